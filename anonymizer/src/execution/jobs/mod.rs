// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Library
//!
//! Concrete jobs, grouped by backend:
//!
//! - this module: control and reply jobs (pongs, dummies, the no-op
//!   fallback)
//! - [`policies`]: side-car policy parsing into the environment
//! - [`context`]: context-store persistence
//! - [`arxlet`]: statistical disclosure control via the ARXlet service
//! - [`flaskdp`]: differential privacy via the FlaskDP service
//! - [`local`]: in-process suppression/generalization and PGP encryption
//! - [`misp`], [`mqtt`], [`stix`]: publication sinks and event conversion
//!
//! Jobs are instantiated by the registry from the dotted type names used
//! in pipeline descriptions.

pub mod arxlet;
pub mod context;
pub mod flaskdp;
pub mod local;
pub mod misp;
pub mod mqtt;
pub mod policies;
pub mod stix;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use anonymizer_domain::PipelineError;

use crate::execution::environment::{EnvKind, EnvValue, HttpReply, KEY_PIPELINE_RESULTS};
use crate::execution::job::{GeneratedJob, Job, JobContext, JobOutput};
use crate::execution::registry;

/// Sets the environment's HTTP reply to a 200 JSON response.
fn reply_json(ctx: &mut JobContext<'_>, body: Value) {
    ctx.env.set_response(HttpReply::json(body));
}

/// Replies with the raw inbound JSON payload.
pub struct RequestPong;

#[async_trait]
impl Job for RequestPong {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        let body = ctx.env.payload()?.clone();
        reply_json(ctx, body);
        Ok(JobOutput::None)
    }
}

/// Replies with the internal data-model request in dictionary form.
pub struct DataPong;

#[async_trait]
impl Job for DataPong {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        let body = serde_json::to_value(ctx.data()?)?;
        reply_json(ctx, body);
        Ok(JobOutput::None)
    }
}

/// Replies with the pipeline report accumulated so far.
pub struct ResultsPong;

#[async_trait]
impl Job for ResultsPong {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        let body = match ctx.env.get_expected(KEY_PIPELINE_RESULTS, EnvKind::Json)? {
            EnvValue::Json(value) => value.clone(),
            _ => unreachable!(),
        };
        reply_json(ctx, body);
        Ok(JobOutput::None)
    }
}

/// Replies with a model instance stored at an env location.
///
/// Required parameters:
///
/// - `object_location` (`str`): the location of the model to reply with.
pub struct ModelPong;

impl ModelPong {
    pub const PARAM_OBJECT_LOCATION: &'static str = "object_location";
}

#[async_trait]
impl Job for ModelPong {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[Self::PARAM_OBJECT_LOCATION])?;
        let location = ctx.arg_str(Self::PARAM_OBJECT_LOCATION)?;
        let body = match ctx.env.get_expected(location, EnvKind::Model)? {
            EnvValue::Model(value) => value.clone(),
            _ => unreachable!(),
        };
        reply_json(ctx, body);
        Ok(JobOutput::None)
    }
}

/// The no-op job unknown registry names collapse to.
pub struct Empty;

#[async_trait]
impl Job for Empty {
    async fn execute(&self, _ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        Ok(JobOutput::None)
    }
}

/// A dummy job for testing purposes.
///
/// Required parameters:
///
/// - `message` (`str`): a message to log when executing this job.
///
/// Optional parameters:
///
/// - `fail` (`bool`): whether the job should fail. Defaults to false.
pub struct DummyJob;

impl DummyJob {
    pub const PARAM_MESSAGE: &'static str = "message";
    pub const PARAM_FAIL: &'static str = "fail";
}

#[async_trait]
impl Job for DummyJob {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[Self::PARAM_MESSAGE])?;
        let message = ctx.arg_str(Self::PARAM_MESSAGE)?;
        info!(job = ctx.name, message, "dummy job");
        if ctx.arg_bool(Self::PARAM_FAIL) {
            return Err(PipelineError::JobFailed(format!("Dummy job {} failed", ctx.name)));
        }
        Ok(JobOutput::None)
    }
}

/// A dummy generator job for testing purposes.
///
/// Required parameters:
///
/// - `jobs` (`list[dict]`): the jobs to generate. Each entry carries
///   `name`, `type`, `args` and `policies` fields as in the pipeline
///   description.
///
/// Optional parameters:
///
/// - `message` (`str`): a message to log when executing this job.
/// - `fail` (`bool`): whether the job should fail. Defaults to false.
pub struct DummyGeneratorJob;

impl DummyGeneratorJob {
    pub const PARAM_JOBS: &'static str = "jobs";
}

#[async_trait]
impl Job for DummyGeneratorJob {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[Self::PARAM_JOBS])?;
        if let Some(message) = ctx.arg(DummyJob::PARAM_MESSAGE).and_then(Value::as_str) {
            info!(job = ctx.name, message, "dummy generator job");
        }
        if ctx.arg_bool(DummyJob::PARAM_FAIL) {
            return Err(PipelineError::JobFailed(format!("Dummy job {} failed", ctx.name)));
        }

        let entries = ctx
            .arg(Self::PARAM_JOBS)
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::JobFailed("Parameter jobs is not a list".into()))?;

        let mut generated = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::JobFailed("Generated job entry lacks a name".into()))?;
            let job_type = entry
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::JobFailed("Generated job entry lacks a type".into()))?;
            let args = entry
                .get("args")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let policies = entry.get("policies").and_then(Value::as_object).cloned();
            let mut child = GeneratedJob::new(name, registry::job_from_type(job_type), args);
            child.policies = policies;
            generated.push(child);
        }
        Ok(JobOutput::Generated(generated))
    }

    fn is_generator(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::environment::KEY_REQUEST;
    use crate::test_support::test_env;
    use serde_json::{json, Map};

    fn ctx_args(args: Value) -> Map<String, Value> {
        args.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn request_pong_echoes_the_payload() {
        let mut env = test_env();
        env.set(KEY_REQUEST, EnvValue::Payload(json!({"a": 1})));
        let args = Map::new();
        let mut ctx = JobContext {
            name: "pong",
            env: &mut env,
            args: &args,
        };
        RequestPong.execute(&mut ctx).await.unwrap();
        let reply = env.response().unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn dummy_job_fails_on_request() {
        let mut env = test_env();
        let args = ctx_args(json!({"message": "boom", "fail": true}));
        let mut ctx = JobContext {
            name: "dummy",
            env: &mut env,
            args: &args,
        };
        assert!(matches!(
            DummyJob.execute(&mut ctx).await,
            Err(PipelineError::JobFailed(_))
        ));
    }

    #[tokio::test]
    async fn dummy_generator_builds_children_from_descriptions() {
        let mut env = test_env();
        let args = ctx_args(json!({
            "jobs": [
                {"name": "c1", "type": "DummyJob", "args": {"message": "one"}, "policies": {}},
                {"name": "c2", "type": "DummyJob", "args": {"message": "two"}, "policies": {}}
            ]
        }));
        let mut ctx = JobContext {
            name: "g",
            env: &mut env,
            args: &args,
        };
        match DummyGeneratorJob.execute(&mut ctx).await.unwrap() {
            JobOutput::Generated(children) => {
                let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["c1", "c2"]);
            }
            _ => panic!("expected generated jobs"),
        }
    }
}
