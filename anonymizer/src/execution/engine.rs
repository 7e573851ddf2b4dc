// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Engine Facade
//!
//! Per-request entry point into the pipeline machinery. The engine loads a
//! pipeline from its declarative description (falling back to a default
//! echo pipeline when the description is absent or unreadable), constructs
//! the request environment, invokes the pipeline, and derives the HTTP
//! reply:
//!
//! - the reply a job stored on the environment is returned as-is, otherwise
//!   an empty 200;
//! - when the pipeline reports failure the status is forced to 400 while
//!   any body the pipeline produced is preserved.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use anonymizer_domain::entities::Request;
use anonymizer_domain::PipelineError;

use crate::execution::environment::{
    Environment, EnvValue, HttpReply, ServiceContext, KEY_BODY, KEY_DATA, KEY_REQUEST,
};
use crate::execution::job::JobEntry;
use crate::execution::jobs::RequestPong;
use crate::execution::loader;
use crate::execution::pipeline::Pipeline;
use crate::execution::stage::Stage;

/// The pipeline installed when no description is available: a single stage
/// echoing the incoming JSON payload.
fn default_pipeline() -> Pipeline {
    let mut job = JobEntry::new("default-pong", Box::new(RequestPong), Map::new());
    job.init_policies(Map::new());
    let mut stage = Stage::new("default-stage", vec![job]);
    stage.init_policies(Map::new());
    let mut pipeline = Pipeline::new(vec![stage]);
    pipeline.init_policies(Map::new());
    pipeline
}

/// Per-request facade over the pipeline machinery.
pub struct ExecutionEngine {
    pipeline: Pipeline,
}

impl ExecutionEngine {
    /// Loads the pipeline from a description file.
    ///
    /// An absent or unreadable file installs the default echo pipeline;
    /// loading never fails the request.
    pub fn new(pipeline_file: Option<&Path>) -> Self {
        match pipeline_file {
            Some(path) => {
                info!(file = %path.display(), "loading pipeline from file");
                match loader::parse_file(path) {
                    Ok(pipeline) => return ExecutionEngine { pipeline },
                    Err(e) => {
                        error!(file = %path.display(), error = %e, "unable to load pipeline from file");
                    }
                }
            }
            None => info!("unable to load pipeline: no pipeline file supplied"),
        }
        info!("loading default pipeline");
        ExecutionEngine {
            pipeline: default_pipeline(),
        }
    }

    /// Builds an engine from an in-memory description.
    pub fn from_description(description: &Value) -> Result<Self, PipelineError> {
        Ok(ExecutionEngine {
            pipeline: loader::parse(description)?,
        })
    }

    /// Runs the pipeline for one request.
    ///
    /// # Arguments
    ///
    /// * `payload` - the raw inbound JSON payload
    /// * `data` - the transformed internal request
    /// * `body` - the validated (possibly transformer-updated) body
    /// * `audit_timestamp` - timestamp of the pre-run audit record
    /// * `services` - process-wide collaborators
    ///
    /// # Errors
    ///
    /// Only non-pipeline errors escape (and the HTTP layer maps them to
    /// 500); pipeline, stage and job failures are folded into the reply.
    pub async fn run(
        &mut self,
        payload: Value,
        data: Request,
        body: Value,
        audit_timestamp: f64,
        services: Arc<ServiceContext>,
    ) -> Result<HttpReply, PipelineError> {
        let mut env = Environment::new(services, audit_timestamp);
        env.set(KEY_REQUEST, EnvValue::Payload(payload));
        env.set(KEY_DATA, EnvValue::Data(data));
        env.set(KEY_BODY, EnvValue::Json(body));

        self.pipeline.reset();
        info!("execution begin");
        let result = self.pipeline.run_wrapped(&mut env, &Map::new()).await?;
        info!("execution finished");

        let mut reply = env.response().cloned().unwrap_or_else(|| HttpReply::empty(200));
        if !result.success {
            error!("pipeline was not successful");
            reply.status = 400;
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_services;

    #[tokio::test]
    async fn default_pipeline_echoes_the_payload() {
        let mut engine = ExecutionEngine::new(None);
        let payload = serde_json::json!({"a": 1});
        let reply = engine
            .run(
                payload.clone(),
                Request::default(),
                Value::Null,
                0.0,
                test_services(),
            )
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, Some(payload));
    }

    #[tokio::test]
    async fn failing_pipeline_forces_status_400() {
        let description = serde_json::json!({
            "stages": ["1"],
            "jobs": {
                "1": {"type": "DummyJob", "stage": "1",
                      "args": {"message": "boom", "fail": true}}
            }
        });
        let mut engine = ExecutionEngine::from_description(&description).unwrap();
        let reply = engine
            .run(Value::Null, Request::default(), Value::Null, 0.0, test_services())
            .await
            .unwrap();
        assert_eq!(reply.status, 400);
        assert_eq!(reply.body, None);
    }

    #[tokio::test]
    async fn missing_pipeline_file_falls_back_to_default() {
        let mut engine = ExecutionEngine::new(Some(Path::new("/definitely/not/here.json")));
        let reply = engine
            .run(
                serde_json::json!({"echo": true}),
                Request::default(),
                Value::Null,
                0.0,
                test_services(),
            )
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, Some(serde_json::json!({"echo": true})));
    }
}
