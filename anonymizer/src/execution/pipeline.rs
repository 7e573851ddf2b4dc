// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline
//!
//! The ordered sequence of stages executed per request. Stages run strictly
//! in declaration order and never overlap; each stage's report is stored
//! under its name. After all stages have run, the pipeline is marked failed
//! iff any *non-optional* stage failed.
//!
//! Before each stage runs, a snapshot of the accumulated report is placed
//! on the environment so reply jobs can return the results of everything
//! that completed earlier.
//!
//! Pipeline-machinery errors (not stage or job failures) are caught once
//! per run and collapse to `success = false` with an empty result map;
//! anything else escapes to the HTTP layer.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use anonymizer_domain::PipelineError;

use crate::execution::environment::{Environment, EnvValue, KEY_PIPELINE_RESULTS};
use crate::execution::stage::{Stage, StageResult};
use crate::execution::ResultMap;

/// Serializable execution report of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub result: ResultMap<StageResult>,
}

impl PipelineResult {
    fn fresh() -> Self {
        PipelineResult {
            success: true,
            result: ResultMap::new(),
        }
    }

    fn broken() -> Self {
        PipelineResult {
            success: false,
            result: ResultMap::new(),
        }
    }
}

/// An ordered sequence of stages with policy-driven failure semantics.
pub struct Pipeline {
    stages: Vec<Stage>,
    next: usize,
    result: PipelineResult,
    optional: Vec<String>,
    discard_response_on_failure: bool,
    policies: Map<String, Value>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Pipeline {
            stages,
            next: 0,
            result: PipelineResult::fresh(),
            optional: Vec::new(),
            discard_response_on_failure: true,
            policies: Map::new(),
        }
    }

    /// Applies the pipeline policy bag.
    ///
    /// Recognized options: `optional` (stage names whose failure does not
    /// fail the pipeline) and `discard_response_on_failure` (reserved,
    /// default true).
    pub fn init_policies(&mut self, policies: Map<String, Value>) {
        self.optional = policies
            .get("optional")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        self.discard_response_on_failure = policies
            .get("discard_response_on_failure")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        self.policies = policies;
    }

    pub fn push_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// The raw policy bag this pipeline was configured with.
    pub fn policies(&self) -> &Map<String, Value> {
        &self.policies
    }

    /// Reserved option: whether a default response body is discarded on
    /// overall failure (default true).
    pub fn discard_response_on_failure(&self) -> bool {
        self.discard_response_on_failure
    }

    /// Rewinds the pipeline and all stages for a fresh request.
    ///
    /// Engines must call this before each run.
    pub fn reset(&mut self) {
        self.result = PipelineResult::fresh();
        self.next = 0;
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    /// Executes all stages in the pipeline.
    pub async fn run_wrapped(
        &mut self,
        env: &mut Environment,
        kwargs: &Map<String, Value>,
    ) -> Result<PipelineResult, PipelineError> {
        match self.run_all(env, kwargs).await {
            Ok(()) => {
                for (stage_name, stage_result) in self.result.result.iter() {
                    if self.optional.iter().any(|o| o.as_str() == stage_name) {
                        continue;
                    }
                    if !stage_result.success {
                        self.result.success = false;
                        break;
                    }
                }
                Ok(self.result.clone())
            }
            Err(PipelineError::PipelineFailed(msg)) => {
                error!(error = %msg, "pipeline caught an exception");
                debug!(args = ?kwargs, "runtime arguments");
                Ok(PipelineResult::broken())
            }
            Err(e) => Err(e),
        }
    }

    /// Executes all remaining stages, resuming from the cursor.
    async fn run_all(&mut self, env: &mut Environment, kwargs: &Map<String, Value>) -> Result<(), PipelineError> {
        while self.run_one(env, kwargs).await? {}
        Ok(())
    }

    /// Executes the next stage in line; returns `false` when none remain.
    async fn run_one(&mut self, env: &mut Environment, kwargs: &Map<String, Value>) -> Result<bool, PipelineError> {
        if self.next >= self.stages.len() {
            return Ok(false);
        }
        let index = self.next;
        self.next += 1;

        // Reply jobs read the report-so-far from the environment.
        let snapshot = serde_json::to_value(&self.result)?;
        env.set(KEY_PIPELINE_RESULTS, EnvValue::Json(snapshot));

        let stage = &mut self.stages[index];
        info!(stage = %stage.name(), "begin execution of stage");
        let stage_result = stage.run_wrapped(env, kwargs).await?;
        info!(stage = %stage.name(), "finished execution of stage");
        let name = stage.name().to_string();
        self.result.result.insert(name, stage_result);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::job::{Job, JobContext, JobEntry, JobOutput};
    use crate::test_support::test_env;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Job for Noop {
        async fn execute(&self, _ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
            Ok(JobOutput::None)
        }
    }

    struct Failing;

    #[async_trait]
    impl Job for Failing {
        async fn execute(&self, _ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
            Err(PipelineError::JobFailed("deliberate".into()))
        }
    }

    fn stage_with(name: &str, job: Box<dyn Job>) -> Stage {
        Stage::new(name, vec![JobEntry::new("1", job, Map::new())])
    }

    #[tokio::test]
    async fn success_requires_every_non_optional_stage() {
        let mut pipeline = Pipeline::new(vec![
            stage_with("ok", Box::new(Noop)),
            stage_with("bad", Box::new(Failing)),
        ]);
        let mut env = test_env();
        let result = pipeline.run_wrapped(&mut env, &Map::new()).await.unwrap();
        assert!(!result.success);
        assert!(result.result.get("ok").unwrap().success);
        assert!(!result.result.get("bad").unwrap().success);
    }

    #[tokio::test]
    async fn optional_stage_failure_is_forgiven() {
        let mut pipeline = Pipeline::new(vec![stage_with("bad", Box::new(Failing))]);
        let mut policies = Map::new();
        policies.insert("optional".into(), serde_json::json!(["bad"]));
        pipeline.init_policies(policies);

        let mut env = test_env();
        let result = pipeline.run_wrapped(&mut env, &Map::new()).await.unwrap();
        assert!(result.success);
        assert!(!result.result.get("bad").unwrap().success);
    }

    #[tokio::test]
    async fn reset_allows_reuse() {
        let mut pipeline = Pipeline::new(vec![stage_with("ok", Box::new(Noop))]);
        let mut env = test_env();
        let first = pipeline.run_wrapped(&mut env, &Map::new()).await.unwrap();
        assert_eq!(first.result.len(), 1);

        pipeline.reset();
        let mut env = test_env();
        let second = pipeline.run_wrapped(&mut env, &Map::new()).await.unwrap();
        assert_eq!(second.result.len(), 1);
        assert!(second.success);
    }

    #[tokio::test]
    async fn later_stages_see_earlier_results_on_the_environment() {
        struct ReadSnapshot;

        #[async_trait]
        impl Job for ReadSnapshot {
            async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
                let snapshot = match ctx.env.get(KEY_PIPELINE_RESULTS) {
                    Some(EnvValue::Json(v)) => v.clone(),
                    _ => return Err(PipelineError::JobFailed("no snapshot".into())),
                };
                Ok(JobOutput::Text(
                    snapshot["result"]["first"]["success"].to_string(),
                ))
            }
        }

        let mut pipeline = Pipeline::new(vec![
            stage_with("first", Box::new(Noop)),
            stage_with("second", Box::new(ReadSnapshot)),
        ]);
        let mut env = test_env();
        let result = pipeline.run_wrapped(&mut env, &Map::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(
            result.result.get("second").unwrap().result.get("1").unwrap().result,
            "true"
        );
    }
}
