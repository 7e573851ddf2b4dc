// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage
//!
//! An ordered sequence of jobs and the smallest unit of success/failure
//! reporting. The stage runs a single cursor loop; generator output is
//! expanded *in place*, so generated jobs observe the environment exactly
//! as if they had been declared inline at their generator's position.
//!
//! For every executed job the loop:
//!
//! 1. removes the job again if it is ephemeral (generated), shifting the
//!    cursor back so subsequent jobs slide in;
//! 2. splices generated jobs in reverse order at the cursor, making the
//!    first child the very next job to run, and rewrites the generator's
//!    report entry to the stringified list of child names so the report
//!    stays serializable;
//! 3. records the result under the job's name;
//! 4. counts a failure, and a *fatal* failure when the job's optionality
//!    root is not in the stage's `optional` policy list.
//!
//! The stage succeeds iff no fatal failure occurred and the stage machinery
//! itself did not throw (`failures = -1` marks the latter).

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use anonymizer_domain::PipelineError;

use crate::execution::environment::Environment;
use crate::execution::job::{JobEntry, JobResult, WrappedOutcome};
use crate::execution::ResultMap;

/// Serializable execution report of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageResult {
    pub success: bool,
    pub result: ResultMap<JobResult>,
    pub failures: i64,
}

impl StageResult {
    fn fresh() -> Self {
        StageResult {
            success: true,
            result: ResultMap::new(),
            failures: 0,
        }
    }

    fn broken() -> Self {
        StageResult {
            success: false,
            result: ResultMap::new(),
            failures: -1,
        }
    }
}

/// An ordered, generator-expandable sequence of jobs.
pub struct Stage {
    name: String,
    jobs: Vec<JobEntry>,
    next: usize,
    fatal_failures: i64,
    result: StageResult,
    optional: Vec<String>,
    policies: Map<String, Value>,
}

impl Stage {
    pub fn new(name: impl Into<String>, jobs: Vec<JobEntry>) -> Self {
        Stage {
            name: name.into(),
            jobs,
            next: 0,
            fatal_failures: 0,
            result: StageResult::fresh(),
            optional: Vec::new(),
            policies: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies the stage policy bag (`optional`: job names whose failure is
    /// not fatal).
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
        self.policies = policies;
    }

    pub fn push_job(&mut self, job: JobEntry) {
        self.jobs.push(job);
    }

    /// The raw policy bag this stage was configured with.
    pub fn policies(&self) -> &Map<String, Value> {
        &self.policies
    }

    /// Rewinds the cursor and counters for a fresh run.
    pub fn reset(&mut self) {
        self.result = StageResult::fresh();
        self.next = 0;
        self.fatal_failures = 0;
    }

    /// Executes all jobs in the stage.
    ///
    /// Stage-machinery errors are caught here and reported as
    /// `success = false, failures = -1`; job-level failures have already
    /// been folded into the report by the job wrapper. Everything else
    /// (including cancellation) propagates.
    pub async fn run_wrapped(
        &mut self,
        env: &mut Environment,
        kwargs: &Map<String, Value>,
    ) -> Result<StageResult, PipelineError> {
        match self.run_all(env, kwargs).await {
            Ok(()) => {
                if self.fatal_failures > 0 {
                    self.result.success = false;
                }
                Ok(self.result.clone())
            }
            Err(PipelineError::StageFailed(msg)) => {
                error!(stage = %self.name, error = %msg, "caught an exception");
                debug!(stage = %self.name, args = ?kwargs, "runtime arguments");
                Ok(StageResult::broken())
            }
            Err(e) => Err(e),
        }
    }

    /// Executes all remaining jobs, resuming from the cursor.
    async fn run_all(&mut self, env: &mut Environment, kwargs: &Map<String, Value>) -> Result<(), PipelineError> {
        while self.run_one(env, kwargs).await? {}
        Ok(())
    }

    /// Executes the next job in line; returns `false` when none remain.
    async fn run_one(&mut self, env: &mut Environment, kwargs: &Map<String, Value>) -> Result<bool, PipelineError> {
        if self.next >= self.jobs.len() {
            return Ok(false);
        }
        let index = self.next;
        self.next += 1;

        let (outcome, name, ephemeral, optional_root) = {
            let entry = &self.jobs[index];
            info!(stage = %self.name, job = %entry.name(), "begin execution of job");
            let outcome = entry.run_wrapped(env, kwargs).await?;
            info!(stage = %self.name, job = %entry.name(), "finished execution of job");
            (
                outcome,
                entry.name.clone(),
                entry.ephemeral,
                entry.optional_root.clone(),
            )
        };

        if ephemeral {
            info!(stage = %self.name, job = %name, "removing ephemeral job");
            self.jobs.remove(index);
            self.next -= 1;
        }

        let job_result = match outcome {
            WrappedOutcome::Finished(result) => result,
            WrappedOutcome::Generated {
                success,
                names,
                entries,
            } => {
                info!(stage = %self.name, job = %name, count = entries.len(), "job created new jobs");
                for entry in entries.into_iter().rev() {
                    self.jobs.insert(self.next, entry);
                }
                // The report must stay serializable, so the generated jobs
                // are replaced by the list of their names.
                JobResult {
                    success,
                    result: stringify_names(&names),
                }
            }
        };

        if !job_result.success {
            self.result.failures += 1;
            if !self.optional.contains(&optional_root) {
                self.fatal_failures += 1;
            }
        }
        self.result.result.insert(name, job_result);
        Ok(true)
    }
}

/// Renders a name list the way the execution report expects it,
/// e.g. `['c1', 'c2']`.
fn stringify_names(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::job::{GeneratedJob, Job, JobContext, JobOutput};
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

    struct TwoChildren;

    #[async_trait]
    impl Job for TwoChildren {
        async fn execute(&self, _ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
            Ok(JobOutput::Generated(vec![
                GeneratedJob::new("c1", Box::new(Noop), Map::new()),
                GeneratedJob::new("c2", Box::new(Noop), Map::new()),
            ]))
        }

        fn is_generator(&self) -> bool {
            true
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Job for FailingGenerator {
        async fn execute(&self, _ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
            Err(PipelineError::JobFailed("deliberate".into()))
        }

        fn is_generator(&self) -> bool {
            true
        }
    }

    fn entry(name: &str, job: Box<dyn Job>) -> JobEntry {
        JobEntry::new(name, job, Map::new())
    }

    #[tokio::test]
    async fn generator_children_run_in_order_and_are_reported_prefixed() {
        let mut stage = Stage::new(
            "1",
            vec![entry("g", Box::new(TwoChildren)), entry("after", Box::new(Noop))],
        );
        let mut env = test_env();
        let result = stage.run_wrapped(&mut env, &Map::new()).await.unwrap();

        assert!(result.success);
        let keys: Vec<&str> = result.result.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["g", "g.c1", "g.c2", "after"]);
        assert_eq!(result.result.get("g").unwrap().result, "['c1', 'c2']");
        // Ephemeral children were removed after running.
        assert_eq!(stage.jobs.len(), 2);
    }

    #[tokio::test]
    async fn failed_generator_reports_an_empty_name_list() {
        let mut stage = Stage::new("1", vec![entry("g", Box::new(FailingGenerator))]);
        let mut env = test_env();
        let result = stage.run_wrapped(&mut env, &Map::new()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.result.len(), 1);
        let g = result.result.get("g").unwrap();
        assert!(!g.success);
        assert_eq!(g.result, "[]");
    }

    #[tokio::test]
    async fn optional_jobs_do_not_fail_the_stage() {
        let mut stage = Stage::new(
            "1",
            vec![entry("bad", Box::new(Failing)), entry("good", Box::new(Noop))],
        );
        let mut policies = Map::new();
        policies.insert("optional".into(), serde_json::json!(["bad"]));
        stage.init_policies(policies);

        let mut env = test_env();
        let result = stage.run_wrapped(&mut env, &Map::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.failures, 1);
        assert!(!result.result.get("bad").unwrap().success);
    }

    #[tokio::test]
    async fn non_optional_failure_is_fatal() {
        let mut stage = Stage::new("1", vec![entry("bad", Box::new(Failing))]);
        let mut env = test_env();
        let result = stage.run_wrapped(&mut env, &Map::new()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.failures, 1);
    }

    #[tokio::test]
    async fn optional_generator_makes_its_children_optional() {
        struct FailingChildGenerator;

        #[async_trait]
        impl Job for FailingChildGenerator {
            async fn execute(&self, _ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
                Ok(JobOutput::Generated(vec![GeneratedJob::new(
                    "child",
                    Box::new(Failing),
                    Map::new(),
                )]))
            }

            fn is_generator(&self) -> bool {
                true
            }
        }

        let mut stage = Stage::new("1", vec![entry("g", Box::new(FailingChildGenerator))]);
        let mut policies = Map::new();
        policies.insert("optional".into(), serde_json::json!(["g"]));
        stage.init_policies(policies);

        let mut env = test_env();
        let result = stage.run_wrapped(&mut env, &Map::new()).await.unwrap();
        // The child failed, but its optionality root ("g") is optional.
        assert!(result.success);
        assert_eq!(result.failures, 1);
        assert!(!result.result.get("g.child").unwrap().success);
    }
}
