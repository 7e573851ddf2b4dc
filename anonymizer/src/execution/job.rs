// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Contract
//!
//! A job is the smallest unit of work the engine schedules. Concrete jobs
//! implement [`Job::execute`] against a [`JobContext`] that merges the
//! static arguments from the pipeline description with any dynamic ones
//! passed by the stage (dynamic overrides static) and exposes the shared
//! environment.
//!
//! Jobs come in two flavors distinguished by their output:
//!
//! - normal jobs return [`JobOutput::None`] or [`JobOutput::Text`], which
//!   the wrapper records as a successful [`JobResult`];
//! - generator jobs return [`JobOutput::Generated`], a list of new jobs the
//!   stage splices ahead of its remaining queue.
//!
//! The wrapper converts job-level errors into a failed result so the stage
//! keeps running; cancellation and non-job errors propagate untouched.
//!
//! ## Identity
//!
//! Each scheduled job lives in a [`JobEntry`] carrying its unique name
//! (`"<parent>.<child>"` for generated jobs), its ephemeral flag, and the
//! *optionality root*: the declared ancestor name checked against the
//! stage's `optional` policy. Generated jobs inherit the root of their
//! generator, so making a generator optional makes its whole subtree
//! optional.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use anonymizer_domain::entities::{Attribute, Component, Object, Request, TYPE_ANONYMIZABLE};
use anonymizer_domain::PipelineError;

use crate::execution::environment::Environment;

/// Serializable outcome of one job execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobResult {
    pub success: bool,
    pub result: String,
}

impl JobResult {
    pub fn success(result: impl Into<String>) -> Self {
        JobResult {
            success: true,
            result: result.into(),
        }
    }

    pub fn failure() -> Self {
        JobResult {
            success: false,
            result: String::new(),
        }
    }
}

/// Policy bag attached to a job by the pipeline description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPolicies {
    map: Map<String, Value>,
}

impl JobPolicies {
    pub fn from_map(map: Map<String, Value>) -> Self {
        JobPolicies { map }
    }

    /// Whether generated jobs copy this job's policy map (default true).
    pub fn inherit_generated(&self) -> bool {
        self.map
            .get("generated_jobs_inherit_policies")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.map
    }
}

/// A job produced by a generator, before the stage adopts it.
///
/// The name is the bare child name; the stage prefixes it with the
/// generator's name when splicing.
pub struct GeneratedJob {
    pub name: String,
    pub job: Box<dyn Job>,
    pub args: Map<String, Value>,
    pub policies: Option<Map<String, Value>>,
}

impl std::fmt::Debug for GeneratedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedJob")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("policies", &self.policies)
            .finish()
    }
}

impl GeneratedJob {
    pub fn new(name: impl Into<String>, job: Box<dyn Job>, args: Map<String, Value>) -> Self {
        GeneratedJob {
            name: name.into(),
            job,
            args,
            policies: None,
        }
    }
}

/// What a job's body produced.
#[derive(Debug)]
pub enum JobOutput {
    /// Nothing to report; recorded as an empty-string success.
    None,
    /// A textual result for the execution report.
    Text(String),
    /// New jobs to splice ahead of the stage's remaining queue.
    Generated(Vec<GeneratedJob>),
}

/// Execution context handed to a job body.
pub struct JobContext<'a> {
    /// The scheduled job's unique name (for logging and error messages).
    pub name: &'a str,
    /// The shared per-request environment.
    pub env: &'a mut Environment,
    /// Static description arguments merged with dynamic stage arguments.
    pub args: &'a Map<String, Value>,
}

impl<'a> JobContext<'a> {
    /// Fails with a job-level error if any named parameter is absent.
    pub fn verify_parameters(&self, params: &[&str]) -> Result<(), PipelineError> {
        debug!(job = self.name, count = params.len(), "verifying parameters");
        for param in params {
            if !self.args.contains_key(*param) {
                error!(job = self.name, parameter = param, "missing parameter");
                return Err(PipelineError::MissingParameter((*param).to_string()));
            }
        }
        Ok(())
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// A required string argument.
    pub fn arg_str(&self, name: &str) -> Result<&str, PipelineError> {
        self.args
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::MissingParameter(name.to_string()))
    }

    /// An optional boolean argument with loose truthiness: absent and
    /// `null` are false, numbers are compared to zero, anything else is
    /// true.
    pub fn arg_bool(&self, name: &str) -> bool {
        match self.args.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// A required numeric argument.
    pub fn arg_f64(&self, name: &str) -> Result<f64, PipelineError> {
        self.args
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| PipelineError::MissingParameter(name.to_string()))
    }

    /// A required integer argument (numeric strings accepted).
    pub fn arg_i64(&self, name: &str) -> Result<i64, PipelineError> {
        match self.args.get(name) {
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| PipelineError::JobFailed(format!("Parameter {} is not an integer", name))),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| PipelineError::JobFailed(format!("Parameter {} is not an integer", name))),
            _ => Err(PipelineError::MissingParameter(name.to_string())),
        }
    }

    /// A list-of-strings argument; absent yields an empty list.
    pub fn arg_string_list(&self, name: &str) -> Result<Vec<String>, PipelineError> {
        match self.args.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(String::from).ok_or_else(|| {
                        PipelineError::JobFailed(format!("Parameter {} contains a non-string entry", name))
                    })
                })
                .collect(),
            Some(_) => Err(PipelineError::JobFailed(format!(
                "Parameter {} is not a list",
                name
            ))),
        }
    }

    /// Deserializes an argument value that may be an instance (already a
    /// JSON object), a dictionary, or a JSON string.
    pub fn parse_arg_as<T: serde::de::DeserializeOwned>(&self, value: &Value) -> Result<T, PipelineError> {
        let result = match value {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        };
        result.map_err(|e| PipelineError::JobFailed(format!("Not a valid model value: {}", e)))
    }

    /// The internal data-model request.
    pub fn data(&self) -> Result<&Request, PipelineError> {
        self.env.data()
    }

    /// Mutable access to the internal data-model request.
    pub fn data_mut(&mut self) -> Result<&mut Request, PipelineError> {
        self.env.data_mut()
    }

    /// Reads and deserializes a model stored at an env location.
    pub fn model_from_env<T: serde::de::DeserializeOwned>(&self, location: &str) -> Result<T, PipelineError> {
        self.env.model(location)
    }
}

/// Obtain attributes from a component collection, filtered by type set
/// (AND semantics).
pub fn extract_attributes<'a, I>(components: I, types: &[&str]) -> Vec<&'a Attribute>
where
    I: IntoIterator<Item = &'a Component>,
{
    components
        .into_iter()
        .filter_map(Component::as_attribute)
        .filter(|a| a.type_is(types))
        .collect()
}

/// Obtain objects from a component collection, filtered by type set
/// (AND semantics).
pub fn extract_objects<'a, I>(components: I, types: &[&str]) -> Vec<&'a Object>
where
    I: IntoIterator<Item = &'a Component>,
{
    components
        .into_iter()
        .filter_map(Component::as_object)
        .filter(|o| o.type_is(types))
        .collect()
}

/// The components of a request that are candidates for anonymization.
pub fn anonymizable_components(data: &Request) -> Vec<&Component> {
    use anonymizer_domain::entities::ComponentContainer;
    data.types_get(&[TYPE_ANONYMIZABLE])
}

/// A single unit of work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Runs the job body against the merged arguments and shared
    /// environment.
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError>;

    /// Whether this job is a generator. Failed generators are reported
    /// with an empty generated-name list instead of an empty string.
    fn is_generator(&self) -> bool {
        false
    }
}

/// A job as scheduled inside a stage.
pub struct JobEntry {
    pub(crate) name: String,
    pub(crate) job: Box<dyn Job>,
    pub(crate) args: Map<String, Value>,
    pub(crate) policies: JobPolicies,
    pub(crate) ephemeral: bool,
    pub(crate) optional_root: String,
}

/// Outcome of one wrapped job execution, as seen by the stage loop.
pub(crate) enum WrappedOutcome {
    Finished(JobResult),
    Generated {
        success: bool,
        names: Vec<String>,
        entries: Vec<JobEntry>,
    },
}

impl JobEntry {
    /// Creates a declared (non-generated) entry. The optionality root is
    /// the job's own name.
    pub fn new(name: impl Into<String>, job: Box<dyn Job>, args: Map<String, Value>) -> Self {
        let name = name.into();
        JobEntry {
            optional_root: name.clone(),
            name,
            job,
            args,
            policies: JobPolicies::default(),
            ephemeral: false,
        }
    }

    pub fn init_policies(&mut self, map: Map<String, Value>) {
        self.policies = JobPolicies::from_map(map);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adopts a generator's child: prefixes the name, marks it ephemeral,
    /// and propagates the optionality root and (by default) the policy map.
    fn adopt(&self, child: GeneratedJob) -> JobEntry {
        let policies = if self.policies.inherit_generated() {
            self.policies.clone()
        } else {
            JobPolicies::from_map(child.policies.unwrap_or_default())
        };
        JobEntry {
            name: format!("{}.{}", self.name, child.name),
            job: child.job,
            args: child.args,
            policies,
            ephemeral: true,
            optional_root: self.optional_root.clone(),
        }
    }

    /// Runs the job with merged arguments, converting job-level failures
    /// into failed results. Cancellation and non-job errors propagate.
    pub(crate) async fn run_wrapped(
        &self,
        env: &mut Environment,
        kwargs: &Map<String, Value>,
    ) -> Result<WrappedOutcome, PipelineError> {
        let mut merged = self.args.clone();
        for (key, value) in kwargs {
            merged.insert(key.clone(), value.clone());
        }
        let mut ctx = JobContext {
            name: &self.name,
            env,
            args: &merged,
        };
        match self.job.execute(&mut ctx).await {
            Ok(JobOutput::None) => Ok(WrappedOutcome::Finished(JobResult::success(""))),
            Ok(JobOutput::Text(text)) => Ok(WrappedOutcome::Finished(JobResult::success(text))),
            Ok(JobOutput::Generated(children)) => {
                let names: Vec<String> = children.iter().map(|c| c.name.clone()).collect();
                let entries: Vec<JobEntry> = children.into_iter().map(|c| self.adopt(c)).collect();
                Ok(WrappedOutcome::Generated {
                    success: true,
                    names,
                    entries,
                })
            }
            Err(e) if e.is_job_level() => {
                error!(job = %self.name, error = %e, "caught an exception");
                debug!(job = %self.name, args = ?merged, "runtime arguments");
                if self.job.is_generator() {
                    Ok(WrappedOutcome::Generated {
                        success: false,
                        names: Vec::new(),
                        entries: Vec::new(),
                    })
                } else {
                    Ok(WrappedOutcome::Finished(JobResult::failure()))
                }
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_env;

    struct Echo;

    #[async_trait]
    impl Job for Echo {
        async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
            ctx.verify_parameters(&["message"])?;
            Ok(JobOutput::Text(ctx.arg_str("message")?.to_string()))
        }
    }

    #[tokio::test]
    async fn dynamic_arguments_override_static_ones() {
        let mut statics = Map::new();
        statics.insert("message".into(), Value::String("static".into()));
        let entry = JobEntry::new("echo", Box::new(Echo), statics);

        let mut env = test_env();
        let mut kwargs = Map::new();
        kwargs.insert("message".into(), Value::String("dynamic".into()));
        match entry.run_wrapped(&mut env, &kwargs).await.unwrap() {
            WrappedOutcome::Finished(result) => {
                assert!(result.success);
                assert_eq!(result.result, "dynamic");
            }
            _ => panic!("expected a finished result"),
        }
    }

    #[tokio::test]
    async fn missing_parameter_is_a_recorded_failure() {
        let entry = JobEntry::new("echo", Box::new(Echo), Map::new());
        let mut env = test_env();
        match entry.run_wrapped(&mut env, &Map::new()).await.unwrap() {
            WrappedOutcome::Finished(result) => {
                assert!(!result.success);
                assert_eq!(result.result, "");
            }
            _ => panic!("expected a finished result"),
        }
    }

    struct Panicky;

    #[async_trait]
    impl Job for Panicky {
        async fn execute(&self, _ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
            Err(PipelineError::Cancelled("transport closed".into()))
        }
    }

    #[tokio::test]
    async fn cancellation_propagates_instead_of_failing_the_job() {
        let entry = JobEntry::new("job", Box::new(Panicky), Map::new());
        let mut env = test_env();
        assert!(matches!(
            entry.run_wrapped(&mut env, &Map::new()).await,
            Err(PipelineError::Cancelled(_))
        ));
    }
}
