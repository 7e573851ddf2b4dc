// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Loader
//!
//! Parses the declarative pipeline description into a runnable
//! [`Pipeline`]. A description has three sections:
//!
//! ```json
//! {
//!   "policies": { "optional": ["stage-a"] },
//!   "stages": ["stage-a", {"name": "stage-b", "policies": {"optional": ["job-x"]}}],
//!   "jobs": {
//!     "job-x": {"type": "policies.ReadPrivacyPolicy", "stage": "stage-a",
//!               "args": {"address": "Privacy-policy", "location": "privacy"},
//!               "policies": {}}
//!   }
//! }
//! ```
//!
//! Stage entries are either a bare name or `{name, policies}`. Job types
//! are dotted names resolved through the job registry; unknown types
//! collapse to a logged no-op job rather than an error. A job referencing
//! an undeclared stage is a construction error.
//!
//! Job declaration order is significant (jobs are appended to their stage
//! in file order), so the `jobs` section is parsed with an order-preserving
//! map. Files may be JSON or the YAML equivalent.

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use anonymizer_domain::PipelineError;

use crate::execution::job::JobEntry;
use crate::execution::pipeline::Pipeline;
use crate::execution::registry;
use crate::execution::stage::Stage;

#[derive(Debug, Deserialize)]
struct PipelineDescription {
    #[serde(default)]
    policies: Map<String, Value>,
    stages: Vec<StageEntry>,
    #[serde(default)]
    jobs: OrderedJobs,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StageEntry {
    Name(String),
    WithPolicies {
        name: String,
        #[serde(default)]
        policies: Map<String, Value>,
    },
}

#[derive(Debug, Deserialize)]
struct JobDescription {
    #[serde(rename = "type")]
    job_type: String,
    stage: String,
    #[serde(default)]
    args: Map<String, Value>,
    #[serde(default)]
    policies: Map<String, Value>,
}

/// The `jobs` section in document order.
#[derive(Debug, Default)]
struct OrderedJobs(Vec<(String, JobDescription)>);

impl<'de> Deserialize<'de> for OrderedJobs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedJobsVisitor;

        impl<'de> Visitor<'de> for OrderedJobsVisitor {
            type Value = OrderedJobs;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of job name to job description")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, description)) = access.next_entry::<String, JobDescription>()? {
                    entries.push((name, description));
                }
                Ok(OrderedJobs(entries))
            }
        }

        deserializer.deserialize_map(OrderedJobsVisitor)
    }
}

/// Builds a pipeline from a parsed description value.
///
/// # Errors
///
/// Returns `InvalidConfiguration` when the description does not match the
/// schema or a job references an undeclared stage.
pub fn parse(description: &Value) -> Result<Pipeline, PipelineError> {
    let description: PipelineDescription = serde_json::from_value(description.clone())
        .map_err(|e| PipelineError::InvalidConfiguration(format!("Invalid pipeline description: {}", e)))?;

    let mut pipeline = Pipeline::new(Vec::new());
    pipeline.init_policies(description.policies);

    let mut stages: Vec<Stage> = Vec::with_capacity(description.stages.len());
    for entry in description.stages {
        let (name, policies) = match entry {
            StageEntry::Name(name) => (name, Map::new()),
            StageEntry::WithPolicies { name, policies } => (name, policies),
        };
        let mut stage = Stage::new(name, Vec::new());
        stage.init_policies(policies);
        stages.push(stage);
    }

    for (name, description) in description.jobs.0 {
        let job = registry::job_from_type(&description.job_type);
        let mut entry = JobEntry::new(name, job, description.args);
        entry.init_policies(description.policies);
        let stage = stages
            .iter_mut()
            .find(|s| s.name() == description.stage)
            .ok_or_else(|| PipelineError::InvalidConfiguration(format!("Missing stage: {}", description.stage)))?;
        stage.push_job(entry);
    }

    for stage in stages {
        pipeline.push_stage(stage);
    }
    Ok(pipeline)
}

/// Reads and parses a pipeline description file (JSON, or YAML when the
/// extension is `.yaml`/`.yml`).
pub fn parse_file(path: &Path) -> Result<Pipeline, PipelineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::IoError(format!("Unable to read pipeline file {}: {}", path.display(), e)))?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value: Value = if yaml {
        serde_yaml::from_str(&text)
            .map_err(|e| PipelineError::InvalidConfiguration(format!("Invalid pipeline YAML: {}", e)))?
    } else {
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::InvalidConfiguration(format!("Invalid pipeline JSON: {}", e)))?
    };
    parse(&value)
}
