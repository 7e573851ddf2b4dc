// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Engine
//!
//! The three-level hierarchical scheduler at the heart of the orchestrator:
//!
//! ```text
//! ExecutionEngine -> Pipeline -> Stage -> Job
//! ```
//!
//! A declarative description is loaded into a [`pipeline::Pipeline`] of
//! [`stage::Stage`]s, each holding an ordered list of jobs. Per request the
//! engine builds a fresh [`environment::Environment`], runs the pipeline,
//! and derives the HTTP response from what the jobs left behind. Generator
//! jobs may splice further jobs ahead of the remaining queue, turning the
//! declarative privacy policies into a concrete sequential job stream.
//!
//! Execution is single-threaded cooperative per request: jobs within a
//! stage never overlap, stages never overlap, and every suspension point is
//! an external I/O call. Failure semantics are policy-driven at each level
//! through `optional` lists.

pub mod engine;
pub mod environment;
pub mod job;
pub mod jobs;
pub mod loader;
pub mod pipeline;
pub mod registry;
pub mod stage;

pub use engine::ExecutionEngine;
pub use environment::{Environment, EnvKind, EnvValue, HttpReply, ServiceContext};
pub use job::{GeneratedJob, Job, JobContext, JobEntry, JobOutput, JobPolicies, JobResult};
pub use pipeline::{Pipeline, PipelineResult};
pub use stage::{Stage, StageResult};

use serde::ser::SerializeMap;
use serde::Serialize;

/// Insertion-ordered result map.
///
/// Execution reports key job and stage results by name. The report is
/// serialized as a JSON object whose key order must follow execution order
/// (generator children appear right after their generator), so a plain
/// sorted map will not do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMap<T>(Vec<(String, T)>);

impl<T> ResultMap<T> {
    pub fn new() -> Self {
        ResultMap(Vec::new())
    }

    /// Inserts or replaces the value under `name`, keeping its position on
    /// replacement.
    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<T: Serialize> Serialize for ResultMap<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
