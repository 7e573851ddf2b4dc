// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Store Port
//!
//! Per-request audit records ordered by timestamp (sorted-set semantics).
//! A snapshot of the inbound payload is logged before the pipeline runs;
//! sink jobs update the record afterwards (e.g. marking a threat event as
//! uploaded/published).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::PipelineError;

/// Mutation applied to a stored audit record by [`AuditStore::update`].
pub type AuditUpdate = Box<dyn FnOnce(Value) -> Value + Send>;

/// Persistence port for timestamp-ordered audit records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Stores an audit record; returns the timestamp it was stored under.
    ///
    /// When `timestamp` is `None` the current time is used.
    async fn log(&self, audit: Value, timestamp: Option<f64>) -> Result<f64, PipelineError>;

    /// Removes and returns the audit logged at the given timestamp.
    ///
    /// Returns `None` when no single record matches.
    async fn remove(&self, timestamp: f64) -> Result<Option<Value>, PipelineError>;

    /// Rewrites the audit at the given timestamp through `update`.
    ///
    /// Returns `false` when no record was found.
    async fn update(&self, timestamp: f64, update: AuditUpdate) -> Result<bool, PipelineError>;

    /// Retrieves audits within `[from, until]`, oldest first.
    async fn audits(
        &self,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Value>, PipelineError>;
}
