// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the anonymizer
//! domain. Failures are categorized into the execution families the engine
//! distinguishes (job, stage, pipeline, client, cancellation) plus the usual
//! infrastructure categories (validation, configuration, serialization,
//! database, I/O).
//!
//! ## Overview
//!
//! The execution engine catches exactly one family per level:
//!
//! - The job wrapper catches **job-level** errors and records them as a
//!   failed job result; everything else propagates.
//! - The stage wrapper catches `StageFailed` and reports `failures = -1`.
//! - The pipeline wrapper catches `PipelineFailed` and reports an empty
//!   result map.
//! - `Cancelled` is never swallowed: a cancelled job must not mark itself
//!   failed, so cancellation always propagates to the transport layer.
//! - Anything else escapes to the HTTP layer, which logs and returns 500.
//!
//! Client errors are raised by external-service clients; the calling job
//! converts them into job failures, mirroring the narrow-catch propagation
//! policy.

use thiserror::Error;

/// Domain-specific errors for the anonymization pipeline system.
///
/// Each variant carries a descriptive message. Variants are grouped into
/// execution families used by the engine's catch points and infrastructure
/// categories used by clients and stores.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A job failed its contract (upstream service reported non-success,
    /// hierarchy shallower than requested, and so on).
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// A required job parameter was absent from the merged argument bag.
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// An environment attribute a job relied on was not present.
    #[error("Environment attribute not found: {0}")]
    EnvAttributeNotFound(String),

    /// An environment attribute held a value of an unexpected kind.
    #[error("Environment attribute returned invalid object: {0}")]
    EnvTypeMismatch(String),

    /// A stage's own machinery failed (not any job within it).
    #[error("Stage failed: {0}")]
    StageFailed(String),

    /// The pipeline machinery failed (not any stage within it).
    #[error("Pipeline failed: {0}")]
    PipelineFailed(String),

    /// An external-service client failed (transport or initialization).
    #[error("Client error: {0}")]
    ClientError(String),

    /// The inbound payload did not match the transformer's body type.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Malformed pipeline description, policy, or settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Request cancellation. Always re-raised, never recorded as a failure.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// Creates a new job-level error
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Creates a new client error
    pub fn client_error(msg: impl Into<String>) -> Self {
        Self::ClientError(msg.into())
    }

    /// Creates a new validation error
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new database error
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks whether this error belongs to the job family.
    ///
    /// The job wrapper records these as a failed `JobResult` and lets the
    /// stage continue; everything else propagates upward.
    pub fn is_job_level(&self) -> bool {
        matches!(
            self,
            PipelineError::JobFailed(_)
                | PipelineError::MissingParameter(_)
                | PipelineError::EnvAttributeNotFound(_)
                | PipelineError::EnvTypeMismatch(_)
        )
    }

    /// Checks whether the error indicates a retry-able condition
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::TimeoutError(_) | PipelineError::ClientError(_) | PipelineError::IoError(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::JobFailed(_) => "job",
            PipelineError::MissingParameter(_) => "job",
            PipelineError::EnvAttributeNotFound(_) => "job",
            PipelineError::EnvTypeMismatch(_) => "job",
            PipelineError::StageFailed(_) => "stage",
            PipelineError::PipelineFailed(_) => "pipeline",
            PipelineError::ClientError(_) => "client",
            PipelineError::ValidationError(_) => "validation",
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::DatabaseError(_) => "database",
            PipelineError::IoError(_) => "io",
            PipelineError::TimeoutError(_) => "timeout",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}
