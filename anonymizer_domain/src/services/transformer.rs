// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transformer Port
//!
//! Adapter contract between an external payload shape and the internal
//! [`Request`] data model. The inbound HTTP shell selects a transformer by
//! name (the `Transformer-Type` header), validates the body against the
//! transformer's declared body kind, and only then enters the pipeline.
//!
//! Transformers work in both directions: `transform` builds the internal
//! request, and `update` writes anonymized values back into the foreign
//! payload so it can be forwarded downstream in its native shape.

use serde_json::Value;

use crate::entities::Request;
use crate::PipelineError;

/// The payload shape a transformer expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// No body expected; validation is skipped entirely.
    None,
    /// Any JSON object.
    Object,
    /// Any JSON list.
    List,
    /// A JSON object the transformer validates against its own model.
    Model,
}

/// Bidirectional bridge between a foreign payload and the internal request.
pub trait Transformer: Send + Sync {
    /// The body shape this transformer declares; enforced before the
    /// pipeline runs.
    fn body_kind(&self) -> BodyKind;

    /// Converts the inbound payload into an internal request.
    ///
    /// The payload is mutable so the transformer may inject the identities
    /// (e.g. generated UUIDs) it needs to correlate `update` later.
    fn transform(&self, body: &mut Value) -> Result<Request, PipelineError>;

    /// Writes anonymized request values back into the foreign payload.
    ///
    /// Returns `true` if any value changed.
    fn update(&self, body: &mut Value, data: &Request) -> Result<bool, PipelineError>;

    /// Produces the auditable snapshot recorded before the pipeline runs.
    ///
    /// Captures information that is no longer reachable once the body has
    /// been transformed and potentially anonymized.
    fn snapshot(&self, body: &Value) -> Value;
}
