// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Per-Request Environment
//!
//! The mutable bag shared by every job of a pipeline run. Jobs communicate
//! exclusively through it: one job parses a policy and stores it under a
//! location, a later generator reads it back; anonymizing jobs mutate the
//! internal request in place; reply jobs set the HTTP response.
//!
//! Values are tagged [`EnvValue`] variants. Typed accessors take an
//! expected tag and fail with a job-level error on mismatch, which a stage
//! records as that job's failure rather than aborting the run.
//!
//! The environment also hands out the process-wide collaborators
//! ([`ServiceContext`]): settings snapshot, context store, and audit store.
//! Jobs borrow them for the duration of a single call.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use anonymizer_domain::entities::Request;
use anonymizer_domain::repositories::{AuditStore, ContextStore};
use anonymizer_domain::PipelineError;

use crate::infrastructure::config::SharedSettings;

/// Well-known key of the raw inbound payload.
pub const KEY_REQUEST: &str = "request";
/// Well-known key of the internal data-model request.
pub const KEY_DATA: &str = "data";
/// Well-known key of the validated (possibly transformer-updated) body.
pub const KEY_BODY: &str = "body";
/// Well-known key of the HTTP reply a job may set.
pub const KEY_RESPONSE: &str = "response";
/// Well-known key of the rolling pipeline-report snapshot.
pub const KEY_PIPELINE_RESULTS: &str = "pipeline_results";

/// HTTP reply under construction, set by reply jobs and read by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpReply {
    pub status: u16,
    pub body: Option<Value>,
}

impl HttpReply {
    /// A JSON reply with status 200.
    pub fn json(body: Value) -> Self {
        HttpReply {
            status: 200,
            body: Some(body),
        }
    }

    /// An empty reply with the given status.
    pub fn empty(status: u16) -> Self {
        HttpReply { status, body: None }
    }
}

/// Expected-kind selector for [`Environment`] accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    Data,
    Payload,
    Response,
    Model,
    Json,
}

/// A tagged environment value.
#[derive(Debug, Clone)]
pub enum EnvValue {
    /// The internal data-model request.
    Data(Request),
    /// A raw inbound JSON payload.
    Payload(Value),
    /// An HTTP reply under construction.
    Response(HttpReply),
    /// A validated model instance in its serialized form.
    Model(Value),
    /// Any other JSON value.
    Json(Value),
}

impl EnvValue {
    pub fn kind(&self) -> EnvKind {
        match self {
            EnvValue::Data(_) => EnvKind::Data,
            EnvValue::Payload(_) => EnvKind::Payload,
            EnvValue::Response(_) => EnvKind::Response,
            EnvValue::Model(_) => EnvKind::Model,
            EnvValue::Json(_) => EnvKind::Json,
        }
    }

    fn kind_name(kind: EnvKind) -> &'static str {
        match kind {
            EnvKind::Data => "data",
            EnvKind::Payload => "payload",
            EnvKind::Response => "response",
            EnvKind::Model => "model",
            EnvKind::Json => "json",
        }
    }
}

/// Process-wide collaborators reachable from every job.
///
/// These are process-owned; the per-request environment merely holds a
/// handle. Jobs must not hold a collaborator across job boundaries longer
/// than one I/O operation.
pub struct ServiceContext {
    pub settings: SharedSettings,
    pub context_store: Arc<dyn ContextStore>,
    pub audit_store: Arc<dyn AuditStore>,
}

/// The per-request mutable bag shared among all jobs of a pipeline run.
pub struct Environment {
    values: HashMap<String, EnvValue>,
    audit_timestamp: f64,
    services: Arc<ServiceContext>,
}

impl Environment {
    pub fn new(services: Arc<ServiceContext>, audit_timestamp: f64) -> Self {
        Environment {
            values: HashMap::new(),
            audit_timestamp,
            services,
        }
    }

    /// The audit-record timestamp for this request.
    pub fn audit_timestamp(&self) -> f64 {
        self.audit_timestamp
    }

    /// The process-wide collaborators.
    pub fn services(&self) -> &Arc<ServiceContext> {
        &self.services
    }

    /// Stores a value under `location`, replacing any previous one.
    pub fn set(&mut self, location: impl Into<String>, value: EnvValue) {
        self.values.insert(location.into(), value);
    }

    pub fn get(&self, location: &str) -> Option<&EnvValue> {
        self.values.get(location)
    }

    pub fn contains(&self, location: &str) -> bool {
        self.values.contains_key(location)
    }

    /// Reads the value at `location`, requiring the given kind.
    ///
    /// # Errors
    ///
    /// - `EnvAttributeNotFound` if nothing is stored there (job-level)
    /// - `EnvTypeMismatch` if the stored value has a different kind
    ///   (job-level)
    pub fn get_expected(&self, location: &str, kind: EnvKind) -> Result<&EnvValue, PipelineError> {
        let value = self
            .values
            .get(location)
            .ok_or_else(|| PipelineError::EnvAttributeNotFound(location.to_string()))?;
        if value.kind() != kind {
            return Err(PipelineError::EnvTypeMismatch(format!(
                "{}: expected {}, got {}",
                location,
                EnvValue::kind_name(kind),
                EnvValue::kind_name(value.kind())
            )));
        }
        Ok(value)
    }

    /// The internal data-model request.
    pub fn data(&self) -> Result<&Request, PipelineError> {
        match self.get_expected(KEY_DATA, EnvKind::Data)? {
            EnvValue::Data(request) => Ok(request),
            _ => unreachable!(),
        }
    }

    /// Mutable access to the internal data-model request.
    pub fn data_mut(&mut self) -> Result<&mut Request, PipelineError> {
        match self.values.get_mut(KEY_DATA) {
            Some(EnvValue::Data(request)) => Ok(request),
            Some(other) => Err(PipelineError::EnvTypeMismatch(format!(
                "{}: expected data, got {}",
                KEY_DATA,
                EnvValue::kind_name(other.kind())
            ))),
            None => Err(PipelineError::EnvAttributeNotFound(KEY_DATA.to_string())),
        }
    }

    /// The raw inbound payload.
    pub fn payload(&self) -> Result<&Value, PipelineError> {
        match self.get_expected(KEY_REQUEST, EnvKind::Payload)? {
            EnvValue::Payload(value) => Ok(value),
            _ => unreachable!(),
        }
    }

    /// The validated request body.
    pub fn body(&self) -> Result<&Value, PipelineError> {
        match self.get_expected(KEY_BODY, EnvKind::Json)? {
            EnvValue::Json(value) => Ok(value),
            _ => unreachable!(),
        }
    }

    /// Stores a serialized model instance under `location`.
    pub fn set_model(&mut self, location: impl Into<String>, model: Value) {
        self.set(location, EnvValue::Model(model));
    }

    /// Reads and deserializes the model stored at `location`.
    pub fn model<T: serde::de::DeserializeOwned>(&self, location: &str) -> Result<T, PipelineError> {
        let value = match self.get_expected(location, EnvKind::Model)? {
            EnvValue::Model(value) => value,
            _ => unreachable!(),
        };
        serde_json::from_value(value.clone()).map_err(|e| {
            PipelineError::EnvTypeMismatch(format!("{}: stored model has the wrong shape: {}", location, e))
        })
    }

    /// The HTTP reply, if any job has set one.
    pub fn response(&self) -> Option<&HttpReply> {
        match self.values.get(KEY_RESPONSE) {
            Some(EnvValue::Response(reply)) => Some(reply),
            _ => None,
        }
    }

    /// Sets the HTTP reply.
    pub fn set_response(&mut self, reply: HttpReply) {
        self.set(KEY_RESPONSE, EnvValue::Response(reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_services;

    #[test]
    fn typed_access_enforces_kinds() {
        let mut env = Environment::new(test_services(), 0.0);
        env.set(KEY_DATA, EnvValue::Data(Request::default()));
        assert!(env.data().is_ok());
        assert!(matches!(
            env.get_expected(KEY_DATA, EnvKind::Model),
            Err(PipelineError::EnvTypeMismatch(_))
        ));
        assert!(matches!(
            env.get_expected("missing", EnvKind::Json),
            Err(PipelineError::EnvAttributeNotFound(_))
        ));
    }

    #[test]
    fn model_round_trip() {
        let mut env = Environment::new(test_services(), 0.0);
        env.set_model("policy", serde_json::json!({"a": 1}));
        let value: serde_json::Value = env.model("policy").unwrap();
        assert_eq!(value["a"], 1);
    }
}
