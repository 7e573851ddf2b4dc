// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transformers
//!
//! Adapters between foreign payload shapes and the internal data model.
//! The inbound HTTP shell selects one by the `Transformer-Type` header
//! through [`transformer_from_type`] and enforces its declared body kind
//! before the pipeline runs.

pub mod misp;

use serde_json::Value;

use anonymizer_domain::entities::Request;
use anonymizer_domain::services::{BodyKind, Transformer};
use anonymizer_domain::PipelineError;

use misp::MispTransformer;

/// Transformer for requests with no usable body: yields an empty request
/// and performs no validation.
#[derive(Debug, Default, Clone)]
pub struct NoTransformer;

impl Transformer for NoTransformer {
    fn body_kind(&self) -> BodyKind {
        BodyKind::None
    }

    fn transform(&self, _body: &mut Value) -> Result<Request, PipelineError> {
        Ok(Request::default())
    }

    fn update(&self, _body: &mut Value, _data: &Request) -> Result<bool, PipelineError> {
        Ok(false)
    }

    fn snapshot(&self, _body: &Value) -> Value {
        Value::Object(serde_json::Map::new())
    }
}

/// Resolves a transformer by its dotted type name.
///
/// Returns `None` for unknown names; the HTTP shell turns that into a
/// validation failure.
pub fn transformer_from_type(transformer_type: &str) -> Option<Box<dyn Transformer>> {
    match transformer_type {
        "NoTransformer" => Some(Box::new(NoTransformer)),
        "misp.MispTransformer" => Some(Box::new(MispTransformer::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_names_only() {
        assert!(transformer_from_type("NoTransformer").is_some());
        assert!(transformer_from_type("misp.MispTransformer").is_some());
        assert!(transformer_from_type("nope.Missing").is_none());
    }

    #[test]
    fn no_transformer_yields_an_empty_request() {
        let transformer = NoTransformer;
        let mut body = serde_json::json!({"anything": true});
        let request = transformer.transform(&mut body).unwrap();
        assert!(request.types().is_empty());
        assert_eq!(transformer.snapshot(&body), serde_json::json!({}));
    }
}
