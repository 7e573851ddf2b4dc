// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Request Entity
//!
//! The top-level container of the internal data model. A [`Request`] is
//! produced by a transformer from the inbound payload, threaded through the
//! pipeline's shared environment, mutated in place by anonymizing jobs, and
//! optionally written back into the foreign payload at the end of the run.
//!
//! ## Content hash
//!
//! Every request has a canonical content hash: the SHA-256 digest of its
//! dictionary form serialized as JSON with sorted keys (type sets serialize
//! as sorted lists). The hash depends only on semantic content - permuting
//! type-set insertion order or field ordering yields the same digest. It is
//! the context store's primary key.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entities::component::{Component, ComponentContainer};
use crate::value_objects::RequestHash;
use crate::PipelineError;

/// Discriminator for the request's serialized form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum RequestTag {
    #[default]
    #[serde(rename = "request")]
    Request,
}

/// Top-level container of the tagged data model.
///
/// Unlike components, a request has no default type tag: its type set may
/// legitimately be empty. The `data` sequence is ordered and holds the
/// transformer-produced component tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "#modeltype")]
    model_type: RequestTag,
    #[serde(rename = "type")]
    types: BTreeSet<String>,
    data: Vec<Component>,
}

impl Request {
    /// Creates a request from a type set and component sequence.
    pub fn new(types: BTreeSet<String>, data: Vec<Component>) -> Self {
        Request {
            model_type: RequestTag::Request,
            types,
            data,
        }
    }

    /// Gets the request's type set
    pub fn types(&self) -> &BTreeSet<String> {
        &self.types
    }

    /// Checks whether the request carries all of the given tags
    pub fn type_is(&self, types: &[&str]) -> bool {
        types.iter().all(|t| self.types.contains(*t))
    }

    /// Adds the given tags to the request's type set
    pub fn type_merge<I, S>(&mut self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for t in types {
            self.types.insert(t.into());
        }
    }

    /// Removes the given tags from the request's type set
    pub fn type_remove(&mut self, types: &[&str]) {
        for t in types {
            self.types.remove(*t);
        }
    }

    /// Checks whether every top-level component is an object
    pub fn all_objects(&self) -> bool {
        self.data.iter().all(|c| matches!(c, Component::Object(_)))
    }

    /// Checks whether every top-level component is an attribute
    pub fn all_attributes(&self) -> bool {
        self.data.iter().all(|c| matches!(c, Component::Attribute(_)))
    }

    /// Computes the canonical content hash.
    ///
    /// The request is serialized to a JSON value first: value maps order
    /// their keys, so the resulting text is independent of struct field
    /// order and of type-set insertion order.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the request cannot be serialized,
    /// which indicates a programming error rather than bad data.
    pub fn to_hash(&self) -> Result<RequestHash, PipelineError> {
        let value = serde_json::to_value(self)?;
        let canonical = serde_json::to_string(&value)?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(RequestHash::from_digest(&hasher.finalize()))
    }
}

impl ComponentContainer for Request {
    fn components(&self) -> &[Component] {
        &self.data
    }

    fn components_mut(&mut self) -> &mut Vec<Component> {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::component::{Attribute, Object};
    use proptest::prelude::*;

    fn sample_request() -> Request {
        let att = Attribute::with_types(
            "ip-src-1",
            ["attribute", "ip-src", "anonymizable"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            "10.0.0.1",
        );
        let obj = Object::with_types(
            "flow-1",
            ["object", "network-flow"].iter().map(|s| s.to_string()).collect(),
            vec![Component::Attribute(att.clone())],
        );
        Request::new(
            ["threat-event"].iter().map(|s| s.to_string()).collect(),
            vec![Component::Object(obj), Component::Attribute(att)],
        )
    }

    #[test]
    fn round_trip_preserves_value() {
        let req = sample_request();
        let dict = serde_json::to_value(&req).unwrap();
        assert_eq!(dict["#modeltype"], "request");
        let back: Request = serde_json::from_value(dict).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn hash_ignores_type_insertion_order() {
        let forward: BTreeSet<String> = ["attribute", "ip-src", "anonymizable"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut backward = BTreeSet::new();
        for t in ["anonymizable", "ip-src", "attribute"] {
            backward.insert(t.to_string());
        }

        let a = Request::new(
            BTreeSet::new(),
            vec![Component::Attribute(Attribute::with_types("a", forward, "v"))],
        );
        let b = Request::new(
            BTreeSet::new(),
            vec![Component::Attribute(Attribute::with_types("a", backward, "v"))],
        );
        assert_eq!(a.to_hash().unwrap(), b.to_hash().unwrap());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = Request::new(
            BTreeSet::new(),
            vec![Component::Attribute(Attribute::new("a", "v1"))],
        );
        let b = Request::new(
            BTreeSet::new(),
            vec![Component::Attribute(Attribute::new("a", "v2"))],
        );
        assert_ne!(a.to_hash().unwrap(), b.to_hash().unwrap());
    }

    #[test]
    fn all_objects_and_all_attributes() {
        let req = sample_request();
        assert!(!req.all_objects());
        assert!(!req.all_attributes());
        let empty = Request::default();
        assert!(empty.all_objects());
        assert!(empty.all_attributes());
    }

    proptest! {
        #[test]
        fn serialization_round_trip_holds_for_arbitrary_leaves(
            name in "[a-z]{1,12}",
            value in "[ -~]{0,32}",
            tags in proptest::collection::btree_set("[a-z:]{1,10}", 1..5),
        ) {
            let req = Request::new(
                BTreeSet::new(),
                vec![Component::Attribute(Attribute::with_types(name, tags, value))],
            );
            let dict = serde_json::to_value(&req).unwrap();
            let back: Request = serde_json::from_value(dict).unwrap();
            prop_assert_eq!(back, req);
        }
    }
}
