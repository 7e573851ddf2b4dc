// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Privacy Policy Model
//!
//! The declarative privacy policy that arrives as a side-car of the inbound
//! payload. It binds each attribute type and each object template to zero or
//! more privacy-enhancing techniques (PETs) and optional differential-privacy
//! parameters, plus the k-anonymity / k-map flags and k value that drive the
//! policy-to-job synthesis rules.
//!
//! Wire keys follow the policy standard's kebab-case spelling
//! (`k-anonymity`, `dp-policy`, `apply-to-all`); unknown keys are ignored.

use serde::{Deserialize, Serialize};

/// Scheme-specific knobs attached to a PET descriptor.
///
/// Which fields are meaningful depends on the scheme: `k` for k-anonymity
/// and k-map, `l`/`c` for the l-diversity family, `t` for t-closeness,
/// `level` for local suppression/generalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetMetadata {
    #[serde(default)]
    pub l: i64,
    #[serde(default)]
    pub c: f64,
    #[serde(default)]
    pub k: i64,
    #[serde(default)]
    pub t: f64,
    #[serde(default)]
    pub level: i64,
}

/// A named privacy-enhancing technique with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub scheme: String,
    pub metadata: PetMetadata,
}

/// Differential-privacy parameters shared by attribute and object policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpPolicyMetadata {
    pub epsilon: f64,
    pub delta: f64,
    pub sensitivity: f64,
    pub upper: f64,
    pub lower: f64,
}

/// DP treatment of a single attribute type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpAttributePolicy {
    pub scheme: String,
    pub metadata: DpPolicyMetadata,
}

/// DP treatment of an object template's attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpObjectPolicy {
    pub scheme: String,
    pub metadata: DpPolicyMetadata,
    #[serde(rename = "attribute-names")]
    pub attribute_names: Vec<String>,
    #[serde(rename = "apply-to-all")]
    pub apply_to_all: bool,
}

/// PET bindings of one attribute type inside an object template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub pets: Vec<Pet>,
}

/// PET and DP bindings of one top-level attribute type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePolicy {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub pets: Vec<Pet>,
    pub dp: bool,
    #[serde(rename = "dp-policy", default)]
    pub dp_policy: Option<DpAttributePolicy>,
}

/// PET and DP bindings of one object template.
///
/// A template marked `k_anonymity` has k-anonymity emitted once for the
/// whole template even if several of its attributes request it. A template
/// marked `k_map` is routed to a dedicated k-map job and its other PETs are
/// skipped entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub attributes: Vec<TemplateAttribute>,
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(rename = "k-anonymity")]
    pub k_anonymity: bool,
    #[serde(rename = "k-map")]
    pub k_map: bool,
    pub k: i64,
    pub dp: bool,
    #[serde(rename = "dp-policy", default)]
    pub dp_policy: Option<DpObjectPolicy>,
}

/// The complete declarative privacy policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    #[serde(default)]
    pub attributes: Vec<AttributePolicy>,
    pub creator: String,
    #[serde(default)]
    pub uuid: Option<String>,
    pub organization: String,
    #[serde(default)]
    pub templates: Vec<Template>,
    pub version: String,
}
