// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Hierarchy Policy Model
//!
//! The second side-car policy: it associates each attribute type with a
//! *generalization ladder* - an ordered list of progressively coarser views
//! of a concrete value. Ladders parameterize the statistical disclosure
//! control backends and the local suppression/generalization jobs.
//!
//! ## Ladder kinds
//!
//! - `interval`: each generalization contributes an ordered list of interval
//!   labels (`"<=10"`, `"11-50"`, `">50"`); the label containing the value
//!   is selected by bisection over the right endpoints of the first n-1
//!   labels.
//! - `regex`: the single generalization's `regex` list is applied pattern by
//!   pattern, each substituting its matches with `"*"` in the original
//!   value.
//! - `static`: explicit enumerated ladders; the one whose first element
//!   equals the value is selected wholesale.

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Ladder kind selector for an `interval` hierarchy.
pub const HIERARCHY_KIND_INTERVAL: &str = "interval";
/// Ladder kind selector for a `regex` hierarchy.
pub const HIERARCHY_KIND_REGEX: &str = "regex";
/// Ladder kind selector for a `static` hierarchy.
pub const HIERARCHY_KIND_STATIC: &str = "static";

/// One generalization entry; which field is meaningful depends on the
/// hierarchy kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeGeneralization {
    #[serde(default)]
    pub generalization: Vec<String>,
    #[serde(default)]
    pub interval: Vec<String>,
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Generalization ladder description for a single attribute type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyAttribute {
    #[serde(rename = "attribute-name")]
    pub attribute_name: String,
    #[serde(rename = "attribute-type")]
    pub attribute_type: String,
    #[serde(rename = "attribute-generalization")]
    pub attribute_generalization: Vec<AttributeGeneralization>,
}

/// Per-template collection of attribute hierarchies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyObject {
    #[serde(rename = "misp-object-template")]
    pub misp_object_template: String,
    #[serde(rename = "attribute-hierarchies")]
    pub attribute_hierarchies: Vec<HierarchyAttribute>,
}

/// The complete declarative hierarchy policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyPolicy {
    #[serde(rename = "hierarchy-description", default)]
    pub hierarchy_description: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    pub organization: String,
    pub version: String,
    pub creator: String,
    pub hierarchy_objects: Vec<HierarchyObject>,
    pub hierarchy_attributes: Vec<HierarchyAttribute>,
}

impl HierarchyPolicy {
    /// Finds the hierarchy for a top-level attribute type.
    pub fn attribute_hierarchy(&self, attribute_name: &str) -> Option<&HierarchyAttribute> {
        self.hierarchy_attributes
            .iter()
            .find(|h| h.attribute_name == attribute_name)
    }

    /// Finds the hierarchy for an object template.
    pub fn object_hierarchy(&self, template_name: &str) -> Option<&HierarchyObject> {
        self.hierarchy_objects
            .iter()
            .find(|h| h.misp_object_template == template_name)
    }
}

impl HierarchyObject {
    /// Finds the hierarchy for an attribute type inside this template.
    pub fn attribute_hierarchy(&self, attribute_name: &str) -> Option<&HierarchyAttribute> {
        self.attribute_hierarchies
            .iter()
            .find(|h| h.attribute_name == attribute_name)
    }
}

/// Resolves the generalization ladder for a concrete value.
///
/// Produces `[value, value@level1, value@level2, ...]` where each
/// subsequent entry is the next-coarser generalization per the hierarchy's
/// kind. A `static` hierarchy with no matching ladder - or an unknown kind -
/// yields an empty list.
///
/// By the policy standard an interval list is always shaped
/// `[(<=a), (a-b), ..., (>z)]`, so instead of parsing the comparison
/// symbols the right endpoint of each label is extracted and the value is
/// located by bisection over the first n-1 endpoints.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if a regex pattern in the hierarchy does
/// not compile.
pub fn hierarchy_values(value: &str, hierarchy: &HierarchyAttribute) -> Result<Vec<String>, PipelineError> {
    let mut ret = Vec::new();
    match hierarchy.attribute_type.as_str() {
        HIERARCHY_KIND_INTERVAL => {
            ret.push(value.to_string());
            for generalization in &hierarchy.attribute_generalization {
                let intervals = &generalization.interval;
                if intervals.is_empty() {
                    continue;
                }
                let endpoints: Vec<&str> = intervals
                    .iter()
                    .map(|interval| {
                        let stripped = interval.trim_matches(|c| c == '<' || c == '=' || c == '>');
                        match stripped.split_once('-') {
                            Some((_, right)) => right,
                            None => stripped,
                        }
                    })
                    .collect();
                let idx = endpoints[..endpoints.len() - 1].partition_point(|e| *e < value);
                ret.push(intervals[idx].clone());
            }
        }
        HIERARCHY_KIND_REGEX => {
            ret.push(value.to_string());
            // By the policy standard there is a single generalization entry;
            // each consecutive regex is a further level of anonymization.
            if let Some(generalization) = hierarchy.attribute_generalization.first() {
                for pattern in &generalization.regex {
                    let re = regex::Regex::new(pattern).map_err(|e| {
                        PipelineError::InvalidConfiguration(format!(
                            "Invalid hierarchy regex \"{}\": {}",
                            pattern, e
                        ))
                    })?;
                    ret.push(re.replace_all(value, "*").into_owned());
                }
            }
        }
        HIERARCHY_KIND_STATIC => {
            // One generalization entry per starting value; select the ladder
            // whose first element equals the current value.
            for att_gen in &hierarchy.attribute_generalization {
                if att_gen.generalization.first().map(String::as_str) == Some(value) {
                    ret.extend(att_gen.generalization.iter().cloned());
                    break;
                }
            }
        }
        _ => {}
    }
    Ok(ret)
}
