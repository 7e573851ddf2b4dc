// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Component Data Model
//!
//! The uniform tagged representation every anonymization job operates on.
//! Inbound payloads of any shape are converted by a transformer into a tree
//! of [`Component`]s: leaf [`Attribute`]s carrying a string value, and
//! [`Object`]s containing further components.
//!
//! ## Overview
//!
//! Each component carries a *type set*: an unordered collection of string
//! tags. Tags mix structural markers (`"attribute"`, `"object"`), backend
//! eligibility markers (`"arxlet:anonymizable"`, `"flaskdp:anonymizable"`,
//! `"local:anonymizable"`), and transformer-supplied semantic tags such as
//! `"ip-src"`. Jobs never address components by position; they filter by
//! type set and mutate the matching attributes in place.
//!
//! ## Type-set algebra
//!
//! The [`ComponentContainer`] trait provides the filter operations shared by
//! [`Object`] and the top-level request:
//!
//! - `types_one` / `types_all`: union / intersection of child type sets
//! - `types_count`: tag -> number of children carrying it
//! - `types_get` / `types_search`: AND-filter / OR-filter
//! - `types_remove` / `types_prune`: their complements
//!
//! ## Serialization
//!
//! Components serialize as tagged dictionaries discriminated by a
//! `#modeltype` field (`"attribute"` or `"object"`), with type sets as
//! sorted lists. The representation is stable: deserializing a serialized
//! component yields an equal value.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Structural tag present on every attribute unless overridden away.
pub const DEFAULT_ATTRIBUTE_TYPE: &str = "attribute";

/// Structural tag present on every object unless overridden away.
pub const DEFAULT_OBJECT_TYPE: &str = "object";

/// Marks a component as a candidate for any privacy-enhancing technique.
pub const TYPE_ANONYMIZABLE: &str = "anonymizable";

/// A leaf value in the data model.
///
/// Attributes are created by the transformer, mutated by anonymizing jobs
/// (value replacement is the only in-place change jobs may perform on them),
/// and destroyed at the end of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    #[serde(rename = "type")]
    types: BTreeSet<String>,
    value: String,
}

impl Attribute {
    /// Creates an attribute carrying only the default `"attribute"` tag.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut types = BTreeSet::new();
        types.insert(DEFAULT_ATTRIBUTE_TYPE.to_string());
        Attribute {
            name: name.into(),
            types,
            value: value.into(),
        }
    }

    /// Creates an attribute with an explicit type set.
    ///
    /// An empty type set is replaced with the default tag: a component's
    /// type set is never empty after construction.
    pub fn with_types(name: impl Into<String>, types: BTreeSet<String>, value: impl Into<String>) -> Self {
        let mut types = types;
        if types.is_empty() {
            types.insert(DEFAULT_ATTRIBUTE_TYPE.to_string());
        }
        Attribute {
            name: name.into(),
            types,
            value: value.into(),
        }
    }

    /// Gets the attribute name (unique within its container)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the attribute's type set
    pub fn types(&self) -> &BTreeSet<String> {
        &self.types
    }

    /// Gets the attribute value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Replaces the attribute value.
    ///
    /// This is the only in-place mutation anonymizing jobs perform on a
    /// leaf component.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    /// Checks whether the attribute carries all of the given tags
    pub fn type_is(&self, types: &[&str]) -> bool {
        types.iter().all(|t| self.types.contains(*t))
    }

    /// Adds the given tags to the attribute's type set
    pub fn type_merge<I, S>(&mut self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for t in types {
            self.types.insert(t.into());
        }
    }

    /// Removes the given tags from the attribute's type set
    pub fn type_remove(&mut self, types: &[&str]) {
        for t in types {
            self.types.remove(*t);
        }
    }
}

/// A named container of components.
///
/// Objects may nest attributes and further objects. The contained sequence
/// is ordered; jobs may add and remove components but address them through
/// the type-set filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    name: String,
    #[serde(rename = "type")]
    types: BTreeSet<String>,
    value: Vec<Component>,
}

impl Object {
    /// Creates an object carrying only the default `"object"` tag.
    pub fn new(name: impl Into<String>, value: Vec<Component>) -> Self {
        let mut types = BTreeSet::new();
        types.insert(DEFAULT_OBJECT_TYPE.to_string());
        Object {
            name: name.into(),
            types,
            value,
        }
    }

    /// Creates an object with an explicit type set.
    ///
    /// An empty type set is replaced with the default tag.
    pub fn with_types(name: impl Into<String>, types: BTreeSet<String>, value: Vec<Component>) -> Self {
        let mut types = types;
        if types.is_empty() {
            types.insert(DEFAULT_OBJECT_TYPE.to_string());
        }
        Object {
            name: name.into(),
            types,
            value,
        }
    }

    /// Gets the object name (unique within its container)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the object's type set
    pub fn types(&self) -> &BTreeSet<String> {
        &self.types
    }

    /// Checks whether the object carries all of the given tags
    pub fn type_is(&self, types: &[&str]) -> bool {
        types.iter().all(|t| self.types.contains(*t))
    }

    /// Adds the given tags to the object's type set
    pub fn type_merge<I, S>(&mut self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for t in types {
            self.types.insert(t.into());
        }
    }

    /// Removes the given tags from the object's type set
    pub fn type_remove(&mut self, types: &[&str]) {
        for t in types {
            self.types.remove(*t);
        }
    }
}

/// The polymorphic choice between an [`Attribute`] and an [`Object`].
///
/// Serialized form is discriminated by the `#modeltype` field, so a
/// component round-trips to exactly the dictionary shape the wire format
/// prescribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "#modeltype")]
pub enum Component {
    #[serde(rename = "attribute")]
    Attribute(Attribute),
    #[serde(rename = "object")]
    Object(Object),
}

impl Component {
    /// Gets the component name
    pub fn name(&self) -> &str {
        match self {
            Component::Attribute(a) => a.name(),
            Component::Object(o) => o.name(),
        }
    }

    /// Gets the component's type set
    pub fn types(&self) -> &BTreeSet<String> {
        match self {
            Component::Attribute(a) => a.types(),
            Component::Object(o) => o.types(),
        }
    }

    /// Checks whether the component carries all of the given tags
    pub fn type_is(&self, types: &[&str]) -> bool {
        match self {
            Component::Attribute(a) => a.type_is(types),
            Component::Object(o) => o.type_is(types),
        }
    }

    /// Adds the given tags to the component's type set
    pub fn type_merge<I, S>(&mut self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Component::Attribute(a) => a.type_merge(types),
            Component::Object(o) => o.type_merge(types),
        }
    }

    /// Removes the given tags from the component's type set
    pub fn type_remove(&mut self, types: &[&str]) {
        match self {
            Component::Attribute(a) => a.type_remove(types),
            Component::Object(o) => o.type_remove(types),
        }
    }

    pub fn as_attribute(&self) -> Option<&Attribute> {
        match self {
            Component::Attribute(a) => Some(a),
            Component::Object(_) => None,
        }
    }

    pub fn as_attribute_mut(&mut self) -> Option<&mut Attribute> {
        match self {
            Component::Attribute(a) => Some(a),
            Component::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Component::Attribute(_) => None,
            Component::Object(o) => Some(o),
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Component::Attribute(_) => None,
            Component::Object(o) => Some(o),
        }
    }
}

/// Type-set algebra over an ordered collection of components.
///
/// Implemented by [`Object`] and by the top-level request. All filters
/// return references in declaration order.
pub trait ComponentContainer {
    /// The contained components, in order.
    fn components(&self) -> &[Component];

    /// Mutable access to the contained components.
    ///
    /// Jobs use this to add or remove components; attribute values are
    /// mutated through the filtered accessors instead.
    fn components_mut(&mut self) -> &mut Vec<Component>;

    /// Union of the child type sets.
    fn types_one(&self) -> BTreeSet<String> {
        let mut ret = BTreeSet::new();
        for c in self.components() {
            ret.extend(c.types().iter().cloned());
        }
        ret
    }

    /// Intersection of the child type sets.
    fn types_all(&self) -> BTreeSet<String> {
        let mut iter = self.components().iter();
        let mut ret = match iter.next() {
            Some(c) => c.types().clone(),
            None => return BTreeSet::new(),
        };
        for c in iter {
            ret = ret.intersection(c.types()).cloned().collect();
        }
        ret
    }

    /// Mapping from tag to the number of children carrying it.
    fn types_count(&self) -> BTreeMap<String, usize> {
        let mut ret = BTreeMap::new();
        for c in self.components() {
            for t in c.types() {
                *ret.entry(t.clone()).or_insert(0) += 1;
            }
        }
        ret
    }

    /// Children carrying all of the given tags (AND-filter).
    fn types_get(&self, types: &[&str]) -> Vec<&Component> {
        self.components().iter().filter(|c| c.type_is(types)).collect()
    }

    /// Children carrying at least one of the given tags (OR-filter).
    fn types_search(&self, types: &[&str]) -> Vec<&Component> {
        self.components()
            .iter()
            .filter(|c| types.iter().any(|t| c.type_is(&[*t])))
            .collect()
    }

    /// Children carrying none of the given tags (complement of `types_search`).
    fn types_remove(&self, types: &[&str]) -> Vec<&Component> {
        self.components()
            .iter()
            .filter(|c| types.iter().all(|t| !c.type_is(&[*t])))
            .collect()
    }

    /// Children lacking at least one of the given tags (complement of `types_get`).
    fn types_prune(&self, types: &[&str]) -> Vec<&Component> {
        self.components()
            .iter()
            .filter(|c| types.iter().any(|t| !c.type_is(&[*t])))
            .collect()
    }

    /// Mutable AND-filter, for in-place value replacement.
    fn types_get_mut(&mut self, types: &[&str]) -> Vec<&mut Component> {
        self.components_mut()
            .iter_mut()
            .filter(|c| c.type_is(types))
            .collect()
    }

    /// Mutable OR-filter.
    fn types_search_mut(&mut self, types: &[&str]) -> Vec<&mut Component> {
        self.components_mut()
            .iter_mut()
            .filter(|c| types.iter().any(|t| c.type_is(&[*t])))
            .collect()
    }
}

impl ComponentContainer for Object {
    fn components(&self) -> &[Component] {
        &self.value
    }

    fn components_mut(&mut self) -> &mut Vec<Component> {
        &mut self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(name: &str, tags: &[&str], value: &str) -> Component {
        Component::Attribute(Attribute::with_types(
            name,
            tags.iter().map(|t| t.to_string()).collect(),
            value,
        ))
    }

    #[test]
    fn empty_type_set_falls_back_to_default() {
        let att = Attribute::with_types("a", BTreeSet::new(), "v");
        assert!(att.type_is(&[DEFAULT_ATTRIBUTE_TYPE]));
        let obj = Object::with_types("o", BTreeSet::new(), vec![]);
        assert!(obj.type_is(&[DEFAULT_OBJECT_TYPE]));
    }

    #[test]
    fn type_algebra_filters() {
        let obj = Object::new(
            "o",
            vec![
                tagged("a", &["attribute", "ip-src", "anonymizable"], "1"),
                tagged("b", &["attribute", "ip-dst", "anonymizable"], "2"),
                tagged("c", &["attribute", "comment"], "3"),
            ],
        );

        assert_eq!(obj.types_get(&["anonymizable"]).len(), 2);
        assert_eq!(obj.types_get(&["anonymizable", "ip-src"]).len(), 1);
        assert_eq!(obj.types_search(&["ip-src", "ip-dst"]).len(), 2);
        assert_eq!(obj.types_remove(&["ip-src", "ip-dst"]).len(), 1);
        assert_eq!(obj.types_prune(&["anonymizable"]).len(), 1);

        let one = obj.types_one();
        assert!(one.contains("ip-src") && one.contains("comment"));
        let all = obj.types_all();
        assert_eq!(all.len(), 1);
        assert!(all.contains("attribute"));

        let counts = obj.types_count();
        assert_eq!(counts.get("anonymizable"), Some(&2));
        assert_eq!(counts.get("attribute"), Some(&3));
    }

    #[test]
    fn types_all_of_empty_container_is_empty() {
        let obj = Object::new("o", vec![]);
        assert!(obj.types_all().is_empty());
        assert!(obj.types_one().is_empty());
    }

    #[test]
    fn mutable_filter_updates_in_place() {
        let mut obj = Object::new("o", vec![tagged("a", &["attribute", "ip-src"], "10.0.0.1")]);
        for c in obj.types_get_mut(&["ip-src"]) {
            if let Some(att) = c.as_attribute_mut() {
                att.set_value("10.0.0.0/24");
            }
        }
        let filtered = obj.types_get(&["ip-src"]);
        assert_eq!(filtered[0].as_attribute().unwrap().value(), "10.0.0.0/24");
    }

    #[test]
    fn component_serialization_is_tagged_and_sorted() {
        let c = tagged("a", &["zeta", "attribute", "alpha"], "v");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["#modeltype"], "attribute");
        let types: Vec<String> = json["type"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["alpha", "attribute", "zeta"]);

        let back: Component = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn type_merge_and_remove() {
        let mut c = tagged("a", &["attribute"], "v");
        c.type_merge(["anonymizable", "ip-src"]);
        assert!(c.type_is(&["anonymizable", "ip-src"]));
        c.type_remove(&["ip-src"]);
        assert!(!c.type_is(&["ip-src"]));
        assert!(c.type_is(&["attribute"]));
    }
}
