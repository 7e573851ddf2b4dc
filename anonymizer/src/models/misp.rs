// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # MISP Wire Model
//!
//! The foreign threat-event payload format: an event with attributes,
//! objects and tags, wrapped (for the anonymization flow) in an
//! [`EventAnon`] envelope carrying the two side-car policies and optional
//! audit extras.
//!
//! MISP capitalizes its collection keys (`Attribute`, `Object`, `Tag`,
//! `Event`); unknown fields are retained verbatim so an updated event can
//! be re-serialized without loss.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use anonymizer_domain::policies::{HierarchyPolicy, PrivacyPolicy};

/// MISP version this model tracks.
pub const VERSION: &str = "2.5.9";

/// MISP threat level, serialized as its numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatLevel {
    #[serde(rename = "1")]
    High,
    #[serde(rename = "2")]
    Medium,
    #[serde(rename = "3")]
    Low,
    #[serde(rename = "4")]
    Undefined,
}

impl ThreatLevel {
    /// The numeric representation of the threat level.
    pub fn as_int(self) -> i64 {
        match self {
            ThreatLevel::High => 1,
            ThreatLevel::Medium => 2,
            ThreatLevel::Low => 3,
            ThreatLevel::Undefined => 4,
        }
    }
}

/// One event attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub uuid: Option<String>,
    pub object_relation: String,
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attribute {
    /// The attribute value as a string, the way the data model carries it.
    pub fn value_string(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// One event object: a named group of attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
    pub timestamp: String,
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<Attribute>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An event tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// A MISP event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    pub threat_level_id: ThreatLevel,
    #[serde(rename = "Attribute", default)]
    pub attributes: Vec<Attribute>,
    #[serde(rename = "Object", default)]
    pub objects: Vec<Object>,
    #[serde(rename = "Tag", default)]
    pub tags: Vec<Tag>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_timestamp() -> String {
    "0".to_string()
}

impl Event {
    /// Whether the event carries its data as objects or bare attributes.
    pub fn event_type(&self) -> &'static str {
        if self.objects.is_empty() && !self.attributes.is_empty() {
            "OBJECTS"
        } else {
            "ATTRIBUTES"
        }
    }

    pub fn threat_level_as_int(&self) -> i64 {
        self.threat_level_id.as_int()
    }
}

/// The anonymization envelope: event plus side-car policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnon {
    #[serde(rename = "Event")]
    pub event: Event,
    #[serde(rename = "Privacy-policy")]
    pub privacy_policy: PrivacyPolicy,
    #[serde(rename = "Hierarchy-policy")]
    pub hierarchy_policy: HierarchyPolicy,
    #[serde(rename = "Audit", default)]
    pub audit: Option<Map<String, Value>>,
}

/// A bare MISP event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMisp {
    #[serde(rename = "Event")]
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trips_with_unknown_fields() {
        let json = serde_json::json!({
            "uuid": "0c4a2b1e-59b9-4c2b-8f2a-3a9f6f4f1a11",
            "date": "2025-06-01",
            "timestamp": "1748736000",
            "threat_level_id": "2",
            "info": "phishing wave",
            "Attribute": [
                {"object_relation": "event_type", "value": "phishing", "comment": "kept"}
            ],
            "Object": [],
            "Tag": [{"id": "7", "name": "tlp:amber"}]
        });
        let event: Event = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(event.threat_level_as_int(), 2);
        assert_eq!(event.extra["info"], "phishing wave");
        assert_eq!(event.attributes[0].extra["comment"], "kept");

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["info"], json["info"]);
        assert_eq!(back["Attribute"][0]["comment"], "kept");
    }

    #[test]
    fn event_type_distinguishes_shapes() {
        let mut event: Event = serde_json::from_value(serde_json::json!({
            "threat_level_id": "4",
            "Attribute": [{"object_relation": "x", "value": true}]
        }))
        .unwrap();
        assert_eq!(event.event_type(), "OBJECTS");
        assert_eq!(event.attributes[0].value_string(), "true");

        event.attributes.clear();
        assert_eq!(event.event_type(), "ATTRIBUTES");
    }
}
