// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # STIX Conversion
//!
//! Translates a MISP event into a STIX document: a 2.1 or 2.0 bundle of
//! indicators referenced by a report, or a 1.x package envelope. The
//! conversion covers the event's attributes and object attributes as
//! indicators; richer object semantics stay with the upstream converter
//! services this module stands in for.

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use anonymizer_domain::PipelineError;

use crate::models::misp::{Attribute, Event};

/// Renders one attribute as a STIX indicator object.
fn indicator(att: &Attribute, spec_version: Option<&str>, timestamp: &str) -> Value {
    let mut object = json!({
        "type": "indicator",
        "id": format!("indicator--{}", att.uuid.clone().unwrap_or_else(|| Uuid::new_v4().to_string())),
        "created": timestamp,
        "modified": timestamp,
        "name": att.object_relation,
        "pattern": format!("[{} = '{}']", att.object_relation, att.value_string()),
        "pattern_type": "stix",
        "valid_from": timestamp,
    });
    if let Some(version) = spec_version {
        object["spec_version"] = Value::String(version.to_string());
    }
    object
}

fn event_indicators(event: &Event, spec_version: Option<&str>, timestamp: &str) -> Vec<Value> {
    let mut indicators = Vec::new();
    for att in &event.attributes {
        indicators.push(indicator(att, spec_version, timestamp));
    }
    for object in &event.objects {
        for att in &object.attributes {
            indicators.push(indicator(att, spec_version, timestamp));
        }
    }
    indicators
}

/// Converts a MISP event into a STIX JSON document.
///
/// Valid versions: `"1.1.1"`, `"1.2"`, `"2.0"`, `"2.1"` (any other value
/// starting with `1` coerces to `1.1.1`, matching the upstream converter).
///
/// # Errors
///
/// Returns a job-level error for an unknown version string.
pub fn convert_event(event: &Event, stix_version: &str) -> Result<Value, PipelineError> {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let event_uuid = event.uuid.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

    if stix_version.starts_with('1') {
        let version = if stix_version == "1.2" { "1.2" } else { "1.1.1" };
        let indicators = event_indicators(event, None, &timestamp);
        return Ok(json!({
            "stix_package": {
                "version": version,
                "id": format!("package--{}", event_uuid),
                "timestamp": timestamp,
                "indicators": indicators,
            }
        }));
    }

    let (bundle_spec, object_spec) = match stix_version {
        "2.1" => (None, Some("2.1")),
        "2.0" => (Some("2.0"), None),
        _ => return Err(PipelineError::JobFailed("Invalid STIX version".into())),
    };

    let mut objects = event_indicators(event, object_spec, &timestamp);
    let object_refs: Vec<Value> = objects
        .iter()
        .map(|o| o["id"].clone())
        .collect();
    let mut report = json!({
        "type": "report",
        "id": format!("report--{}", event_uuid),
        "created": timestamp,
        "modified": timestamp,
        "name": format!("MISP event {}", event_uuid),
        "published": timestamp,
        "report_types": ["threat-report"],
        "object_refs": object_refs,
    });
    if let Some(version) = object_spec {
        report["spec_version"] = Value::String(version.to_string());
    }
    objects.insert(0, report);

    let mut bundle = json!({
        "type": "bundle",
        "id": format!("bundle--{}", Uuid::new_v4()),
        "objects": objects,
    });
    if let Some(version) = bundle_spec {
        bundle["spec_version"] = Value::String(version.to_string());
    }
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        serde_json::from_value(json!({
            "uuid": "5e7f3a7e-7c4d-47c5-8cc5-8cbfae122c5c",
            "threat_level_id": "1",
            "Attribute": [{"object_relation": "ip-src", "value": "10.0.0.1"}],
            "Object": [{
                "name": "network-flow", "timestamp": "0",
                "Attribute": [{"object_relation": "ip-dst", "value": "10.0.0.2"}]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn stix_21_bundle_references_every_indicator() {
        let document = convert_event(&event(), "2.1").unwrap();
        assert_eq!(document["type"], "bundle");
        let objects = document["objects"].as_array().unwrap();
        assert_eq!(objects.len(), 3); // report + 2 indicators
        assert_eq!(objects[0]["type"], "report");
        assert_eq!(objects[0]["object_refs"].as_array().unwrap().len(), 2);
        assert_eq!(objects[1]["spec_version"], "2.1");
    }

    #[test]
    fn stix_20_marks_the_bundle_not_the_objects() {
        let document = convert_event(&event(), "2.0").unwrap();
        assert_eq!(document["spec_version"], "2.0");
        assert!(document["objects"][1].get("spec_version").is_none());
    }

    #[test]
    fn stix_1x_coerces_to_known_versions() {
        let document = convert_event(&event(), "1.0").unwrap();
        assert_eq!(document["stix_package"]["version"], "1.1.1");
        let document = convert_event(&event(), "1.2").unwrap();
        assert_eq!(document["stix_package"]["version"], "1.2");
    }

    #[test]
    fn unknown_versions_are_rejected() {
        assert!(convert_event(&event(), "3.0").is_err());
    }
}
