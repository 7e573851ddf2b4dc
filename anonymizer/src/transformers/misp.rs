// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # MISP Transformer
//!
//! Converts a MISP anonymization envelope ([`EventAnon`]) into the
//! internal data model and back. Every produced component is tagged with
//! the three backend eligibility markers plus its MISP semantic name
//! (attribute relation or object template), so the privacy policy can
//! address components by the names it already uses.
//!
//! Component names are derived from the MISP UUIDs
//! (`<relation>-<uuid>` / `<template>-<uuid>`); missing UUIDs are
//! assigned during `transform` and written back into the payload so the
//! `update` direction can correlate components again.

use std::collections::BTreeSet;

use serde_json::Value;
use uuid::Uuid;

use anonymizer_domain::entities::{
    Attribute, Component, ComponentContainer, Object, Request, DEFAULT_ATTRIBUTE_TYPE, DEFAULT_OBJECT_TYPE,
};
use anonymizer_domain::services::{BodyKind, Transformer};
use anonymizer_domain::PipelineError;

use crate::execution::jobs::arxlet::TYPE_ANONYMIZABLE_BY_ARXLET;
use crate::execution::jobs::flaskdp::TYPE_ANONYMIZABLE_BY_FLASKDP;
use crate::execution::jobs::local::TYPE_ANONYMIZABLE_BY_LOCAL;
use crate::models::misp::{self, EventAnon};

fn backend_tags() -> [&'static str; 3] {
    [
        TYPE_ANONYMIZABLE_BY_ARXLET,
        TYPE_ANONYMIZABLE_BY_FLASKDP,
        TYPE_ANONYMIZABLE_BY_LOCAL,
    ]
}

fn attribute_types(att: &misp::Attribute) -> BTreeSet<String> {
    let mut types: BTreeSet<String> = backend_tags().iter().map(|t| t.to_string()).collect();
    types.insert(DEFAULT_ATTRIBUTE_TYPE.to_string());
    types.insert(att.object_relation.clone());
    types
}

fn object_types(obj: &misp::Object) -> BTreeSet<String> {
    let mut types: BTreeSet<String> = backend_tags().iter().map(|t| t.to_string()).collect();
    types.insert(DEFAULT_OBJECT_TYPE.to_string());
    types.insert(obj.name.clone());
    types
}

fn ensure_uuid(uuid: &mut Option<String>) -> String {
    if uuid.is_none() {
        *uuid = Some(Uuid::new_v4().to_string());
    }
    uuid.clone().expect("just assigned")
}

fn attribute_name(att: &mut misp::Attribute) -> String {
    format!("{}-{}", att.object_relation, ensure_uuid(&mut att.uuid))
}

fn object_name(obj: &mut misp::Object) -> String {
    format!("{}-{}", obj.name, ensure_uuid(&mut obj.uuid))
}

/// Bidirectional MISP envelope transformer.
#[derive(Debug, Default, Clone)]
pub struct MispTransformer;

impl MispTransformer {
    pub fn new() -> Self {
        MispTransformer
    }

    fn parse_envelope(body: &Value) -> Result<EventAnon, PipelineError> {
        serde_json::from_value(body.clone())
            .map_err(|e| PipelineError::ValidationError(format!("Not a valid anonymization envelope: {}", e)))
    }
}

impl Transformer for MispTransformer {
    fn body_kind(&self) -> BodyKind {
        BodyKind::Model
    }

    fn transform(&self, body: &mut Value) -> Result<Request, PipelineError> {
        let mut envelope = Self::parse_envelope(body)?;
        ensure_uuid(&mut envelope.event.uuid);

        let mut data: Vec<Component> = Vec::new();
        for obj in &mut envelope.event.objects {
            let mut components = Vec::with_capacity(obj.attributes.len());
            for att in &mut obj.attributes {
                let types = attribute_types(att);
                let name = attribute_name(att);
                components.push(Component::Attribute(Attribute::with_types(
                    name,
                    types,
                    att.value_string(),
                )));
            }
            let types = object_types(obj);
            let name = object_name(obj);
            data.push(Component::Object(Object::with_types(name, types, components)));
        }
        for att in &mut envelope.event.attributes {
            let types = attribute_types(att);
            let name = attribute_name(att);
            data.push(Component::Attribute(Attribute::with_types(
                name,
                types,
                att.value_string(),
            )));
        }

        // The assigned UUIDs must survive in the payload so the update
        // direction can correlate components later.
        *body = serde_json::to_value(&envelope)?;
        Ok(Request::new(BTreeSet::new(), data))
    }

    fn update(&self, body: &mut Value, data: &Request) -> Result<bool, PipelineError> {
        let mut envelope = Self::parse_envelope(body)?;
        let mut updated = false;

        for obj in &mut envelope.event.objects {
            let expected_name = object_name(obj);
            let obj_types = object_types(obj);
            let type_refs: Vec<&str> = obj_types.iter().map(String::as_str).collect();
            let obj_data = data
                .types_get(&type_refs)
                .into_iter()
                .filter_map(Component::as_object)
                .find(|o| o.name() == expected_name)
                .ok_or_else(|| {
                    PipelineError::ValidationError(format!(
                        "Unable to find data for object \"{}\" with UUID \"{}\"",
                        obj.name,
                        obj.uuid.as_deref().unwrap_or("")
                    ))
                })?;

            for att in &mut obj.attributes {
                let expected_name = attribute_name(att);
                let att_types = attribute_types(att);
                let type_refs: Vec<&str> = att_types.iter().map(String::as_str).collect();
                let att_data = obj_data
                    .types_get(&type_refs)
                    .into_iter()
                    .filter_map(Component::as_attribute)
                    .find(|a| a.name() == expected_name)
                    .ok_or_else(|| {
                        PipelineError::ValidationError(format!(
                            "Unable to find data for object attribute \"{}\" with UUID \"{}\"",
                            att.object_relation,
                            att.uuid.as_deref().unwrap_or("")
                        ))
                    })?;
                if att.value_string() != att_data.value() {
                    updated = true;
                    att.value = Value::String(att_data.value().to_string());
                }
            }
        }

        for att in &mut envelope.event.attributes {
            let expected_name = attribute_name(att);
            let att_types = attribute_types(att);
            let type_refs: Vec<&str> = att_types.iter().map(String::as_str).collect();
            let att_data = data
                .types_get(&type_refs)
                .into_iter()
                .filter_map(Component::as_attribute)
                .find(|a| a.name() == expected_name)
                .ok_or_else(|| {
                    PipelineError::ValidationError(format!(
                        "Unable to find data for attribute \"{}\" with UUID \"{}\"",
                        att.object_relation,
                        att.uuid.as_deref().unwrap_or("")
                    ))
                })?;
            if att.value_string() != att_data.value() {
                updated = true;
                att.value = Value::String(att_data.value().to_string());
            }
        }

        *body = serde_json::to_value(&envelope)?;
        Ok(updated)
    }

    fn snapshot(&self, body: &Value) -> Value {
        let Ok(envelope) = Self::parse_envelope(body) else {
            return Value::Object(serde_json::Map::new());
        };
        let mut snapshot = serde_json::Map::new();
        // A unique identifier prevents losing identical audits.
        snapshot.insert("uuid".into(), Value::String(Uuid::new_v4().to_string()));
        snapshot.insert(
            "tags".into(),
            Value::Array(
                envelope
                    .event
                    .tags
                    .iter()
                    .map(|t| Value::String(t.id.clone()))
                    .collect(),
            ),
        );
        snapshot.insert(
            "severity".into(),
            Value::Number(envelope.event.threat_level_as_int().into()),
        );
        let date = envelope
            .event
            .date
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        snapshot.insert("date".into(), Value::String(date.format("%Y-%m-%d").to_string()));
        snapshot.insert("published".into(), Value::Bool(false));
        snapshot.insert("uploaded".into(), Value::Bool(false));
        for attribute in &envelope.event.attributes {
            if attribute.object_relation == "event_type" {
                snapshot.insert("event_type".into(), attribute.value.clone());
                break;
            }
        }
        if let Some(audit) = &envelope.audit {
            for (key, value) in audit {
                snapshot.insert(key.clone(), value.clone());
            }
        }
        Value::Object(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> Value {
        json!({
            "Event": {
                "uuid": "9c2e9f1a-2b7d-4e11-9f3c-0db2f1a7e210",
                "date": "2025-06-01",
                "threat_level_id": "2",
                "Attribute": [
                    {"uuid": "11111111-1111-1111-1111-111111111111",
                     "object_relation": "event_type", "value": "phishing"}
                ],
                "Object": [{
                    "name": "network-flow",
                    "uuid": "22222222-2222-2222-2222-222222222222",
                    "timestamp": "0",
                    "Attribute": [
                        {"uuid": "33333333-3333-3333-3333-333333333333",
                         "object_relation": "ip-src", "value": "10.0.0.1"}
                    ]
                }],
                "Tag": [{"id": "7", "name": "tlp:amber"}]
            },
            "Privacy-policy": {
                "creator": "c", "organization": "o", "version": "1",
                "attributes": [], "templates": []
            },
            "Hierarchy-policy": {
                "creator": "c", "organization": "o", "version": "1",
                "hierarchy_objects": [], "hierarchy_attributes": []
            },
            "Audit": {"origin": "sensor-12"}
        })
    }

    #[test]
    fn transform_tags_components_for_every_backend() {
        let mut body = envelope();
        let request = MispTransformer::new().transform(&mut body).unwrap();

        assert_eq!(request.components().len(), 2);
        let object = request.components()[0].as_object().unwrap();
        assert_eq!(object.name(), "network-flow-22222222-2222-2222-2222-222222222222");
        assert!(object.type_is(&[
            TYPE_ANONYMIZABLE_BY_ARXLET,
            TYPE_ANONYMIZABLE_BY_FLASKDP,
            TYPE_ANONYMIZABLE_BY_LOCAL,
            "network-flow"
        ]));
        let inner = object.components()[0].as_attribute().unwrap();
        assert!(inner.type_is(&["ip-src", TYPE_ANONYMIZABLE_BY_LOCAL]));
        assert_eq!(inner.value(), "10.0.0.1");
    }

    #[test]
    fn transform_assigns_missing_uuids_into_the_payload() {
        let mut body = envelope();
        body["Event"]["Object"][0]["Attribute"][0]
            .as_object_mut()
            .unwrap()
            .remove("uuid");
        MispTransformer::new().transform(&mut body).unwrap();
        assert!(body["Event"]["Object"][0]["Attribute"][0]["uuid"].is_string());
    }

    #[test]
    fn update_writes_anonymized_values_back() {
        let mut body = envelope();
        let transformer = MispTransformer::new();
        let mut request = transformer.transform(&mut body).unwrap();

        // Anonymize the flow's source address in the data model.
        for component in request.components_mut() {
            if let Some(object) = component.as_object_mut() {
                for inner in object.components_mut() {
                    if let Some(att) = inner.as_attribute_mut() {
                        att.set_value("10.0.0.0/24");
                    }
                }
            }
        }

        let updated = transformer.update(&mut body, &request).unwrap();
        assert!(updated);
        assert_eq!(body["Event"]["Object"][0]["Attribute"][0]["value"], "10.0.0.0/24");
        // Unchanged values report no update on a second pass.
        let updated = transformer.update(&mut body, &request).unwrap();
        assert!(!updated);
    }

    #[test]
    fn transform_then_update_round_trip_is_stable() {
        let mut body = envelope();
        let transformer = MispTransformer::new();
        let request = transformer.transform(&mut body).unwrap();
        transformer.update(&mut body, &request).unwrap();
        let request_again = transformer.transform(&mut body.clone()).unwrap();
        assert_eq!(request_again, request);
    }

    #[test]
    fn snapshot_captures_audit_relevant_fields() {
        let body = envelope();
        let snapshot = MispTransformer::new().snapshot(&body);
        assert_eq!(snapshot["tags"], json!(["7"]));
        assert_eq!(snapshot["severity"], 2);
        assert_eq!(snapshot["date"], "2025-06-01");
        assert_eq!(snapshot["event_type"], "phishing");
        assert_eq!(snapshot["published"], false);
        assert_eq!(snapshot["uploaded"], false);
        assert_eq!(snapshot["origin"], "sensor-12");
        assert!(snapshot["uuid"].is_string());
    }
}
