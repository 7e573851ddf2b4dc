// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Scenario Tests
//!
//! Exercises the execution machinery below the HTTP shell: policy parsing
//! into the environment, idempotence of read-only pipelines, and the local
//! anonymization path end to end.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Map};

use anonymizer::execution::environment::{EnvValue, KEY_DATA, KEY_REQUEST};
use anonymizer::execution::{loader, Environment, ServiceContext};
use anonymizer::infrastructure::config::Settings;
use anonymizer::infrastructure::repositories::NoAuditStore;
use anonymizer_domain::entities::{Attribute, Component, ComponentContainer, Request};
use anonymizer_domain::policies::PrivacyPolicy;
use anonymizer_domain::repositories::context_store::NoContextStore;

fn services() -> Arc<ServiceContext> {
    Arc::new(ServiceContext {
        settings: Settings::default().into_shared(),
        context_store: Arc::new(NoContextStore),
        audit_store: Arc::new(NoAuditStore),
    })
}

fn policy_payload() -> serde_json::Value {
    json!({
        "Privacy-policy": {
            "creator": "cert", "organization": "example", "version": "1",
            "attributes": [], "templates": []
        },
        "Hierarchy-policy": {
            "creator": "cert", "organization": "example", "version": "1",
            "hierarchy_objects": [], "hierarchy_attributes": []
        }
    })
}

fn local_request() -> Request {
    let types: BTreeSet<String> = ["attribute", "local:anonymizable", "size"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    Request::new(
        BTreeSet::new(),
        vec![Component::Attribute(Attribute::with_types("size-1", types, "42"))],
    )
}

fn read_policy_description() -> serde_json::Value {
    json!({
        "stages": ["parse"],
        "jobs": {
            "read-privacy": {"type": "policies.ReadPrivacyPolicy", "stage": "parse",
                "args": {"address": "Privacy-policy", "location": "privacy"}},
            "read-hierarchy": {"type": "policies.ReadHierarchyPolicy", "stage": "parse",
                "args": {"address": "Hierarchy-policy", "location": "hierarchy"}}
        }
    })
}

#[tokio::test]
async fn read_policy_pipeline_is_idempotent_on_the_data() {
    let mut pipeline = loader::parse(&read_policy_description()).unwrap();
    let original = local_request();

    let mut env = Environment::new(services(), 0.0);
    env.set(KEY_REQUEST, EnvValue::Payload(policy_payload()));
    env.set(KEY_DATA, EnvValue::Data(original.clone()));

    let result = pipeline.run_wrapped(&mut env, &Map::new()).await.unwrap();
    assert!(result.success);
    assert_eq!(env.data().unwrap(), &original);

    // A second run over the same environment changes nothing either.
    pipeline.reset();
    let result = pipeline.run_wrapped(&mut env, &Map::new()).await.unwrap();
    assert!(result.success);
    assert_eq!(env.data().unwrap(), &original);

    // The policies landed where the jobs were told to put them.
    let privacy: PrivacyPolicy = env.model("privacy").unwrap();
    assert_eq!(privacy.creator, "cert");
}

#[tokio::test]
async fn local_policy_pipeline_generalizes_values_end_to_end() {
    // Privacy policy asks for generalization of "size" at level 1; the
    // hierarchy ladders 42 into the 11-50 bucket.
    let payload = json!({
        "Privacy-policy": {
            "creator": "cert", "organization": "example", "version": "1",
            "attributes": [
                {"name": "size", "type": "counter", "dp": false,
                 "pets": [{"scheme": "generalization", "metadata": {"level": 1}}]}
            ],
            "templates": []
        },
        "Hierarchy-policy": {
            "creator": "cert", "organization": "example", "version": "1",
            "hierarchy_objects": [],
            "hierarchy_attributes": [
                {"attribute-name": "size", "attribute-type": "interval",
                 "attribute-generalization": [
                     {"generalization": [], "regex": [],
                      "interval": ["<=10", "11-50", ">50"]}
                 ]}
            ]
        }
    });
    let description = json!({
        "stages": ["parse", "anonymize"],
        "jobs": {
            "read-privacy": {"type": "policies.ReadPrivacyPolicy", "stage": "parse",
                "args": {"address": "Privacy-policy", "location": "privacy"}},
            "read-hierarchy": {"type": "policies.ReadHierarchyPolicy", "stage": "parse",
                "args": {"address": "Hierarchy-policy", "location": "hierarchy"}},
            "local": {"type": "local.FromPrivacyPolicy", "stage": "anonymize",
                "args": {"privacy_policy_location": "privacy",
                          "hierarchy_policy_location": "hierarchy"}}
        }
    });

    let mut pipeline = loader::parse(&description).unwrap();
    let mut env = Environment::new(services(), 0.0);
    env.set(KEY_REQUEST, EnvValue::Payload(payload));
    env.set(KEY_DATA, EnvValue::Data(local_request()));

    let result = pipeline.run_wrapped(&mut env, &Map::new()).await.unwrap();
    assert!(result.success, "report: {:?}", result);

    // The generator chain shows up under dotted names.
    let anonymize = result.result.get("anonymize").unwrap();
    assert!(anonymize.result.get("local").is_some());
    assert!(anonymize.result.get("local.from-pets").is_some());
    assert!(anonymize
        .result
        .get("local.from-pets.apply-suppression")
        .is_some());

    let data = env.data().unwrap();
    let att = data.components()[0].as_attribute().unwrap();
    assert_eq!(att.value(), "11-50");
}
