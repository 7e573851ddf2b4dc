// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP API Integration Tests
//!
//! Drives the full axum router in-process: transformer selection and
//! validation, the default echo pipeline, policy-driven success/failure
//! reporting, runtime configuration overrides, and the metrics surface.

use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use anonymizer::execution::ServiceContext;
use anonymizer::infrastructure::auth::NoAuth;
use anonymizer::infrastructure::config::Settings;
use anonymizer::infrastructure::metrics::MetricsService;
use anonymizer::infrastructure::repositories::NoAuditStore;
use anonymizer::presentation::{router, AppState};
use anonymizer_domain::repositories::context_store::NoContextStore;

fn app() -> Router {
    let settings = Settings::default().into_shared();
    let services = Arc::new(ServiceContext {
        settings: settings.clone(),
        context_store: Arc::new(NoContextStore),
        audit_store: Arc::new(NoAuditStore),
    });
    router(AppState {
        settings,
        services,
        auth: Arc::new(NoAuth),
        metrics: Arc::new(MetricsService::new().unwrap()),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_anonymizer(body: Value, transformer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/anonymizer")
        .header("Content-Type", "application/json");
    if let Some(transformer) = transformer {
        builder = builder.header("Transformer-Type", transformer);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Writes a pipeline description file and points the running service at
/// it through the debug configuration API.
async fn install_pipeline(app: &Router, description: Value) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(description.to_string().as_bytes()).unwrap();
    file.flush().unwrap();

    let override_body = json!({"pipeline.file": file.path().to_str().unwrap()});
    let request = Request::builder()
        .method("PUT")
        .uri("/api/debug/config")
        .header("Content-Type", "application/json")
        .body(Body::from(override_body.to_string()))
        .unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    file
}

/// A one-stage dummy pipeline plus a trailing report stage.
fn dummy_pipeline(fail: bool) -> Value {
    json!({
        "stages": ["1", "2"],
        "jobs": {
            "1": {"type": "DummyJob", "stage": "1",
                  "args": {"message": "ok", "fail": fail}},
            "report": {"type": "ResultsPong", "stage": "2"}
        }
    })
}

#[tokio::test]
async fn version_reports_semver_components() {
    let app = app();
    let request = Request::builder().uri("/api/version").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].as_str().unwrap().starts_with('v'));
    assert_eq!(body["major"], 1);
    assert!(body["minor"].is_i64());
}

#[tokio::test]
async fn credential_check_returns_empty_200() {
    let app = app();
    let request = Request::builder().uri("/api/anonymizer").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn default_pipeline_echoes_the_incoming_json() {
    // No pipeline file configured: the default echo pipeline answers.
    let app = app();
    let (status, body) = send(&app, post_anonymizer(json!({"a": 1}), Some("NoTransformer"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"a": 1}));
}

#[tokio::test]
async fn missing_transformer_header_is_rejected_before_the_pipeline() {
    let app = app();
    let (status, _) = send(&app, post_anonymizer(json!({"a": 1}), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_transformer_is_rejected() {
    let app = app();
    let (status, _) = send(&app, post_anonymizer(json!({"a": 1}), Some("no.such.Transformer"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn model_transformer_rejects_non_object_bodies() {
    let app = app();
    let (status, _) = send(&app, post_anonymizer(json!([1, 2]), Some("misp.MispTransformer"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn successful_job_reports_success_with_200() {
    let app = app();
    let _file = install_pipeline(&app, dummy_pipeline(false)).await;

    let (status, body) = send(&app, post_anonymizer(json!({}), Some("NoTransformer"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["1"]["success"], true);
    assert_eq!(body["result"]["1"]["result"]["1"]["success"], true);
}

#[tokio::test]
async fn failing_job_reports_failure_with_400() {
    let app = app();
    let _file = install_pipeline(&app, dummy_pipeline(true)).await;

    let (status, body) = send(&app, post_anonymizer(json!({}), Some("NoTransformer"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["result"]["1"]["success"], false);
    assert_eq!(body["result"]["1"]["result"]["1"]["success"], false);
}

#[tokio::test]
async fn optional_stage_failure_keeps_the_pipeline_successful() {
    let app = app();
    let description = json!({
        "policies": {"optional": ["1"]},
        "stages": ["1", "2"],
        "jobs": {
            "1": {"type": "DummyJob", "stage": "1",
                  "args": {"message": "boom", "fail": true}},
            "report": {"type": "ResultsPong", "stage": "2"}
        }
    });
    let _file = install_pipeline(&app, description).await;

    let (status, body) = send(&app, post_anonymizer(json!({}), Some("NoTransformer"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["1"]["success"], false);
}

#[tokio::test]
async fn generator_expansion_shows_up_in_the_report() {
    let app = app();
    let description = json!({
        "stages": ["1", "2"],
        "jobs": {
            "g": {"type": "DummyGeneratorJob", "stage": "1",
                  "args": {"jobs": [
                      {"name": "c1", "type": "DummyJob",
                       "args": {"message": "one"}, "policies": {}},
                      {"name": "c2", "type": "DummyJob",
                       "args": {"message": "two"}, "policies": {}}
                  ]}},
            "report": {"type": "ResultsPong", "stage": "2"}
        }
    });
    let _file = install_pipeline(&app, description).await;

    let (status, body) = send(&app, post_anonymizer(json!({}), Some("NoTransformer"))).await;
    assert_eq!(status, StatusCode::OK);

    let stage = body["result"]["1"]["result"].as_object().unwrap();
    let keys: Vec<&str> = stage.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["g", "g.c1", "g.c2"]);
    assert_eq!(body["result"]["1"]["result"]["g"]["result"], "['c1', 'c2']");
    assert_eq!(body["result"]["1"]["result"]["g.c1"]["success"], true);
}

#[tokio::test]
async fn failed_generator_runs_no_children() {
    let app = app();
    let description = json!({
        "stages": ["1", "2"],
        "jobs": {
            "g": {"type": "DummyGeneratorJob", "stage": "1",
                  "args": {"fail": true, "jobs": [
                      {"name": "c1", "type": "DummyJob",
                       "args": {"message": "one"}, "policies": {}}
                  ]}},
            "report": {"type": "ResultsPong", "stage": "2"}
        }
    });
    let _file = install_pipeline(&app, description).await;

    let (status, body) = send(&app, post_anonymizer(json!({}), Some("NoTransformer"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let stage = body["result"]["1"]["result"].as_object().unwrap();
    assert_eq!(stage.len(), 1);
    assert_eq!(stage["g"]["result"], "[]");
}

#[tokio::test]
async fn debug_config_round_trips_overrides() {
    let app = app();
    let request = Request::builder().uri("/api/debug/config").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"]["port"], 8080);

    let override_body = json!({"server.port": 9090});
    let request = Request::builder()
        .method("PUT")
        .uri("/api/debug/config")
        .header("Content-Type", "application/json")
        .body(Body::from(override_body.to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder().uri("/api/debug/config").body(Body::empty()).unwrap();
    let (_, body) = send(&app, request).await;
    assert_eq!(body["server"]["port"], 9090);
}

#[tokio::test]
async fn invalid_config_override_is_rejected() {
    let app = app();
    let override_body = json!({"server.port": "not-a-port"});
    let request = Request::builder()
        .method("PUT")
        .uri("/api/debug/config")
        .header("Content-Type", "application/json")
        .body(Body::from(override_body.to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_count_processed_requests() {
    let app = app();
    let _ = send(&app, post_anonymizer(json!({"a": 1}), Some("NoTransformer"))).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("anonymizer_requests_total 1"));
}

#[tokio::test]
async fn hello_world_is_alive() {
    let app = app();
    let request = Request::builder()
        .uri("/api/debug/hello-world")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hello"], "world");
}
