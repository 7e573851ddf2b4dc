// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # HTTP Surface
//!
//! The thin shell in front of the execution engine:
//!
//! - `GET  /api/version` - version information
//! - `GET  /api/anonymizer` - credential check only (protected)
//! - `POST /api/anonymizer` - run the pipeline (protected, validated)
//! - `GET  /api/debug/hello-world` - liveness probe
//! - `GET  /api/debug/config` / `PUT /api/debug/config` - inspect and
//!   override configuration at runtime (flat dotted-key maps)
//! - `GET  /metrics` - Prometheus exposition
//!
//! The `Transformer-Type` request header selects the inbound payload
//! shape; the named transformer's body kind is enforced *before* the
//! pipeline runs, and a mismatch is a 400 that never enters the engine.
//! Pipeline/stage/job failures surface as a 400 carrying whatever body
//! the jobs produced; only unexpected errors become a 500.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use anonymizer_domain::services::BodyKind;
use anonymizer_domain::PipelineError;

use crate::execution::environment::HttpReply;
use crate::execution::{ExecutionEngine, ServiceContext};
use crate::infrastructure::auth::AuthProvider;
use crate::infrastructure::config::SharedSettings;
use crate::infrastructure::metrics::MetricsService;
use crate::transformers::transformer_from_type;

/// Request header naming the transformer for the inbound payload shape.
pub const HEADER_TRANSFORMER_TYPE: &str = "Transformer-Type";

/// Shared state of the HTTP shell.
#[derive(Clone)]
pub struct AppState {
    pub settings: SharedSettings,
    pub services: Arc<ServiceContext>,
    pub auth: Arc<dyn AuthProvider>,
    pub metrics: Arc<MetricsService>,
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/version", get(version))
        .route("/api/anonymizer", get(verify_credentials).post(anonymize))
        .route("/api/debug/hello-world", get(hello_world))
        .route("/api/debug/config", get(get_config).put(put_config))
        .route("/metrics", get(metrics))
        .with_state(state)
}

fn reply_to_response(reply: HttpReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match reply.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    }
}

fn validation_fail(reason: &str) -> Response {
    error!(reason, "validation failed");
    StatusCode::BAD_REQUEST.into_response()
}

async fn version() -> Response {
    let version = env!("CARGO_PKG_VERSION");
    let mut parts = version.split('.');
    let major: i64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: i64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Json(json!({
        "version": format!("v{}", version),
        "major": major,
        "minor": minor,
    }))
    .into_response()
}

async fn verify_credentials(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => StatusCode::UNAUTHORIZED.into_response(),
        Err(response) => response,
    }
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<bool, Response> {
    let authorization = headers.get("Authorization").and_then(|v| v.to_str().ok());
    state.auth.authorize(authorization).await.map_err(|e| {
        error!(error = %e, "auth provider failure");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

/// Execute the pipeline on the received data.
async fn anonymize(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    match authorize(&state, &headers).await {
        Ok(true) => {}
        Ok(false) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(response) => return response,
    }

    info!("validating request");
    let Some(transformer_type) = headers
        .get(HEADER_TRANSFORMER_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return validation_fail("unable to locate Transformer-Type HTTP header");
    };
    let Some(transformer) = transformer_from_type(transformer_type) else {
        return validation_fail("unable to import transformer");
    };
    info!(transformer = transformer_type, "transformer selected");

    let parsed: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(_) if transformer.body_kind() == BodyKind::None => Value::Null,
            Err(_) => return validation_fail("request body is not valid JSON"),
        }
    };
    match transformer.body_kind() {
        BodyKind::None => {}
        BodyKind::Object | BodyKind::Model => {
            if !parsed.is_object() {
                return validation_fail("request body is not a JSON object");
            }
        }
        BodyKind::List => {
            if !parsed.is_array() {
                return validation_fail("request body is not a JSON list");
            }
        }
    }

    // Record the pre-run audit snapshot; the pipeline updates it later.
    let snapshot = transformer.snapshot(&parsed);
    let now = Utc::now();
    let fallback_timestamp = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0;
    let audit_timestamp = match state.services.audit_store.log(snapshot, None).await {
        Ok(timestamp) => timestamp,
        Err(e) => {
            warn!(error = %e, "unable to record audit snapshot");
            fallback_timestamp
        }
    };

    let payload = parsed.clone();
    let mut validated_body = parsed;
    let data = match transformer.transform(&mut validated_body) {
        Ok(data) => data,
        Err(PipelineError::ValidationError(reason)) => return validation_fail(&reason),
        Err(e) => {
            error!(error = %e, "transformer failure");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let pipeline_file = state.settings.snapshot().pipeline.file;
    let mut engine = ExecutionEngine::new(pipeline_file.as_deref());
    let started = Instant::now();
    match engine
        .run(payload, data, validated_body, audit_timestamp, state.services.clone())
        .await
    {
        Ok(reply) => {
            state
                .metrics
                .observe_request(started.elapsed().as_secs_f64(), reply.status < 400);
            reply_to_response(reply)
        }
        Err(e) => {
            error!(error = %e, category = e.category(), "pipeline escaped with an error");
            state.metrics.observe_request(started.elapsed().as_secs_f64(), false);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn hello_world() -> Response {
    Json(json!({"hello": "world"})).into_response()
}

async fn get_config(State(state): State<AppState>) -> Response {
    match state.settings.as_json() {
        Ok(settings) => Json(settings).into_response(),
        Err(e) => {
            error!(error = %e, "unable to serialize settings");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn put_config(State(state): State<AppState>, Json(overrides): Json<Value>) -> Response {
    let Some(overrides) = overrides.as_object() else {
        return validation_fail("configuration override is not a JSON object");
    };
    match state.settings.apply_overrides(overrides) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!(error = %e, "configuration override rejected");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.export() {
        Ok(text) => ([("Content-Type", "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            error!(error = %e, "metrics export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
