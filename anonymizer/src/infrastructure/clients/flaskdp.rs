// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! HTTP client for the FlaskDP differential-privacy service.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error};

use anonymizer_domain::PipelineError;

use crate::infrastructure::clients::{http_client, join_url};
use crate::infrastructure::config::ConnectionSettings;
use crate::infrastructure::retry::retry;
use crate::models::flaskdp::{FlaskDpRequest, FlaskDpResponse, VERSION};

/// Endpoint applying a DP mechanism to a keyed item batch.
pub const ENDPOINT_APPLY: &str = "/api/dp/apply";

/// Client for one FlaskDP base URL.
pub struct FlaskDpClient {
    url: String,
    http: reqwest::Client,
    connection: ConnectionSettings,
}

impl FlaskDpClient {
    pub fn new(url: &str, connection: ConnectionSettings) -> Result<Self, PipelineError> {
        Ok(FlaskDpClient {
            url: url.to_string(),
            http: http_client(false)?,
            connection,
        })
    }

    /// The protocol version this client speaks.
    pub fn version() -> &'static str {
        VERSION
    }

    /// Applies DP to the items inside the request.
    ///
    /// Returns the noised items, or `None` when the service rejected the
    /// request.
    pub async fn apply_dp(&self, request: &FlaskDpRequest) -> Result<Option<FlaskDpResponse>, PipelineError> {
        let url = join_url(&self.url, ENDPOINT_APPLY);
        debug!(url = %url, "using FlaskDP URL");
        let body = serde_json::to_value(request)?;
        retry(
            self.connection.attempts,
            Duration::from_secs(self.connection.timeout),
            || {
                let http = &self.http;
                let url = &url;
                let body = &body;
                async move {
                    let response = http
                        .post(url)
                        .json(body)
                        .send()
                        .await
                        .map_err(|e| PipelineError::ClientError(e.to_string()))?;
                    if !response.status().is_success() {
                        error!(status = %response.status(), "FlaskDP request returned HTTP status");
                        debug!(body = %body, "request body");
                        return Ok(None);
                    }
                    let value = response
                        .json::<Value>()
                        .await
                        .map_err(|e| PipelineError::ClientError(e.to_string()))?;
                    let parsed: FlaskDpResponse = serde_json::from_value(value)
                        .map_err(|e| PipelineError::JobFailed(format!("Malformed FlaskDP response: {}", e)))?;
                    Ok(Some(parsed))
                }
            },
            PipelineError::is_recoverable,
            |_| PipelineError::JobFailed("FlaskDP request failed".into()),
        )
        .await
    }
}
