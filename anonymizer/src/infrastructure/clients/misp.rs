// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! HTTP client for a MISP instance: event upload and publication.

use std::time::Duration;

use tracing::{debug, error};

use anonymizer_domain::PipelineError;

use crate::infrastructure::clients::{http_client, join_url};
use crate::infrastructure::config::ConnectionSettings;
use crate::infrastructure::retry::retry;
use crate::models::misp::Event;

const ENDPOINT_ADD: &str = "/events/add";
const ENDPOINT_PUBLISH: &str = "/events/publish";

/// Client for one MISP instance.
pub struct MispClient {
    url: String,
    key: String,
    http: reqwest::Client,
    connection: ConnectionSettings,
}

impl MispClient {
    pub fn new(url: &str, key: &str, ssl: bool, connection: ConnectionSettings) -> Result<Self, PipelineError> {
        Ok(MispClient {
            url: url.to_string(),
            key: key.to_string(),
            http: http_client(!ssl)?,
            connection,
        })
    }

    /// The instance base URL, for logging.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<bool, PipelineError> {
        retry(
            self.connection.attempts,
            Duration::from_secs(self.connection.timeout),
            || {
                let http = &self.http;
                let key = &self.key;
                async move {
                    let response = http
                        .post(url)
                        .header("Authorization", key)
                        .header("Accept", "application/json")
                        .json(body)
                        .send()
                        .await
                        .map_err(|e| PipelineError::ClientError(e.to_string()))?;
                    if !response.status().is_success() {
                        error!(status = %response.status(), "MISP request returned HTTP status");
                        return Ok(false);
                    }
                    Ok(true)
                }
            },
            PipelineError::is_recoverable,
            |_| PipelineError::JobFailed("MISP request failed".into()),
        )
        .await
    }

    /// Uploads an event; optionally publishes it afterwards.
    ///
    /// Returns whether the upload (and, if requested, the publication)
    /// succeeded.
    pub async fn post_event(&self, event: &Event, publish: bool) -> Result<bool, PipelineError> {
        let body = serde_json::json!({ "Event": event });
        debug!(url = %self.url, "uploading MISP event");
        if !self.post(&join_url(&self.url, ENDPOINT_ADD), &body).await? {
            return Ok(false);
        }
        if publish {
            let uuid = event
                .uuid
                .as_deref()
                .ok_or_else(|| PipelineError::JobFailed("Cannot publish an event without a UUID".into()))?;
            let publish_url = format!("{}/{}", join_url(&self.url, ENDPOINT_PUBLISH), uuid);
            if !self.post(&publish_url, &serde_json::json!({})).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
