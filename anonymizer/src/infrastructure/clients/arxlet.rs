// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # ARXlet Client
//!
//! HTTP client for the statistical disclosure control service. The
//! attribute endpoint is `/attributes` - plural, like the object endpoint;
//! the singular spelling seen in older deployments is not accepted.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error};

use anonymizer_domain::PipelineError;

use crate::infrastructure::clients::{http_client, join_url};
use crate::infrastructure::config::ConnectionSettings;
use crate::infrastructure::retry::retry;
use crate::models::arxlet::{Attribute, AttributeData, AttributeRequest, ObjectData, ObjectRequest, Pet, VERSION};

/// Endpoint applying PETs to standalone attribute values.
pub const ENDPOINT_ATTRIBUTES: &str = "/attributes";
/// Endpoint applying PETs to object records.
pub const ENDPOINT_OBJECTS: &str = "/objects";

/// Client for one ARXlet base URL.
pub struct ArxletClient {
    url: String,
    http: reqwest::Client,
    connection: ConnectionSettings,
}

impl ArxletClient {
    pub fn new(url: &str, connection: ConnectionSettings) -> Result<Self, PipelineError> {
        Ok(ArxletClient {
            url: url.to_string(),
            http: http_client(false)?,
            connection,
        })
    }

    /// The protocol version this client speaks.
    pub fn version() -> &'static str {
        VERSION
    }

    /// POSTs a body, retrying transport failures.
    ///
    /// Returns `Ok(None)` on a non-2xx response; exhausting the retry
    /// budget yields the job-level "request failed" error.
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Option<Value>, PipelineError> {
        let url = join_url(&self.url, endpoint);
        debug!(url = %url, "using ARXlet URL");
        retry(
            self.connection.attempts,
            Duration::from_secs(self.connection.timeout),
            || {
                let http = &self.http;
                let url = &url;
                async move {
                    let response = http
                        .post(url)
                        .json(body)
                        .send()
                        .await
                        .map_err(|e| PipelineError::ClientError(e.to_string()))?;
                    if !response.status().is_success() {
                        error!(status = %response.status(), "ARXlet request returned HTTP status");
                        debug!(body = %body, "request body");
                        return Ok(None);
                    }
                    let value = response
                        .json::<Value>()
                        .await
                        .map_err(|e| PipelineError::ClientError(e.to_string()))?;
                    Ok(Some(value))
                }
            },
            PipelineError::is_recoverable,
            |_| PipelineError::JobFailed("ARXlet request failed".into()),
        )
        .await
    }

    /// Applies the PETs to the supplied attribute list.
    ///
    /// Returns the anonymized values in input order, or `None` when the
    /// service rejected the request.
    pub async fn anonymize_attributes(
        &self,
        attributes: &[AttributeData],
        pets: &[Pet],
    ) -> Result<Option<Vec<String>>, PipelineError> {
        let request = AttributeRequest {
            data: attributes.to_vec(),
            pets: pets.to_vec(),
        };
        let body = serde_json::to_value(&request)?;
        match self.post(ENDPOINT_ATTRIBUTES, &body).await? {
            None => Ok(None),
            Some(value) => {
                let values: Vec<String> = serde_json::from_value(value)
                    .map_err(|e| PipelineError::JobFailed(format!("Malformed ARXlet response: {}", e)))?;
                Ok(Some(values))
            }
        }
    }

    /// Applies the PETs to the supplied object records.
    ///
    /// Returns one anonymized attribute list per record, in input order,
    /// or `None` when the service rejected the request.
    pub async fn anonymize_objects(
        &self,
        objects: &[ObjectData],
        pets: &[Pet],
    ) -> Result<Option<Vec<Vec<Attribute>>>, PipelineError> {
        let request = ObjectRequest {
            data: objects.to_vec(),
            pets: pets.to_vec(),
        };
        let body = serde_json::to_value(&request)?;
        match self.post(ENDPOINT_OBJECTS, &body).await? {
            None => Ok(None),
            Some(value) => {
                let records: Vec<Vec<Attribute>> = serde_json::from_value(value)
                    .map_err(|e| PipelineError::JobFailed(format!("Malformed ARXlet response: {}", e)))?;
                Ok(Some(records))
            }
        }
    }
}
