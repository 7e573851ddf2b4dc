// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # External Service Clients
//!
//! One client per external collaborator, all built the same way: a
//! `reqwest` (or broker) handle, the service's [`ConnectionSettings`], and
//! every call wrapped in the shared [`crate::infrastructure::retry`]
//! envelope. Transport failures are `ClientError` (retryable); a non-2xx
//! response is reported as an absent result for the calling job to turn
//! into a job failure.

pub mod arxlet;
pub mod flaskdp;
pub mod misp;
pub mod mqtt;

use anonymizer_domain::PipelineError;

/// Joins a base URL and an absolute endpoint path.
pub(crate) fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), endpoint)
}

/// Builds the HTTP handle shared by the reqwest-backed clients.
pub(crate) fn http_client(accept_invalid_certs: bool) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| PipelineError::ClientError(format!("Unable to initialize HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_trailing_slashes() {
        assert_eq!(join_url("http://host:1234/", "/attributes"), "http://host:1234/attributes");
        assert_eq!(join_url("http://host:1234", "/objects"), "http://host:1234/objects");
    }
}
