// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Request Hash Value Object
//!
//! Type-safe wrapper for a request's canonical content hash: the
//! hex-encoded SHA-256 digest of its sorted-key serialization. The hash is
//! the context store's primary key, so a dedicated type keeps raw strings
//! from leaking into store interfaces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PipelineError;

const HASH_HEX_LEN: usize = 64;

/// Hex-encoded SHA-256 content hash of a [`crate::entities::Request`].
///
/// Two requests with the same semantic content share the same hash
/// regardless of field or type-set insertion ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestHash(String);

impl RequestHash {
    /// Wraps a raw SHA-256 digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        RequestHash(hex::encode(digest))
    }

    /// Parses a hash from its hex representation (e.g. a stored key).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the input is not 64 lowercase hex
    /// characters.
    pub fn parse(s: impl Into<String>) -> Result<Self, PipelineError> {
        let s = s.into();
        if s.len() != HASH_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(PipelineError::ValidationError(format!(
                "Not a hex-encoded SHA-256 digest: {}",
                s
            )));
        }
        Ok(RequestHash(s))
    }

    /// The hex representation, as stored in the context database.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_valid_digests() {
        let hash = RequestHash::from_digest(&[0xabu8; 32]);
        assert_eq!(hash.as_str().len(), 64);
        assert_eq!(RequestHash::parse(hash.as_str()).unwrap(), hash);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(RequestHash::parse("short").is_err());
        assert!(RequestHash::parse("G".repeat(64)).is_err());
        assert!(RequestHash::parse("AB".repeat(32)).is_err());
    }
}
