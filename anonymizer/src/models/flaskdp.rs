// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # FlaskDP Wire Model
//!
//! Request/response shapes for the differential-privacy service. Each item
//! is a keyed batch of numeric values with its noise parameters; the
//! service applies the mechanism server-side and returns the noised values
//! under the same item id.

use serde::{Deserialize, Serialize};

/// Protocol version spoken by this model.
pub const VERSION: &str = "1";

/// The noise mechanisms the service implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mechanism {
    #[serde(rename = "laplace")]
    Laplace,
    #[serde(rename = "laplace/truncated")]
    LaplaceTruncated,
    #[serde(rename = "laplace/bounded-domain")]
    LaplaceBoundedDomain,
    #[serde(rename = "laplace/bounded-noise")]
    LaplaceBoundedNoise,
    #[serde(rename = "gaussian")]
    Gaussian,
    #[serde(rename = "gaussian/analytic")]
    GaussianAnalytic,
}

impl Mechanism {
    /// Resolves a scheme string, defaulting to Laplace for anything
    /// unrecognized.
    pub fn from_scheme(scheme: &str) -> Mechanism {
        match scheme.to_lowercase().as_str() {
            "laplace" => Mechanism::Laplace,
            "laplace/truncated" => Mechanism::LaplaceTruncated,
            "laplace/bounded-domain" => Mechanism::LaplaceBoundedDomain,
            "laplace/bounded-noise" => Mechanism::LaplaceBoundedNoise,
            "gaussian" => Mechanism::Gaussian,
            "gaussian/analytic" => Mechanism::GaussianAnalytic,
            _ => Mechanism::Laplace,
        }
    }
}

/// One noised item of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub id: String,
    pub values: Vec<f64>,
}

/// One item of a request: values plus mechanism parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub id: String,
    pub values: Vec<f64>,
    pub epsilon: f64,
    pub delta: f64,
    pub sensitivity: f64,
    pub mechanism: Mechanism,
    pub upper: f64,
    pub lower: f64,
}

/// Body of a POST to `/api/dp/apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaskDpRequest {
    pub items: Vec<ItemRequest>,
}

/// Response of `/api/dp/apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaskDpResponse {
    pub items: Vec<ItemResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_wire_names() {
        assert_eq!(
            serde_json::to_value(Mechanism::LaplaceBoundedDomain).unwrap(),
            "laplace/bounded-domain"
        );
        assert_eq!(Mechanism::from_scheme("GAUSSIAN/ANALYTIC"), Mechanism::GaussianAnalytic);
        assert_eq!(Mechanism::from_scheme("unknown"), Mechanism::Laplace);
    }
}
