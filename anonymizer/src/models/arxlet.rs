// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # ARXlet Wire Model
//!
//! Request/response shapes for the statistical disclosure control service.
//! The service exposes two endpoints: `/attributes` takes a list of values
//! with their generalization ladders, `/objects` takes record-shaped data
//! with per-column ladders. Both apply a batch of PET descriptors and
//! return the generalized values in input order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version spoken by this model.
pub const VERSION: &str = "0.2";

pub const SCHEME_KANON: &str = "k-anonymity";
pub const SCHEME_KMAP: &str = "k-map";
pub const SCHEME_DLDIV: &str = "l-diversity/distinct";
pub const SCHEME_ELDIV: &str = "l-diversity/entropy";
pub const SCHEME_RLDIV: &str = "l-diversity/recursive";
pub const SCHEME_HTCLO: &str = "t-closeness/hierarchical";
pub const SCHEME_OTCLO: &str = "t-closeness/ordered";

/// Scheme-specific PET parameters.
///
/// Serialized untagged; variant order matters for deserialization (larger
/// shapes first so a subset never shadows a superset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PetMetadata {
    KMap {
        k: i64,
        context: Vec<Vec<ObjectData>>,
    },
    RecursiveLDiversity {
        attribute: String,
        l: i64,
        c: f64,
    },
    LDiversity {
        attribute: String,
        l: i64,
    },
    TCloseness {
        attribute: String,
        t: f64,
    },
    KAnonymity {
        k: i64,
    },
}

/// A PET descriptor as the service consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub scheme: String,
    pub metadata: PetMetadata,
}

/// One typed value of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub value: String,
}

/// The generalization ladder of one record column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub values: Vec<String>,
}

/// A standalone value with its generalization ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeData {
    pub value: String,
    pub hierarchies: Vec<String>,
}

/// A record: typed values with parallel per-column ladders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectData {
    pub values: Vec<Attribute>,
    pub hierarchies: Vec<Hierarchy>,
}

/// Body of a POST to the `/attributes` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRequest {
    pub data: Vec<AttributeData>,
    pub pets: Vec<Pet>,
}

/// Body of a POST to the `/objects` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRequest {
    pub data: Vec<ObjectData>,
    pub pets: Vec<Pet>,
}

/// Why a scheme string could not be turned into a [`Pet`].
#[derive(Debug, Clone, PartialEq)]
pub enum PetSchemeError {
    /// The scheme does not belong to this service; the caller should skip
    /// the descriptor.
    Unknown(String),
    /// The scheme is known but its metadata is unusable.
    Invalid(String),
}

impl std::fmt::Display for PetSchemeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PetSchemeError::Unknown(scheme) => write!(f, "Unknown scheme \"{}\"", scheme),
            PetSchemeError::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

fn require_i64(metadata: &Map<String, Value>, key: &str) -> Result<i64, PetSchemeError> {
    metadata
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| PetSchemeError::Invalid(format!("Metadata field \"{}\" missing or not an integer", key)))
}

fn require_f64(metadata: &Map<String, Value>, key: &str) -> Result<f64, PetSchemeError> {
    metadata
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| PetSchemeError::Invalid(format!("Metadata field \"{}\" missing or not a number", key)))
}

fn require_sensitive(
    metadata: &Map<String, Value>,
    sensitive: Option<&str>,
) -> Result<String, PetSchemeError> {
    sensitive
        .map(String::from)
        .or_else(|| {
            metadata
                .get("sensitive")
                .or_else(|| metadata.get("attribute"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .ok_or_else(|| PetSchemeError::Invalid("Sensitive attribute must not be None".into()))
}

/// Builds the PET descriptor for a scheme string.
///
/// Matching is by scheme-substring, mirroring the policy wire format.
/// Returns [`PetSchemeError::Unknown`] for schemes this service does not
/// implement (differential privacy, local suppression) so callers can skip
/// them, and [`PetSchemeError::Invalid`] when a known scheme lacks its
/// required metadata (e.g. an l-diversity PET without a sensitive
/// attribute).
pub fn pet_from_scheme(
    scheme: &str,
    metadata: &Map<String, Value>,
    sensitive: Option<&str>,
    context: Option<Vec<Vec<ObjectData>>>,
) -> Result<Pet, PetSchemeError> {
    if scheme.contains(SCHEME_KMAP) {
        let context = context
            .or_else(|| {
                metadata
                    .get("context")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
            })
            .ok_or_else(|| PetSchemeError::Invalid("Context must not be None".into()))?;
        return Ok(Pet {
            scheme: SCHEME_KMAP.into(),
            metadata: PetMetadata::KMap {
                k: require_i64(metadata, "k")?,
                context,
            },
        });
    }

    if scheme.contains(SCHEME_KANON) {
        return Ok(Pet {
            scheme: SCHEME_KANON.into(),
            metadata: PetMetadata::KAnonymity {
                k: require_i64(metadata, "k")?,
            },
        });
    }

    if scheme.contains(SCHEME_DLDIV) || scheme.contains(SCHEME_ELDIV) {
        let canonical = if scheme.contains(SCHEME_DLDIV) {
            SCHEME_DLDIV
        } else {
            SCHEME_ELDIV
        };
        return Ok(Pet {
            scheme: canonical.into(),
            metadata: PetMetadata::LDiversity {
                attribute: require_sensitive(metadata, sensitive)?,
                l: require_i64(metadata, "l")?,
            },
        });
    }

    if scheme.contains(SCHEME_RLDIV) {
        return Ok(Pet {
            scheme: SCHEME_RLDIV.into(),
            metadata: PetMetadata::RecursiveLDiversity {
                attribute: require_sensitive(metadata, sensitive)?,
                l: require_i64(metadata, "l")?,
                c: require_f64(metadata, "c")?,
            },
        });
    }

    if scheme.contains(SCHEME_HTCLO) || scheme.contains(SCHEME_OTCLO) {
        let canonical = if scheme.contains(SCHEME_HTCLO) {
            SCHEME_HTCLO
        } else {
            SCHEME_OTCLO
        };
        return Ok(Pet {
            scheme: canonical.into(),
            metadata: PetMetadata::TCloseness {
                attribute: require_sensitive(metadata, sensitive)?,
                t: require_f64(metadata, "t")?,
            },
        });
    }

    Err(PetSchemeError::Unknown(scheme.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn known_schemes_resolve() {
        let pet = pet_from_scheme(SCHEME_KANON, &meta(serde_json::json!({"k": 3})), None, None).unwrap();
        assert_eq!(pet.metadata, PetMetadata::KAnonymity { k: 3 });

        let pet = pet_from_scheme(
            SCHEME_RLDIV,
            &meta(serde_json::json!({"l": 2, "c": 0.5})),
            Some("diagnosis"),
            None,
        )
        .unwrap();
        assert_eq!(
            pet.metadata,
            PetMetadata::RecursiveLDiversity {
                attribute: "diagnosis".into(),
                l: 2,
                c: 0.5
            }
        );
    }

    #[test]
    fn sensitive_falls_back_to_metadata_keys() {
        let pet = pet_from_scheme(
            SCHEME_HTCLO,
            &meta(serde_json::json!({"t": 0.2, "attribute": "diagnosis"})),
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            pet.metadata,
            PetMetadata::TCloseness {
                attribute: "diagnosis".into(),
                t: 0.2
            }
        );

        assert!(matches!(
            pet_from_scheme(SCHEME_DLDIV, &meta(serde_json::json!({"l": 2})), None, None),
            Err(PetSchemeError::Invalid(_))
        ));
    }

    #[test]
    fn foreign_schemes_are_unknown() {
        assert!(matches!(
            pet_from_scheme("laplace", &Map::new(), None, None),
            Err(PetSchemeError::Unknown(_))
        ));
        assert!(matches!(
            pet_from_scheme("suppression", &Map::new(), None, None),
            Err(PetSchemeError::Unknown(_))
        ));
    }

    #[test]
    fn pet_round_trips_through_json() {
        let pet = Pet {
            scheme: SCHEME_KMAP.into(),
            metadata: PetMetadata::KMap {
                k: 4,
                context: vec![vec![ObjectData {
                    values: vec![Attribute {
                        attribute_type: "ip-src".into(),
                        value: "10.0.0.1".into(),
                    }],
                    hierarchies: vec![Hierarchy {
                        attribute_type: "ip-src".into(),
                        values: vec!["10.0.0.1".into(), "10.0.0.*".into()],
                    }],
                }]],
            },
        };
        let json = serde_json::to_value(&pet).unwrap();
        let back: Pet = serde_json::from_value(json).unwrap();
        assert_eq!(back, pet);
    }
}
