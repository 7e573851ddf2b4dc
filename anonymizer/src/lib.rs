// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Anonymizer
//!
//! Privacy-preserving data pipeline orchestrator. An HTTP request carrying
//! a structured threat-intelligence event plus two side-car policies is
//! converted into a uniform internal data model, then run through a
//! user-defined, policy-driven pipeline of anonymization stages that
//! transform the data in place by calling external privacy-enhancing
//! services (statistical disclosure control, differential privacy, local
//! suppression/generalization/PGP). The result is returned to the caller
//! and optionally forwarded to downstream publication sinks.
//!
//! ## Layers
//!
//! - [`execution`]: the three-level scheduler (pipeline -> stage -> job),
//!   the job library, and the per-request environment
//! - [`models`]: external-service wire shapes and the foreign event format
//! - [`transformers`]: payload <-> data-model adapters
//! - [`infrastructure`]: configuration, clients, stores, metrics, auth
//! - [`presentation`]: the axum HTTP shell
//!
//! The domain crate (`anonymizer-domain`) provides the data model, the
//! policy models and the persistence ports everything here builds on.

pub mod execution;
pub mod infrastructure;
pub mod models;
pub mod presentation;
pub mod transformers;
