// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Anonymizer Domain
//!
//! Core business logic of the privacy-preserving pipeline orchestrator,
//! independent of databases, HTTP, and external services. It implements
//! Domain-Driven Design patterns and is consumed by the application crate
//! which adds the execution engine, job library, and infrastructure.
//!
//! ## Module Structure
//!
//! - [`entities`]: the tagged component tree ([`entities::Attribute`],
//!   [`entities::Object`], [`entities::Component`]) and the top-level
//!   [`entities::Request`] with its type-set algebra and content hash
//! - [`policies`]: the declarative privacy and hierarchy policies plus the
//!   generalization-ladder resolver
//! - [`value_objects`]: immutable validated wrappers such as
//!   [`value_objects::RequestHash`]
//! - [`repositories`]: infrastructure ports for the context store and the
//!   audit store
//! - [`services`]: the [`services::Transformer`] port bridging external
//!   payloads and the internal data model
//! - [`error`]: the [`PipelineError`] hierarchy shared by every layer
//!
//! ## Business Rules and Invariants
//!
//! - A component's type set is never empty after construction; requests may
//!   carry an empty type set.
//! - Serialization is stable: `from_dict(to_dict(x)) == x`.
//! - The content hash depends only on semantic content, never on field or
//!   type-set insertion order.
//! - Jobs mutate attribute values in place and may add or remove
//!   components; names and structural tags are left alone.

pub mod entities;
pub mod error;
pub mod policies;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::PipelineError;
