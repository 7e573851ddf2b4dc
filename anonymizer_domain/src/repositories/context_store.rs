// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Context Store Port
//!
//! The context store is the durable map from request content hash to
//! request, with flattened type-set indices supporting AND/OR lookups. The
//! k-map jobs use it to retrieve previously-seen objects of a template as
//! the re-identification population; the `StoreRequest` job feeds it.
//!
//! Writes are idempotent upserts keyed by content hash; the flattened
//! type-set columns are recomputed on every write so later type additions
//! propagate.

use async_trait::async_trait;

use crate::entities::Request;
use crate::PipelineError;

/// Persistence port for the request context database.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Retrieves stored requests whose components carry the given types.
    ///
    /// # Arguments
    ///
    /// * `data_types` - types to check components against
    /// * `data_types_all` - require all types (`true`) or at least one
    /// * `request_types` - optional additional filter over the request's own
    ///   type set
    /// * `request_types_all` - all/any semantics for `request_types`
    async fn lookup(
        &self,
        data_types: &[String],
        data_types_all: bool,
        request_types: Option<&[String]>,
        request_types_all: bool,
    ) -> Result<Vec<Request>, PipelineError>;

    /// Stores a request keyed by its content hash (upsert).
    ///
    /// Returns whether the store accepted the write; a null store returns
    /// `false`.
    async fn record(&self, request: &Request) -> Result<bool, PipelineError>;
}

/// Context store that stores nothing and finds nothing.
///
/// Installed when no context provider is configured; k-map jobs then see an
/// empty population.
#[derive(Debug, Default, Clone)]
pub struct NoContextStore;

#[async_trait]
impl ContextStore for NoContextStore {
    async fn lookup(
        &self,
        _data_types: &[String],
        _data_types_all: bool,
        _request_types: Option<&[String]>,
        _request_types_all: bool,
    ) -> Result<Vec<Request>, PipelineError> {
        Ok(Vec::new())
    }

    async fn record(&self, _request: &Request) -> Result<bool, PipelineError> {
        Ok(false)
    }
}
