// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Context-store persistence jobs.

use async_trait::async_trait;

use anonymizer_domain::PipelineError;

use crate::execution::job::{Job, JobContext, JobOutput};

/// Store the current request into the context database.
///
/// Later k-map runs use the stored population to measure re-identification
/// risk against previously-seen objects of the same template.
pub struct StoreRequest;

#[async_trait]
impl Job for StoreRequest {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        let request = ctx.data()?.clone();
        let store = ctx.env.services().context_store.clone();
        store
            .record(&request)
            .await
            .map_err(|e| PipelineError::JobFailed(format!("Context store failure: {}", e)))?;
        Ok(JobOutput::None)
    }
}
