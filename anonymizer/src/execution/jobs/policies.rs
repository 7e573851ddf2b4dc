// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Parsing Jobs
//!
//! Read a policy sub-tree out of the inbound payload, validate it against
//! the policy schema, and store it at an environment location for the
//! generator jobs downstream. The sub-tree is addressed by a dotted path
//! (`"a.b.c"`) of intermediate objects.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use anonymizer_domain::policies::{HierarchyPolicy, PrivacyPolicy};
use anonymizer_domain::PipelineError;

use crate::execution::job::{Job, JobContext, JobOutput};

const PARAM_ADDRESS: &str = "address";
const PARAM_LOCATION: &str = "location";

/// Follows the dotted address into the payload.
fn resolve_address<'a>(payload: &'a Value, address: &str) -> Result<&'a Value, PipelineError> {
    let mut data = payload;
    for intermediate in address.split('.') {
        let object = data.as_object().ok_or_else(|| {
            PipelineError::JobFailed(format!("Reached recursion end before \"{}\"", intermediate))
        })?;
        data = object.get(intermediate).ok_or_else(|| {
            PipelineError::JobFailed(format!("Intermediate object {} not present", intermediate))
        })?;
    }
    if !data.is_object() {
        return Err(PipelineError::JobFailed("Target address is not a JSON object".into()));
    }
    Ok(data)
}

/// Read, parse and store a privacy policy.
///
/// Required parameters:
///
/// - `address` (`str`): dotted path of the policy inside the payload.
/// - `location` (`str`): environment location to store the policy under.
pub struct ReadPrivacyPolicy;

#[async_trait]
impl Job for ReadPrivacyPolicy {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_ADDRESS, PARAM_LOCATION])?;
        let address = ctx.arg_str(PARAM_ADDRESS)?;
        let location = ctx.arg_str(PARAM_LOCATION)?.to_string();

        let subtree = resolve_address(ctx.env.payload()?, address)?.clone();
        let policy: PrivacyPolicy = serde_json::from_value(subtree)
            .map_err(|e| PipelineError::JobFailed(format!("Not a valid privacy policy: {}", e)))?;

        debug!(job = ctx.name, location = %location, "storing privacy policy");
        ctx.env.set_model(location, serde_json::to_value(&policy)?);
        Ok(JobOutput::None)
    }
}

/// Read, parse and store a hierarchy policy.
///
/// Required parameters:
///
/// - `address` (`str`): dotted path of the policy inside the payload.
/// - `location` (`str`): environment location to store the policy under.
pub struct ReadHierarchyPolicy;

#[async_trait]
impl Job for ReadHierarchyPolicy {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_ADDRESS, PARAM_LOCATION])?;
        let address = ctx.arg_str(PARAM_ADDRESS)?;
        let location = ctx.arg_str(PARAM_LOCATION)?.to_string();

        let subtree = resolve_address(ctx.env.payload()?, address)?.clone();
        let policy: HierarchyPolicy = serde_json::from_value(subtree)
            .map_err(|e| PipelineError::JobFailed(format!("Not a valid hierarchy policy: {}", e)))?;

        debug!(job = ctx.name, location = %location, "storing hierarchy policy");
        ctx.env.set_model(location, serde_json::to_value(&policy)?);
        Ok(JobOutput::None)
    }
}
