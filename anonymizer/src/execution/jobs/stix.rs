// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! STIX conversion jobs: translate a MISP event into a STIX document and
//! reply with previously-converted documents.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use anonymizer_domain::PipelineError;

use crate::execution::environment::{EnvKind, EnvValue, HttpReply};
use crate::execution::job::{Job, JobContext, JobOutput};
use crate::infrastructure::stix::convert_event;
use crate::models::misp::Event;

const PARAM_OBJECT_LOCATION: &str = "object_location";
const PARAM_EVENT_LOCATION: &str = "event_location";
const PARAM_DESTINATION: &str = "destination";
const PARAM_STIX_VERSION: &str = "stix_version";

/// Set the HTTP response to a STIX document stored on the environment.
///
/// Required parameters:
///
/// - `object_location` (`str`): the location of the document.
pub struct StixPong;

#[async_trait]
impl Job for StixPong {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_OBJECT_LOCATION])?;
        let location = ctx.arg_str(PARAM_OBJECT_LOCATION)?;
        let document = match ctx.env.get_expected(location, EnvKind::Json)? {
            EnvValue::Json(value) => value.clone(),
            _ => unreachable!(),
        };
        if !document.is_object() {
            return Err(PipelineError::JobFailed("Unserializable STIX object".into()));
        }
        ctx.env.set_response(HttpReply::json(document));
        Ok(JobOutput::None)
    }
}

/// Transform an existing MISP event into a STIX document.
///
/// Required parameters:
///
/// - `event_location` (`str`): environment location of the MISP event.
/// - `destination` (`str`): location to store the document under;
///   overwritten if occupied.
///
/// Optional parameters:
///
/// - `stix_version` (`str`): `"1.1.1"`, `"1.2"`, `"2.0"` or `"2.1"`.
///   Defaults to `"2.1"`.
pub struct TransformMispEvent;

#[async_trait]
impl Job for TransformMispEvent {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_EVENT_LOCATION, PARAM_DESTINATION])?;
        let location = ctx.arg_str(PARAM_EVENT_LOCATION)?;
        let destination = ctx.arg_str(PARAM_DESTINATION)?.to_string();
        let version = ctx
            .arg(PARAM_STIX_VERSION)
            .and_then(Value::as_str)
            .unwrap_or("2.1")
            .to_string();

        info!(job = ctx.name, "retrieving MISP event");
        let event: Event = ctx.model_from_env(location)?;
        info!(job = ctx.name, version = %version, "parsing MISP event");
        debug!(job = ctx.name, event = %serde_json::to_string(&event).unwrap_or_default());

        let document = convert_event(&event, &version)?;

        info!(job = ctx.name, location = %destination, "storing STIX object");
        if ctx.env.contains(&destination) {
            warn!(job = ctx.name, location = %destination, "overriding existing object");
        }
        ctx.env.set(destination, EnvValue::Json(document));
        Ok(JobOutput::None)
    }
}
