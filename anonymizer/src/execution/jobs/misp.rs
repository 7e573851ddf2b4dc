// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # MISP Jobs
//!
//! Jobs working with the foreign threat-event payload: replying with it,
//! writing anonymized values back into it, unwrapping the anonymization
//! envelope, and uploading the event to a MISP instance.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use anonymizer_domain::services::Transformer;
use anonymizer_domain::PipelineError;

use crate::execution::environment::{EnvKind, EnvValue, HttpReply};
use crate::execution::job::{Job, JobContext, JobOutput};
use crate::infrastructure::clients::misp::MispClient;
use crate::models::misp::{Event, EventAnon};
use crate::transformers::misp::MispTransformer;

const PARAM_OBJECT_LOCATION: &str = "object_location";
const PARAM_EVENT_LOCATION: &str = "event_location";
const PARAM_PUBLISH: &str = "publish";
const PARAM_EVENT_ANON: &str = "event_anon";
const PARAM_SOURCE: &str = "source";
const PARAM_DESTINATION: &str = "destination";
const PARAM_MISP_URL: &str = "misp_url";
const PARAM_MISP_KEY: &str = "misp_key";
const PARAM_MISP_SSL: &str = "misp_ssl";

/// Set the HTTP response to a MISP model stored on the environment.
///
/// Required parameters:
///
/// - `object_location` (`str`): the location of the model to reply with.
pub struct MispPong;

#[async_trait]
impl Job for MispPong {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_OBJECT_LOCATION])?;
        let location = ctx.arg_str(PARAM_OBJECT_LOCATION)?;
        let body = match ctx.env.get_expected(location, EnvKind::Model)? {
            EnvValue::Model(value) => value.clone(),
            _ => unreachable!(),
        };
        ctx.env.set_response(HttpReply::json(body));
        Ok(JobOutput::None)
    }
}

/// Update a pre-existing anonymization envelope with the request values.
///
/// Uses the MISP transformer's update direction to write the anonymized
/// attribute values back into the foreign event by their generated
/// component names.
///
/// Required parameters:
///
/// - `event_location` (`str`): environment location holding an
///   `EventAnon` model.
pub struct UpdateEvent;

#[async_trait]
impl Job for UpdateEvent {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_EVENT_LOCATION])?;
        let location = ctx.arg_str(PARAM_EVENT_LOCATION)?.to_string();
        // Validate the stored model before handing it to the transformer.
        let _typed: EventAnon = ctx.model_from_env(&location)?;
        let mut envelope = match ctx.env.get_expected(&location, EnvKind::Model)? {
            EnvValue::Model(value) => value.clone(),
            _ => unreachable!(),
        };

        let data = ctx.data()?.clone();
        info!(job = ctx.name, "updating event");
        debug!(job = ctx.name, data = %serde_json::to_string(&data).unwrap_or_default());
        let updated = MispTransformer::new()
            .update(&mut envelope, &data)
            .map_err(|e| PipelineError::JobFailed(format!("Unable to update event: {}", e)))?;
        info!(job = ctx.name, updated, "was the event updated?");
        ctx.env.set_model(location, envelope);
        Ok(JobOutput::None)
    }
}

/// Upload an event to MISP and update the request's audit record.
///
/// Required parameters:
///
/// - `event_location` (`str`): environment location of the event.
/// - `publish` (`bool`): whether to also publish the event.
///
/// Optional parameters:
///
/// - `event_anon` (`bool`): the location holds an `EventAnon` envelope
///   rather than a bare event. Defaults to false.
/// - `misp_url`, `misp_key`, `misp_ssl`: connection overrides.
pub struct PostEvent;

#[async_trait]
impl Job for PostEvent {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_EVENT_LOCATION, PARAM_PUBLISH])?;
        let location = ctx.arg_str(PARAM_EVENT_LOCATION)?;
        let publish = ctx.arg_bool(PARAM_PUBLISH);
        let event_anon = ctx.arg_bool(PARAM_EVENT_ANON);

        let settings = ctx.env.services().settings.snapshot();
        let misp_settings = settings.services.misp;
        let url = match ctx.arg(PARAM_MISP_URL).and_then(Value::as_str) {
            Some(url) => url.to_string(),
            None => misp_settings
                .as_ref()
                .map(|s| s.url.clone())
                .ok_or_else(|| PipelineError::JobFailed("MISP service not configured".into()))?,
        };
        let key = match ctx.arg(PARAM_MISP_KEY).and_then(Value::as_str) {
            Some(key) => key.to_string(),
            None => misp_settings
                .as_ref()
                .map(|s| s.key.clone())
                .ok_or_else(|| PipelineError::JobFailed("MISP service not configured".into()))?,
        };
        let ssl = match ctx.arg(PARAM_MISP_SSL) {
            Some(value) => value.as_bool().unwrap_or(true),
            None => misp_settings.as_ref().map(|s| s.ssl).unwrap_or(true),
        };
        let connection = misp_settings.map(|s| s.connection).unwrap_or_default();

        let event: Event = if event_anon {
            let envelope: EventAnon = ctx.model_from_env(location)?;
            envelope.event
        } else {
            ctx.model_from_env(location)?
        };

        let client = MispClient::new(&url, &key, ssl, connection)
            .map_err(|e| PipelineError::JobFailed(format!("Client exception raised: {}", e)))?;
        info!(job = ctx.name, url = %client.url(), "uploading to MISP");
        let success = client
            .post_event(&event, publish)
            .await
            .map_err(|e| PipelineError::JobFailed(format!("Client exception raised: {}", e)))?;
        if !success {
            return Err(PipelineError::JobFailed("Unable to upload MISP event".into()));
        }
        info!(job = ctx.name, url = %client.url(), "uploaded event to MISP");

        let audit_store = ctx.env.services().audit_store.clone();
        audit_store
            .update(
                ctx.env.audit_timestamp(),
                Box::new(move |mut audit| {
                    if let Some(map) = audit.as_object_mut() {
                        map.insert("uploaded".into(), Value::Bool(true));
                        map.insert("published".into(), Value::Bool(publish));
                    }
                    audit
                }),
            )
            .await
            .map_err(|e| PipelineError::JobFailed(format!("Audit update failed: {}", e)))?;
        Ok(JobOutput::None)
    }
}

/// Extract the MISP event out of an anonymization envelope.
///
/// Required parameters:
///
/// - `source` (`str`): environment location holding an `EventAnon` model.
/// - `destination` (`str`): location to store the bare event under;
///   overwritten if occupied.
pub struct ExtractEventFromEventAnon;

#[async_trait]
impl Job for ExtractEventFromEventAnon {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_SOURCE, PARAM_DESTINATION])?;
        let source = ctx.arg_str(PARAM_SOURCE)?;
        let destination = ctx.arg_str(PARAM_DESTINATION)?.to_string();

        let envelope: EventAnon = ctx.model_from_env(source)?;
        debug!(job = ctx.name, "obtained event from envelope");
        info!(job = ctx.name, location = %destination, "storing MISP event");
        if ctx.env.contains(&destination) {
            warn!(job = ctx.name, location = %destination, "overriding existing object");
        }
        ctx.env.set_model(destination, serde_json::to_value(&envelope.event)?);
        Ok(JobOutput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_env;
    use serde_json::json;

    fn envelope_json() -> Value {
        json!({
            "Event": {
                "uuid": "5e7f3a7e-7c4d-47c5-8cc5-8cbfae122c5c",
                "threat_level_id": "2",
                "Attribute": [{"object_relation": "ip-src", "value": "10.0.0.1"}],
                "Object": [], "Tag": []
            },
            "Privacy-policy": {
                "creator": "c", "organization": "o", "version": "1",
                "attributes": [], "templates": []
            },
            "Hierarchy-policy": {
                "creator": "c", "organization": "o", "version": "1",
                "hierarchy_objects": [], "hierarchy_attributes": []
            }
        })
    }

    #[tokio::test]
    async fn extract_event_moves_the_inner_event() {
        let mut env = test_env();
        env.set_model("envelope", envelope_json());
        let args = json!({"source": "envelope", "destination": "event"})
            .as_object()
            .cloned()
            .unwrap();
        let mut ctx = JobContext {
            name: "extract",
            env: &mut env,
            args: &args,
        };
        ExtractEventFromEventAnon.execute(&mut ctx).await.unwrap();

        let event: Event = env.model("event").unwrap();
        assert_eq!(event.threat_level_as_int(), 2);
        assert_eq!(event.attributes[0].value_string(), "10.0.0.1");
    }

    #[tokio::test]
    async fn misp_pong_replies_with_the_stored_model() {
        let mut env = test_env();
        env.set_model("envelope", envelope_json());
        let args = json!({"object_location": "envelope"})
            .as_object()
            .cloned()
            .unwrap();
        let mut ctx = JobContext {
            name: "pong",
            env: &mut env,
            args: &args,
        };
        MispPong.execute(&mut ctx).await.unwrap();
        let reply = env.response().unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body.as_ref().unwrap()["Event"]["threat_level_id"], "2");
    }
}
