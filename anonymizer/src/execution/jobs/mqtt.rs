// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! MQTT publication sink.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use anonymizer_domain::PipelineError;

use crate::execution::environment::EnvValue;
use crate::execution::job::{Job, JobContext, JobOutput};
use crate::infrastructure::clients::mqtt::MqttClient;

const PARAM_LOCATION: &str = "location";
const PARAM_TOPIC: &str = "topic";
const PARAM_HOST: &str = "mqtt_host";
const PARAM_PORT: &str = "mqtt_port";
const PARAM_USERNAME: &str = "mqtt_username";
const PARAM_PASSWORD: &str = "mqtt_password";
const PARAM_SSL: &str = "mqtt_ssl";

/// Publish a JSON payload stored on the environment to a broker topic.
///
/// Required parameters:
///
/// - `location` (`str`): environment location of the payload.
///
/// Optional parameters:
///
/// - `topic`, `mqtt_host`, `mqtt_port`, `mqtt_username`, `mqtt_password`,
///   `mqtt_ssl`: connection overrides. A password override of the literal
///   string `"None"` clears a configured default password.
pub struct Publish;

#[async_trait]
impl Job for Publish {
    async fn execute(&self, ctx: &mut JobContext<'_>) -> Result<JobOutput, PipelineError> {
        ctx.verify_parameters(&[PARAM_LOCATION])?;
        let location = ctx.arg_str(PARAM_LOCATION)?;

        let settings = ctx.env.services().settings.snapshot();
        let mqtt_settings = settings
            .services
            .mqtt
            .ok_or_else(|| PipelineError::JobFailed("MQTT service not configured".into()))?;

        let topic = ctx
            .arg(PARAM_TOPIC)
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| mqtt_settings.topic.clone());
        let host = ctx
            .arg(PARAM_HOST)
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| mqtt_settings.host.clone());
        let port = ctx
            .arg(PARAM_PORT)
            .and_then(Value::as_u64)
            .map(|p| p as u16)
            .unwrap_or(mqtt_settings.port);
        let username = ctx
            .arg(PARAM_USERNAME)
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| mqtt_settings.username.clone());
        let mut password = ctx
            .arg(PARAM_PASSWORD)
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| mqtt_settings.password.clone());
        if password.as_deref() == Some("None") {
            password = None;
        }
        let ssl = match ctx.arg(PARAM_SSL) {
            Some(value) => value.as_bool().unwrap_or(true),
            None => mqtt_settings.ssl,
        };

        info!(job = ctx.name, location, "retrieving MQTT payload");
        let payload = match ctx.env.get(location) {
            Some(EnvValue::Json(value)) | Some(EnvValue::Model(value)) | Some(EnvValue::Payload(value)) => {
                value.clone()
            }
            Some(EnvValue::Data(request)) => serde_json::to_value(request)?,
            Some(EnvValue::Response(_)) => {
                return Err(PipelineError::JobFailed("Unserializable MQTT payload".into()))
            }
            None => return Err(PipelineError::EnvAttributeNotFound(location.to_string())),
        };

        info!(job = ctx.name, topic = %topic, "publishing MQTT message");
        let client = MqttClient::new(
            &host,
            port,
            username.as_deref(),
            password.as_deref(),
            ssl,
            mqtt_settings.client_id.as_deref(),
            mqtt_settings.connection,
        );
        client
            .publish(&topic, &payload)
            .await
            .map_err(|e| PipelineError::JobFailed(format!("Client exception raised: {}", e)))?;
        Ok(JobOutput::None)
    }
}
