// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! MQTT broker client: connect, publish one JSON payload, disconnect.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use anonymizer_domain::PipelineError;

use crate::infrastructure::config::ConnectionSettings;

/// Client for one broker connection.
pub struct MqttClient {
    options: MqttOptions,
    timeout: Duration,
}

impl MqttClient {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        ssl: bool,
        client_id: Option<&str>,
        connection: ConnectionSettings,
    ) -> Self {
        let client_id = client_id
            .map(String::from)
            .unwrap_or_else(|| format!("anonymizer-{}", Uuid::new_v4()));
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(5));
        if let Some(username) = username {
            options.set_credentials(username, password.unwrap_or_default());
        }
        if ssl {
            options.set_transport(Transport::tls_with_default_config());
        }
        MqttClient {
            options,
            timeout: Duration::from_secs(connection.timeout.max(1) * u64::from(connection.attempts.max(1))),
        }
    }

    /// Publishes the payload to `topic` at QoS 1 and waits for the broker
    /// acknowledgment.
    pub async fn publish(&self, topic: &str, payload: &Value) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec(payload)?;
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), 10);
        client
            .publish(topic, QoS::AtLeastOnce, false, bytes)
            .await
            .map_err(|e| PipelineError::ClientError(format!("MQTT publish failed: {}", e)))?;

        let acked = tokio::time::timeout(self.timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                    Ok(event) => debug!(?event, "mqtt event"),
                    Err(e) => return Err(PipelineError::ClientError(format!("MQTT connection failed: {}", e))),
                }
            }
        })
        .await
        .map_err(|_| PipelineError::ClientError("MQTT acknowledgment timed out".into()))?;
        acked?;

        client.disconnect().await.ok();
        Ok(())
    }
}
