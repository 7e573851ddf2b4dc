// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration
//!
//! The settings tree, layered from a TOML file plus `ANONYMIZER_*`
//! environment overrides, and held behind a shared handle so the debug API
//! can apply runtime overrides.
//!
//! Runtime overrides are *flat, dotted-key maps* - e.g.
//! `{"services.arxlet.url": "http://arxlet:8080/"}` - applied onto the
//! serialized tree and re-validated as a whole, so an override can never
//! leave the settings in a shape the type system would not accept.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use anonymizer_domain::PipelineError;

/// Connection behavior of one external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Seconds to wait after each failed attempt.
    pub timeout: u64,
    /// Maximum number of attempts.
    pub attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            timeout: 5,
            attempts: 5,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Pipeline description location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Path of the declarative pipeline description (JSON or YAML).
    /// Absent installs the default echo pipeline.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Which authentication provider protects the anonymizer endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthProviderKind {
    #[default]
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "KEYCLOAK")]
    Keycloak,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub provider: AuthProviderKind,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

/// Which context-store backend persists requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextProviderKind {
    #[default]
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "SQLITE")]
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default)]
    pub provider: ContextProviderKind,
    /// SQLite database path; required when the provider is `SQLITE`.
    #[serde(default)]
    pub sqlite: Option<SqliteSettings>,
}

impl ContextSettings {
    /// Ensures provider-specific configuration is present.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.provider == ContextProviderKind::Sqlite && self.sqlite.is_none() {
            return Err(PipelineError::InvalidConfiguration(
                "Configuration for provider \"SQLITE\" missing".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteSettings {
    pub path: String,
}

/// Audit-store settings; absent disables audit persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSettings {
    #[serde(default)]
    pub sqlite: Option<SqliteSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxletSettings {
    pub url: String,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaskDpSettings {
    pub url: String,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MispSettings {
    pub url: String,
    pub key: String,
    #[serde(default = "default_true")]
    pub ssl: bool,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttSettings {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub ssl: bool,
    pub topic: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub connection: ConnectionSettings,
}

fn default_true() -> bool {
    true
}

fn default_mqtt_port() -> u16 {
    1883
}

/// The external privacy-enhancing and publication services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default)]
    pub arxlet: Option<ArxletSettings>,
    #[serde(default)]
    pub flaskdp: Option<FlaskDpSettings>,
    #[serde(default)]
    pub misp: Option<MispSettings>,
    #[serde(default)]
    pub mqtt: Option<MqttSettings>,
}

/// On-disk resources the local jobs read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSettings {
    #[serde(default = "default_pgp_key_directory")]
    pub pgp_key_directory: PathBuf,
}

fn default_pgp_key_directory() -> PathBuf {
    PathBuf::from("resources/pgp")
}

impl Default for ResourceSettings {
    fn default() -> Self {
        ResourceSettings {
            pgp_key_directory: default_pgp_key_directory(),
        }
    }
}

/// The complete settings tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub audit: AuditSettings,
    #[serde(default)]
    pub services: ServiceSettings,
    #[serde(default)]
    pub resources: ResourceSettings,
}

impl Settings {
    /// Loads settings from an optional TOML file layered with
    /// `ANONYMIZER_*` environment overrides (`__` as the nesting
    /// separator).
    pub fn load(path: Option<&Path>) -> Result<Settings, PipelineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ANONYMIZER")
                .separator("__")
                .try_parsing(true),
        );
        let settings: Settings = builder
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("Unable to load configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| PipelineError::InvalidConfiguration(format!("Invalid configuration: {}", e)))?;
        settings.context.validate()?;
        Ok(settings)
    }

    pub fn into_shared(self) -> SharedSettings {
        SharedSettings {
            inner: Arc::new(RwLock::new(self)),
        }
    }
}

/// Shared, runtime-overridable settings handle.
#[derive(Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    /// A point-in-time copy of the settings.
    pub fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }

    /// The settings as JSON, for the debug API.
    pub fn as_json(&self) -> Result<Value, PipelineError> {
        Ok(serde_json::to_value(&*self.inner.read())?)
    }

    /// Applies flat dotted-key overrides and re-validates the whole tree.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` when a key path crosses a non-object or
    /// the resulting tree no longer deserializes into valid settings; the
    /// previous settings stay in effect.
    pub fn apply_overrides(&self, overrides: &Map<String, Value>) -> Result<(), PipelineError> {
        info!(count = overrides.len(), "updating configuration");
        let mut tree = serde_json::to_value(&*self.inner.read())?;
        for (dotted, value) in overrides {
            debug!(field = %dotted, "evaluating configuration override");
            let segments: Vec<&str> = dotted.split('.').collect();
            let (last, parents) = segments
                .split_last()
                .expect("dotted key always has at least one segment");
            let cursor = Self::descend_override(&mut tree, parents, dotted)?;
            let object = cursor.as_object_mut().ok_or_else(|| {
                PipelineError::ValidationError(format!(
                    "Category override for \"{}\" crosses a non-object",
                    dotted
                ))
            })?;
            object.insert((*last).to_string(), value.clone());
        }
        let updated: Settings = serde_json::from_value(tree)
            .map_err(|e| PipelineError::ValidationError(format!("Override produced invalid settings: {}", e)))?;
        updated.context.validate().map_err(|e| PipelineError::ValidationError(e.to_string()))?;
        *self.inner.write() = updated;
        Ok(())
    }

    /// Walks `cursor` through `segments`, creating nested objects as needed,
    /// and returns a mutable reference to the node the last segment lands on.
    fn descend_override<'a>(
        cursor: &'a mut Value,
        segments: &[&str],
        dotted: &str,
    ) -> Result<&'a mut Value, PipelineError> {
        match segments.split_first() {
            None => Ok(cursor),
            Some((segment, rest)) => {
                let object = cursor.as_object_mut().ok_or_else(|| {
                    PipelineError::ValidationError(format!(
                        "Category override for \"{}\" crosses a non-object",
                        dotted
                    ))
                })?;
                let next = object
                    .entry((*segment).to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                Self::descend_override(next, rest, dotted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.auth.provider, AuthProviderKind::None);
        assert!(settings.pipeline.file.is_none());
        assert_eq!(settings.resources.pgp_key_directory, PathBuf::from("resources/pgp"));
    }

    #[test]
    fn dotted_overrides_reach_nested_fields() {
        let shared = Settings::default().into_shared();
        let mut overrides = Map::new();
        overrides.insert("pipeline.file".into(), Value::String("/tmp/p.json".into()));
        overrides.insert(
            "services.arxlet".into(),
            serde_json::json!({"url": "http://arxlet:8080/"}),
        );
        shared.apply_overrides(&overrides).unwrap();

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.pipeline.file, Some(PathBuf::from("/tmp/p.json")));
        assert_eq!(snapshot.services.arxlet.unwrap().url, "http://arxlet:8080/");
    }

    #[test]
    fn invalid_overrides_leave_settings_untouched() {
        let shared = Settings::default().into_shared();
        let mut overrides = Map::new();
        overrides.insert("server.port".into(), Value::String("not-a-port".into()));
        assert!(shared.apply_overrides(&overrides).is_err());
        assert_eq!(shared.snapshot().server.port, 8080);
    }

    #[test]
    fn sqlite_provider_requires_its_section() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "context": {"provider": "SQLITE"}
        }))
        .unwrap();
        assert!(settings.context.validate().is_err());
    }
}
