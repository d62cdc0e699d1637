//! Centralized configuration for the content-app bridge.
//!
//! Constants live in unit structs grouped by subsystem. Runtime-tunable values
//! are collected in [`HostSettings`], which can be loaded from a JSON file.

use crate::error::{BridgeError, Result};
use crate::router::RouteMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Durable endpoint store configuration.
pub struct StoreConfig;

impl StoreConfig {
    /// Version written into every serialized record.
    pub const RECORD_SCHEMA_VERSION: u32 = 2;
    /// Endpoints below this id belong to the platform itself.
    pub const FIRST_DYNAMIC_ENDPOINT_ID: u16 = 4;
    /// Highest assignable id; 0xFFFF is the invalid sentinel.
    pub const MAX_ENDPOINT_ID: u16 = 0xFFFE;
    pub const BUSY_TIMEOUT_MS: u32 = 5000;
    pub const DB_FILE_NAME: &'static str = "endpoints.db";
}

/// Command routing configuration.
pub struct RouterConfig;

impl RouterConfig {
    pub const FAILURE_KEY: &'static str = "failure";
    pub const STATUS_KEY: &'static str = "status";
    /// Interaction-model status code for an endpoint that exists but cannot serve.
    pub const FAILED_UNSUPPORTED_ENDPOINT: u8 = 0x7F;
    pub const PERMISSIVE_COMMAND_RESPONSE: &'static str = "Success";
    pub const PERMISSIVE_ATTRIBUTE_RESPONSE: &'static str = "";
    pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Agent binding configuration.
pub struct BinderConfig;

impl BinderConfig {
    pub const BIND_ACTION: &'static str = "appbridge.action.BIND_AGENT";
    pub const BIND_PERMISSION: &'static str = "appbridge.permission.BIND_AGENT";
    pub const PERMISSION_HELD_BY_SERVICE: &'static str = "appbridge.permission.AGENT_SERVICE";
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Local IPC transport configuration.
pub struct IpcConfig;

impl IpcConfig {
    pub const MAX_IPC_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
    pub const MAX_IPC_CONNECTIONS: usize = 32;
    pub const IPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const DISPATCH_METHOD: &'static str = "content_app.dispatch";
}

/// Data directory layout.
pub struct PathsConfig;

impl PathsConfig {
    /// Quiet period before a burst of manifest changes is reported.
    pub const PACKAGE_WATCH_DEBOUNCE: Duration = Duration::from_millis(250);
    pub const DATA_DIR_NAME: &'static str = "appbridge";
    pub const PACKAGES_DIR_NAME: &'static str = "packages";
    pub const AGENTS_FILE_NAME: &'static str = "agents.json";
    pub const SETTINGS_FILE_NAME: &'static str = "settings.json";
}

/// Runtime settings for a host instance.
///
/// Every field has a default so partial files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub route_mode: RouteMode,
    /// Dispatch deadline in milliseconds; 0 disables the deadline.
    pub dispatch_timeout_ms: u64,
    pub first_dynamic_endpoint_id: u16,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            route_mode: RouteMode::Strict,
            dispatch_timeout_ms: RouterConfig::DEFAULT_DISPATCH_TIMEOUT.as_millis() as u64,
            first_dynamic_endpoint_id: StoreConfig::FIRST_DYNAMIC_ENDPOINT_ID,
        }
    }
}

impl HostSettings {
    /// Load settings from a JSON file, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| BridgeError::io_with_path(e, path))?;
        let settings: HostSettings =
            serde_json::from_str(&content).map_err(|e| BridgeError::Config {
                message: format!("Invalid settings file {}: {}", path.display(), e),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn dispatch_timeout(&self) -> Option<Duration> {
        match self.dispatch_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.first_dynamic_endpoint_id > StoreConfig::MAX_ENDPOINT_ID {
            return Err(BridgeError::Validation {
                field: "first_dynamic_endpoint_id".to_string(),
                message: format!(
                    "must not exceed {}",
                    StoreConfig::MAX_ENDPOINT_ID
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_settings_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = HostSettings::load(&temp_dir.path().join("missing.json")).unwrap();
        assert_eq!(settings, HostSettings::default());
        assert_eq!(
            settings.dispatch_timeout(),
            Some(RouterConfig::DEFAULT_DISPATCH_TIMEOUT)
        );
    }

    #[test]
    fn test_partial_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"route_mode": "permissive", "dispatch_timeout_ms": 0}"#)
            .unwrap();

        let settings = HostSettings::load(&path).unwrap();
        assert_eq!(settings.route_mode, RouteMode::Permissive);
        assert_eq!(settings.dispatch_timeout(), None);
        assert_eq!(
            settings.first_dynamic_endpoint_id,
            StoreConfig::FIRST_DYNAMIC_ENDPOINT_ID
        );
    }

    #[test]
    fn test_invalid_settings_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = HostSettings::load(&path).unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }

    #[test]
    fn test_endpoint_range_is_sane() {
        assert!(StoreConfig::FIRST_DYNAMIC_ENDPOINT_ID < StoreConfig::MAX_ENDPOINT_ID);
        assert!(RouterConfig::DEFAULT_DISPATCH_TIMEOUT > Duration::ZERO);
    }
}
