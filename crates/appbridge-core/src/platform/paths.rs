//! Data directory layout.
//!
//! ```text
//! <data>/
//!   endpoints.db      durable endpoint records
//!   packages/         package manifests and resources
//!   agents.json       agent service candidates
//!   settings.json     optional host settings
//! ```

use crate::config::{PathsConfig, StoreConfig};
use crate::error::{BridgeError, Result};
use std::path::{Path, PathBuf};

/// Per-user default data directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.local/share/appbridge` (XDG_DATA_HOME)
/// - **Windows**: `%APPDATA%\appbridge`
/// - **macOS**: `~/Library/Application Support/appbridge`
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().ok_or_else(|| BridgeError::Config {
        message: "Could not determine data directory".to_string(),
    })?;
    Ok(base.join(PathsConfig::DATA_DIR_NAME))
}

pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(StoreConfig::DB_FILE_NAME)
}

pub fn packages_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(PathsConfig::PACKAGES_DIR_NAME)
}

pub fn agents_file(data_dir: &Path) -> PathBuf {
    data_dir.join(PathsConfig::AGENTS_FILE_NAME)
}

pub fn settings_file(data_dir: &Path) -> PathBuf {
    data_dir.join(PathsConfig::SETTINGS_FILE_NAME)
}
