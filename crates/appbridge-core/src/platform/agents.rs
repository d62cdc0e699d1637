//! Agent service candidates listed in a JSON file.

use crate::binder::{ServiceCandidate, ServiceResolver};
use crate::config::BinderConfig;
use crate::error::{BridgeError, Result};
use std::path::PathBuf;
use tracing::debug;

/// Reads `agents.json` on every query so edits take effect on the next bind.
///
/// The file holds an array of [`ServiceCandidate`]; every entry answers the
/// bind action. A missing file means no candidates.
#[derive(Debug, Clone)]
pub struct FileServiceResolver {
    path: PathBuf,
}

impl FileServiceResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ServiceResolver for FileServiceResolver {
    fn query_candidates(&self, action: &str) -> Result<Vec<ServiceCandidate>> {
        if action != BinderConfig::BIND_ACTION {
            return Ok(Vec::new());
        }
        if !self.path.exists() {
            debug!("No agent list at {:?}", self.path);
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| BridgeError::io_with_path(e, &self.path))?;
        serde_json::from_str(&content).map_err(|e| BridgeError::Config {
            message: format!("Invalid agent list {}: {}", self.path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agents.json");
        std::fs::write(
            &path,
            r#"[{"package": "com.agent", "service_name": "Agent", "system_image": true,
                 "address": "127.0.0.1:7400"}]"#,
        )
        .unwrap();

        let candidates = FileServiceResolver::new(&path)
            .query_candidates(BinderConfig::BIND_ACTION)
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address.unwrap().port(), 7400);
    }

    #[test]
    fn test_missing_file_and_other_actions_yield_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = FileServiceResolver::new(temp_dir.path().join("agents.json"));
        assert!(resolver
            .query_candidates(BinderConfig::BIND_ACTION)
            .unwrap()
            .is_empty());
        assert!(resolver.query_candidates("other.action").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agents.json");
        std::fs::write(&path, "{").unwrap();
        let err = FileServiceResolver::new(&path)
            .query_candidates(BinderConfig::BIND_ACTION)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }
}
