//! Package source backed by manifest files in a directory.
//!
//! Layout:
//!
//! ```text
//! packages/
//!   vid-lib.json          manifest, file stem == package id
//!   caps/vid-lib.json     capability resource referenced as "caps/vid-lib.json"
//! ```
//!
//! Only top-level `*.json` files are manifests. Resources are resolved
//! relative to the packages directory and must stay inside it.

use crate::discovery::PackageSource;
use crate::error::{BridgeError, Result};
use crate::models::PackageInfo;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub(crate) const MANIFEST_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct ManifestPackageSource {
    packages_dir: PathBuf,
}

impl ManifestPackageSource {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
        }
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    pub fn manifest_path(&self, package: &str) -> PathBuf {
        self.packages_dir
            .join(format!("{}.{}", package, MANIFEST_EXTENSION))
    }
}

impl PackageSource for ManifestPackageSource {
    fn package_info(&self, package: &str) -> Result<PackageInfo> {
        let lookup_failed = |message: String| BridgeError::PackageLookupFailed {
            package: package.to_string(),
            message,
        };

        let path = self.manifest_path(package);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| lookup_failed(format!("{}: {}", path.display(), e)))?;
        let info: PackageInfo = serde_json::from_str(&content)
            .map_err(|e| lookup_failed(format!("invalid manifest: {}", e)))?;

        if info.package != package {
            return Err(lookup_failed(format!(
                "manifest declares package {}",
                info.package
            )));
        }
        Ok(info)
    }

    fn read_resource(&self, package: &str, resource: &str) -> Result<String> {
        let relative = Path::new(resource);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(BridgeError::PackageLookupFailed {
                package: package.to_string(),
                message: format!("resource path {} leaves the packages directory", resource),
            });
        }

        let path = self.packages_dir.join(relative);
        std::fs::read_to_string(&path).map_err(|e| BridgeError::PackageLookupFailed {
            package: package.to_string(),
            message: format!("cannot read {}: {}", path.display(), e),
        })
    }

    fn installed_packages(&self) -> Result<Vec<String>> {
        if !self.packages_dir.exists() {
            debug!("Packages directory {:?} does not exist", self.packages_dir);
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.packages_dir)
            .map_err(|e| BridgeError::io_with_path(e, &self.packages_dir))?;

        let mut packages = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| BridgeError::io_with_path(e, &self.packages_dir))?
                .path();
            if let Some(package) = manifest_package(&path) {
                packages.push(package);
            }
        }
        packages.sort();
        Ok(packages)
    }
}

/// Package id for a top-level manifest path.
pub(crate) fn manifest_package(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION) {
        return None;
    }
    if path.is_dir() {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}
