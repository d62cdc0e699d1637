//! In-process package source.

use crate::discovery::PackageSource;
use crate::error::{BridgeError, Result};
use crate::models::PackageInfo;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct InstalledPackage {
    info: PackageInfo,
    resources: HashMap<String, String>,
}

/// Package source held entirely in memory.
///
/// Useful for embedding hosts that learn about packages from elsewhere, and
/// for tests.
#[derive(Debug, Default)]
pub struct InMemoryPackageSource {
    packages: Mutex<HashMap<String, InstalledPackage>>,
}

impl InMemoryPackageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace a package, optionally with one named resource.
    pub fn install(&self, info: PackageInfo, resource: Option<(&str, &str)>) {
        let mut resources = HashMap::new();
        if let Some((name, content)) = resource {
            resources.insert(name.to_string(), content.to_string());
        }
        self.lock()
            .insert(info.package.clone(), InstalledPackage { info, resources });
    }

    /// Returns `true` if the package was installed.
    pub fn uninstall(&self, package: &str) -> bool {
        self.lock().remove(package).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, InstalledPackage>> {
        self.packages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PackageSource for InMemoryPackageSource {
    fn package_info(&self, package: &str) -> Result<PackageInfo> {
        self.lock()
            .get(package)
            .map(|p| p.info.clone())
            .ok_or_else(|| BridgeError::PackageLookupFailed {
                package: package.to_string(),
                message: "not installed".to_string(),
            })
    }

    fn read_resource(&self, package: &str, resource: &str) -> Result<String> {
        let packages = self.lock();
        let installed = packages
            .get(package)
            .ok_or_else(|| BridgeError::PackageLookupFailed {
                package: package.to_string(),
                message: "not installed".to_string(),
            })?;
        installed
            .resources
            .get(resource)
            .cloned()
            .ok_or_else(|| BridgeError::PackageLookupFailed {
                package: package.to_string(),
                message: format!("missing resource {}", resource),
            })
    }

    fn installed_packages(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
