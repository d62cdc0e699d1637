//! Package manager seam.

use crate::error::Result;
use crate::models::PackageInfo;

/// Install/uninstall signal delivered by the package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSignal {
    Added(String),
    Removed(String),
}

impl PackageSignal {
    pub fn package(&self) -> &str {
        match self {
            PackageSignal::Added(p) | PackageSignal::Removed(p) => p,
        }
    }
}

/// Read access to the platform package manager.
///
/// All operations are synchronous; they are expected to hit local metadata
/// only and complete quickly.
pub trait PackageSource: Send + Sync {
    /// Resolve metadata for an installed package.
    ///
    /// Fails with `PackageLookupFailed` when the package cannot be resolved.
    fn package_info(&self, package: &str) -> Result<PackageInfo>;

    /// Read a named resource attached to a package.
    fn read_resource(&self, package: &str, resource: &str) -> Result<String>;

    /// List the identifiers of all installed packages.
    fn installed_packages(&self) -> Result<Vec<String>>;
}
