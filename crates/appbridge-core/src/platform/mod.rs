//! Host-side collaborators for the package manager and agent lookup.
//!
//! - `manifest` - package metadata and capability resources read from disk
//! - `watcher` - install/uninstall signals from the packages directory
//! - `agents` - agent service candidates from `agents.json`
//! - `memory` - in-process package source
//! - `paths` - data directory layout

pub mod agents;
pub mod manifest;
pub mod memory;
pub mod paths;
pub mod watcher;

pub use agents::FileServiceResolver;
pub use manifest::ManifestPackageSource;
pub use memory::InMemoryPackageSource;
pub use paths::default_data_dir;
pub use watcher::PackageDirWatcher;
