//! AppBridge Core - content-app endpoint registry and command router.
//!
//! Content apps are installed packages that implement device-control
//! clusters. This crate discovers them, gives each a stable endpoint id,
//! routes protocol-stack requests to the app behind an endpoint, and binds
//! to the trusted agent process through which those requests are delivered.
//! It has no HTTP/RPC layer of its own; see the `appbridge-rpc` daemon.
//!
//! # Example
//!
//! ```rust,ignore
//! use appbridge_core::ContentAppHost;
//!
//! #[tokio::main]
//! async fn main() -> appbridge_core::Result<()> {
//!     let host = ContentAppHost::open("/var/lib/appbridge").await?;
//!
//!     for app in host.apps() {
//!         println!("{} -> endpoint {}", app.name, app.endpoint_id);
//!     }
//!
//!     host.bind_agent();
//!     let response = host.read_attribute(5.into(), 1289, 0).await?;
//!     println!("{}", response);
//!
//!     Ok(())
//! }
//! ```

pub mod binder;
pub mod cancel;
pub mod capability;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ipc;
pub mod models;
pub mod platform;
pub mod router;
pub mod store;

mod api;

pub use binder::{BindState, SecureServiceBinder, ServiceCandidate};
pub use cancel::{InterruptToken, InterruptedError};
pub use capability::{parse_descriptor, CapabilityDescriptor, ClusterDescriptor};
pub use config::HostSettings;
pub use discovery::{DiscoveryEvent, DiscoveryRegistry, PackageSignal};
pub use error::{BridgeError, Result};
pub use models::{ContentApp, EndpointId, EndpointRecord, PackageInfo};
pub use router::{CommandRouter, RouteMode, RouteRequest};
pub use store::EndpointStore;

pub use api::ContentAppHostBuilder;

use platform::PackageDirWatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Explicitly owned bridge instance.
///
/// Holds one registry, store, router and binder. Several hosts can coexist
/// in a process (each with its own data directory); nothing is global.
pub struct ContentAppHost {
    data_dir: PathBuf,
    settings: HostSettings,
    discovery: Arc<DiscoveryRegistry>,
    store: Arc<EndpointStore>,
    assigner: Arc<api::EndpointAssigner>,
    binder: Arc<SecureServiceBinder>,
    router: CommandRouter,
    watcher: Option<PackageDirWatcher>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ContentAppHost {
    /// Create a builder for a host rooted at `data_dir`.
    pub fn builder(data_dir: impl Into<PathBuf>) -> ContentAppHostBuilder {
        ContentAppHostBuilder::new(data_dir)
    }

    /// Open a host with default collaborators, creating directories as needed.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(data_dir).auto_create_dirs(true).build().await
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn discovery(&self) -> &Arc<DiscoveryRegistry> {
        &self.discovery
    }

    pub fn store(&self) -> &Arc<EndpointStore> {
        &self.store
    }

    pub fn binder(&self) -> &Arc<SecureServiceBinder> {
        &self.binder
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Whether the packages directory is being watched for changes.
    pub fn is_watching_packages(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop background work and drop the agent connection.
    pub async fn shutdown(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.binder.unbind();
    }
}

impl Drop for ContentAppHost {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
