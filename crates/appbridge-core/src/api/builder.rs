//! Builder for configuring ContentAppHost initialization.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::endpoints::{spawn_assignment_task, EndpointAssigner};
use crate::binder::{AgentConnector, SecureServiceBinder, ServiceResolver};
use crate::config::{HostSettings, PathsConfig};
use crate::discovery::{DiscoveryRegistry, PackageSource};
use crate::error::{BridgeError, Result};
use crate::ipc::TcpAgentConnector;
use crate::platform::{paths, FileServiceResolver, ManifestPackageSource, PackageDirWatcher};
use crate::router::{CommandRouter, RouteMode};
use crate::store::{EndpointStore, RecordBackend, SqliteRecordBackend};
use crate::ContentAppHost;

const SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Builder for configuring ContentAppHost initialization.
///
/// Every collaborator has a file-based default under the data directory;
/// tests and embedders can swap any of them.
///
/// # Example
///
/// ```rust,ignore
/// use appbridge_core::{ContentAppHost, RouteMode};
///
/// let host = ContentAppHost::builder("./bridge-data")
///     .auto_create_dirs(true)
///     .route_mode(RouteMode::Permissive)
///     .watch_packages(true)
///     .build()
///     .await?;
/// ```
pub struct ContentAppHostBuilder {
    data_dir: PathBuf,
    auto_create_dirs: bool,
    watch_packages: bool,
    auto_assign_endpoints: bool,
    settings: Option<HostSettings>,
    route_mode: Option<RouteMode>,
    dispatch_timeout: Option<Option<Duration>>,
    package_source: Option<Arc<dyn PackageSource>>,
    service_resolver: Option<Arc<dyn ServiceResolver>>,
    agent_connector: Option<Arc<dyn AgentConnector>>,
    record_backend: Option<Box<dyn RecordBackend>>,
}

impl ContentAppHostBuilder {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            auto_create_dirs: false,
            watch_packages: false,
            auto_assign_endpoints: true,
            settings: None,
            route_mode: None,
            dispatch_timeout: None,
            package_source: None,
            service_resolver: None,
            agent_connector: None,
            record_backend: None,
        }
    }

    /// Create the data and packages directories if they don't exist.
    ///
    /// Default: `false` (the data directory must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Watch the packages directory and feed install/uninstall signals into
    /// discovery. Only meaningful with the default package source.
    ///
    /// Default: `false`
    pub fn watch_packages(mut self, enable: bool) -> Self {
        self.watch_packages = enable;
        self
    }

    /// Give every discovered app an endpoint id as soon as it appears.
    ///
    /// Default: `true`
    pub fn auto_assign_endpoints(mut self, enable: bool) -> Self {
        self.auto_assign_endpoints = enable;
        self
    }

    /// Use these settings instead of loading `settings.json`.
    pub fn settings(mut self, settings: HostSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Override the routing mode from settings.
    pub fn route_mode(mut self, mode: RouteMode) -> Self {
        self.route_mode = Some(mode);
        self
    }

    /// Override the dispatch deadline from settings; `None` disables it.
    pub fn dispatch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    pub fn package_source(mut self, source: Arc<dyn PackageSource>) -> Self {
        self.package_source = Some(source);
        self
    }

    pub fn service_resolver(mut self, resolver: Arc<dyn ServiceResolver>) -> Self {
        self.service_resolver = Some(resolver);
        self
    }

    pub fn agent_connector(mut self, connector: Arc<dyn AgentConnector>) -> Self {
        self.agent_connector = Some(connector);
        self
    }

    pub fn record_backend(mut self, backend: Box<dyn RecordBackend>) -> Self {
        self.record_backend = Some(backend);
        self
    }

    fn create_directory_structure(data_dir: &Path) -> Result<()> {
        for dir in [data_dir.to_path_buf(), paths::packages_dir(data_dir)] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir).map_err(|e| BridgeError::Io {
                    message: format!("Failed to create directory: {}", dir.display()),
                    path: Some(dir.clone()),
                    source: Some(e),
                })?;
            }
        }
        Ok(())
    }

    /// Build the host, load persisted records and run the first discovery scan.
    pub async fn build(self) -> Result<ContentAppHost> {
        if self.auto_create_dirs {
            Self::create_directory_structure(&self.data_dir)?;
        } else if !self.data_dir.exists() {
            return Err(BridgeError::Config {
                message: format!("Data directory does not exist: {}", self.data_dir.display()),
            });
        }

        let mut settings = match self.settings {
            Some(settings) => settings,
            None => HostSettings::load(&paths::settings_file(&self.data_dir))?,
        };
        if let Some(mode) = self.route_mode {
            settings.route_mode = mode;
        }
        if let Some(timeout) = self.dispatch_timeout {
            settings.dispatch_timeout_ms = timeout
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0);
        }

        let backend = match self.record_backend {
            Some(backend) => backend,
            None => Box::new(SqliteRecordBackend::open_at(&paths::database_path(
                &self.data_dir,
            ))?),
        };
        let store = Arc::new(EndpointStore::with_first_dynamic_id(
            backend,
            settings.first_dynamic_endpoint_id,
        )?);

        let packages_dir = paths::packages_dir(&self.data_dir);
        let uses_manifest_source = self.package_source.is_none();
        let source = self
            .package_source
            .unwrap_or_else(|| Arc::new(ManifestPackageSource::new(&packages_dir)));
        let discovery = Arc::new(DiscoveryRegistry::new(source));

        let resolver = self.service_resolver.unwrap_or_else(|| {
            Arc::new(FileServiceResolver::new(paths::agents_file(&self.data_dir)))
        });
        let connector = self
            .agent_connector
            .unwrap_or_else(|| Arc::new(TcpAgentConnector));
        let binder = Arc::new(SecureServiceBinder::new(resolver, connector));

        let router = CommandRouter::new(discovery.clone(), store.clone(), binder.clone())
            .with_mode(settings.route_mode)
            .with_dispatch_timeout(settings.dispatch_timeout());

        let assigner = Arc::new(EndpointAssigner::new(discovery.clone(), store.clone()));

        // Subscribe before the first scan so its events are not missed.
        let mut tasks = Vec::new();
        if self.auto_assign_endpoints {
            tasks.push(spawn_assignment_task(&discovery, &assigner));
        }

        let watcher = if self.watch_packages {
            if !uses_manifest_source {
                tracing::warn!("Package watching requested with a custom package source");
            }
            let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
            let watcher =
                PackageDirWatcher::start(&packages_dir, PathsConfig::PACKAGE_WATCH_DEBOUNCE, tx)?;
            discovery.attach_signal_source(rx);
            Some(watcher)
        } else {
            None
        };

        let host = ContentAppHost {
            data_dir: self.data_dir,
            settings,
            discovery,
            store,
            assigner,
            binder,
            router,
            watcher,
            tasks,
        };

        host.discovery.scan()?;
        if self.auto_assign_endpoints {
            host.reconcile_endpoints();
        }

        tracing::info!(
            "Content app host ready at {} ({} apps, {} endpoint records)",
            host.data_dir.display(),
            host.discovery.len(),
            host.store.len()
        );

        Ok(host)
    }
}
