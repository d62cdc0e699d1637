//! Live set of discovered content apps.

use super::source::{PackageSignal, PackageSource};
use crate::capability::{parse_descriptor, CapabilityDescriptor};
use crate::error::{BridgeError, Result};
use crate::models::{ContentApp, EndpointId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification published when the live set changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    AppAdded {
        package: String,
        descriptor: CapabilityDescriptor,
    },
    AppRemoved {
        package: String,
    },
}

impl DiscoveryEvent {
    pub fn package(&self) -> &str {
        match self {
            DiscoveryEvent::AppAdded { package, .. } | DiscoveryEvent::AppRemoved { package } => {
                package
            }
        }
    }
}

/// Registry of currently installed content apps.
///
/// Reads hand out cloned snapshots; writers take the map lock for the whole
/// update including event emission, so notifications for one app are
/// published in the order its signals were handled.
pub struct DiscoveryRegistry {
    source: Arc<dyn PackageSource>,
    apps: RwLock<HashMap<String, ContentApp>>,
    events: broadcast::Sender<DiscoveryEvent>,
    signal_attached: AtomicBool,
}

impl DiscoveryRegistry {
    pub fn new(source: Arc<dyn PackageSource>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            apps: RwLock::new(HashMap::new()),
            events,
            signal_attached: AtomicBool::new(false),
        }
    }

    /// Subscribe to add/remove notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// Attach the package manager's signal stream.
    ///
    /// Only the first call takes effect; later calls return `false` and drop
    /// their receiver. Signals are handled one at a time on a spawned task in
    /// arrival order. The task stops when the stream closes or the registry
    /// is dropped.
    pub fn attach_signal_source(
        self: &Arc<Self>,
        mut signals: mpsc::Receiver<PackageSignal>,
    ) -> bool {
        if self
            .signal_attached
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Package signal source already attached, ignoring");
            return false;
        }

        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.handle_signal(&signal);
            }
            debug!("Package signal stream closed");
        });

        true
    }

    /// Handle one install/uninstall signal.
    pub fn handle_signal(&self, signal: &PackageSignal) {
        match signal {
            PackageSignal::Added(package) => {
                self.on_package_added(package);
            }
            PackageSignal::Removed(package) => {
                self.on_package_removed(package);
            }
        }
    }

    /// React to a package install or update.
    ///
    /// Returns `true` when the package declares capabilities and is now in
    /// the live set. Lookup and parse failures are logged and skipped.
    pub fn on_package_added(&self, package: &str) -> bool {
        let app = match self.load_app(package) {
            Ok(Some(app)) => app,
            Ok(None) => {
                debug!("Package {} declares no capabilities, skipping", package);
                return false;
            }
            Err(e) => {
                warn!("Skipping package {}: {}", package, e);
                return false;
            }
        };

        let Ok(mut apps) = self.apps.write() else {
            warn!("Discovery registry lock poisoned, dropping signal for {}", package);
            return false;
        };
        self.insert_locked(&mut apps, app);
        true
    }

    /// React to a package uninstall.
    ///
    /// Returns `true` if the package was in the live set.
    pub fn on_package_removed(&self, package: &str) -> bool {
        let Ok(mut apps) = self.apps.write() else {
            warn!("Discovery registry lock poisoned, dropping signal for {}", package);
            return false;
        };
        if apps.remove(package).is_none() {
            return false;
        }
        info!("Content app removed: {}", package);
        let _ = self.events.send(DiscoveryEvent::AppRemoved {
            package: package.to_string(),
        });
        true
    }

    /// Re-populate the live set from every installed package.
    ///
    /// Apps that disappeared since the last scan are removed, new ones added.
    /// Endpoint ids already stamped on retained apps are kept. Returns the
    /// size of the live set afterwards.
    pub fn scan(&self) -> Result<usize> {
        let packages = self.source.installed_packages()?;

        let mut discovered = HashMap::new();
        for package in packages {
            match self.load_app(&package) {
                Ok(Some(app)) => {
                    discovered.insert(app.name.clone(), app);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping package {} during scan: {}", package, e),
            }
        }

        let mut apps = self.apps.write().map_err(|_| lock_poisoned())?;
        let stale: Vec<String> = apps
            .keys()
            .filter(|name| !discovered.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            apps.remove(&name);
            let _ = self
                .events
                .send(DiscoveryEvent::AppRemoved { package: name });
        }
        for (_, app) in discovered {
            self.insert_locked(&mut apps, app);
        }

        info!("Discovery scan complete: {} content apps", apps.len());
        Ok(apps.len())
    }

    /// Snapshot of all live apps.
    pub fn apps(&self) -> Vec<ContentApp> {
        self.apps
            .read()
            .map(|apps| apps.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<ContentApp> {
        self.apps
            .read()
            .ok()
            .and_then(|apps| apps.get(name).cloned())
    }

    /// Find the live app currently holding an endpoint id.
    pub fn find_by_endpoint(&self, endpoint_id: EndpointId) -> Option<ContentApp> {
        if !endpoint_id.is_valid() {
            return None;
        }
        self.apps.read().ok().and_then(|apps| {
            apps.values()
                .find(|app| app.endpoint_id == endpoint_id)
                .cloned()
        })
    }

    /// Stamp an assigned endpoint id on a live app.
    pub fn set_endpoint(&self, name: &str, endpoint_id: EndpointId) -> Result<()> {
        let mut apps = self.apps.write().map_err(|_| lock_poisoned())?;
        let app = apps.get_mut(name).ok_or_else(|| BridgeError::AppNotFound {
            name: name.to_string(),
        })?;
        app.endpoint_id = endpoint_id;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.apps.read().map(|apps| apps.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a live app for a package, or `None` if it declares no capabilities.
    fn load_app(&self, package: &str) -> Result<Option<ContentApp>> {
        let info = self.source.package_info(package)?;
        let Some(resource) = info.capability_resource.as_deref().filter(|r| !r.is_empty())
        else {
            return Ok(None);
        };
        let raw = self.source.read_resource(package, resource)?;
        let descriptor = parse_descriptor(package, &raw)?;
        Ok(Some(ContentApp::from_package(&info, descriptor)))
    }

    fn insert_locked(&self, apps: &mut HashMap<String, ContentApp>, mut app: ContentApp) {
        if let Some(previous) = apps.get(&app.name) {
            app.endpoint_id = previous.endpoint_id;
        }
        let event = DiscoveryEvent::AppAdded {
            package: app.name.clone(),
            descriptor: app.descriptor.clone(),
        };
        info!(
            "Content app added: {} ({} clusters)",
            app.name,
            app.descriptor.clusters().len()
        );
        apps.insert(app.name.clone(), app);
        let _ = self.events.send(event);
    }
}

fn lock_poisoned() -> BridgeError {
    BridgeError::Other("Discovery registry lock poisoned".to_string())
}
