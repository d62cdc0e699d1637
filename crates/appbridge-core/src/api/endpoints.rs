//! Discovery and endpoint assignment methods for ContentAppHost.

use crate::discovery::{DiscoveryEvent, DiscoveryRegistry, PackageSignal};
use crate::error::{BridgeError, Result};
use crate::models::{ContentApp, EndpointId, EndpointRecord};
use crate::store::EndpointStore;
use crate::ContentAppHost;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

impl ContentAppHost {
    /// Snapshot of the live content apps.
    pub fn apps(&self) -> Vec<ContentApp> {
        let mut apps = self.discovery.apps();
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        apps
    }

    /// Every persisted endpoint record, keyed by app name.
    pub fn list_endpoints(&self) -> HashMap<String, EndpointRecord> {
        self.store.get_all_persisted()
    }

    /// Re-scan installed packages and assign ids to any new apps.
    pub fn rescan(&self) -> Result<usize> {
        let count = self.discovery.scan()?;
        self.reconcile_endpoints();
        Ok(count)
    }

    /// Attach an external install/uninstall signal stream.
    ///
    /// Fails (returns `false`) if a stream is already attached, including the
    /// packages-directory watcher.
    pub fn attach_signal_source(&self, signals: mpsc::Receiver<PackageSignal>) -> bool {
        self.discovery.attach_signal_source(signals)
    }

    /// Make sure a live app holds an endpoint id and return it.
    ///
    /// Reuses the persisted id if there is one, otherwise the store assigns
    /// the lowest free id. The id is stamped on the live instance.
    pub fn ensure_endpoint(&self, name: &str) -> Result<EndpointId> {
        self.assigner.ensure(name)
    }

    /// Forget an app's endpoint record, freeing its id.
    ///
    /// A live app loses its id too; call [`ensure_endpoint`](Self::ensure_endpoint)
    /// to give it a fresh one.
    pub fn reset_endpoint(&self, name: &str) -> Result<bool> {
        self.assigner.reset(name)
    }

    pub(crate) fn reconcile_endpoints(&self) {
        self.assigner.reconcile();
    }
}

/// Keeps live endpoint ids and stored records in step.
///
/// Every assignment and reset runs under one guard, so a freed id cannot be
/// handed to another app while the previous holder still carries it live.
pub(crate) struct EndpointAssigner {
    discovery: Arc<DiscoveryRegistry>,
    store: Arc<EndpointStore>,
    guard: Mutex<()>,
}

impl EndpointAssigner {
    pub(crate) fn new(discovery: Arc<DiscoveryRegistry>, store: Arc<EndpointStore>) -> Self {
        Self {
            discovery,
            store,
            guard: Mutex::new(()),
        }
    }

    pub(crate) fn ensure(&self, name: &str) -> Result<EndpointId> {
        let _guard = self.guard.lock().map_err(|_| lock_poisoned())?;
        let app = self
            .discovery
            .get(name)
            .ok_or_else(|| BridgeError::AppNotFound {
                name: name.to_string(),
            })?;
        let endpoint_id = self.store.assign_endpoint_id(&app)?;
        if app.endpoint_id != endpoint_id {
            self.discovery.set_endpoint(name, endpoint_id)?;
        }
        Ok(endpoint_id)
    }

    pub(crate) fn reset(&self, name: &str) -> Result<bool> {
        let _guard = self.guard.lock().map_err(|_| lock_poisoned())?;
        // Live id goes first: the stored record is what reserves the id.
        match self.discovery.set_endpoint(name, EndpointId::INVALID) {
            Ok(()) | Err(BridgeError::AppNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        self.store.reset(name)
    }

    pub(crate) fn reconcile(&self) {
        for app in self.discovery.apps() {
            if let Err(e) = self.ensure(&app.name) {
                warn!("Could not assign endpoint to {}: {}", app.name, e);
            }
        }
    }
}

fn lock_poisoned() -> BridgeError {
    BridgeError::Other("Endpoint assignment lock poisoned".to_string())
}

/// Assign endpoints to apps as discovery reports them.
///
/// The task holds only a weak reference and ends when the host goes away.
pub(crate) fn spawn_assignment_task(
    discovery: &DiscoveryRegistry,
    assigner: &Arc<EndpointAssigner>,
) -> tokio::task::JoinHandle<()> {
    let mut events = discovery.subscribe();
    let assigner = Arc::downgrade(assigner);

    tokio::spawn(async move {
        loop {
            let event = events.recv().await;
            let Some(assigner) = assigner.upgrade() else {
                break;
            };
            match event {
                Ok(DiscoveryEvent::AppAdded { package, .. }) => match assigner.ensure(&package) {
                    Ok(id) => debug!("{} holds endpoint {}", package, id),
                    // Removed again before we got to it.
                    Err(BridgeError::AppNotFound { .. }) => {}
                    Err(e) => warn!("Could not assign endpoint to {}: {}", package, e),
                },
                Ok(DiscoveryEvent::AppRemoved { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Endpoint assignment missed {} discovery events, reconciling", missed);
                    assigner.reconcile();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Endpoint assignment task stopped");
    })
}
