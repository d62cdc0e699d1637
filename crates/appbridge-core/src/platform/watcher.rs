//! Install/uninstall signals from the packages directory.
//!
//! A debounced watcher on the packages directory turns manifest changes into
//! [`PackageSignal`]s: a manifest that exists after the burst is reported as
//! added (install or update), one that is gone as removed.

use super::manifest::manifest_package;
use crate::discovery::PackageSignal;
use crate::error::{BridgeError, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, Debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Watches a packages directory and forwards package signals.
pub struct PackageDirWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    stop_tx: mpsc::Sender<()>,
    packages_dir: PathBuf,
}

impl PackageDirWatcher {
    /// Start watching `packages_dir`, sending signals into `signals`.
    ///
    /// The directory must exist. The watcher stops when [`stop`](Self::stop)
    /// is called, when it is dropped, or when `signals` is closed.
    pub fn start(
        packages_dir: impl AsRef<Path>,
        debounce: Duration,
        signals: mpsc::Sender<PackageSignal>,
    ) -> Result<Self> {
        let packages_dir = packages_dir.as_ref().to_path_buf();
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let (event_tx, event_rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer(debounce, event_tx)
            .map_err(|e| BridgeError::Other(format!("Failed to create package watcher: {}", e)))?;
        debouncer
            .watcher()
            .watch(&packages_dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                BridgeError::Other(format!(
                    "Failed to watch {}: {}",
                    packages_dir.display(),
                    e
                ))
            })?;

        info!("Watching packages directory {:?}", packages_dir);

        std::thread::spawn(move || loop {
            if stop_rx.try_recv().is_ok() {
                debug!("Package watcher stopping");
                break;
            }

            match event_rx.recv_timeout(debounce) {
                Ok(Ok(events)) => {
                    for signal in signals_for(events.iter().map(|e| e.path.as_path())) {
                        debug!("Package signal: {:?}", signal);
                        if signals.blocking_send(signal).is_err() {
                            debug!("Package signal receiver closed");
                            return;
                        }
                    }
                }
                Ok(Err(e)) => warn!("Package watcher error: {:?}", e),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    debug!("Package watcher channel disconnected");
                    break;
                }
            }
        });

        Ok(Self {
            _debouncer: debouncer,
            stop_tx,
            packages_dir,
        })
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    pub async fn stop(&self) {
        let _ = self.stop_tx.send(()).await;
    }
}

/// Map one debounced batch to package signals, in event order.
fn signals_for<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Vec<PackageSignal> {
    let mut signals: Vec<PackageSignal> = Vec::new();
    for path in paths {
        let Some(package) = manifest_package(path) else {
            continue;
        };
        let signal = if path.exists() {
            PackageSignal::Added(package)
        } else {
            PackageSignal::Removed(package)
        };
        if !signals.contains(&signal) {
            signals.push(signal);
        }
    }
    signals
}
