//! Agent service candidates and the trust/tie-break policy.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{debug, warn};

/// A service that answered the bind action query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCandidate {
    /// Package that owns the service.
    pub package: String,
    pub service_name: String,
    /// Permission a client must hold to bind to this service.
    #[serde(default)]
    pub required_permission: Option<String>,
    /// Permissions granted to the owning package.
    #[serde(default)]
    pub granted_permissions: Vec<String>,
    /// Installed as part of the trusted system image (or an update to it).
    #[serde(default)]
    pub system_image: bool,
    /// Where the service accepts connections.
    #[serde(default)]
    pub address: Option<SocketAddr>,
}

impl ServiceCandidate {
    pub fn enforces(&self, permission: &str) -> bool {
        self.required_permission.as_deref() == Some(permission)
    }

    pub fn holds(&self, permission: &str) -> bool {
        self.granted_permissions.iter().any(|p| p == permission)
    }
}

/// Enumerates the services able to handle a bind action.
pub trait ServiceResolver: Send + Sync {
    fn query_candidates(&self, action: &str) -> Result<Vec<ServiceCandidate>>;
}

/// Pick the single trusted agent among `candidates`.
///
/// 1. Drop candidates that do not enforce `bind_permission`.
/// 2. Drop candidates whose package does not hold `held_permission`.
/// 3. If several remain, keep only system-image candidates (when any exist).
/// 4. If several still remain, warn and take the first in query order.
///
/// Returns `None` when nothing survives the permission checks.
pub fn select_candidate(
    candidates: Vec<ServiceCandidate>,
    bind_permission: &str,
    held_permission: &str,
) -> Option<ServiceCandidate> {
    let mut trusted: Vec<ServiceCandidate> = candidates
        .into_iter()
        .filter(|c| {
            let ok = c.enforces(bind_permission);
            if !ok {
                debug!(
                    "Rejecting {}/{}: does not enforce {}",
                    c.package, c.service_name, bind_permission
                );
            }
            ok
        })
        .filter(|c| {
            let ok = c.holds(held_permission);
            if !ok {
                debug!(
                    "Rejecting {}/{}: package lacks {}",
                    c.package, c.service_name, held_permission
                );
            }
            ok
        })
        .collect();

    if trusted.len() > 1 && trusted.iter().any(|c| c.system_image) {
        trusted.retain(|c| c.system_image);
    }

    if trusted.len() > 1 {
        warn!(
            "{} agent services qualify, picking the first ({}/{})",
            trusted.len(),
            trusted[0].package,
            trusted[0].service_name
        );
    }

    trusted.into_iter().next()
}
