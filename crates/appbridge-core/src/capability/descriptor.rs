//! Capability descriptor schema and parser.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One supported cluster, with optional nested identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterDescriptor {
    /// Cluster identifier.
    #[serde(alias = "clusterIdentifier")]
    pub identifier: u32,
    /// Feature flags the app advertises for this cluster.
    #[serde(default)]
    pub features: Vec<String>,
    /// Optional command identifiers.
    #[serde(default, alias = "optionalCommandIdentifiers")]
    pub commands: Vec<u32>,
    /// Optional attribute identifiers.
    #[serde(default, alias = "optionalAttributesIdentifiers")]
    pub attributes: Vec<u32>,
}

/// Parsed capability declaration. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    clusters: Vec<ClusterDescriptor>,
}

impl CapabilityDescriptor {
    pub fn clusters(&self) -> &[ClusterDescriptor] {
        &self.clusters
    }

    pub fn cluster(&self, identifier: u32) -> Option<&ClusterDescriptor> {
        self.clusters.iter().find(|c| c.identifier == identifier)
    }

    pub fn supports_cluster(&self, identifier: u32) -> bool {
        self.cluster(identifier).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

#[derive(Deserialize)]
struct RawDescriptor {
    clusters: Vec<ClusterDescriptor>,
}

/// Parse a raw capability resource.
///
/// Only well-formedness is checked: the text must be a JSON object with a
/// `clusters` array whose entries carry a numeric `identifier`, and no
/// identifier may repeat.
pub fn parse_descriptor(package: &str, raw: &str) -> Result<CapabilityDescriptor> {
    let parsed: RawDescriptor =
        serde_json::from_str(raw).map_err(|e| BridgeError::MalformedDescriptor {
            package: package.to_string(),
            message: e.to_string(),
        })?;

    let mut seen = HashSet::new();
    for cluster in &parsed.clusters {
        if !seen.insert(cluster.identifier) {
            return Err(BridgeError::MalformedDescriptor {
                package: package.to_string(),
                message: format!("cluster {} declared more than once", cluster.identifier),
            });
        }
    }

    Ok(CapabilityDescriptor {
        clusters: parsed.clusters,
    })
}
