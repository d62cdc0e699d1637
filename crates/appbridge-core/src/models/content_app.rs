//! Content app identity types.

use crate::capability::CapabilityDescriptor;
use serde::{Deserialize, Serialize};

use super::{EndpointId, EndpointRecord};

/// Installed-package metadata as reported by the package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package: String,
    #[serde(default)]
    pub vendor_name: String,
    #[serde(default)]
    pub vendor_id: u16,
    #[serde(default)]
    pub product_id: u16,
    #[serde(default)]
    pub version: String,
    /// Name of the capability declaration resource, if the package declares one.
    #[serde(default)]
    pub capability_resource: Option<String>,
}

/// An application that implements device-control clusters.
///
/// The `name` is the identity key. A live instance comes from discovery and
/// carries a parsed descriptor; a persisted instance is rebuilt from an
/// [`EndpointRecord`] and has an empty descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentApp {
    pub name: String,
    pub vendor_name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: String,
    pub descriptor: CapabilityDescriptor,
    pub endpoint_id: EndpointId,
}

impl ContentApp {
    /// Build a live instance from package metadata and its parsed descriptor.
    pub fn from_package(info: &PackageInfo, descriptor: CapabilityDescriptor) -> Self {
        Self {
            name: info.package.clone(),
            vendor_name: info.vendor_name.clone(),
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            version: info.version.clone(),
            descriptor,
            endpoint_id: EndpointId::INVALID,
        }
    }

    /// Rebuild a persisted instance from its durable record.
    pub fn from_record(name: impl Into<String>, record: &EndpointRecord) -> Self {
        Self {
            name: name.into(),
            vendor_name: record.vendor_name.clone(),
            vendor_id: record.vendor_id,
            product_id: record.product_id,
            version: record.version.clone(),
            descriptor: CapabilityDescriptor::default(),
            endpoint_id: record.endpoint_id,
        }
    }

    pub fn to_record(&self) -> EndpointRecord {
        EndpointRecord {
            vendor_id: self.vendor_id,
            vendor_name: self.vendor_name.clone(),
            product_id: self.product_id,
            version: self.version.clone(),
            endpoint_id: self.endpoint_id,
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint_id: EndpointId) -> Self {
        self.endpoint_id = endpoint_id;
        self
    }
}
