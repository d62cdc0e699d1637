//! Capability declarations.
//!
//! An installed package may ship a capability resource: a JSON document that
//! lists the device-control clusters the app implements. This module parses
//! that text into an immutable [`CapabilityDescriptor`].

mod descriptor;

pub use descriptor::{parse_descriptor, CapabilityDescriptor, ClusterDescriptor};
