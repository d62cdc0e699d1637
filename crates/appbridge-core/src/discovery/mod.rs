//! Discovery of installed content apps.
//!
//! The [`DiscoveryRegistry`] keeps the live set of installed packages that
//! declare device clusters. It is fed by install/uninstall signals from a
//! [`PackageSource`] and publishes typed [`DiscoveryEvent`]s to subscribers.
//!
//! The registry never touches the endpoint store: persisted endpoint history
//! is independent of live presence.

mod registry;
mod source;

pub use registry::{DiscoveryEvent, DiscoveryRegistry};
pub use source::{PackageSignal, PackageSource};
