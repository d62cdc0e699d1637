//! `ContentAppHost` implementation submodules.
//!
//! The struct lives in `lib.rs`; each submodule adds one area of the API.

mod agent;
mod builder;
mod endpoints;
mod routing;

pub use builder::ContentAppHostBuilder;
pub(crate) use endpoints::EndpointAssigner;
