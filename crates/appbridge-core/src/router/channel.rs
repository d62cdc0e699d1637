//! Dispatch channel seam between the router and content-app processes.

use super::request::RouteRequest;
use crate::error::Result;
use crate::models::ContentApp;
use std::sync::Arc;

/// Request/response channel to a content-app process.
///
/// The interface is owned by the content app; the router only forwards and
/// returns whatever string comes back. Serialization of concurrent requests,
/// if the process needs it, is the channel's job.
#[async_trait::async_trait]
pub trait DispatchChannel: Send + Sync {
    async fn dispatch(&self, app: &ContentApp, request: &RouteRequest) -> Result<String>;
}

/// Source of the channel the router should use right now.
#[async_trait::async_trait]
pub trait ChannelProvider: Send + Sync {
    /// The current channel, or `None` if none is connected.
    async fn channel(&self) -> Option<Arc<dyn DispatchChannel>>;
}

/// A provider that always hands out the same channel.
#[derive(Clone)]
pub struct StaticChannel(pub Arc<dyn DispatchChannel>);

#[async_trait::async_trait]
impl ChannelProvider for StaticChannel {
    async fn channel(&self) -> Option<Arc<dyn DispatchChannel>> {
        Some(self.0.clone())
    }
}
