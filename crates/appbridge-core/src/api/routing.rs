//! Request routing methods for ContentAppHost.

use crate::error::Result;
use crate::models::EndpointId;
use crate::router::{Resolution, RouteRequest};
use crate::ContentAppHost;

impl ContentAppHost {
    /// Route a decoded request. See [`crate::router::CommandRouter::route`].
    pub async fn route(&self, request: &RouteRequest) -> Result<String> {
        self.router.route(request).await
    }

    pub async fn send_command(
        &self,
        endpoint_id: EndpointId,
        cluster_id: u32,
        command_id: u32,
        payload: impl Into<String>,
    ) -> Result<String> {
        self.router
            .send_command(endpoint_id, cluster_id, command_id, payload)
            .await
    }

    pub async fn read_attribute(
        &self,
        endpoint_id: EndpointId,
        cluster_id: u32,
        attribute_id: u32,
    ) -> Result<String> {
        self.router
            .read_attribute(endpoint_id, cluster_id, attribute_id)
            .await
    }

    pub fn resolve(&self, endpoint_id: EndpointId) -> Resolution {
        self.router.resolve(endpoint_id)
    }
}
