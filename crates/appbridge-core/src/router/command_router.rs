//! Endpoint resolution and dispatch.

use super::channel::ChannelProvider;
use super::request::RouteRequest;
use crate::config::RouterConfig;
use crate::discovery::DiscoveryRegistry;
use crate::error::{BridgeError, Result};
use crate::models::{ContentApp, EndpointId};
use crate::store::EndpointStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How requests for never-seen endpoint ids are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// Return `BridgeError::UnknownEndpoint` and let the caller decide.
    #[default]
    Strict,
    /// Answer with an empty attribute value or a generic command success.
    /// Exists for protocol-stack test harnesses that cannot handle errors.
    Permissive,
}

/// Where an endpoint id currently leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A live app holds the id.
    Live(ContentApp),
    /// The id is on record for an app that is not currently installed.
    Absent { app_name: String },
    /// The id was never assigned.
    Unknown,
}

/// Routes cluster requests to the content app that owns the endpoint.
///
/// The router keeps no per-request state: identical requests to a live app
/// each produce their own dispatch call. No retries happen here.
pub struct CommandRouter {
    discovery: Arc<DiscoveryRegistry>,
    store: Arc<EndpointStore>,
    channels: Arc<dyn ChannelProvider>,
    mode: RouteMode,
    dispatch_timeout: Option<Duration>,
}

impl CommandRouter {
    pub fn new(
        discovery: Arc<DiscoveryRegistry>,
        store: Arc<EndpointStore>,
        channels: Arc<dyn ChannelProvider>,
    ) -> Self {
        Self {
            discovery,
            store,
            channels,
            mode: RouteMode::default(),
            dispatch_timeout: Some(RouterConfig::DEFAULT_DISPATCH_TIMEOUT),
        }
    }

    pub fn with_mode(mut self, mode: RouteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bound every dispatch; `None` waits as long as the channel does.
    pub fn with_dispatch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn mode(&self) -> RouteMode {
        self.mode
    }

    /// Resolve an endpoint id against the live set, then the persisted records.
    pub fn resolve(&self, endpoint_id: EndpointId) -> Resolution {
        if let Some(app) = self.discovery.find_by_endpoint(endpoint_id) {
            return Resolution::Live(app);
        }
        match self.store.find_by_endpoint(endpoint_id) {
            Some((app_name, _)) => Resolution::Absent { app_name },
            None => Resolution::Unknown,
        }
    }

    /// Route a request and return the structured response string.
    pub async fn route(&self, request: &RouteRequest) -> Result<String> {
        match self.resolve(request.endpoint_id) {
            Resolution::Live(app) => self.dispatch(&app, request).await,
            Resolution::Absent { app_name } => {
                debug!(
                    "Endpoint {} belongs to {} which is not installed",
                    request.endpoint_id, app_name
                );
                Ok(Self::unsupported_endpoint_response())
            }
            Resolution::Unknown => match self.mode {
                RouteMode::Strict => Err(BridgeError::UnknownEndpoint(request.endpoint_id)),
                RouteMode::Permissive => {
                    warn!(
                        "Request for unknown endpoint {} answered with placeholder",
                        request.endpoint_id
                    );
                    Ok(if request.is_command() {
                        RouterConfig::PERMISSIVE_COMMAND_RESPONSE.to_string()
                    } else {
                        RouterConfig::PERMISSIVE_ATTRIBUTE_RESPONSE.to_string()
                    })
                }
            },
        }
    }

    pub async fn send_command(
        &self,
        endpoint_id: EndpointId,
        cluster_id: u32,
        command_id: u32,
        payload: impl Into<String>,
    ) -> Result<String> {
        self.route(&RouteRequest::command(
            endpoint_id,
            cluster_id,
            command_id,
            payload,
        ))
        .await
    }

    pub async fn read_attribute(
        &self,
        endpoint_id: EndpointId,
        cluster_id: u32,
        attribute_id: u32,
    ) -> Result<String> {
        self.route(&RouteRequest::read_attribute(
            endpoint_id,
            cluster_id,
            attribute_id,
        ))
        .await
    }

    /// Response for an endpoint that exists on record but cannot be reached.
    pub fn unsupported_endpoint_response() -> String {
        serde_json::json!({
            (RouterConfig::FAILURE_KEY): {
                (RouterConfig::STATUS_KEY): RouterConfig::FAILED_UNSUPPORTED_ENDPOINT
            }
        })
        .to_string()
    }

    async fn dispatch(&self, app: &ContentApp, request: &RouteRequest) -> Result<String> {
        let channel = self
            .channels
            .channel()
            .await
            .ok_or(BridgeError::ChannelUnavailable)?;

        debug!(
            "Dispatching {:?} on cluster {} to {} (endpoint {})",
            request.operation, request.cluster_id, app.name, request.endpoint_id
        );

        match self.dispatch_timeout {
            Some(limit) => tokio::time::timeout(limit, channel.dispatch(app, request))
                .await
                .map_err(|_| BridgeError::Timeout(limit))?,
            None => channel.dispatch(app, request).await,
        }
    }
}
