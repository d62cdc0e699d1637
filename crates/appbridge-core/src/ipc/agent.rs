//! Dispatch channel and connector backed by the TCP agent transport.

use super::client::AgentClient;
use super::protocol::DispatchParams;
use crate::binder::{AgentConnector, ServiceCandidate};
use crate::error::{BridgeError, Result};
use crate::models::ContentApp;
use crate::router::{DispatchChannel, RouteRequest};
use std::sync::Arc;
use tracing::debug;

/// Forwards routed requests to the agent as `content_app.dispatch` calls.
///
/// The agent replies with the content app's response string. A non-string
/// result is passed back as its JSON text.
pub struct IpcDispatchChannel {
    client: AgentClient,
}

impl IpcDispatchChannel {
    pub fn new(client: AgentClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl DispatchChannel for IpcDispatchChannel {
    async fn dispatch(&self, app: &ContentApp, request: &RouteRequest) -> Result<String> {
        let reply = self
            .client
            .call(DispatchParams::new(app, request))
            .await
            .map_err(|e| match e {
                BridgeError::AgentConnectionLost { .. } => e,
                other => BridgeError::Dispatch {
                    app: app.name.clone(),
                    message: other.to_string(),
                },
            })?;

        reply.into_response().map_err(|err| BridgeError::Dispatch {
            app: app.name.clone(),
            message: format!("agent error {}: {}", err.code, err.message),
        })
    }
}

/// Connects to the candidate's advertised loopback address.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpAgentConnector;

#[async_trait::async_trait]
impl AgentConnector for TcpAgentConnector {
    async fn connect(&self, candidate: &ServiceCandidate) -> Result<Arc<dyn DispatchChannel>> {
        let addr = candidate.address.ok_or_else(|| BridgeError::Config {
            message: format!(
                "Agent service {}/{} advertises no address",
                candidate.package, candidate.service_name
            ),
        })?;
        let client = AgentClient::connect(addr).await?;
        debug!("Connected to agent {} at {}", candidate.package, addr);
        Ok(Arc::new(IpcDispatchChannel::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::{AgentServer, ContentAppResponder};
    use crate::models::EndpointId;

    /// Answers on behalf of two installed apps.
    struct FakeAgent;

    #[async_trait::async_trait]
    impl ContentAppResponder for FakeAgent {
        async fn respond(&self, params: DispatchParams) -> Result<String> {
            match params.app.as_str() {
                "vid-lib" => Ok(format!(r#"{{"cluster":{}}}"#, params.request.cluster_id)),
                "counter" => Ok(r#"{"count":3}"#.to_string()),
                other => Err(BridgeError::AppNotFound {
                    name: other.to_string(),
                }),
            }
        }
    }

    fn app(name: &str) -> ContentApp {
        ContentApp {
            name: name.to_string(),
            vendor_name: "Vendor".to_string(),
            vendor_id: 1,
            product_id: 1,
            version: "1.0".to_string(),
            descriptor: Default::default(),
            endpoint_id: EndpointId::new(5),
        }
    }

    fn candidate(address: Option<std::net::SocketAddr>) -> ServiceCandidate {
        ServiceCandidate {
            package: "agent".to_string(),
            service_name: "AgentService".to_string(),
            required_permission: None,
            granted_permissions: Vec::new(),
            system_image: true,
            address,
        }
    }

    #[tokio::test]
    async fn test_dispatch_through_agent() {
        let mut handle = AgentServer::start(Arc::new(FakeAgent)).await.unwrap();
        let channel = TcpAgentConnector
            .connect(&candidate(Some(handle.addr())))
            .await
            .unwrap();

        let request = RouteRequest::command(EndpointId::new(5), 1289, 0, "{}");
        let response = channel.dispatch(&app("vid-lib"), &request).await.unwrap();
        assert_eq!(response, r#"{"cluster":1289}"#);

        let response = channel.dispatch(&app("counter"), &request).await.unwrap();
        assert_eq!(response, r#"{"count":3}"#);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_agent_error_becomes_dispatch_error() {
        let mut handle = AgentServer::start(Arc::new(FakeAgent)).await.unwrap();
        let channel = TcpAgentConnector
            .connect(&candidate(Some(handle.addr())))
            .await
            .unwrap();

        let request = RouteRequest::read_attribute(EndpointId::new(5), 1289, 0);
        let err = channel.dispatch(&app("ghost"), &request).await.unwrap_err();
        assert!(matches!(err, BridgeError::Dispatch { ref app, .. } if app == "ghost"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_candidate_without_address() {
        let result = TcpAgentConnector.connect(&candidate(None)).await;
        assert!(matches!(result, Err(BridgeError::Config { .. })));
    }
}
