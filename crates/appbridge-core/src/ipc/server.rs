//! Agent side of the transport.
//!
//! An agent process runs an [`AgentServer`] and answers `content_app.dispatch`
//! calls on behalf of its content apps through a [`ContentAppResponder`].
//! Calls on one connection are answered concurrently; each reply carries the
//! id of its call, so a slow app never holds up the others.

use super::protocol::{encode_frame, DispatchParams, DispatchReply, FrameBuffer, JSONRPC_VERSION};
use crate::config::IpcConfig;
use crate::error::{BridgeError, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, warn};

const REPLY_QUEUE: usize = 64;

/// Answers routed requests for the content apps an agent fronts.
#[async_trait::async_trait]
pub trait ContentAppResponder: Send + Sync + 'static {
    /// The app's response string for one request.
    async fn respond(&self, params: DispatchParams) -> Result<String>;
}

/// A running agent server. Dropping the handle stops it.
pub struct AgentServerHandle {
    addr: SocketAddr,
    stop: watch::Sender<bool>,
    accept_task: Option<tokio::task::JoinHandle<()>>,
}

impl AgentServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and close every open connection.
    pub fn shutdown(&mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

impl Drop for AgentServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct AgentServer;

impl AgentServer {
    /// Listen on an OS-assigned loopback port.
    pub async fn start<R: ContentAppResponder>(responder: Arc<R>) -> Result<AgentServerHandle> {
        Self::start_on(SocketAddr::from(([127, 0, 0, 1], 0)), responder).await
    }

    pub async fn start_on<R: ContentAppResponder>(
        bind_addr: SocketAddr,
        responder: Arc<R>,
    ) -> Result<AgentServerHandle> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| BridgeError::Io {
                message: format!("Failed to bind agent listener on {}: {}", bind_addr, e),
                path: None,
                source: Some(e),
            })?;
        let addr = listener.local_addr()?;
        let (stop, stop_rx) = watch::channel(false);

        info!("Agent server listening on {}", addr);
        let accept_task = tokio::spawn(accept_connections(listener, responder, stop_rx));

        Ok(AgentServerHandle {
            addr,
            stop,
            accept_task: Some(accept_task),
        })
    }
}

async fn accept_connections<R: ContentAppResponder>(
    listener: TcpListener,
    responder: Arc<R>,
    mut stop: watch::Receiver<bool>,
) {
    let slots = Arc::new(Semaphore::new(IpcConfig::MAX_IPC_CONNECTIONS));
    loop {
        let (stream, peer) = tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Agent accept failed: {}", e);
                    continue;
                }
            },
        };

        let Ok(slot) = slots.clone().try_acquire_owned() else {
            warn!(
                "Refusing connection from {}: {} already open",
                peer,
                IpcConfig::MAX_IPC_CONNECTIONS
            );
            continue;
        };
        let responder = responder.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            debug!("Host connected from {}", peer);
            if let Err(e) = serve_connection(stream, responder, stop).await {
                debug!("Connection from {} ended: {}", peer, e);
            }
            drop(slot);
        });
    }
    debug!("Agent server stopped accepting");
}

/// Loosely typed call, so a bad method or bad params still get a reply with an id.
#[derive(Deserialize)]
struct IncomingCall {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    params: serde_json::Value,
}

async fn serve_connection<R: ContentAppResponder>(
    stream: TcpStream,
    responder: Arc<R>,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let (mut read_half, write_half) = stream.into_split();
    let (replies, reply_rx) = mpsc::channel(REPLY_QUEUE);
    let writer = tokio::spawn(write_replies(write_half, reply_rx));

    let mut frames = FrameBuffer::new();
    let outcome = loop {
        let frame = tokio::select! {
            _ = stop.changed() => break Ok(()),
            frame = frames.read_frame(&mut read_half) => match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            },
        };

        match accept_call(&frame) {
            Ok((id, params)) => {
                let responder = responder.clone();
                let replies = replies.clone();
                tokio::spawn(async move {
                    let reply = match responder.respond(params).await {
                        Ok(response) => DispatchReply::answered(id, response),
                        Err(e) => {
                            DispatchReply::failed(Some(id), e.to_rpc_error_code(), e.to_string())
                        }
                    };
                    let _ = replies.send(reply).await;
                });
            }
            Err(reply) => {
                if replies.send(reply).await.is_err() {
                    break Ok(());
                }
            }
        }
    };

    if *stop.borrow() {
        writer.abort();
    }
    outcome
}

/// Validate one frame as a dispatch call, or produce the error reply for it.
fn accept_call(frame: &[u8]) -> std::result::Result<(u64, DispatchParams), DispatchReply> {
    let call: IncomingCall = serde_json::from_slice(frame)
        .map_err(|e| DispatchReply::failed(None, -32700, format!("Parse error: {}", e)))?;

    if call.jsonrpc != JSONRPC_VERSION {
        return Err(DispatchReply::failed(
            call.id,
            -32600,
            "Invalid Request: expected jsonrpc 2.0",
        ));
    }
    if call.method != IpcConfig::DISPATCH_METHOD {
        let err = BridgeError::MethodNotFound {
            method: call.method,
        };
        return Err(DispatchReply::failed(call.id, err.to_rpc_error_code(), err.to_string()));
    }
    let id = call
        .id
        .ok_or_else(|| DispatchReply::failed(None, -32600, "Invalid Request: missing id"))?;
    let params = serde_json::from_value(call.params)
        .map_err(|e| DispatchReply::failed(Some(id), -32602, format!("Invalid params: {}", e)))?;
    Ok((id, params))
}

async fn write_replies(mut write_half: OwnedWriteHalf, mut replies: mpsc::Receiver<DispatchReply>) {
    while let Some(reply) = replies.recv().await {
        let frame = match encode_frame(&reply) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping reply {:?}: {}", reply.id, e);
                continue;
            }
        };
        if let Err(e) = write_half.write_all(&frame).await {
            debug!("Reply write failed: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::protocol::DispatchCall;
    use crate::models::EndpointId;
    use crate::router::RouteRequest;
    use std::time::Duration;

    struct ScriptedAgent;

    #[async_trait::async_trait]
    impl ContentAppResponder for ScriptedAgent {
        async fn respond(&self, params: DispatchParams) -> Result<String> {
            match params.app.as_str() {
                "ghost" => Err(BridgeError::AppNotFound { name: params.app }),
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok("slow done".to_string())
                }
                app => Ok(format!("{}:{}", app, params.request.cluster_id)),
            }
        }
    }

    fn params(app: &str) -> DispatchParams {
        DispatchParams {
            app: app.to_string(),
            vendor_id: 1,
            product_id: 1,
            request: RouteRequest::read_attribute(EndpointId::new(5), 1289, 0),
        }
    }

    struct RawConnection {
        stream: TcpStream,
        frames: FrameBuffer,
    }

    impl RawConnection {
        async fn open(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                frames: FrameBuffer::new(),
            }
        }

        async fn send_bytes(&mut self, payload: &[u8]) {
            let mut frame = (payload.len() as u32).to_be_bytes().to_vec();
            frame.extend_from_slice(payload);
            self.stream.write_all(&frame).await.unwrap();
        }

        async fn send(&mut self, call: &DispatchCall) {
            self.send_bytes(&serde_json::to_vec(call).unwrap()).await;
        }

        async fn reply(&mut self) -> DispatchReply {
            let frame = self.frames.read_frame(&mut self.stream).await.unwrap().unwrap();
            serde_json::from_slice(&frame).unwrap()
        }
    }

    #[tokio::test]
    async fn test_listens_on_loopback() {
        let mut handle = AgentServer::start(Arc::new(ScriptedAgent)).await.unwrap();
        assert!(handle.addr().port() > 0);
        assert_eq!(handle.addr().ip(), std::net::Ipv4Addr::LOCALHOST);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_answers_with_call_id() {
        let mut handle = AgentServer::start(Arc::new(ScriptedAgent)).await.unwrap();
        let mut conn = RawConnection::open(handle.addr()).await;

        conn.send(&DispatchCall::new(7, params("vid-lib"))).await;
        let reply = conn.reply().await;

        assert_eq!(reply.id, Some(7));
        assert_eq!(reply.into_response().unwrap(), "vid-lib:1289");
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_slow_app_does_not_block_connection() {
        let mut handle = AgentServer::start(Arc::new(ScriptedAgent)).await.unwrap();
        let mut conn = RawConnection::open(handle.addr()).await;

        conn.send(&DispatchCall::new(1, params("slow"))).await;
        conn.send(&DispatchCall::new(2, params("fast"))).await;

        assert_eq!(conn.reply().await.id, Some(2));
        assert_eq!(conn.reply().await.id, Some(1));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_responder_error_maps_to_rpc_code() {
        let mut handle = AgentServer::start(Arc::new(ScriptedAgent)).await.unwrap();
        let mut conn = RawConnection::open(handle.addr()).await;

        conn.send(&DispatchCall::new(3, params("ghost"))).await;
        let err = conn.reply().await.into_response().unwrap_err();
        assert_eq!(err.code, -32002);
        assert!(err.message.contains("ghost"));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_calls_get_error_replies() {
        let mut handle = AgentServer::start(Arc::new(ScriptedAgent)).await.unwrap();
        let mut conn = RawConnection::open(handle.addr()).await;

        conn.send_bytes(b"not valid json").await;
        let reply = conn.reply().await;
        assert_eq!(reply.id, None);
        assert_eq!(reply.error.unwrap().code, -32700);

        conn.send_bytes(br#"{"jsonrpc": "1.0", "method": "content_app.dispatch", "id": 9}"#)
            .await;
        let reply = conn.reply().await;
        assert_eq!(reply.id, Some(9));
        assert_eq!(reply.error.unwrap().code, -32600);

        conn.send_bytes(br#"{"jsonrpc": "2.0", "method": "content_app.launch", "id": 10}"#)
            .await;
        assert_eq!(conn.reply().await.error.unwrap().code, -32601);

        conn.send_bytes(br#"{"jsonrpc": "2.0", "method": "content_app.dispatch", "id": 11, "params": {}}"#)
            .await;
        assert_eq!(conn.reply().await.error.unwrap().code, -32602);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_connections() {
        let mut handle = AgentServer::start(Arc::new(ScriptedAgent)).await.unwrap();
        let mut conn = RawConnection::open(handle.addr()).await;
        conn.send(&DispatchCall::new(1, params("vid-lib"))).await;
        conn.reply().await;

        handle.shutdown();

        let closed = tokio::time::timeout(
            Duration::from_secs(1),
            conn.frames.read_frame(&mut conn.stream),
        )
        .await
        .unwrap();
        assert!(matches!(closed, Ok(None)));
    }
}
