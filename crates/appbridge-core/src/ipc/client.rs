//! Host side of the agent transport.
//!
//! One connection carries every dispatch. Each call registers its id before
//! the request is written; a reader task hands every reply to the call that
//! owns its id. A call that is dropped (e.g. by the router's deadline)
//! unregisters itself, and its late reply is discarded instead of being
//! delivered to whoever calls next.

use super::protocol::{encode_frame, DispatchCall, DispatchParams, DispatchReply, FrameBuffer};
use crate::config::IpcConfig;
use crate::error::{BridgeError, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const OUTBOUND_QUEUE: usize = 64;

/// In-flight calls by id. `None` once the connection is gone.
type Pending = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<DispatchReply>>>>>;

/// Dispatch client over a single agent connection.
#[derive(Debug)]
pub struct AgentClient {
    addr: SocketAddr,
    next_id: AtomicU64,
    outbound: mpsc::Sender<Vec<u8>>,
    pending: Pending,
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
}

impl AgentClient {
    /// Connect to an agent, bounded by `IpcConfig::IPC_CONNECT_TIMEOUT`.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = tokio::time::timeout(IpcConfig::IPC_CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| connection_lost(addr))?
            .map_err(|_| connection_lost(addr))?;
        let (read_half, write_half) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        let reader = tokio::spawn(read_replies(read_half, pending.clone(), addr));
        let writer = tokio::spawn(write_calls(write_half, outbound_rx, pending.clone(), addr));

        debug!("Agent client connected to {}", addr);

        Ok(Self {
            addr,
            next_id: AtomicU64::new(1),
            outbound,
            pending,
            reader,
            writer,
        })
    }

    /// Send one dispatch and wait for its own reply.
    ///
    /// Fails with `AgentConnectionLost` if the connection is or becomes
    /// unusable before the reply arrives.
    pub async fn call(&self, params: DispatchParams) -> Result<DispatchReply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_frame(&DispatchCall::new(id, params))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().map_err(|_| self.lost())?;
            let calls = pending.as_mut().ok_or_else(|| self.lost())?;
            calls.insert(id, reply_tx);
        }
        let _registration = Registration {
            pending: &self.pending,
            id,
        };

        self.outbound.send(frame).await.map_err(|_| self.lost())?;
        reply_rx.await.map_err(|_| self.lost())
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of calls still waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.pending
            .lock()
            .ok()
            .and_then(|p| p.as_ref().map(HashMap::len))
            .unwrap_or(0)
    }

    fn lost(&self) -> BridgeError {
        connection_lost(self.addr)
    }
}

impl Drop for AgentClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Unregisters a call when it finishes or is dropped mid-flight.
struct Registration<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(calls) = pending.as_mut() {
                calls.remove(&self.id);
            }
        }
    }
}

async fn read_replies(mut read_half: OwnedReadHalf, pending: Pending, addr: SocketAddr) {
    let mut frames = FrameBuffer::new();
    loop {
        let frame = match frames.read_frame(&mut read_half).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Agent at {} closed the connection", addr);
                break;
            }
            Err(e) => {
                warn!("Agent connection {} failed: {}", addr, e);
                break;
            }
        };

        let reply: DispatchReply = match serde_json::from_slice(&frame) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Unreadable reply from agent at {}: {}", addr, e);
                continue;
            }
        };
        let Some(id) = reply.id else {
            warn!("Agent at {} rejected a call: {:?}", addr, reply.error);
            continue;
        };

        let waiter = pending
            .lock()
            .ok()
            .and_then(|mut p| p.as_mut().and_then(|calls| calls.remove(&id)));
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!("Discarding reply {} from {}: caller gave up", id, addr),
        }
    }
    close(&pending);
}

async fn write_calls(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    pending: Pending,
    addr: SocketAddr,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            warn!("Write to agent at {} failed: {}", addr, e);
            break;
        }
    }
    close(&pending);
}

/// Fail every waiting call and refuse new ones.
fn close(pending: &Pending) {
    if let Ok(mut pending) = pending.lock() {
        pending.take();
    }
}

fn connection_lost(addr: SocketAddr) -> BridgeError {
    BridgeError::AgentConnectionLost {
        address: addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::{AgentServer, ContentAppResponder};
    use crate::models::EndpointId;
    use crate::router::RouteRequest;
    use std::time::Duration;

    /// Answers `reply-from-<app>`, slowly for apps whose name starts with "slow".
    struct NamedResponder;

    #[async_trait::async_trait]
    impl ContentAppResponder for NamedResponder {
        async fn respond(&self, params: DispatchParams) -> Result<String> {
            if params.app.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            Ok(format!("reply-from-{}", params.app))
        }
    }

    fn params(app: &str) -> DispatchParams {
        DispatchParams {
            app: app.to_string(),
            vendor_id: 1,
            product_id: 1,
            request: RouteRequest::command(EndpointId::new(5), 6, 0, ""),
        }
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let mut handle = AgentServer::start(Arc::new(NamedResponder)).await.unwrap();
        let client = AgentClient::connect(handle.addr()).await.unwrap();

        let reply = client.call(params("vid-lib")).await.unwrap();
        assert_eq!(reply.into_response().unwrap(), "reply-from-vid-lib");
        assert_eq!(client.in_flight(), 0);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_abandoned_call_reply_goes_nowhere() {
        let mut handle = AgentServer::start(Arc::new(NamedResponder)).await.unwrap();
        let client = AgentClient::connect(handle.addr()).await.unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), client.call(params("slow-app"))).await;
        assert!(abandoned.is_err());
        assert_eq!(client.in_flight(), 0);

        let reply = client.call(params("fast-app")).await.unwrap();
        assert_eq!(reply.into_response().unwrap(), "reply-from-fast-app");

        // Once the slow reply has landed and been dropped, calls still pair up.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let reply = client.call(params("other-app")).await.unwrap();
        assert_eq!(reply.into_response().unwrap(), "reply-from-other-app");

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_calls_get_their_own_replies() {
        let mut handle = AgentServer::start(Arc::new(NamedResponder)).await.unwrap();
        let client = Arc::new(AgentClient::connect(handle.addr()).await.unwrap());

        let calls = (0..8).map(|i| {
            let client = client.clone();
            async move { client.call(params(&format!("app-{}", i))).await }
        });
        let results = futures::future::join_all(calls).await;

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(
                result.unwrap().into_response().unwrap(),
                format!("reply-from-app-{}", i)
            );
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_connection_lost() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        match AgentClient::connect(addr).await.unwrap_err() {
            BridgeError::AgentConnectionLost { address } => assert_eq!(address, "127.0.0.1:1"),
            other => panic!("Expected AgentConnectionLost, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_detects_server_shutdown() {
        let mut handle = AgentServer::start(Arc::new(NamedResponder)).await.unwrap();
        let client = AgentClient::connect(handle.addr()).await.unwrap();
        assert!(client.call(params("vid-lib")).await.is_ok());

        handle.shutdown();

        let mut detected = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Err(BridgeError::AgentConnectionLost { .. }) = client.call(params("vid-lib")).await
            {
                detected = true;
                break;
            }
        }
        assert!(detected, "client should observe the closed connection");
    }

    #[tokio::test]
    async fn test_pending_call_fails_when_agent_goes_away() {
        let mut handle = AgentServer::start(Arc::new(NamedResponder)).await.unwrap();
        let client = AgentClient::connect(handle.addr()).await.unwrap();

        let call = client.call(params("slow-app"));
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.shutdown();
        };
        let (result, _) = tokio::join!(call, shutdown);
        assert!(matches!(result, Err(BridgeError::AgentConnectionLost { .. })));
    }
}
