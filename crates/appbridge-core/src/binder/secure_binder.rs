//! Binding to the trusted agent process.

use super::candidate::{select_candidate, ServiceCandidate, ServiceResolver};
use super::gate::ChannelGate;
use crate::cancel::InterruptToken;
use crate::config::BinderConfig;
use crate::error::{BridgeError, Result};
use crate::models::ContentApp;
use crate::router::{ChannelProvider, DispatchChannel, RouteRequest};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Opens a dispatch channel to a selected agent service.
#[async_trait::async_trait]
pub trait AgentConnector: Send + Sync {
    async fn connect(&self, candidate: &ServiceCandidate) -> Result<Arc<dyn DispatchChannel>>;
}

/// Connection state of the binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindState {
    Unbound,
    Binding,
    Connected,
}

struct BinderInner {
    state: BindState,
    channel: Option<Arc<dyn DispatchChannel>>,
    service: Option<ServiceCandidate>,
    /// Released when the next connection completes.
    gate: Arc<ChannelGate>,
    /// Bumped on every unbind so stale connect results are discarded.
    attempt: u64,
}

/// Locates, verifies and connects to exactly one agent service.
///
/// `Unbound -> Binding -> Connected` on a successful connect,
/// `Connected -> Unbound` on disconnect, or when a dispatch through the bound
/// channel reports the transport lost. There is no automatic re-bind.
pub struct SecureServiceBinder {
    resolver: Arc<dyn ServiceResolver>,
    connector: Arc<dyn AgentConnector>,
    connect_timeout: Duration,
    inner: Mutex<BinderInner>,
}

impl SecureServiceBinder {
    pub fn new(resolver: Arc<dyn ServiceResolver>, connector: Arc<dyn AgentConnector>) -> Self {
        Self {
            resolver,
            connector,
            connect_timeout: BinderConfig::CONNECT_TIMEOUT,
            inner: Mutex::new(BinderInner {
                state: BindState::Unbound,
                channel: None,
                service: None,
                gate: Arc::new(ChannelGate::new()),
                attempt: 0,
            }),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Start binding to the trusted agent.
    ///
    /// Must be called from within a Tokio runtime; the connect runs on a
    /// spawned task.
    ///
    /// Returns `false` when no candidate passes the permission checks or the
    /// candidate query fails. Returns `true` once a connection attempt is
    /// under way, or if one is already pending or established.
    pub fn bind(self: &Arc<Self>) -> bool {
        if self.state() != BindState::Unbound {
            debug!("Agent bind requested while {:?}, ignoring", self.state());
            return true;
        }

        let candidates = match self.resolver.query_candidates(BinderConfig::BIND_ACTION) {
            Ok(c) => c,
            Err(e) => {
                warn!("Agent candidate query failed: {}", e);
                return false;
            }
        };
        let Some(candidate) = select_candidate(
            candidates,
            BinderConfig::BIND_PERMISSION,
            BinderConfig::PERMISSION_HELD_BY_SERVICE,
        ) else {
            warn!("{}", BridgeError::NoTrustedAgent);
            return false;
        };

        let attempt = {
            let mut inner = self.lock_inner();
            if inner.state != BindState::Unbound {
                return true;
            }
            inner.state = BindState::Binding;
            inner.service = Some(candidate.clone());
            inner.attempt
        };

        info!(
            "Binding to agent {}/{}",
            candidate.package, candidate.service_name
        );

        let binder = self.clone();
        tokio::spawn(async move {
            let result =
                tokio::time::timeout(binder.connect_timeout, binder.connector.connect(&candidate))
                    .await
                    .unwrap_or(Err(BridgeError::Timeout(binder.connect_timeout)));
            binder.finish_bind(attempt, result);
        });

        true
    }

    /// Record an established agent connection and release waiters.
    ///
    /// Only accepted while binding; returns whether the channel was taken.
    pub fn on_connected(&self, channel: Arc<dyn DispatchChannel>) -> bool {
        let mut inner = self.lock_inner();
        if inner.state != BindState::Binding {
            debug!("Ignoring agent connection while {:?}", inner.state);
            return false;
        }
        Self::connect_locked(&mut inner, channel);
        true
    }

    /// Record loss of the agent connection.
    ///
    /// Returns `true` if a connection was dropped. The binder does not
    /// reconnect on its own.
    pub fn on_disconnected(&self) -> bool {
        let mut inner = self.lock_inner();
        if inner.state != BindState::Connected {
            return false;
        }
        Self::reset_locked(&mut inner);
        info!("Agent disconnected");
        true
    }

    /// Drop the connection or abandon a pending bind.
    pub fn unbind(&self) {
        let mut inner = self.lock_inner();
        if inner.state == BindState::Unbound {
            return;
        }
        Self::reset_locked(&mut inner);
        info!("Agent unbound");
    }

    pub fn state(&self) -> BindState {
        self.lock_inner().state
    }

    /// The service selected by the current bind, if any.
    pub fn bound_service(&self) -> Option<ServiceCandidate> {
        self.lock_inner().service.clone()
    }

    pub fn current_channel(&self) -> Option<Arc<dyn DispatchChannel>> {
        self.lock_inner().channel.clone()
    }

    /// Wait for the agent channel.
    ///
    /// Blocks until a bind completes or `token` is interrupted. An
    /// interrupted wait yields `None`.
    pub async fn wait_for_channel(
        &self,
        token: &InterruptToken,
    ) -> Option<Arc<dyn DispatchChannel>> {
        loop {
            let gate = {
                let inner = self.lock_inner();
                if let Some(channel) = &inner.channel {
                    return Some(channel.clone());
                }
                inner.gate.clone()
            };

            if gate.wait(token).await.is_err() {
                debug!("{}", BridgeError::BindInterrupted);
                return None;
            }
            // The connection may have dropped between release and wakeup.
        }
    }

    fn finish_bind(self: &Arc<Self>, attempt: u64, result: Result<Arc<dyn DispatchChannel>>) {
        let mut inner = self.lock_inner();
        if inner.attempt != attempt || inner.state != BindState::Binding {
            debug!("Discarding result of abandoned agent bind");
            return;
        }
        match result {
            Ok(channel) => {
                let watched = WatchedChannel {
                    inner: channel,
                    binder: Arc::downgrade(self),
                    attempt,
                };
                Self::connect_locked(&mut inner, Arc::new(watched));
            }
            Err(e) => {
                warn!("Agent connection failed: {}", e);
                inner.state = BindState::Unbound;
                inner.service = None;
            }
        }
    }

    fn connect_locked(inner: &mut BinderInner, channel: Arc<dyn DispatchChannel>) {
        inner.state = BindState::Connected;
        inner.channel = Some(channel);
        inner.gate.release();
        info!("Agent connected");
    }

    /// Drop the connection made by `attempt` if it is still the current one.
    fn connection_lost(&self, attempt: u64) {
        let mut inner = self.lock_inner();
        if inner.attempt == attempt && inner.state == BindState::Connected {
            Self::reset_locked(&mut inner);
            warn!("Agent connection lost");
        }
    }

    fn reset_locked(inner: &mut BinderInner) {
        inner.state = BindState::Unbound;
        inner.channel = None;
        inner.service = None;
        inner.attempt += 1;
        if inner.gate.is_released() {
            inner.gate = Arc::new(ChannelGate::new());
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, BinderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Channel handed out after a bind; reports transport loss back to the binder.
struct WatchedChannel {
    inner: Arc<dyn DispatchChannel>,
    binder: Weak<SecureServiceBinder>,
    attempt: u64,
}

#[async_trait::async_trait]
impl DispatchChannel for WatchedChannel {
    async fn dispatch(&self, app: &ContentApp, request: &RouteRequest) -> Result<String> {
        let result = self.inner.dispatch(app, request).await;
        if let Err(BridgeError::AgentConnectionLost { .. }) = &result {
            if let Some(binder) = self.binder.upgrade() {
                binder.connection_lost(self.attempt);
            }
        }
        result
    }
}

#[async_trait::async_trait]
impl ChannelProvider for SecureServiceBinder {
    async fn channel(&self) -> Option<Arc<dyn DispatchChannel>> {
        self.current_channel()
    }
}
