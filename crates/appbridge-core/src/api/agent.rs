//! Agent binding methods for ContentAppHost.

use crate::binder::{BindState, ServiceCandidate};
use crate::cancel::InterruptToken;
use crate::router::DispatchChannel;
use crate::ContentAppHost;
use std::sync::Arc;

impl ContentAppHost {
    /// Start binding to the trusted agent. `false` means no trusted agent.
    pub fn bind_agent(&self) -> bool {
        self.binder.bind()
    }

    pub fn unbind_agent(&self) {
        self.binder.unbind();
    }

    pub fn agent_state(&self) -> BindState {
        self.binder.state()
    }

    pub fn agent_service(&self) -> Option<ServiceCandidate> {
        self.binder.bound_service()
    }

    /// Block until the agent is connected or `token` is interrupted.
    pub async fn wait_for_agent(&self, token: &InterruptToken) -> Option<Arc<dyn DispatchChannel>> {
        self.binder.wait_for_channel(token).await
    }
}
