//! Agent binding handlers.

use super::shared::get_i64_param;
use crate::server::AppState;
use appbridge_core::config::BinderConfig;
use appbridge_core::InterruptToken;
use serde_json::{json, Value};
use std::time::Duration;

pub async fn bind_agent(state: &AppState, _params: &Value) -> appbridge_core::Result<Value> {
    let started = state.host.bind_agent();
    Ok(json!({ "started": started, "state": state.host.agent_state() }))
}

pub async fn unbind_agent(state: &AppState, _params: &Value) -> appbridge_core::Result<Value> {
    state.host.unbind_agent();
    Ok(json!({ "state": state.host.agent_state() }))
}

pub async fn agent_state(state: &AppState, _params: &Value) -> appbridge_core::Result<Value> {
    Ok(json!({
        "state": state.host.agent_state(),
        "service": state.host.agent_service(),
    }))
}

/// Wait up to `timeout_ms` (default: the binder connect timeout) for the agent.
pub async fn wait_for_agent(state: &AppState, params: &Value) -> appbridge_core::Result<Value> {
    let timeout = get_i64_param(params, "timeout_ms", "timeoutMs")
        .and_then(|ms| u64::try_from(ms).ok())
        .map(Duration::from_millis)
        .unwrap_or(BinderConfig::CONNECT_TIMEOUT);

    let token = InterruptToken::new();
    let connected = tokio::time::timeout(timeout, state.host.wait_for_agent(&token))
        .await
        .ok()
        .flatten()
        .is_some();
    Ok(json!({ "connected": connected, "state": state.host.agent_state() }))
}
