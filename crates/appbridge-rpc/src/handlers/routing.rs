//! Cluster request routing handlers.

use super::shared::{get_str_param, require_endpoint_param, require_uint_param};
use crate::server::AppState;
use appbridge_core::router::Resolution;
use serde_json::{json, Value};

/// Payloads may arrive as a JSON string or as a structured value.
fn payload_param(params: &Value) -> String {
    match params.get("payload") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub async fn send_command(state: &AppState, params: &Value) -> appbridge_core::Result<Value> {
    let endpoint_id = require_endpoint_param(params)?;
    let cluster_id = require_uint_param::<u32>(params, "cluster_id", "clusterId")?;
    let command_id = require_uint_param::<u32>(params, "command_id", "commandId")?;
    let payload = payload_param(params);

    let response = state
        .host
        .send_command(endpoint_id, cluster_id, command_id, payload)
        .await?;
    Ok(json!({ "response": response }))
}

pub async fn read_attribute(state: &AppState, params: &Value) -> appbridge_core::Result<Value> {
    let endpoint_id = require_endpoint_param(params)?;
    let cluster_id = require_uint_param::<u32>(params, "cluster_id", "clusterId")?;
    let attribute_id = require_uint_param::<u32>(params, "attribute_id", "attributeId")?;

    let response = state
        .host
        .read_attribute(endpoint_id, cluster_id, attribute_id)
        .await?;
    Ok(json!({ "response": response }))
}

pub async fn resolve_endpoint(state: &AppState, params: &Value) -> appbridge_core::Result<Value> {
    let endpoint_id = require_endpoint_param(params)?;
    let resolved = match state.host.resolve(endpoint_id) {
        Resolution::Live(app) => json!({ "status": "live", "app_name": app.name }),
        Resolution::Absent { app_name } => json!({ "status": "absent", "app_name": app_name }),
        Resolution::Unknown => json!({ "status": "unknown" }),
    };
    if let Some(expected) = get_str_param(params, "app_name", "appName") {
        let matches = resolved.get("app_name").and_then(|v| v.as_str()) == Some(expected);
        return Ok(json!({ "resolution": resolved, "matches": matches }));
    }
    Ok(json!({ "resolution": resolved }))
}
