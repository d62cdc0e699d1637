//! JSON-RPC request handlers.

mod agent;
mod apps;
mod routing;
mod shared;

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data,
            }),
            id,
        }
    }
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    if method == "shutdown" {
        state.request_shutdown();
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(
                id,
                json!({"status": "shutting_down"}),
            )),
        );
    }

    match dispatch_method(&state, method, &params).await {
        Ok(value) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Err(e) => {
            error!("RPC error for {}: {}", method, e);
            let data = e.is_retryable().then(|| json!({"retryable": true}));
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(
                    id,
                    e.to_rpc_error_code(),
                    e.to_string(),
                    data,
                )),
            )
        }
    }
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate domain handler.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> appbridge_core::Result<Value> {
    match method {
        // Discovery & endpoints
        "list_apps" => apps::list_apps(state, params).await,
        "get_app" => apps::get_app(state, params).await,
        "list_endpoints" => apps::list_endpoints(state, params).await,
        "assign_endpoint" => apps::assign_endpoint(state, params).await,
        "reset_endpoint" => apps::reset_endpoint(state, params).await,
        "rescan" => apps::rescan(state, params).await,

        // Routing
        "send_command" => routing::send_command(state, params).await,
        "read_attribute" => routing::read_attribute(state, params).await,
        "resolve_endpoint" => routing::resolve_endpoint(state, params).await,

        // Agent binding
        "bind_agent" => agent::bind_agent(state, params).await,
        "unbind_agent" => agent::unbind_agent(state, params).await,
        "agent_state" => agent::agent_state(state, params).await,
        "wait_for_agent" => agent::wait_for_agent(state, params).await,

        _ => {
            warn!("Method not found: {}", method);
            Err(appbridge_core::BridgeError::MethodNotFound {
                method: method.to_string(),
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::server::build_router;
    use appbridge_core::ContentAppHost;
    use axum::body::Body;
    use axum::http::Request;
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    pub(crate) const CAPS: &str =
        r#"{"clusters": [{"identifier": 1289, "commands": [0]}, {"identifier": 1290}]}"#;

    /// Write a package manifest and its capability resource under `data_dir`.
    pub(crate) fn install(data_dir: &Path, package: &str, vendor_id: u16) {
        let packages = data_dir.join("packages");
        std::fs::create_dir_all(packages.join("caps")).unwrap();
        let manifest = json!({
            "package": package,
            "vendor_name": "Vendor",
            "vendor_id": vendor_id,
            "product_id": 1,
            "version": "1.0",
            "capability_resource": format!("caps/{}.json", package),
        });
        std::fs::write(
            packages.join(format!("{}.json", package)),
            manifest.to_string(),
        )
        .unwrap();
        std::fs::write(packages.join("caps").join(format!("{}.json", package)), CAPS).unwrap();
    }

    pub(crate) async fn test_state(temp_dir: &TempDir) -> Arc<AppState> {
        let host = ContentAppHost::open(temp_dir.path()).await.unwrap();
        Arc::new(AppState::new(host))
    }

    /// Post a JSON-RPC call through the router and return the full payload.
    pub(crate) async fn rpc_call_raw(state: &Arc<AppState>, method: &str, params: Value) -> Value {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        let request = Request::post("/rpc")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Post a JSON-RPC call and return its result, or the error object.
    pub(crate) async fn rpc_call(
        state: &Arc<AppState>,
        method: &str,
        params: Value,
    ) -> Result<Value, Value> {
        let json = rpc_call_raw(state, method, params).await;
        if let Some(error) = json.get("error") {
            return Err(error.clone());
        }
        Ok(json.get("result").cloned().unwrap_or(Value::Null))
    }

    #[test]
    fn test_json_rpc_response_success() {
        let response = JsonRpcResponse::success(Some(json!(1)), json!({"data": "test"}));
        assert!(response.error.is_none());
        assert!(response.result.is_some());
    }

    #[test]
    fn test_json_rpc_response_error() {
        let response = JsonRpcResponse::error(Some(json!(1)), -32600, "Test error".into(), None);
        assert!(response.error.is_some());
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_health_check_method() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir).await;

        let result = rpc_call(&state, "health_check", json!({})).await.unwrap();
        assert_eq!(result["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir).await;

        let raw = rpc_call_raw(&state, "no_such_method", json!({})).await;
        assert_eq!(raw["id"], 1);
        assert_eq!(raw["error"]["code"], -32601);
        assert!(raw["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no_such_method"));
    }

    #[tokio::test]
    async fn test_shutdown_method_signals_main_task() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir).await;

        let result = rpc_call(&state, "shutdown", json!({})).await.unwrap();
        assert_eq!(result["status"], "shutting_down");
        tokio::time::timeout(std::time::Duration::from_secs(1), state.shutdown_requested())
            .await
            .unwrap();
    }
}
