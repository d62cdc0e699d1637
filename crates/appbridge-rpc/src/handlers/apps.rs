//! Discovery and endpoint handlers.

use super::shared::require_str_param;
use crate::server::AppState;
use appbridge_core::BridgeError;
use serde_json::{json, Value};

pub async fn list_apps(state: &AppState, _params: &Value) -> appbridge_core::Result<Value> {
    let apps = state.host.apps();
    Ok(json!({ "apps": serde_json::to_value(apps)? }))
}

pub async fn get_app(state: &AppState, params: &Value) -> appbridge_core::Result<Value> {
    let name = require_str_param(params, "app_name", "appName")?;
    let app = state
        .host
        .discovery()
        .get(&name)
        .ok_or(BridgeError::AppNotFound { name })?;
    Ok(serde_json::to_value(app)?)
}

pub async fn list_endpoints(state: &AppState, _params: &Value) -> appbridge_core::Result<Value> {
    let endpoints = state.host.list_endpoints();
    Ok(json!({ "endpoints": serde_json::to_value(endpoints)? }))
}

pub async fn assign_endpoint(state: &AppState, params: &Value) -> appbridge_core::Result<Value> {
    let name = require_str_param(params, "app_name", "appName")?;
    let endpoint_id = state.host.ensure_endpoint(&name)?;
    Ok(json!({ "app_name": name, "endpoint_id": endpoint_id }))
}

pub async fn reset_endpoint(state: &AppState, params: &Value) -> appbridge_core::Result<Value> {
    let name = require_str_param(params, "app_name", "appName")?;
    let removed = state.host.reset_endpoint(&name)?;
    Ok(json!({ "removed": removed }))
}

pub async fn rescan(state: &AppState, _params: &Value) -> appbridge_core::Result<Value> {
    let count = state.host.rescan()?;
    Ok(json!({ "apps": count }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{install, rpc_call, test_state};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_apps_and_endpoints() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "vid-lib", 1);
        install(temp_dir.path(), "news-app", 2);
        let state = test_state(&temp_dir).await;

        let result = rpc_call(&state, "list_apps", json!({})).await.unwrap();
        let apps = result["apps"].as_array().unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0]["name"], "news-app");
        assert_eq!(apps[1]["name"], "vid-lib");

        let result = rpc_call(&state, "list_endpoints", json!({})).await.unwrap();
        let endpoints = result["endpoints"].as_object().unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints["vid-lib"]["vendor_id"], 1);
    }

    #[tokio::test]
    async fn test_get_app() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "vid-lib", 7);
        let state = test_state(&temp_dir).await;

        let app = rpc_call(&state, "get_app", json!({"appName": "vid-lib"}))
            .await
            .unwrap();
        assert_eq!(app["vendor_id"], 7);

        let err = rpc_call(&state, "get_app", json!({"app_name": "ghost"}))
            .await
            .unwrap_err();
        assert_eq!(err["code"], -32002);
    }

    #[tokio::test]
    async fn test_assign_and_reset_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "vid-lib", 1);
        let state = test_state(&temp_dir).await;

        let result = rpc_call(&state, "assign_endpoint", json!({"app_name": "vid-lib"}))
            .await
            .unwrap();
        let endpoint_id = result["endpoint_id"].as_u64().unwrap();
        assert!(endpoint_id >= 4);

        let result = rpc_call(&state, "reset_endpoint", json!({"app_name": "vid-lib"}))
            .await
            .unwrap();
        assert_eq!(result["removed"], true);

        let result = rpc_call(&state, "reset_endpoint", json!({"app_name": "vid-lib"}))
            .await
            .unwrap();
        assert_eq!(result["removed"], false);
    }

    #[tokio::test]
    async fn test_assign_endpoint_requires_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir).await;

        let err = rpc_call(&state, "assign_endpoint", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err["code"], -32602);
    }

    #[tokio::test]
    async fn test_rescan_picks_up_new_packages() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir).await;

        install(temp_dir.path(), "late-app", 3);
        let result = rpc_call(&state, "rescan", json!({})).await.unwrap();
        assert_eq!(result["apps"], 1);

        let endpoints = rpc_call(&state, "list_endpoints", json!({})).await.unwrap();
        assert!(endpoints["endpoints"]["late-app"].is_object());
    }
}
