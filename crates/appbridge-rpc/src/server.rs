//! HTTP server implementation using Axum.

use crate::handlers::{handle_health, handle_rpc};
use appbridge_core::ContentAppHost;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// In-flight RPC requests allowed at once.
const MAX_CONCURRENT_REQUESTS: usize = 64;

/// Application state shared across handlers.
pub struct AppState {
    pub host: ContentAppHost,
    shutdown: Notify,
}

impl AppState {
    pub fn new(host: ContentAppHost) -> Self {
        Self {
            host,
            shutdown: Notify::new(),
        }
    }

    /// Ask the main task to exit.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once [`request_shutdown`](Self::request_shutdown) has been called.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }
}

/// Build the axum router for `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Configure CORS for local tooling
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0)
/// and the shared state.
pub async fn start_server(
    host: ContentAppHost,
    bind_host: &str,
    port: u16,
) -> anyhow::Result<(SocketAddr, Arc<AppState>)> {
    let state = Arc::new(AppState::new(host));
    let app = build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind_host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_server_starts() {
        let temp_dir = TempDir::new().unwrap();
        let host = ContentAppHost::open(temp_dir.path()).await.unwrap();

        let (addr, _state) = start_server(host, "127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_health_route() {
        let temp_dir = TempDir::new().unwrap();
        let host = ContentAppHost::open(temp_dir.path()).await.unwrap();
        let app = build_router(Arc::new(AppState::new(host)));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rpc_route_rejects_get() {
        let temp_dir = TempDir::new().unwrap();
        let host = ContentAppHost::open(temp_dir.path()).await.unwrap();
        let app = build_router(Arc::new(AppState::new(host)));

        let response = app
            .oneshot(Request::get("/rpc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_shutdown_request_is_remembered() {
        let temp_dir = TempDir::new().unwrap();
        let host = ContentAppHost::open(temp_dir.path()).await.unwrap();
        let state = AppState::new(host);

        state.request_shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), state.shutdown_requested())
            .await
            .unwrap();
    }
}
