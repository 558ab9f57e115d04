//! HTTP surface: WebSocket upgrades into the hub, and /health.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::{IntoResponse, Json as AxumJson, Response},
    routing::get,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use agent_relay::client::ToolRegistry;
use agent_relay::hub::HubHandle;
use agent_relay::protocol::Router;

use crate::error::ServerError;
use crate::websocket;

/// Shared server state passed to all handlers via axum State.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub router: Arc<Router>,
    pub registry: Arc<ToolRegistry>,
}

pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/ws/a2a", get(handle_a2a))
        .route("/ws/browser", get(handle_browser))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    tracing::info!("HTTP transport listening on {addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)
}

async fn handle_a2a(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| websocket::serve_socket(socket, state, "a2a"))
        .into_response()
}

async fn handle_browser(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| websocket::serve_socket(socket, state, "browser"))
        .into_response()
}

/// Health check endpoint.
pub async fn handle_health(State(state): State<AppState>) -> AxumJson<Value> {
    let status = if state.registry.is_healthy() {
        "ok"
    } else {
        "degraded"
    };
    AxumJson(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "peers": state.hub.peer_count(),
        "providers": state.registry.summaries(),
    }))
}
