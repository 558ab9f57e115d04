//! `serve`: connect providers, start the hub, expose both over HTTP.

use std::sync::Arc;
use std::time::Duration;

use agent_relay::client::{ClientOptions, ToolRegistry};
use agent_relay::config::load_providers;
use agent_relay::hub::{Hub, HubConfig};

use crate::error::ServerError;
use crate::events;
use crate::http::{self, AppState};
use crate::methods::build_router;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8090";
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub addr: String,
    pub config: Option<String>,
    pub heartbeat: Duration,
    /// `None` waits for provider replies indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            config: None,
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        }
    }
}

/// Seconds to an optional timeout; zero disables it.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

pub async fn run(options: ServeOptions) -> Result<(), ServerError> {
    let providers = load_providers(options.config.as_deref())?;

    let registry = Arc::new(ToolRegistry::new(ClientOptions {
        request_timeout: options.request_timeout,
        ..Default::default()
    }));
    let (hub, hub_task) = Hub::spawn(HubConfig {
        heartbeat: options.heartbeat,
        ..Default::default()
    });

    let failures = registry.connect_all(&providers).await;
    tracing::info!(
        connected = registry.len(),
        failed = failures.len(),
        "providers started"
    );

    let router = Arc::new(build_router(Arc::clone(&registry), hub.clone()));
    events::publish_providers(&hub, &registry);

    let state = AppState {
        hub,
        router,
        registry: Arc::clone(&registry),
    };
    let served = http::serve(&options.addr, state, shutdown_signal()).await;

    registry.shutdown().await;
    if tokio::time::timeout(Duration::from_secs(2), hub_task).await.is_err() {
        tracing::debug!("hub still has live sessions at exit");
    }
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
