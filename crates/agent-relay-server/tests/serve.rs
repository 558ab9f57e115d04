//! `serve` startup failures and the HTTP listener.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use agent_relay::client::ToolRegistry;
use agent_relay::hub::{Hub, HubConfig};
use agent_relay::types::ConfigError;

use agent_relay_server::server::{self, timeout_from_secs, ServeOptions};
use agent_relay_server::{build_router, http, AppState, ServerError};

fn state() -> AppState {
    let registry = Arc::new(ToolRegistry::default());
    let (hub, _task) = Hub::spawn(HubConfig {
        heartbeat: Duration::ZERO,
        ..Default::default()
    });
    let router = Arc::new(build_router(Arc::clone(&registry), hub.clone()));
    AppState {
        hub,
        router,
        registry,
    }
}

#[test]
fn test_zero_timeout_disables_it() {
    assert_eq!(timeout_from_secs(0), None);
    assert_eq!(timeout_from_secs(5), Some(Duration::from_secs(5)));
    assert_eq!(
        ServeOptions::default().request_timeout,
        Some(Duration::from_secs(120))
    );
}

#[tokio::test]
async fn test_missing_explicit_config_fails_before_listening() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("providers.json");

    let err = server::run(ServeOptions {
        config: Some(missing.display().to_string()),
        ..Default::default()
    })
    .await
    .unwrap_err();

    assert!(matches!(err, ServerError::Config(ConfigError::Io { .. })));
}

#[tokio::test]
async fn test_malformed_config_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{{\"providers\": [").unwrap();

    let err = server::run(ServeOptions {
        config: Some(file.path().display().to_string()),
        ..Default::default()
    })
    .await
    .unwrap_err();

    assert!(matches!(err, ServerError::Config(ConfigError::Parse { .. })));
}

#[tokio::test]
async fn test_bad_listen_address() {
    let err = http::serve("not-an-address", state(), std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Bind { ref addr, .. } if addr == "not-an-address"));
}

#[tokio::test]
async fn test_serve_stops_on_shutdown() {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(http::serve("127.0.0.1:0", state(), async move {
        let _ = rx.await;
    }));

    tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server shuts down")
        .unwrap();
    assert!(result.is_ok());
}
