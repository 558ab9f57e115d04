//! Tool Registry: naming, lookup, and failure isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use agent_relay::client::{ClientOptions, ConnectionStatus, ToolConnection, ToolRegistry};
use agent_relay::config::{ProviderConfig, ProvidersConfig};
use agent_relay::types::*;

use common::{spawn_provider, standard_script, tool};

// ─────────────────────── helpers ───────────────────────

async fn fake_connection(name: &str, tools: &[&str]) -> ToolConnection {
    let provider = spawn_provider(standard_script(tools.iter().map(|t| tool(t)).collect()));
    ToolConnection::over_streams(name, provider.reader, provider.writer, &ClientOptions::default())
        .await
        .unwrap()
}

fn missing_binary() -> ProviderConfig {
    ProviderConfig::new("/nonexistent/agent-relay-provider")
}

// ─────────────────────── naming ───────────────────────

#[tokio::test]
async fn test_duplicate_name_leaves_existing_connection_untouched() {
    let registry = ToolRegistry::default();
    let original = registry
        .attach(fake_connection("alpha", &["echo"]).await)
        .unwrap();

    let err = registry.connect("alpha", &missing_binary()).await.unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyConnected(ref n) if n == "alpha"));

    let err = registry
        .attach(fake_connection("alpha", &[]).await)
        .unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyConnected(_)));

    let current = registry.get("alpha").unwrap();
    assert!(Arc::ptr_eq(&original, &current));
    assert_eq!(current.status(), ConnectionStatus::Ready);
    assert_eq!(registry.list_tools("alpha").unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_connect_leaves_no_trace() {
    let registry = ToolRegistry::default();

    let err = registry.connect("ghost", &missing_binary()).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Connect {
            source: ClientError::Spawn { .. },
            ..
        }
    ));
    assert!(registry.is_empty());
    assert!(registry.list_providers().is_empty());

    // The name is free again.
    let err = registry.connect("ghost", &missing_binary()).await.unwrap_err();
    assert!(matches!(err, RegistryError::Connect { .. }));
}

#[tokio::test]
async fn test_connect_all_reports_failures() {
    let registry = ToolRegistry::default();
    let mut config = ProvidersConfig::default();
    config.providers.insert("one".into(), missing_binary());
    config.providers.insert("two".into(), missing_binary());

    let failures = registry.connect_all(&config).await;
    let names: Vec<&str> = failures.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["one", "two"]);
    assert!(registry.is_empty());
}

// ─────────────────────── calls ───────────────────────

#[tokio::test]
async fn test_unknown_provider_and_tool() {
    let registry = ToolRegistry::default();
    registry
        .attach(fake_connection("alpha", &["echo"]).await)
        .unwrap();

    let err = registry.call_tool("beta", "echo", None).await.unwrap_err();
    assert!(matches!(err, RegistryError::ProviderNotFound(ref n) if n == "beta"));
    assert!(matches!(
        registry.list_tools("beta"),
        Err(RegistryError::ProviderNotFound(_))
    ));

    let err = registry.call_tool("alpha", "launch", None).await.unwrap_err();
    assert!(matches!(err, RegistryError::ToolNotFound { ref tool, .. } if tool == "launch"));

    // Lookups have no side effects.
    assert_eq!(registry.list_providers(), ["alpha"]);
}

#[tokio::test]
async fn test_calls_route_to_the_named_provider() {
    let registry = ToolRegistry::default();
    registry
        .attach(fake_connection("alpha", &["echo", "fail"]).await)
        .unwrap();
    registry
        .attach(fake_connection("beta", &["echo"]).await)
        .unwrap();

    let ok = registry
        .call_tool("beta", "echo", Some(json!({"text": "x"})))
        .await
        .unwrap();
    assert!(ok.success);

    // Application failures are outcomes, not registry errors.
    let failed = registry.call_tool("alpha", "fail", None).await.unwrap();
    assert!(!failed.success);
    assert_eq!(registry.status("alpha"), Some(ConnectionStatus::Ready));
}

#[tokio::test]
async fn test_transport_failure_becomes_call_failed() {
    let registry = ToolRegistry::default();
    let conn = registry
        .attach(fake_connection("alpha", &["echo"]).await)
        .unwrap();
    conn.close().await;

    let err = registry.call_tool("alpha", "echo", None).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::CallFailed {
            source: ClientError::Transport(TransportError::Closed),
            ..
        }
    ));
    assert_eq!(registry.status("alpha"), Some(ConnectionStatus::Closed));
    assert!(!registry.is_healthy());
}

#[tokio::test]
async fn test_closed_entry_can_be_replaced() {
    let registry = ToolRegistry::default();
    let dead = registry
        .attach(fake_connection("alpha", &["echo"]).await)
        .unwrap();
    dead.close().await;

    // A failed reconnect keeps the closed entry listed.
    let err = registry.connect("alpha", &missing_binary()).await.unwrap_err();
    assert!(matches!(err, RegistryError::Connect { .. }));
    assert_eq!(registry.status("alpha"), Some(ConnectionStatus::Closed));

    let fresh = registry
        .attach(fake_connection("alpha", &["echo", "other"]).await)
        .unwrap();
    assert!(!Arc::ptr_eq(&dead, &fresh));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.status("alpha"), Some(ConnectionStatus::Ready));
    assert_eq!(registry.list_tools("alpha").unwrap().len(), 2);
    assert!(registry.is_healthy());
}

// ─────────────────────── inventory ───────────────────────

#[tokio::test]
async fn test_summaries_and_catalogs() {
    let registry = ToolRegistry::default();
    assert!(registry.is_healthy());

    registry
        .attach(fake_connection("zeta", &["a"]).await)
        .unwrap();
    registry
        .attach(fake_connection("alpha", &["b", "c"]).await)
        .unwrap();

    let summaries = registry.summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].name, "alpha");
    assert_eq!(summaries[0].tool_count, 2);
    assert_eq!(summaries[1].status, ConnectionStatus::Ready);
    assert_eq!(
        serde_json::to_value(&summaries[1]).unwrap(),
        json!({"name": "zeta", "status": "ready", "tool_count": 1})
    );

    let all = registry.all_tools();
    assert_eq!(all.keys().collect::<Vec<_>>(), ["alpha", "zeta"]);
    assert_eq!(all["zeta"][0].name, "a");

    assert_eq!(registry.refresh_tools("alpha").await.unwrap(), 2);
    assert!(matches!(
        registry.refresh_tools("nope").await,
        Err(RegistryError::ProviderNotFound(_))
    ));
    assert!(registry.is_healthy());
}

#[tokio::test]
async fn test_disconnect_and_shutdown() {
    let registry = ToolRegistry::default();
    let alpha = registry
        .attach(fake_connection("alpha", &["echo"]).await)
        .unwrap();
    registry
        .attach(fake_connection("beta", &["echo"]).await)
        .unwrap();

    assert!(registry.disconnect("alpha").await);
    assert!(!registry.disconnect("alpha").await);
    assert_eq!(alpha.status(), ConnectionStatus::Closed);
    assert_eq!(registry.status("alpha"), None);

    let beta = registry.get("beta").unwrap();
    registry.shutdown().await;
    assert!(registry.is_empty());
    assert_eq!(beta.status(), ConnectionStatus::Closed);
}

#[cfg(unix)]
#[tokio::test]
async fn test_connect_in_flight_reserves_the_name() {
    let slow = ProviderConfig::new("sh").arg("-c").arg(
        r#"
read line
sleep 0.3
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}'
cat > /dev/null
"#,
    );
    let registry = ToolRegistry::default();

    let (first, second) = tokio::join!(registry.connect("slow", &slow), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.connect("slow", &missing_binary()).await
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(RegistryError::AlreadyConnected(_))));
    assert_eq!(registry.list_providers(), ["slow"]);
    registry.shutdown().await;
}
