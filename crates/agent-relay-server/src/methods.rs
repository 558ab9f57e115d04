//! Hub method set backed by the tool registry.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use agent_relay::client::ToolRegistry;
use agent_relay::hub::HubHandle;
use agent_relay::protocol::{Params, Router};
use agent_relay::types::{ProtocolError, RegistryError};

use crate::events;

#[derive(Debug, Default, Deserialize)]
struct ListToolsParams {
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    provider: String,
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    provider: String,
}

/// Lookup failures are the caller's fault; anything else is internal.
fn registry_error(error: RegistryError) -> anyhow::Error {
    match error {
        RegistryError::ProviderNotFound(_) | RegistryError::ToolNotFound { .. } => {
            ProtocolError::InvalidParams(error.to_string()).into()
        }
        other => other.into(),
    }
}

/// Build the router served to every hub peer.
pub fn build_router(registry: Arc<ToolRegistry>, hub: HubHandle) -> Router {
    let mut router = Router::new();

    router.register("ping", |_params: Params| async move {
        Ok(json!({"pong": true, "timestamp": chrono::Utc::now().to_rfc3339()}))
    });

    let reg = Arc::clone(&registry);
    router.register("providers/list", move |_params: Params| {
        let reg = Arc::clone(&reg);
        async move { Ok(json!({"providers": reg.summaries()})) }
    });

    let reg = Arc::clone(&registry);
    router.register("tools/list", move |params: Params| {
        let reg = Arc::clone(&reg);
        async move {
            let p: ListToolsParams = params.parse()?;
            match p.provider {
                Some(provider) => {
                    let tools = reg.list_tools(&provider).map_err(registry_error)?;
                    Ok(json!({"provider": provider, "tools": tools}))
                }
                None => Ok(json!({"providers": reg.all_tools()})),
            }
        }
    });

    let reg = Arc::clone(&registry);
    router.register("tools/call", move |params: Params| {
        let reg = Arc::clone(&reg);
        async move {
            let p: CallToolParams = params.parse()?;
            let outcome = reg
                .call_tool(&p.provider, &p.name, p.arguments)
                .await
                .map_err(registry_error)?;
            Ok(serde_json::to_value(outcome)?)
        }
    });

    let reg = Arc::clone(&registry);
    router.register("tools/refresh", move |params: Params| {
        let reg = Arc::clone(&reg);
        let hub = hub.clone();
        async move {
            let p: RefreshParams = params.parse()?;
            let count = reg
                .refresh_tools(&p.provider)
                .await
                .map_err(registry_error)?;
            events::publish_providers(&hub, &reg);
            Ok(json!({"provider": p.provider, "tools": count}))
        }
    });

    router
}
