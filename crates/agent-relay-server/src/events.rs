//! Events pushed to every hub peer.

use serde_json::json;

use agent_relay::client::ToolRegistry;
use agent_relay::hub::HubHandle;
use agent_relay::types::{Message, Request};

pub const PROVIDERS_EVENT: &str = "notifications/providers";

/// Provider status snapshot as a notification.
pub fn providers_event(registry: &ToolRegistry) -> Message {
    Message::Request(Request::notification(
        PROVIDERS_EVENT,
        Some(json!({
            "providers": registry.summaries(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    ))
}

pub fn publish_providers(hub: &HubHandle, registry: &ToolRegistry) {
    if let Err(e) = hub.broadcast(&providers_event(registry)) {
        tracing::warn!("cannot publish provider status: {e}");
    }
}
