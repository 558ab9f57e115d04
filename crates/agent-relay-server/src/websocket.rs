//! WebSocket peers for the hub.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{BoxStream, SplitSink, SplitStream};
use futures::{future, SinkExt, StreamExt};
use tokio::sync::Mutex;

use agent_relay::hub::{serve_peer, Peer};
use agent_relay::types::HubError;

use crate::http::AppState;

/// Outbound half of an upgraded socket. The hub loop and the session both
/// write through it, so the sink sits behind a lock.
pub struct WsPeer {
    sink: Mutex<SplitSink<WebSocket, WsMessage>>,
}

impl WsPeer {
    pub fn new(sink: SplitSink<WebSocket, WsMessage>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    async fn send(&self, message: WsMessage) -> Result<(), HubError> {
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| HubError::Write(e.to_string()))
    }
}

#[async_trait]
impl Peer for WsPeer {
    async fn send_text(&self, text: &str) -> Result<(), HubError> {
        self.send(WsMessage::Text(text.to_string())).await
    }

    async fn send_ping(&self) -> Result<(), HubError> {
        self.send(WsMessage::Ping(Vec::new())).await
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
    }
}

/// Text frames from the socket, ending at the first close frame.
pub fn inbound(stream: SplitStream<WebSocket>) -> BoxStream<'static, Result<String, HubError>> {
    stream
        .take_while(|msg| future::ready(!matches!(msg, Ok(WsMessage::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(WsMessage::Text(text)) => Some(Ok(text)),
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!("dropping non-UTF-8 binary frame");
                        None
                    }
                },
                // Pings are answered by axum; pongs need nothing.
                Ok(_) => None,
                Err(e) => Some(Err(HubError::Read(e.to_string()))),
            })
        })
        .boxed()
}

/// Run one upgraded socket as a hub peer until it disconnects.
pub async fn serve_socket(socket: WebSocket, state: AppState, channel: &'static str) {
    let (sink, stream) = socket.split();
    let peer: Arc<dyn Peer> = Arc::new(WsPeer::new(sink));

    match serve_peer(state.hub, state.router, peer, inbound(stream)).await {
        Ok(id) => tracing::debug!(peer = %id, channel, "socket session ended"),
        Err(e) => tracing::warn!(channel, "socket rejected: {e}"),
    }
}
