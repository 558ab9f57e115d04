//! Per-peer read side: decode inbound frames, dispatch, reply to the sender.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::protocol::Router;
use crate::types::{HubError, Message, RequestId};

use super::event_loop::HubHandle;
use super::peer::{Peer, PeerId};

/// Register `peer` with the hub and serve its inbound frames until the
/// stream ends or a read or write fails. Replies go to this peer only.
/// The peer is unregistered through the hub on the way out.
pub async fn serve_peer<S>(
    hub: HubHandle,
    router: Arc<Router>,
    peer: Arc<dyn Peer>,
    mut inbound: S,
) -> Result<PeerId, HubError>
where
    S: Stream<Item = Result<String, HubError>> + Unpin + Send,
{
    let id = hub.register(Arc::clone(&peer))?;

    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(peer = %id, "read ended: {e}");
                break;
            }
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let reply = match Message::decode(text) {
            Ok(Message::Request(request)) => router.handle(request).await,
            Ok(Message::Response(response)) => {
                tracing::debug!(peer = %id, id = %response.id, "ignoring response frame from peer");
                None
            }
            Err(e) => {
                tracing::warn!(peer = %id, "undecodable frame: {e}");
                Some(e.into_response(RequestId::Null))
            }
        };

        let Some(reply) = reply else { continue };
        let frame = match Message::Response(reply).encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(peer = %id, "cannot encode reply: {e}");
                continue;
            }
        };
        if let Err(e) = peer.send_text(&frame).await {
            tracing::debug!(peer = %id, "reply write failed: {e}");
            break;
        }
    }

    hub.unregister(id);
    Ok(id)
}
