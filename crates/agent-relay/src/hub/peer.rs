//! Peer abstraction: anything the hub can write frames and pings to.

use async_trait::async_trait;

use crate::types::HubError;

/// Hub-assigned peer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub(crate) u64);

impl PeerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Outbound half of a duplex peer connection.
///
/// Both the hub loop and the peer's own read loop write through this, so
/// implementations must serialize writes internally.
#[async_trait]
pub trait Peer: Send + Sync {
    /// Write one text frame.
    async fn send_text(&self, text: &str) -> Result<(), HubError>;

    /// Write a liveness ping.
    async fn send_ping(&self) -> Result<(), HubError>;

    /// Close the connection. Must tolerate being called more than once.
    async fn close(&self);
}
