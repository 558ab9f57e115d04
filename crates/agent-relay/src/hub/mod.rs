//! Connection Hub: a single-owner peer set fed by channels.

pub mod event_loop;
pub mod peer;
pub mod session;

pub use event_loop::{Hub, HubConfig, HubHandle, DEFAULT_HEARTBEAT, DEFAULT_PEER_TIMEOUT};
pub use peer::{Peer, PeerId};
pub use session::serve_peer;
