//! Line-delimited JSON-RPC transport.

pub mod framed;
pub mod framing;
pub mod pending;

pub use framed::{FramedTransport, Receipt, TransportOptions};
