//! Agent Relay: JSON-RPC plumbing between agents and tool providers.
//!
//! Providers are subprocesses speaking line-delimited JSON-RPC on stdio;
//! peers are duplex network connections fanned out through a hub.

pub mod client;
pub mod config;
pub mod hub;
pub mod protocol;
pub mod transport;
pub mod types;

pub use client::{ClientOptions, ConnectionStatus, ToolConnection, ToolRegistry};
pub use config::{load_providers, resolve_config_path, ProviderConfig, ProvidersConfig};
pub use hub::{serve_peer, Hub, HubConfig, HubHandle, Peer, PeerId};
pub use protocol::{Params, Router};
pub use transport::FramedTransport;
pub use types::*;
