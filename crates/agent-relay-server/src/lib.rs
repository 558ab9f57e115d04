//! Agent Relay server: tool providers over stdio, agents and browsers over
//! WebSocket.

pub mod error;
pub mod events;
pub mod http;
pub mod methods;
pub mod repl;
pub mod server;
pub mod websocket;

pub use error::ServerError;
pub use http::AppState;
pub use methods::build_router;
pub use server::ServeOptions;
