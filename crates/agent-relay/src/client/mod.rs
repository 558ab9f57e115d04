//! Provider client: subprocess lifecycle, per-provider connections, and the
//! registry that owns them.

pub mod connection;
pub mod process;
pub mod registry;

pub use connection::{ClientOptions, ConnectionStatus, ToolConnection};
pub use process::ProviderProcess;
pub use registry::{ProviderSummary, ToolRegistry};
