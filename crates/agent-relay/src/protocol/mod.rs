//! JSON-RPC request validation and method dispatch.

pub mod router;
pub mod validator;

pub use router::{Params, Router};
pub use validator::validate_request;
