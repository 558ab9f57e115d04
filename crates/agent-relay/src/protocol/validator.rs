//! JSON-RPC request validation.

use crate::types::{ProtocolError, ProtocolResult, Request, JSONRPC_VERSION};

/// Validate that a request is well-formed.
pub fn validate_request(request: &Request) -> ProtocolResult<()> {
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(ProtocolError::InvalidRequest(format!(
            "expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{}\"",
            request.jsonrpc
        )));
    }

    if request.method.is_empty() {
        return Err(ProtocolError::InvalidRequest(
            "method name must not be empty".to_string(),
        ));
    }

    Ok(())
}
