//! Error codes and per-layer error types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{ErrorObject, RequestId, Response};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Wire error code. Anything outside the standard set is a provider-defined
/// application code and is carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    Application(i32),
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        use error_codes::*;
        match code {
            PARSE_ERROR => ErrorCode::ParseError,
            INVALID_REQUEST => ErrorCode::InvalidRequest,
            METHOD_NOT_FOUND => ErrorCode::MethodNotFound,
            INVALID_PARAMS => ErrorCode::InvalidParams,
            INTERNAL_ERROR => ErrorCode::InternalError,
            other => ErrorCode::Application(other),
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        use error_codes::*;
        match code {
            ErrorCode::ParseError => PARSE_ERROR,
            ErrorCode::InvalidRequest => INVALID_REQUEST,
            ErrorCode::MethodNotFound => METHOD_NOT_FOUND,
            ErrorCode::InvalidParams => INVALID_PARAMS,
            ErrorCode::InternalError => INTERNAL_ERROR,
            ErrorCode::Application(other) => other,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", i32::from(*self))
    }
}

/// Protocol-level failures: bad frames, bad requests, and errors that are
/// sent back over the wire.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),

    #[error("{message}")]
    Application {
        code: i32,
        message: String,
        data: Option<Value>,
    },
}

impl ProtocolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Parse(_) => ErrorCode::ParseError,
            ProtocolError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ProtocolError::MethodNotFound(_) => ErrorCode::MethodNotFound,
            ProtocolError::InvalidParams(_) => ErrorCode::InvalidParams,
            ProtocolError::Internal(_) => ErrorCode::InternalError,
            ProtocolError::Application { code, .. } => ErrorCode::from(*code),
        }
    }

    pub fn to_error_object(&self) -> ErrorObject {
        let data = match self {
            ProtocolError::Application { data, .. } => data.clone(),
            _ => None,
        };
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }

    pub fn into_response(self, id: RequestId) -> Response {
        Response::error(id, self.to_error_object())
    }
}

impl From<ErrorObject> for ProtocolError {
    fn from(error: ErrorObject) -> Self {
        match error.code {
            ErrorCode::ParseError => ProtocolError::Parse(error.message),
            ErrorCode::InvalidRequest => ProtocolError::InvalidRequest(error.message),
            ErrorCode::MethodNotFound => ProtocolError::MethodNotFound(error.message),
            ErrorCode::InvalidParams => ProtocolError::InvalidParams(error.message),
            ErrorCode::InternalError => ProtocolError::Internal(error.message),
            ErrorCode::Application(code) => ProtocolError::Application {
                code,
                message: error.message,
                data: error.data,
            },
        }
    }
}

/// Failures of a framed transport.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("request {0} cancelled: transport closed before a reply arrived")]
    Cancelled(RequestId),

    #[error("request {id} timed out after {after:?}")]
    Timeout { id: RequestId, after: Duration },

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures of a single provider connection.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("failed to spawn provider '{provider}': {source}")]
    Spawn {
        provider: String,
        #[source]
        source: std::io::Error,
    },

    #[error("provider '{provider}' did not expose its {stream} pipe")]
    MissingPipe {
        provider: String,
        stream: &'static str,
    },

    #[error("handshake with provider '{provider}' failed at {stage}: {reason}")]
    Handshake {
        provider: String,
        stage: &'static str,
        reason: String,
    },

    #[error("provider '{0}' is closed")]
    Closed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("provider error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Failures surfaced by the tool registry.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("provider '{0}' already connected")]
    AlreadyConnected(String),

    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("tool '{tool}' not found on provider '{provider}'")]
    ToolNotFound { provider: String, tool: String },

    #[error("failed to connect provider '{provider}': {source}")]
    Connect {
        provider: String,
        #[source]
        source: ClientError,
    },

    #[error("call to '{tool}' on provider '{provider}' failed: {source}")]
    CallFailed {
        provider: String,
        tool: String,
        #[source]
        source: ClientError,
    },

    #[error("refreshing tools of provider '{provider}' failed: {source}")]
    Refresh {
        provider: String,
        #[source]
        source: ClientError,
    },
}

/// Failures on the hub side.
#[derive(thiserror::Error, Debug)]
pub enum HubError {
    #[error("peer connection closed")]
    Closed,

    #[error("write to peer failed: {0}")]
    Write(String),

    #[error("peer made no progress within {0:?}")]
    WriteTimeout(std::time::Duration),

    #[error("read from peer failed: {0}")]
    Read(String),

    #[error("hub event loop has stopped")]
    Stopped,

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures loading provider configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(ErrorCode::from(-32601), ErrorCode::MethodNotFound);
        assert_eq!(ErrorCode::from(7), ErrorCode::Application(7));
        assert_eq!(i32::from(ErrorCode::InvalidParams), -32602);
        assert_eq!(serde_json::to_string(&ErrorCode::Application(-1)).unwrap(), "-1");
    }

    #[test]
    fn test_protocol_error_wire_shape() {
        let obj = ProtocolError::MethodNotFound("browser/fly".into()).to_error_object();
        assert_eq!(obj.code, ErrorCode::MethodNotFound);
        assert_eq!(obj.message, "method not found: browser/fly");

        let obj = ProtocolError::Internal("disk full".into()).to_error_object();
        assert_eq!(obj.message, "disk full");
    }

    #[test]
    fn test_error_object_conversion_keeps_application_codes() {
        let err = ProtocolError::from(ErrorObject::new(ErrorCode::Application(1001), "quota"));
        assert_eq!(err.code(), ErrorCode::Application(1001));
        assert_eq!(err.to_string(), "quota");
    }
}
