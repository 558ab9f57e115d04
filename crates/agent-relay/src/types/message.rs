//! JSON-RPC 2.0 message model shared by the provider client and the hub.
//!
//! A [`Message`] is either a [`Request`] (a notification is a request with no
//! `id`) or a [`Response`] carrying exactly one of `result` / `error`.
//! Encoding is compact and field order is fixed, so a well-formed frame
//! re-encodes to the same bytes it was decoded from.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ErrorCode, ProtocolError};

/// JSON-RPC 2.0 protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier: a number, a string, or null.
///
/// Identifiers allocated by this crate are always numbers; strings and null
/// are accepted from peers and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl TryFrom<Value> for RequestId {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(RequestId::Null),
            Value::String(s) => Ok(RequestId::String(s)),
            Value::Number(n) => n.as_i64().map(RequestId::Number).ok_or_else(|| {
                ProtocolError::InvalidRequest(format!("id must be an integer, got {n}"))
            }),
            other => Err(ProtocolError::InvalidRequest(format!(
                "id must be a number, string or null, got {other}"
            ))),
        }
    }
}

/// A request, or a notification when `id` is absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// True iff no reply must ever be produced for this request.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Error object within an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: ErrorCode,
    pub message: String,
    /// `Some(Value::Null)` for an explicit `"data":null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The outcome carried by a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Result(Value),
    Error(ErrorObject),
}

/// A response echoing the identifier of the request that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub jsonrpc: String,
    pub id: RequestId,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn error(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self.payload {
            ResponsePayload::Result(value) => Ok(value),
            ResponsePayload::Error(error) => Err(error),
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Response", 3)?;
        state.serialize_field("jsonrpc", &self.jsonrpc)?;
        state.serialize_field("id", &self.id)?;
        match &self.payload {
            ResponsePayload::Result(value) => state.serialize_field("result", value)?,
            ResponsePayload::Error(error) => state.serialize_field("error", error)?,
        }
        state.end()
    }
}

/// Any frame on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    /// Decode one frame. Malformed JSON is a parse error; valid JSON with the
    /// wrong shape is an invalid request.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawMessage =
            serde_json::from_str(text).map_err(|e| ProtocolError::Parse(e.to_string()))?;
        raw.into_message()
    }

    /// Encode as a single compact JSON line without the trailing newline.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Message::Request(request) if request.is_notification())
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Message::Request(request) => request.serialize(serializer),
            Message::Response(response) => response.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawMessage::deserialize(deserializer)?
            .into_message()
            .map_err(de::Error::custom)
    }
}

/// Flat view of a frame used to classify it. `present` distinguishes an
/// explicit `null` from an absent field.
#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default, deserialize_with = "present")]
    params: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl RawMessage {
    fn into_message(self) -> Result<Message, ProtocolError> {
        let jsonrpc = self.jsonrpc.unwrap_or_default();

        if let Some(method) = self.method {
            let id = self.id.map(RequestId::try_from).transpose()?;
            return Ok(Message::Request(Request {
                jsonrpc,
                id,
                method,
                params: self.params,
            }));
        }

        let payload = match (self.result, self.error) {
            (Some(result), None) => ResponsePayload::Result(result),
            (None, Some(error)) => ResponsePayload::Error(error),
            (Some(_), Some(_)) => {
                return Err(ProtocolError::InvalidRequest(
                    "response carries both result and error".to_string(),
                ))
            }
            (None, None) => {
                return Err(ProtocolError::InvalidRequest(
                    "message has neither method nor result/error".to_string(),
                ))
            }
        };

        let id = self
            .id
            .ok_or_else(|| ProtocolError::InvalidRequest("response without id".to_string()))
            .and_then(RequestId::try_from)?;

        Ok(Message::Response(Response {
            jsonrpc,
            id,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(text: &str) {
        let message = Message::decode(text).unwrap();
        assert_eq!(message.encode().unwrap(), text);
    }

    #[test]
    fn test_request_roundtrip_preserves_bytes() {
        roundtrip(r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"echo","arguments":{"z":1,"a":[true,null,"x"]}}}"#);
    }

    #[test]
    fn test_notification_roundtrip() {
        roundtrip(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
    }

    #[test]
    fn test_response_roundtrips() {
        roundtrip(r#"{"jsonrpc":"2.0","id":"abc","result":{"ok":true}}"#);
        roundtrip(r#"{"jsonrpc":"2.0","id":3,"result":null}"#);
        roundtrip(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"parse error: eof"}}"#);
        roundtrip(r#"{"jsonrpc":"2.0","id":4,"error":{"code":42,"message":"quota","data":{"retry":5}}}"#);
    }

    #[test]
    fn test_error_data_null_survives_roundtrip() {
        let text = r#"{"jsonrpc":"2.0","id":5,"error":{"code":-32603,"message":"boom","data":null}}"#;
        roundtrip(text);
        match Message::decode(text).unwrap() {
            Message::Response(resp) => match resp.payload {
                ResponsePayload::Error(e) => assert_eq!(e.data, Some(Value::Null)),
                other => panic!("expected error payload, got {other:?}"),
            },
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn test_notification_vs_null_id() {
        let notification = Message::decode(r#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert!(notification.is_notification());

        let null_id = Message::decode(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert!(!null_id.is_notification());
        match null_id {
            Message::Request(req) => assert_eq!(req.id, Some(RequestId::Null)),
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn test_decode_classifies_responses() {
        let msg = Message::decode(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}}"#)
            .unwrap();
        match msg {
            Message::Response(resp) => {
                assert_eq!(resp.id, RequestId::Number(1));
                let err = resp.into_result().unwrap_err();
                assert_eq!(err.code, ErrorCode::MethodNotFound);
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Message::decode("{not json"),
            Err(ProtocolError::Parse(_))
        ));
        assert!(matches!(
            Message::decode(r#"{"jsonrpc":"2.0","id":1}"#),
            Err(ProtocolError::InvalidRequest(_))
        ));
        assert!(matches!(
            Message::decode(r#"{"jsonrpc":"2.0","result":1}"#),
            Err(ProtocolError::InvalidRequest(_))
        ));
        assert!(matches!(
            Message::decode(r#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"x"}}"#),
            Err(ProtocolError::InvalidRequest(_))
        ));
        assert!(matches!(
            Message::decode(r#"{"jsonrpc":"2.0","id":1.5,"method":"x"}"#),
            Err(ProtocolError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_missing_version_still_decodes_as_request() {
        let msg = Message::decode(r#"{"id":1,"method":"ping"}"#).unwrap();
        match msg {
            Message::Request(req) => assert_eq!(req.jsonrpc, ""),
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn test_constructors_encode_in_wire_order() {
        let req = Request::new(RequestId::Number(1), "initialize", Some(json!({"b": 1, "a": 2})));
        assert_eq!(
            Message::from(req).encode().unwrap(),
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"b":1,"a":2}}"#
        );

        let resp = Response::error(
            RequestId::String("x".into()),
            ErrorObject::new(ErrorCode::InternalError, "boom").with_data(json!([1])),
        );
        assert_eq!(
            Message::from(resp).encode().unwrap(),
            r#"{"jsonrpc":"2.0","id":"x","error":{"code":-32603,"message":"boom","data":[1]}}"#
        );
    }
}
