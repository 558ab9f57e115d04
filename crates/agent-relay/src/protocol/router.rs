//! Method-name dispatch shared by the provider client and the hub.
//!
//! Handlers are async closures returning `anyhow::Result<Value>`. Any
//! handler failure, including a panic, becomes an `InternalError` reply;
//! an [`ProtocolError::InvalidParams`] raised while decoding parameters
//! keeps its own code. Notifications never get a reply.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{ProtocolError, ProtocolResult, Request, RequestId, Response};

use super::validator::validate_request;

type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;
type BoxedHandler = Arc<dyn Fn(Params) -> HandlerFuture + Send + Sync>;

/// Parameters handed to a handler, decoded on demand into a concrete type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Option<Value>);

impl Params {
    pub fn new(value: Option<Value>) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    pub fn into_value(self) -> Option<Value> {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.as_ref().and_then(|v| v.get(key))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Decode into a per-method parameter struct. Absent or null params
    /// decode as an empty object.
    pub fn parse<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        let value = match &self.0 {
            None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
            Some(value) => value.clone(),
        };
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidParams(e.to_string()))
    }
}

/// Maps method names to handlers.
#[derive(Clone, Default)]
pub struct Router {
    handlers: HashMap<String, BoxedHandler>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.methods())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `method`.
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let boxed: BoxedHandler = Arc::new(move |params| handler(params).boxed());
        self.handlers.insert(method.into(), boxed);
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Handle one request. Returns `None` for notifications, whatever the
    /// outcome.
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let notification = request.is_notification();
        let id = request.id.clone().unwrap_or(RequestId::Null);
        let method = request.method.clone();

        let outcome = self.dispatch(request).await;

        if notification {
            if let Err(e) = &outcome {
                tracing::debug!(%method, "notification failed: {e}");
            }
            return None;
        }

        Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(e) => {
                tracing::debug!(%method, %id, code = %e.code(), "request failed: {e}");
                e.into_response(id)
            }
        })
    }

    async fn dispatch(&self, request: Request) -> ProtocolResult<Value> {
        validate_request(&request)?;

        let handler = self
            .handlers
            .get(&request.method)
            .ok_or_else(|| ProtocolError::MethodNotFound(request.method.clone()))?;

        let params = Params::new(request.params);
        let future = std::panic::catch_unwind(AssertUnwindSafe(|| handler(params)))
            .map_err(|panic| ProtocolError::Internal(panic_message(panic)))?;

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(classify(error)),
            Err(panic) => Err(ProtocolError::Internal(panic_message(panic))),
        }
    }
}

fn classify(error: anyhow::Error) -> ProtocolError {
    match error.downcast::<ProtocolError>() {
        Ok(invalid @ ProtocolError::InvalidParams(_)) => invalid,
        Ok(other) => ProtocolError::Internal(other.to_string()),
        Err(error) => ProtocolError::Internal(format!("{error:#}")),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorCode, ResponsePayload};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct NavigateParams {
        url: String,
    }

    fn router() -> Router {
        let mut router = Router::new();
        router
            .register("echo", |params: Params| async move {
                Ok(params.into_value().unwrap_or(Value::Null))
            })
            .register("browser/navigate", |params: Params| async move {
                let p: NavigateParams = params.parse()?;
                Ok(json!({"success": true, "url": p.url}))
            })
            .register("fail", |_params: Params| async move {
                Err(anyhow::anyhow!("navigation failed"))
            })
            .register("explode", |_params: Params| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(Value::Null)
            });
        router
    }

    fn error_of(response: Response) -> crate::types::ErrorObject {
        match response.payload {
            ResponsePayload::Error(e) => e,
            ResponsePayload::Result(v) => panic!("expected error, got {v}"),
        }
    }

    #[tokio::test]
    async fn test_success_echoes_id() {
        let resp = router()
            .handle(Request::new(RequestId::String("a".into()), "echo", Some(json!({"x": 1}))))
            .await
            .unwrap();
        assert_eq!(resp.id, RequestId::String("a".into()));
        assert_eq!(resp.into_result().unwrap(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = router()
            .handle(Request::new(RequestId::Number(1), "browser/fly", None))
            .await
            .unwrap();
        let err = error_of(resp);
        assert_eq!(err.code, ErrorCode::MethodNotFound);
        assert!(err.message.contains("browser/fly"));
    }

    #[tokio::test]
    async fn test_invalid_version() {
        let mut req = Request::new(RequestId::Number(1), "echo", None);
        req.jsonrpc = "1.0".into();
        let err = error_of(router().handle(req).await.unwrap());
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_internal_error() {
        let err = error_of(
            router()
                .handle(Request::new(RequestId::Number(2), "fail", None))
                .await
                .unwrap(),
        );
        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(err.message, "navigation failed");
    }

    #[tokio::test]
    async fn test_bad_params_keep_invalid_params_code() {
        let err = error_of(
            router()
                .handle(Request::new(RequestId::Number(3), "browser/navigate", Some(json!({"link": 1}))))
                .await
                .unwrap(),
        );
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let err = error_of(
            router()
                .handle(Request::new(RequestId::Number(4), "explode", None))
                .await
                .unwrap(),
        );
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_notifications_never_reply() {
        let r = router();
        assert!(r.handle(Request::notification("echo", None)).await.is_none());
        assert!(r.handle(Request::notification("fail", None)).await.is_none());
        assert!(r.handle(Request::notification("missing", None)).await.is_none());
        assert!(r.handle(Request::notification("", None)).await.is_none());
    }

    #[test]
    fn test_methods_sorted() {
        assert_eq!(
            router().methods(),
            vec!["browser/navigate", "echo", "explode", "fail"]
        );
    }
}
