//! Shared fixtures: scripted in-memory providers and polling helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;

use agent_relay::types::*;

pub type Script = Arc<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

/// Client-side halves of an in-memory provider.
pub struct FakeProvider {
    pub reader: ReadHalf<DuplexStream>,
    pub writer: WriteHalf<DuplexStream>,
    pub task: JoinHandle<Vec<Request>>,
}

/// Run `script` as a provider on the far end of a duplex pipe. The task
/// returns every request it saw once the client hangs up.
pub fn spawn_provider(script: Script) -> FakeProvider {
    let (client, provider) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(client);
    let (provider_read, mut provider_write) = tokio::io::split(provider);

    let task = tokio::spawn(async move {
        let mut seen = Vec::new();
        let mut lines = BufReader::new(provider_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(Message::Request(request)) = Message::decode(&line) else {
                continue;
            };
            if let Some(response) = script(&request) {
                let mut frame = Message::Response(response).encode().unwrap();
                frame.push('\n');
                if provider_write.write_all(frame.as_bytes()).await.is_err() {
                    break;
                }
            }
            seen.push(request);
        }
        seen
    });

    FakeProvider {
        reader,
        writer,
        task,
    }
}

pub fn tool(name: &str) -> Value {
    json!({
        "name": name,
        "description": format!("The {name} tool"),
        "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
    })
}

/// A well-behaved provider with `tools` in its catalog. `echo` returns its
/// arguments as text, `fail` reports `isError`, `reject` answers with an
/// application error object.
pub fn standard_script(tools: Vec<Value>) -> Script {
    Arc::new(move |req: &Request| {
        let id = req.id.clone()?;
        let result = match req.method.as_str() {
            "initialize" => json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake", "version": "0.0.1"}
            }),
            "tools/list" => json!({"tools": tools}),
            "tools/call" => {
                let params = req.params.clone().unwrap_or(Value::Null);
                match params["name"].as_str() {
                    Some("echo") => json!({
                        "content": [{"type": "text", "text": params["arguments"].to_string()}]
                    }),
                    Some("fail") => json!({
                        "content": [{"type": "text", "text": "disk full"}],
                        "isError": true
                    }),
                    Some("reject") => {
                        return Some(Response::error(
                            id,
                            ErrorObject::new(ErrorCode::Application(1001), "quota exceeded"),
                        ))
                    }
                    _ => {
                        return Some(Response::error(
                            id,
                            ErrorObject::new(ErrorCode::InvalidParams, "unknown tool"),
                        ))
                    }
                }
            }
            other => {
                return Some(Response::error(
                    id,
                    ErrorObject::new(ErrorCode::MethodNotFound, format!("method not found: {other}")),
                ))
            }
        };
        Some(Response::success(id, result))
    })
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
