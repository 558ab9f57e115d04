//! Tool Connection: one provider, its transport, and its tool catalog.
//!
//! Lifecycle is `connecting -> ready -> closed`. The handshake sends
//! `initialize`, then `notifications/initialized`, then reads the full tool
//! catalog. Any failure along the way closes the connection (and kills the
//! subprocess) before the error is returned. When the provider's stream ends
//! on its own, a watcher task runs the same teardown.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ProviderConfig;
use crate::protocol::Router;
use crate::transport::{FramedTransport, TransportOptions};
use crate::types::{
    ClientError, Implementation, InitializeParams, InitializeResult, ListToolsParams,
    ProtocolError, ResponsePayload, ToolCallOutcome, ToolCallParams, ToolDescriptor, ToolPage,
    TransportError, MCP_VERSION,
};

use super::process::ProviderProcess;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Ready,
    Closed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Ready => "ready",
            ConnectionStatus::Closed => "closed",
        })
    }
}

/// Client-side settings shared by every provider connection.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Identity sent in `initialize`.
    pub client_info: Implementation,
    pub protocol_version: String,
    pub request_timeout: Option<Duration>,
    /// Handles requests the provider sends to us.
    pub router: Option<Arc<Router>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_info: Implementation::default(),
            protocol_version: MCP_VERSION.to_string(),
            request_timeout: None,
            router: None,
        }
    }
}

impl ClientOptions {
    fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            request_timeout: self.request_timeout,
            router: self.router.clone(),
        }
    }
}

pub struct ToolConnection {
    name: String,
    transport: FramedTransport,
    lifecycle: Arc<Lifecycle>,
    tools: RwLock<Arc<[ToolDescriptor]>>,
    server_info: OnceLock<InitializeResult>,
}

/// State shared with the close watcher.
struct Lifecycle {
    name: String,
    status: RwLock<ConnectionStatus>,
    process: tokio::sync::Mutex<Option<ProviderProcess>>,
}

impl Lifecycle {
    /// Mark closed and kill the subprocess. Safe to run more than once.
    async fn teardown(&self, reason: &str) {
        let previous = std::mem::replace(&mut *write(&self.status), ConnectionStatus::Closed);
        if let Some(mut process) = self.process.lock().await.take() {
            process.terminate().await;
        }
        if previous == ConnectionStatus::Ready {
            tracing::info!(provider = %self.name, reason, "provider disconnected");
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl ToolConnection {
    /// Spawn the provider and run the handshake.
    pub async fn connect(
        name: &str,
        config: &ProviderConfig,
        options: &ClientOptions,
    ) -> Result<Self, ClientError> {
        let (process, stdin, stdout) = ProviderProcess::spawn(name, config)?;
        let conn = Self::build(name, stdout, stdin, Some(process), options);
        conn.handshake(options).await?;
        Ok(conn)
    }

    /// Run the handshake over an already-open stream pair.
    pub async fn over_streams<R, W>(
        name: &str,
        reader: R,
        writer: W,
        options: &ClientOptions,
    ) -> Result<Self, ClientError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let conn = Self::build(name, reader, writer, None, options);
        conn.handshake(options).await?;
        Ok(conn)
    }

    fn build<R, W>(
        name: &str,
        reader: R,
        writer: W,
        process: Option<ProviderProcess>,
        options: &ClientOptions,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let transport = FramedTransport::new(name, reader, writer, options.transport_options());
        transport.start_reading();

        let lifecycle = Arc::new(Lifecycle {
            name: name.to_string(),
            status: RwLock::new(ConnectionStatus::Connecting),
            process: tokio::sync::Mutex::new(process),
        });

        let closed = transport.closed_signal();
        let watched = Arc::clone(&lifecycle);
        tokio::spawn(async move {
            closed.await;
            watched.teardown("stream closed").await;
        });

        Self {
            name: name.to_string(),
            transport,
            lifecycle,
            tools: RwLock::new(Arc::from(Vec::new())),
            server_info: OnceLock::new(),
        }
    }

    async fn handshake(&self, options: &ClientOptions) -> Result<(), ClientError> {
        match self.run_handshake(options).await {
            Ok(()) => {
                {
                    let mut status = write(&self.lifecycle.status);
                    if *status == ConnectionStatus::Connecting {
                        *status = ConnectionStatus::Ready;
                    }
                }
                tracing::info!(provider = %self.name, tools = self.tools().len(), "provider connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(provider = %self.name, "handshake failed: {e}");
                self.close().await;
                Err(e)
            }
        }
    }

    async fn run_handshake(&self, options: &ClientOptions) -> Result<(), ClientError> {
        let params = InitializeParams::new(&options.protocol_version, options.client_info.clone());
        let params = serde_json::to_value(params).map_err(TransportError::from)?;

        let result = self
            .transport
            .send_and_wait("initialize", Some(params))
            .await
            .map_err(|e| self.handshake_error("initialize", e))?
            .into_result()
            .map_err(|e| self.handshake_error("initialize", ProtocolError::from(e)))?;

        let info: InitializeResult = serde_json::from_value(result).unwrap_or_default();
        if let Some(server) = &info.server_info {
            tracing::debug!(
                provider = %self.name,
                server = %server.name,
                version = %server.version,
                protocol = ?info.protocol_version,
                "initialized"
            );
        }
        let _ = self.server_info.set(info);

        self.transport
            .notify("notifications/initialized", None)
            .await
            .map_err(|e| self.handshake_error("initialized", e))?;

        self.refresh_tools()
            .await
            .map_err(|e| self.handshake_error("tools/list", e))?;
        Ok(())
    }

    fn handshake_error(&self, stage: &'static str, error: impl std::fmt::Display) -> ClientError {
        ClientError::Handshake {
            provider: self.name.clone(),
            stage,
            reason: error.to_string(),
        }
    }

    /// Re-read the whole catalog, following `nextCursor`, and swap it in.
    /// Readers see either the old catalog or the new one.
    pub async fn refresh_tools(&self) -> Result<usize, ClientError> {
        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match cursor.take() {
                Some(cursor) => Some(
                    serde_json::to_value(ListToolsParams {
                        cursor: Some(cursor),
                    })
                    .map_err(TransportError::from)?,
                ),
                None => None,
            };

            let result = self
                .transport
                .send_and_wait("tools/list", params)
                .await?
                .into_result()
                .map_err(ProtocolError::from)?;

            let page = ToolPage::from_result(&result);
            for reason in &page.skipped {
                tracing::warn!(provider = %self.name, "skipping tool entry: {reason}");
            }
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    tracing::warn!(provider = %self.name, cursor = %next, "provider repeated a cursor");
                    break;
                }
                None => break,
            }
        }

        let count = tools.len();
        *write(&self.tools) = Arc::from(tools);
        tracing::debug!(provider = %self.name, tools = count, "tool catalog updated");
        Ok(count)
    }

    /// Invoke a tool. Provider-reported failures come back as an outcome
    /// with `success == false`; only transport failures are errors.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Option<Value>,
    ) -> Result<ToolCallOutcome, ClientError> {
        let params = serde_json::to_value(ToolCallParams {
            name: tool.to_string(),
            arguments: Some(arguments.unwrap_or_else(|| Value::Object(Default::default()))),
        })
        .map_err(TransportError::from)?;

        let response = self.transport.send_and_wait("tools/call", Some(params)).await?;
        Ok(match response.payload {
            ResponsePayload::Result(result) => ToolCallOutcome::from_result(result),
            ResponsePayload::Error(e) => {
                tracing::debug!(provider = %self.name, tool, code = %e.code, "tool call rejected: {}", e.message);
                ToolCallOutcome::failure(format!("[{}] {}", e.code, e.message))
            }
        })
    }

    /// Stop the transport and kill the subprocess. Idempotent.
    pub async fn close(&self) {
        self.lifecycle.teardown("closed by client").await;
        self.transport.close().await;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Closed` as soon as the transport has gone away, even if nobody
    /// called [`close`](Self::close).
    pub fn status(&self) -> ConnectionStatus {
        if self.transport.is_closed() {
            return ConnectionStatus::Closed;
        }
        *read(&self.lifecycle.status)
    }

    /// Resolves once the provider's stream has ended.
    pub async fn closed(&self) {
        self.transport.closed().await
    }

    /// Snapshot of the current catalog.
    pub fn tools(&self) -> Arc<[ToolDescriptor]> {
        Arc::clone(&read(&self.tools))
    }

    pub fn has_tool(&self, name: &str) -> bool {
        read(&self.tools).iter().any(|t| t.name == name)
    }

    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.get()
    }
}

impl std::fmt::Debug for ToolConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolConnection")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("tools", &self.tools().len())
            .finish()
    }
}
