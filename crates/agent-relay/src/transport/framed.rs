//! Framed transport: request/response correlation over a byte duplex.
//!
//! Outbound requests get a fresh numeric id and a one-shot reply channel in
//! the pending table; a dedicated read task matches inbound responses back
//! to those channels. When the read side ends, every pending request is
//! cancelled so no caller is left waiting on a dead stream.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::protocol::Router;
use crate::types::{Message, Request, RequestId, Response, TransportError};

use super::framing;
use super::pending::PendingTable;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport tuning.
#[derive(Clone, Default)]
pub struct TransportOptions {
    /// Deadline applied by [`FramedTransport::send_and_wait`]. `None` waits
    /// until the reply arrives or the transport closes.
    pub request_timeout: Option<Duration>,
    /// Handles requests and notifications initiated by the remote side.
    /// Without one, remote requests are answered with `MethodNotFound`.
    pub router: Option<Arc<Router>>,
}

/// A line-delimited JSON-RPC endpoint over one reader/writer pair.
pub struct FramedTransport {
    shared: Arc<Shared>,
    reader: Mutex<Option<BoxedReader>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    label: String,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    pending: Mutex<PendingTable>,
    next_id: AtomicI64,
    request_timeout: Option<Duration>,
    router: Arc<Router>,
    closed: watch::Sender<bool>,
}

/// Handle for one outstanding request. Dropping it before the reply
/// arrives withdraws the pending entry.
pub struct Receipt {
    rx: oneshot::Receiver<Response>,
    entry: PendingEntry,
}

struct PendingEntry {
    id: RequestId,
    shared: Arc<Shared>,
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if lock(&self.shared.pending).remove(&self.id) {
            tracing::debug!(transport = %self.shared.label, id = %self.id, "request abandoned");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FramedTransport {
    pub fn new<R, W>(label: impl Into<String>, reader: R, writer: W, options: TransportOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                label: label.into(),
                writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
                pending: Mutex::new(PendingTable::new()),
                next_id: AtomicI64::new(1),
                request_timeout: options.request_timeout,
                router: options.router.unwrap_or_default(),
                closed,
            }),
            reader: Mutex::new(Some(Box::new(reader))),
            read_task: Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Spawn the read loop. Returns `false` if it was already started.
    pub fn start_reading(&self) -> bool {
        let Some(reader) = lock(&self.reader).take() else {
            return false;
        };
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(read_loop(shared, reader));
        *lock(&self.read_task) = Some(handle);
        true
    }

    /// Allocate an id, register a waiter, and write the request frame.
    /// Returns as soon as the frame is written.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Receipt, TransportError> {
        let id = RequestId::Number(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let message = Message::Request(Request::new(id.clone(), method, params));
        let frame = framing::frame_message(&message)?;

        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id.clone(), tx)?;

        if let Err(e) = self.shared.write_frame(&frame).await {
            lock(&self.shared.pending).remove(&id);
            return Err(e);
        }

        tracing::trace!(transport = %self.shared.label, %id, method, "request sent");
        Ok(Receipt {
            rx,
            entry: PendingEntry {
                id,
                shared: Arc::clone(&self.shared),
            },
        })
    }

    /// Send and suspend until the matching reply arrives, the transport
    /// closes, or the configured request timeout expires.
    pub async fn send_and_wait(&self, method: &str, params: Option<Value>) -> Result<Response, TransportError> {
        let receipt = self.send(method, params).await?;
        match self.shared.request_timeout {
            Some(after) => receipt.wait_timeout(after).await,
            None => receipt.wait().await,
        }
    }

    pub async fn send_and_wait_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        after: Duration,
    ) -> Result<Response, TransportError> {
        self.send(method, params).await?.wait_timeout(after).await
    }

    /// Write a notification. No id is allocated and no reply is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let message = Message::Request(Request::notification(method, params));
        let frame = framing::frame_message(&message)?;
        self.shared.write_frame(&frame).await
    }

    /// Cancel every pending request and release both streams. Idempotent.
    pub async fn close(&self) {
        self.shared.shutdown().await;
        lock(&self.reader).take();
        if let Some(task) = lock(&self.read_task).take() {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// Resolves once the transport has closed, for whatever reason.
    pub async fn closed(&self) {
        self.closed_signal().await
    }

    /// Like [`closed`](Self::closed), but owns its subscription so a
    /// spawned task can await it. Also resolves if the transport is dropped.
    pub fn closed_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shared.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.shared.pending).len()
    }
}

impl Drop for FramedTransport {
    fn drop(&mut self) {
        // Waiters hold the shared state alive through their receipts, so the
        // table must be closed here rather than left to the last Arc.
        lock(&self.shared.pending).close();
        self.shared.closed.send_replace(true);
        if let Some(task) = lock(&self.read_task).take() {
            task.abort();
        }
    }
}

impl Receipt {
    pub fn id(&self) -> &RequestId {
        &self.entry.id
    }

    pub async fn wait(self) -> Result<Response, TransportError> {
        let Receipt { rx, entry } = self;
        rx.await
            .map_err(|_| TransportError::Cancelled(entry.id.clone()))
    }

    /// Wait with a deadline. On expiry the pending entry is dropped and any
    /// late reply is discarded as unmatched; the transport stays open.
    pub async fn wait_timeout(self, after: Duration) -> Result<Response, TransportError> {
        let Receipt { rx, entry } = self;
        match tokio::time::timeout(after, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Cancelled(entry.id.clone())),
            Err(_) => {
                tracing::warn!(transport = %entry.shared.label, id = %entry.id, ?after, "request timed out");
                Err(TransportError::Timeout {
                    id: entry.id.clone(),
                    after,
                })
            }
        }
    }
}

impl Shared {
    async fn write_frame(&self, frame: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        writer
            .write_all(frame.as_bytes())
            .await
            .map_err(TransportError::Write)?;
        writer.flush().await.map_err(TransportError::Write)
    }

    fn deliver(&self, response: Response) {
        if let Err(unmatched) = lock(&self.pending).complete(response) {
            tracing::warn!(
                transport = %self.label,
                id = %unmatched.id,
                "dropping response with no pending request"
            );
        }
    }

    async fn shutdown(&self) {
        let cancelled = lock(&self.pending).close();
        if cancelled > 0 {
            tracing::debug!(transport = %self.label, cancelled, "cancelled pending requests");
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.closed.send_replace(true);
    }
}

/// Handle a request initiated by the remote side on its own task, so a slow
/// handler never stalls reply delivery.
fn dispatch_inbound(shared: &Arc<Shared>, request: Request) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let method = request.method.clone();
        let Some(response) = shared.router.handle(request).await else {
            return;
        };
        let frame = match framing::frame_message(&Message::Response(response)) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(transport = %shared.label, %method, "cannot encode reply: {e}");
                return;
            }
        };
        if let Err(e) = shared.write_frame(&frame).await {
            tracing::warn!(transport = %shared.label, %method, "cannot write reply: {e}");
        }
    });
}

async fn read_loop(shared: Arc<Shared>, reader: BoxedReader) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::debug!(transport = %shared.label, "end of stream");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(transport = %shared.label, "read failed: {e}");
                break;
            }
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::warn!(transport = %shared.label, "skipping non-UTF-8 frame: {e}");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        match framing::parse_message(line) {
            Ok(Message::Response(response)) => shared.deliver(response),
            Ok(Message::Request(request)) => dispatch_inbound(&shared, request),
            Err(e) => tracing::warn!(transport = %shared.label, "skipping malformed frame: {e}"),
        }
    }

    shared.shutdown().await;
}
