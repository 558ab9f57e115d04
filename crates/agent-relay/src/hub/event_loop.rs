//! The hub's single-owner event loop.
//!
//! The peer set lives on the loop task only. Handles reach it through three
//! channels (register, unregister, broadcast) and a heartbeat timer drives
//! pings. Within one iteration registrations win over unregistrations,
//! which win over broadcasts, so a peer registered before a broadcast is
//! issued always receives it and a peer unregistered before it never does.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::types::{HubError, Message};

use super::peer::{Peer, PeerId};

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Ping interval. Zero disables pings.
    pub heartbeat: Duration,
    /// Deadline for one write or close on a single peer. A peer that misses
    /// it is dropped like one whose write failed. Zero waits forever.
    pub peer_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }
}

type PeerRef = Arc<dyn Peer>;

/// Cheap, cloneable entry point into a running hub. The loop stops once
/// every handle is gone.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<(PeerId, PeerRef)>,
    unregister_tx: mpsc::UnboundedSender<PeerId>,
    broadcast_tx: mpsc::UnboundedSender<Arc<str>>,
    next_peer: Arc<AtomicU64>,
    peer_count: Arc<AtomicUsize>,
}

pub struct Hub;

impl Hub {
    /// Start the event loop on the current runtime.
    pub fn spawn(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let peer_count = Arc::new(AtomicUsize::new(0));

        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            next_peer: Arc::new(AtomicU64::new(1)),
            peer_count: Arc::clone(&peer_count),
        };

        let state = LoopState {
            peers: BTreeMap::new(),
            peer_count,
            peer_timeout: config.peer_timeout,
        };
        let task = tokio::spawn(state.run(config, register_rx, unregister_rx, broadcast_rx));
        (handle, task)
    }
}

impl HubHandle {
    /// Queue a peer for registration and return its id.
    pub fn register(&self, peer: PeerRef) -> Result<PeerId, HubError> {
        let id = PeerId(self.next_peer.fetch_add(1, Ordering::Relaxed));
        self.register_tx
            .send((id, peer))
            .map_err(|_| HubError::Stopped)?;
        Ok(id)
    }

    /// Queue a removal. Unknown ids are ignored by the loop.
    pub fn unregister(&self, id: PeerId) {
        if self.unregister_tx.send(id).is_err() {
            tracing::debug!(peer = %id, "hub stopped before unregister");
        }
    }

    /// Encode once and queue the frame for every registered peer.
    pub fn broadcast(&self, message: &Message) -> Result<(), HubError> {
        let frame = message.encode()?;
        self.broadcast_text(frame)
    }

    pub fn broadcast_text(&self, frame: impl Into<Arc<str>>) -> Result<(), HubError> {
        self.broadcast_tx
            .send(frame.into())
            .map_err(|_| HubError::Stopped)
    }

    /// Peers currently in the set, as last published by the loop.
    pub fn peer_count(&self) -> usize {
        self.peer_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.register_tx.is_closed()
    }
}

struct LoopState {
    peers: BTreeMap<PeerId, PeerRef>,
    peer_count: Arc<AtomicUsize>,
    peer_timeout: Duration,
}

/// Run one peer write under the loop's deadline.
async fn bounded<F>(limit: Duration, write: F) -> Result<(), HubError>
where
    F: Future<Output = Result<(), HubError>>,
{
    if limit.is_zero() {
        return write.await;
    }
    tokio::time::timeout(limit, write)
        .await
        .unwrap_or(Err(HubError::WriteTimeout(limit)))
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl LoopState {
    async fn run(
        mut self,
        config: HubConfig,
        mut register_rx: mpsc::UnboundedReceiver<(PeerId, PeerRef)>,
        mut unregister_rx: mpsc::UnboundedReceiver<PeerId>,
        mut broadcast_rx: mpsc::UnboundedReceiver<Arc<str>>,
    ) {
        let mut ticker = (!config.heartbeat.is_zero()).then(|| {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + config.heartbeat, config.heartbeat);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        tracing::debug!(heartbeat = ?config.heartbeat, "hub loop started");

        loop {
            tokio::select! {
                biased;
                registration = register_rx.recv() => match registration {
                    Some((id, peer)) => self.add(id, peer),
                    None => break,
                },
                Some(id) = unregister_rx.recv() => {
                    self.remove(id).await;
                }
                Some(frame) = broadcast_rx.recv() => {
                    self.broadcast(&frame).await;
                }
                _ = next_tick(&mut ticker) => {
                    self.ping().await;
                }
            }
        }

        while let Ok(id) = unregister_rx.try_recv() {
            self.remove(id).await;
        }
        let remaining = std::mem::take(&mut self.peers);
        join_all(remaining.values().map(|peer| self.close_peer(peer))).await;
        self.publish_count();
        tracing::debug!(closed = remaining.len(), "hub loop stopped");
    }

    fn publish_count(&self) {
        self.peer_count.store(self.peers.len(), Ordering::Relaxed);
    }

    fn add(&mut self, id: PeerId, peer: PeerRef) {
        self.peers.insert(id, peer);
        self.publish_count();
        tracing::info!(peer = %id, peers = self.peers.len(), "peer registered");
    }

    async fn remove(&mut self, id: PeerId) {
        let Some(peer) = self.peers.remove(&id) else {
            tracing::debug!(peer = %id, "unregister for unknown peer");
            return;
        };
        self.publish_count();
        self.close_peer(&peer).await;
        tracing::info!(peer = %id, peers = self.peers.len(), "peer unregistered");
    }

    async fn close_peer(&self, peer: &PeerRef) {
        let closing = async {
            peer.close().await;
            Ok::<_, HubError>(())
        };
        if bounded(self.peer_timeout, closing).await.is_err() {
            tracing::debug!(timeout = ?self.peer_timeout, "peer close abandoned");
        }
    }

    async fn broadcast(&mut self, frame: &str) {
        let limit = self.peer_timeout;
        let sends = self
            .peers
            .iter()
            .map(|(id, peer)| async move { (*id, bounded(limit, peer.send_text(frame)).await) });
        let failed = collect_failures(join_all(sends).await, "broadcast");
        self.drop_failed(failed).await;
    }

    async fn ping(&mut self) {
        if self.peers.is_empty() {
            return;
        }
        let limit = self.peer_timeout;
        let pings = self
            .peers
            .iter()
            .map(|(id, peer)| async move { (*id, bounded(limit, peer.send_ping()).await) });
        let failed = collect_failures(join_all(pings).await, "ping");
        self.drop_failed(failed).await;
    }

    async fn drop_failed(&mut self, failed: Vec<PeerId>) {
        for id in failed {
            self.remove(id).await;
        }
    }
}

fn collect_failures(results: Vec<(PeerId, Result<(), HubError>)>, what: &str) -> Vec<PeerId> {
    results
        .into_iter()
        .filter_map(|(id, result)| match result {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(peer = %id, "{what} failed, dropping peer: {e}");
                Some(id)
            }
        })
        .collect()
}
