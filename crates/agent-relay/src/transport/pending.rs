//! Pending request table: in-flight id -> one-shot reply channel.
//!
//! Entries leave the table exactly once: through the matching reply, an
//! explicit removal (write failure, timeout), or [`PendingTable::close`].
//! Dropping a sender is the cancellation signal seen by the waiter.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::types::{RequestId, Response, TransportError};

#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<RequestId, oneshot::Sender<Response>>,
    closed: bool,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter. Fails once the table is closed so that no request
    /// can be left waiting on a dead reader.
    pub fn insert(
        &mut self,
        id: RequestId,
        sender: oneshot::Sender<Response>,
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.entries.insert(id, sender);
        Ok(())
    }

    /// Deliver a reply to its waiter. Hands the response back if nobody is
    /// waiting for its id.
    pub fn complete(&mut self, response: Response) -> Result<(), Response> {
        match self.entries.remove(&response.id) {
            Some(sender) => {
                // The waiter may have given up (timeout); nothing to do then.
                let _ = sender.send(response);
                Ok(())
            }
            None => Err(response),
        }
    }

    pub fn remove(&mut self, id: &RequestId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Close the table and cancel every waiter. Returns how many were
    /// cancelled.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        let cancelled = self.entries.len();
        self.entries.clear();
        cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
