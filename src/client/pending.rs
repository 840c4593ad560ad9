use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

use crate::{Result, RpcError};

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// The protected state is a map of correlation id → oneshot sender with no
/// invariants spanning entries. The worst outcome of a poisoned lock is a
/// dropped or unmatched reply, which the caller sees as a timeout.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Tracks request-reply calls waiting for their reply.
///
/// Fire-and-forget calls are never registered here. Once closed, no new call
/// can register.
#[derive(Default)]
pub(crate) struct PendingCalls {
    // ---
    calls: HashMap<Arc<str>, oneshot::Sender<Bytes>>,
    closed: bool,
}

impl PendingCalls {
    // ---

    /// Register a call. The receiver resolves when the reply arrives.
    ///
    /// Fails with `RpcError::Transport` once the reply subscription is gone.
    pub fn register(&mut self, correlation_id: Arc<str>) -> Result<oneshot::Receiver<Bytes>> {
        // ---
        if self.closed {
            return Err(RpcError::Transport(
                "reply subscription closed (transport shut down)".into(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        self.calls.insert(correlation_id, tx);
        Ok(rx)
    }

    /// Deliver a reply.
    ///
    /// Returns true if the correlation id was found and the reply handed over.
    pub fn complete(&mut self, correlation_id: &str, reply: Bytes) -> bool {
        // ---
        match self.calls.remove(correlation_id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Forget a call without delivering anything (timeout or cancellation).
    pub fn remove(&mut self, correlation_id: &str) -> bool {
        // ---
        self.calls.remove(correlation_id).is_some()
    }

    /// Refuse new calls and drop every waiting one; their receivers observe
    /// a closed channel.
    pub fn close(&mut self) {
        // ---
        self.closed = true;
        self.calls.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        // ---
        self.calls.len()
    }
}

/// Removes its call from the pending map when dropped.
///
/// Covers timeouts and callers that abandon the future before the reply
/// arrives.
pub(crate) struct PendingGuard<'a> {
    // ---
    pending: &'a Mutex<PendingCalls>,
    correlation_id: Arc<str>,
}

impl<'a> PendingGuard<'a> {
    pub fn new(pending: &'a Mutex<PendingCalls>, correlation_id: Arc<str>) -> Self {
        Self {
            pending,
            correlation_id,
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_ignore_poison(self.pending).remove(&self.correlation_id);
    }
}
