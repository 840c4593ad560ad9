//! Single-process transport.
//!
//! Every [`MemoryHub`] is an isolated bus: transports created on the same hub
//! see each other's frames, transports on different hubs never do. Delivery
//! goes through bounded `mpsc` inboxes, so a slow subscriber applies
//! backpressure to the publisher.
//!
//! A frame published to an address nobody listens on is dropped, which is
//! what makes fire-and-forget calls to an absent service harmless.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    log_debug,
    Frame,
    Result,
    RpcError,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};

const INBOX_CAPACITY: usize = 64;

/// Shared frame bus for the in-memory transport.
///
/// All `MemoryTransport` instances that share a `MemoryHub` can publish and
/// receive each other's frames, the way peers on one network would.
///
/// Integration tests construct a hub per test for isolation:
///
/// ```
/// # use rpc_envelope::MemoryHub;
/// # async fn example() -> rpc_envelope::Result<()> {
/// let hub = MemoryHub::new();
///
/// let server = rpc_envelope::create_memory_transport_with_hub("server", hub.clone()).await?;
/// let client = rpc_envelope::create_memory_transport_with_hub("client", hub.clone()).await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<Subscription, Vec<mpsc::Sender<Frame>>>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::default())
    }

    async fn publish(&self, _transport_id: &str, frame: Frame) -> Result<()> {
        // ---
        let senders: Vec<mpsc::Sender<Frame>> = {
            let subs = self.subscriptions.read().await;
            subs.iter()
                .filter(|(sub, _)| sub.0 == frame.address.0)
                .flat_map(|(_, senders)| senders.iter().cloned())
                .collect()
        };

        if senders.is_empty() {
            log_debug!(
                "{_transport_id}: no subscriber for {}, frame dropped",
                frame.address.0
            );
            return Ok(());
        }

        let mut saw_closed = false;
        for sender in senders {
            // A closed channel means the SubscriptionHandle was dropped.
            if sender.send(frame.clone()).await.is_err() {
                log_debug!("{_transport_id}: inbox for {} closed", frame.address.0);
                saw_closed = true;
            }
        }

        if saw_closed {
            self.prune_closed().await;
        }

        Ok(())
    }

    /// Drop senders whose inbox is gone, and subscriptions left empty.
    async fn prune_closed(&self) {
        // ---
        let mut subs = self.subscriptions.write().await;
        subs.retain(|_, senders| {
            senders.retain(|tx| !tx.is_closed());
            !senders.is_empty()
        });
    }

    async fn subscribe(&self, _transport_id: &str, sub: Subscription) -> Result<SubscriptionHandle> {
        // ---
        log_debug!("{_transport_id}: subscribe to {sub:?}");

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut subs = self.subscriptions.write().await;
        subs.entry(sub).or_default().push(tx);

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn close(&self, _transport_id: &str) -> Result<()> {
        // ---
        log_debug!("{_transport_id}: closing transport...");

        let mut subs = self.subscriptions.write().await;
        subs.clear();
        Ok(())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport routing frames through a shared [`MemoryHub`].
struct MemoryTransport {
    // ---
    transport_id: String,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn transport_id(&self) -> &str {
        &self.transport_id
    }

    async fn publish(&self, frame: Frame) -> Result<()> {
        self.hub.publish(&self.transport_id, frame).await
    }

    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle> {
        self.hub.subscribe(&self.transport_id, sub).await
    }

    /// Clears every subscription on the hub, including those of other
    /// transports sharing it.
    async fn close(&self) -> Result<()> {
        self.hub.close(&self.transport_id).await
    }
}

/// Create an in-memory transport on the process-global hub.
///
/// # Errors
///
/// Returns `RpcError::InvalidConfig` if `node_id` is empty.
pub async fn create_memory_transport(node_id: impl Into<String>) -> Result<TransportPtr> {
    // ---
    create_memory_transport_with_hub(node_id, global_hub()).await
}

/// Create an in-memory transport on the given hub.
///
/// # Errors
///
/// Returns `RpcError::InvalidConfig` if `node_id` is empty.
pub async fn create_memory_transport_with_hub(
    node_id: impl Into<String>,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    let transport_id = node_id.into();
    if transport_id.is_empty() {
        return Err(RpcError::InvalidConfig("node_id must not be empty".into()));
    }

    log_debug!("{transport_id}: create memory transport");

    Ok(Arc::new(MemoryTransport { transport_id, hub }))
}
