// src/domain/transport.rs

//! Frames and the transport seam.
//!
//! A transport moves [`Frame`]s from a publisher to whoever subscribed to the
//! frame's address. It knows nothing about codecs, correlation, timeouts or
//! tracing; the dispatcher on the client side and the server loop on the
//! other side take care of those.
//!
//! Implementations live in `src/transport/`.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::Result;

use super::{DeliveryMode, TraceHeader};

/// Where a frame is published, e.g. `requests/calculator`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(pub Arc<str>);

impl<T> From<T> for Address
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Address(value.into())
    }
}

/// What a consumer listens on. Matches an [`Address`] by exact string equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(pub Arc<str>);

impl From<Address> for Subscription {
    fn from(address: Address) -> Self {
        // ---
        Subscription(address.0)
    }
}

impl<T> From<T> for Subscription
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Subscription(value.into())
    }
}

/// The unit a transport delivers.
///
/// A frame is what a [`ClientRequest`](crate::ClientRequest) becomes once the
/// dispatcher has chosen a destination, assigned a correlation id (for
/// request-reply calls) and attached trace metadata.
///
/// # Examples
///
/// ```
/// # use rpc_envelope::{Address, Frame};
/// # use bytes::Bytes;
/// # use std::sync::Arc;
/// let call = Frame::call(
///     Address::from("requests/calculator"),
///     Bytes::from_static(b"{\"method\":\"add\"}"),
///     Arc::from("correlation-123"),
///     Address::from("responses/client-1"),
///     None,
/// );
/// assert!(call.delivery_mode.expects_reply());
///
/// let note = Frame::oneway(
///     Address::from("requests/calculator"),
///     Bytes::from_static(b"{\"method\":\"log\"}"),
///     None,
/// );
/// assert!(note.correlation_id.is_none());
/// assert!(note.reply_to.is_none());
/// ```
#[derive(Clone, Debug)]
pub struct Frame {
    // ---
    /// Delivery address used by the transport.
    pub address: Address,

    /// Opaque payload bytes, produced by the codec.
    pub payload: Bytes,

    /// Whether the sender waits for a reply.
    pub delivery_mode: DeliveryMode,

    /// Present on request-reply calls and on their replies.
    pub correlation_id: Option<Arc<str>>,

    /// Where the reply goes. Absent for fire-and-forget calls and replies.
    pub reply_to: Option<Address>,

    /// Trace identifiers propagated with the call.
    pub trace: Option<TraceHeader>,
}

impl Frame {
    // ---
    /// Create a request-reply call frame.
    pub fn call(
        address: Address,
        payload: Bytes,
        correlation_id: Arc<str>,
        reply_to: Address,
        trace: Option<TraceHeader>,
    ) -> Self {
        // ---
        Self {
            address,
            payload,
            delivery_mode: DeliveryMode::RequestReply,
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_to),
            trace,
        }
    }

    /// Create a fire-and-forget call frame. No correlation id, no reply address.
    pub fn oneway(address: Address, payload: Bytes, trace: Option<TraceHeader>) -> Self {
        // ---
        Self {
            address,
            payload,
            delivery_mode: DeliveryMode::FireAndForget,
            correlation_id: None,
            reply_to: None,
            trace,
        }
    }

    /// Create a reply frame for a request-reply call.
    pub fn reply(address: Address, payload: Bytes, correlation_id: Arc<str>) -> Self {
        // ---
        Self {
            address,
            payload,
            delivery_mode: DeliveryMode::RequestReply,
            correlation_id: Some(correlation_id),
            reply_to: None,
            trace: None,
        }
    }
}

/// Handle returned from a successful subscription.
///
/// Dropping the handle closes the inbox; the transport drops the sender on
/// its next publish to it.
pub struct SubscriptionHandle {
    // ---
    /// Receiver channel for delivered frames matching this subscription.
    pub inbox: mpsc::Receiver<Frame>,
}

/// Best-effort frame delivery between publishers and subscribers.
///
/// Frames published after `subscribe()` returns must reach that subscriber
/// if their address matches. Ordering and durability are not promised.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Identifier of this transport instance, used in logs.
    fn transport_id(&self) -> &str;

    /// Publish a frame to its address.
    async fn publish(&self, frame: Frame) -> Result<()>;

    /// Register a subscription and return a handle for receiving frames.
    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle>;

    /// Stop delivery. Open subscription inboxes end with `None`.
    async fn close(&self) -> Result<()>;
}

/// Transport handle shared by clients, servers and dispatchers.
pub type TransportPtr = Arc<dyn Transport>;
