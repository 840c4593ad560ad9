// src/domain/request.rs

//! Outbound request envelope.
//!
//! A [`ClientRequest`] is what the client layer hands to the dispatcher for
//! exactly one outbound call: the payload bytes produced by a codec, the
//! delivery mode, and optionally the trace context to propagate with the call.
//!
//! The envelope is a plain value. It does not look inside the payload, it
//! never mutates its fields after construction, and it never creates or
//! tears down the trace context it carries.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::TraceContext;

/// Whether a call expects a correlated reply.
///
/// There are exactly two modes; the transport decides whether to wait based
/// on this alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    /// The caller waits for a reply correlated to this call.
    #[default]
    RequestReply,

    /// No reply is expected; the caller is never blocked waiting for one.
    FireAndForget,
}

impl DeliveryMode {
    /// Map the classic `oneway` flag onto a delivery mode.
    pub fn from_oneway(oneway: bool) -> Self {
        if oneway {
            Self::FireAndForget
        } else {
            Self::RequestReply
        }
    }

    pub fn is_oneway(self) -> bool {
        matches!(self, Self::FireAndForget)
    }

    pub fn expects_reply(self) -> bool {
        matches!(self, Self::RequestReply)
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestReply => f.write_str("request-reply"),
            Self::FireAndForget => f.write_str("fire-and-forget"),
        }
    }
}

/// A single outbound call, ready for the dispatcher.
///
/// Built with [`ClientRequest::new`]. Attaching a trace context is reserved
/// for the dispatcher, which re-wraps calls when it injects tracing.
///
/// # Example
///
/// ```
/// use rpc_envelope::{ClientRequest, DeliveryMode};
///
/// let req = ClientRequest::new(vec![0x80, 0x01, 0x00, 0x01], DeliveryMode::RequestReply);
///
/// assert_eq!(&req.payload()[..], &[0x80, 0x01, 0x00, 0x01]);
/// assert_eq!(req.delivery_mode(), DeliveryMode::RequestReply);
/// assert!(req.trace().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ClientRequest {
    // ---
    payload: Bytes,
    delivery_mode: DeliveryMode,
    trace: Option<Arc<TraceContext>>,
}

impl ClientRequest {
    // ---
    /// Create an envelope with no trace context attached.
    ///
    /// The payload is taken as-is. An empty payload is accepted; validating
    /// its content is up to the codec on the other side.
    pub fn new(payload: impl Into<Bytes>, delivery_mode: DeliveryMode) -> Self {
        // ---
        Self {
            payload: payload.into(),
            delivery_mode,
            trace: None,
        }
    }

    /// Create an envelope carrying a shared trace context.
    ///
    /// Only the dispatcher calls this, when it re-wraps a call to inject
    /// tracing. The `Arc` is stored as given; no copy of the context is made.
    pub(crate) fn with_trace(
        payload: impl Into<Bytes>,
        delivery_mode: DeliveryMode,
        trace: Arc<TraceContext>,
    ) -> Self {
        // ---
        Self {
            payload: payload.into(),
            delivery_mode,
            trace: Some(trace),
        }
    }

    /// The serialized message.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    /// Shorthand for `delivery_mode().is_oneway()`.
    pub fn is_oneway(&self) -> bool {
        self.delivery_mode.is_oneway()
    }

    /// The attached trace context, if any.
    pub fn trace(&self) -> Option<&Arc<TraceContext>> {
        self.trace.as_ref()
    }

    /// Take the envelope apart. Used by the dispatcher when it builds a frame.
    pub fn into_parts(self) -> (Bytes, DeliveryMode, Option<Arc<TraceContext>>) {
        (self.payload, self.delivery_mode, self.trace)
    }
}
