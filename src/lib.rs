//! Outbound request envelopes for framed RPC, with delivery modes and trace
//! propagation.
//!
//! The centre of this crate is [`ClientRequest`]: one outbound call, made of
//! the payload bytes a codec produced, a [`DeliveryMode`] that says whether
//! a reply is expected, and optionally a shared [`TraceContext`] to carry
//! across the process boundary.
//!
//! Around it sit the collaborators that produce and consume envelopes:
//! a [`Codec`], the [`Dispatcher`] (correlation, timeouts, trace injection),
//! the [`Transport`] abstraction with an in-memory implementation, and the
//! typed [`RpcClient`] / [`RpcServer`] pair.
//!

// Import all sub modules once...
mod client;
mod domain;
mod protocol;
mod server;
mod transport;

mod correlation;
mod error;
mod macros;
mod rpc_config;

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use client::{Dispatcher, RpcClient};
pub use server::RpcServer;

pub use rpc_config::{RpcConfig, DEFAULT_REQUEST_TIMEOUT};

pub use correlation::CorrelationId;
pub use error::{Result, RpcError};

pub use protocol::{CallMessage, Codec, JsonCodec, ReplyMessage};

pub use transport::{create_memory_transport, create_memory_transport_with_hub, MemoryHub};

// --- public re-exports
pub use domain::{
    //
    current_trace,
    trace_scope,
    Address,
    ClientRequest,
    DeliveryMode,
    Frame,
    SpanId,
    Subscription,
    SubscriptionHandle,
    TraceContext,
    TraceHeader,
    TraceId,
    Transport,
    TransportPtr,
    FLAG_DEBUG,
};
