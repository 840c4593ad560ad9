//! Domain layer public interface.
//!
//! The request envelope, the trace context it may carry, and the transport
//! abstractions that consume it. Nothing here depends on a concrete
//! transport or codec.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod request;
mod trace;
mod transport;

pub use request::{ClientRequest, DeliveryMode};

pub use trace::{
    //
    current as current_trace,
    scope as trace_scope,
    SpanId,
    TraceContext,
    TraceHeader,
    TraceId,
    FLAG_DEBUG,
};

pub use transport::{
    //
    Address,
    Frame,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};
