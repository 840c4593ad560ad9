// src/domain/trace.rs

//! Trace propagation context.
//!
//! A [`TraceContext`] holds the identifiers that correlate one call across
//! process boundaries: the trace it belongs to, its own span, the parent span
//! and the sampling decision. The dispatcher turns it into a [`TraceHeader`]
//! on the outgoing frame and the server turns the header back into a context
//! for the handler.
//!
//! How spans are recorded or exported is left to whatever tracer the
//! application uses; this module only carries identifiers.
//!
//! The "current" context is task-local. Wrap a future in [`scope`] and any
//! call dispatched from inside it becomes a child of that context.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flags bit set when the trace was forced on for debugging.
pub const FLAG_DEBUG: u64 = 1;

tokio::task_local! {
    static CURRENT: Arc<TraceContext>;
}

fn random_id() -> u64 {
    // ---
    let (hi, lo) = Uuid::new_v4().as_u64_pair();
    match hi ^ lo {
        0 => 1,
        id => id,
    }
}

/// Hex id of 1 to 16 digits. Zero is not a valid id.
fn parse_id(s: &str) -> Option<u64> {
    // ---
    if s.is_empty() || s.len() > 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match u64::from_str_radix(s, 16) {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    }
}

/// Identifier shared by every span of one trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u64);

/// Identifier of a single span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl TraceId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(random_id())
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl SpanId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(random_id())
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Correlation identifiers for one outbound call.
///
/// Contexts are created by the application (or by the dispatcher when none
/// is supplied) and shared by `Arc`. Nothing in this crate mutates one after
/// it is built.
///
/// # Example
///
/// ```
/// use rpc_envelope::TraceContext;
///
/// let root = TraceContext::root().with_sampled(Some(true));
/// let child = root.child();
///
/// assert_eq!(child.trace_id(), root.trace_id());
/// assert_eq!(child.parent_id(), Some(root.span_id()));
/// assert_eq!(child.sampled(), Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    // ---
    trace_id: TraceId,
    span_id: SpanId,
    parent_id: Option<SpanId>,
    sampled: Option<bool>,
    debug: bool,
}

impl TraceContext {
    // ---
    /// Start a new trace. The root span has no parent and no sampling decision.
    pub fn root() -> Self {
        // ---
        let span_id = SpanId::generate();
        Self {
            trace_id: TraceId::generate(),
            span_id,
            parent_id: None,
            sampled: None,
            debug: false,
        }
    }

    /// Build a context from known identifiers.
    pub fn from_ids(trace_id: TraceId, span_id: SpanId, parent_id: Option<SpanId>) -> Self {
        Self {
            trace_id,
            span_id,
            parent_id,
            sampled: None,
            debug: false,
        }
    }

    pub fn with_sampled(mut self, sampled: Option<bool>) -> Self {
        self.sampled = sampled;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// A new span in the same trace, parented on this one.
    ///
    /// Sampling and debug flags are inherited.
    pub fn child(&self) -> Self {
        // ---
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::generate(),
            parent_id: Some(self.span_id),
            sampled: self.sampled,
            debug: self.debug,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_id(&self) -> Option<SpanId> {
        self.parent_id
    }

    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Correlation metadata to attach to an outgoing frame.
    pub fn header(&self) -> TraceHeader {
        // ---
        TraceHeader {
            trace_id: self.trace_id.to_string(),
            span_id: self.span_id.to_string(),
            parent_span_id: self.parent_id.map(|id| id.to_string()),
            sampled: self.sampled,
            flags: if self.debug { FLAG_DEBUG } else { 0 },
        }
    }

    /// Rebuild a context from frame metadata.
    ///
    /// Returns `None` when an identifier is not valid hex.
    pub fn from_header(header: &TraceHeader) -> Option<Self> {
        // ---
        let parent_id = match &header.parent_span_id {
            Some(raw) => Some(SpanId(parse_id(raw)?)),
            None => None,
        };

        Some(Self {
            trace_id: TraceId(parse_id(&header.trace_id)?),
            span_id: SpanId(parse_id(&header.span_id)?),
            parent_id,
            sampled: header.sampled,
            debug: header.flags & FLAG_DEBUG != 0,
        })
    }
}

/// Trace identifiers as carried on the wire next to a payload.
///
/// Ids are 16-digit lowercase hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHeader {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampled: Option<bool>,
    #[serde(default)]
    pub flags: u64,
}

/// Run `fut` with `ctx` as the current trace context.
pub async fn scope<F>(ctx: Arc<TraceContext>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, fut).await
}

/// The trace context of the enclosing [`scope`], if any.
pub fn current() -> Option<Arc<TraceContext>> {
    CURRENT.try_with(Arc::clone).ok()
}
