// src/client/dispatcher.rs

//! Envelope dispatcher.
//!
//! The [`Dispatcher`] is the transport-facing consumer of
//! [`ClientRequest`]s. For each envelope it:
//!
//! - injects a trace context when the call has none and propagation is on,
//!   re-wrapping the call with the crate-private traced constructor;
//! - turns the envelope into a [`Frame`] addressed to `requests/{service}`;
//! - for request-reply calls, registers a pending entry keyed by a fresh
//!   correlation id and waits for the matching reply or the timeout;
//! - for fire-and-forget calls, hands the publish to a background task and
//!   returns at once. Publish failures for those are logged and dropped.
//!
//! A background receive loop on `responses/{node_id}` matches replies to
//! pending calls. When the transport closes, every waiting call fails with
//! [`RpcError::Transport`], and so does every request-reply call made
//! afterwards.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time;

use super::pending::{lock_ignore_poison, PendingCalls, PendingGuard};
use crate::{
    // ---
    current_trace,
    log_debug,
    log_warn,
    Address,
    ClientRequest,
    CorrelationId,
    DeliveryMode,
    Frame,
    Result,
    RpcConfig,
    RpcError,
    Subscription,
    TraceContext,
    TraceHeader,
    TransportPtr,
};

/// Sends envelopes to one remote service over a transport.
///
/// Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    config: RpcConfig,
    target: Address,
    reply_to: Address,
    pending: Arc<Mutex<PendingCalls>>,

    /// Kept so the receive loop can be aborted when the last clone drops.
    rx_task: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.rx_task.abort();
    }
}

impl Dispatcher {
    // ---
    /// Create a dispatcher for calls to `service`.
    ///
    /// Subscribes to `responses/{config.node_id}` before returning, so replies
    /// to calls made right after construction are never missed.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::InvalidConfig` if the config does not validate, or
    /// the transport's error if the reply subscription fails.
    pub async fn new(transport: TransportPtr, service: &str, config: RpcConfig) -> Result<Self> {
        // ---
        config.validate()?;

        let reply_to = Address::from(format!("responses/{}", config.node_id));
        let mut handle = transport
            .subscribe(Subscription::from(reply_to.clone()))
            .await?;

        let pending = Arc::new(Mutex::new(PendingCalls::default()));

        let rx_task = {
            let pending = pending.clone();
            let _transport_id = transport.transport_id().to_owned();

            tokio::spawn(async move {
                // ---
                while let Some(frame) = handle.inbox.recv().await {
                    handle_reply(&pending, frame);
                }

                log_debug!("{_transport_id}: reply subscription closed, failing pending calls");
                lock_ignore_poison(&pending).close();
            })
        };

        log_debug!(
            "{}: dispatcher for requests/{service} ready",
            transport.transport_id()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                target: Address::from(format!("requests/{service}")),
                reply_to,
                config,
                pending,
                rx_task,
            }),
        })
    }

    /// Send one envelope.
    ///
    /// Returns `Ok(Some(reply))` for request-reply calls and `Ok(None)` for
    /// fire-and-forget calls, which return as soon as the publish has been
    /// handed off.
    ///
    /// # Errors
    ///
    /// For request-reply calls:
    /// - `RpcError::Timeout` if no reply arrives within `request_timeout`
    /// - `RpcError::Transport` if the publish fails or the transport closes
    ///   while waiting
    ///
    /// Fire-and-forget calls do not fail here.
    pub async fn dispatch(&self, request: ClientRequest) -> Result<Option<Bytes>> {
        // ---
        let request = self.inject_trace(request);
        let (payload, mode, trace) = request.into_parts();
        let header = trace.as_deref().map(TraceContext::header);

        log_debug!(
            "dispatch {mode} to {} ({} bytes, trace {})",
            self.inner.target.0,
            payload.len(),
            trace
                .as_deref()
                .map(|ctx| ctx.trace_id().to_string())
                .unwrap_or_else(|| "-".into())
        );

        match mode {
            DeliveryMode::FireAndForget => {
                self.send_oneway(payload, header);
                Ok(None)
            }
            DeliveryMode::RequestReply => self.call(payload, header).await.map(Some),
        }
    }

    /// Number of request-reply calls still waiting for a reply.
    pub fn pending_len(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }

    /// True once the reply subscription has ended. Request-reply calls then
    /// fail at once with `RpcError::Transport`.
    pub fn is_closed(&self) -> bool {
        lock_ignore_poison(&self.inner.pending).is_closed()
    }

    /// Address calls are published to.
    pub fn target(&self) -> &Address {
        &self.inner.target
    }

    /// Attach a trace context if the call has none and propagation is on.
    ///
    /// The new context is a child of the current task-local context, or a
    /// fresh root when there is none. A context already on the call is kept
    /// untouched.
    pub(crate) fn inject_trace(&self, request: ClientRequest) -> ClientRequest {
        // ---
        if request.trace().is_some() || !self.inner.config.propagate_trace {
            return request;
        }

        let ctx = match current_trace() {
            Some(parent) => parent.child(),
            None => TraceContext::root().with_sampled(self.inner.config.sample_traces),
        };

        let (payload, mode, _) = request.into_parts();
        ClientRequest::with_trace(payload, mode, Arc::new(ctx))
    }

    fn send_oneway(&self, payload: Bytes, header: Option<TraceHeader>) {
        // ---
        let frame = Frame::oneway(self.inner.target.clone(), payload, header);
        let transport = self.inner.transport.clone();

        tokio::spawn(async move {
            let _target = frame.address.clone();
            if let Err(_err) = transport.publish(frame).await {
                log_warn!("fire-and-forget publish to {} failed: {_err}", _target.0);
            }
        });
    }

    async fn call(&self, payload: Bytes, header: Option<TraceHeader>) -> Result<Bytes> {
        // ---
        let correlation_id: Arc<str> = (&CorrelationId::generate()).into();

        let rx = lock_ignore_poison(&self.inner.pending).register(correlation_id.clone())?;
        let _guard = PendingGuard::new(&self.inner.pending, correlation_id.clone());

        let frame = Frame::call(
            self.inner.target.clone(),
            payload,
            correlation_id.clone(),
            self.inner.reply_to.clone(),
            header,
        );

        self.inner.transport.publish(frame).await?;

        match time::timeout(self.inner.config.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RpcError::Transport(
                "reply channel closed (transport shut down)".into(),
            )),
            Err(_) => {
                log_debug!("call {correlation_id} timed out");
                Err(RpcError::Timeout)
            }
        }
    }
}

fn handle_reply(pending: &Mutex<PendingCalls>, frame: Frame) {
    // ---
    let Some(correlation_id) = frame.correlation_id else {
        log_warn!("reply without correlation_id dropped");
        return;
    };

    if !lock_ignore_poison(pending).complete(&correlation_id, frame.payload) {
        log_debug!("reply arrived after call abandoned (correlation_id: {correlation_id})");
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{
        create_memory_transport_with_hub, trace_scope, MemoryHub, SubscriptionHandle, Transport,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Accepts subscriptions but fails every publish.
    #[derive(Default)]
    struct BrokenTransport {
        publishes: AtomicUsize,
        inboxes: Mutex<Vec<mpsc::Sender<Frame>>>,
    }

    #[async_trait::async_trait]
    impl Transport for BrokenTransport {
        fn transport_id(&self) -> &str {
            "broken"
        }

        async fn publish(&self, _frame: Frame) -> Result<()> {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::Transport("link down".into()))
        }

        async fn subscribe(&self, _sub: Subscription) -> Result<SubscriptionHandle> {
            let (tx, rx) = mpsc::channel(1);
            lock_ignore_poison(&self.inboxes).push(tx);
            Ok(SubscriptionHandle { inbox: rx })
        }

        async fn close(&self) -> Result<()> {
            lock_ignore_poison(&self.inboxes).clear();
            Ok(())
        }
    }

    async fn dispatcher(hub: &Arc<MemoryHub>, config: RpcConfig) -> Dispatcher {
        // ---
        let transport = create_memory_transport_with_hub(config.node_id.clone(), hub.clone())
            .await
            .unwrap();
        Dispatcher::new(transport, "echo", config).await.unwrap()
    }

    async fn service_inbox(hub: &Arc<MemoryHub>) -> (TransportPtr, crate::SubscriptionHandle) {
        // ---
        let transport = create_memory_transport_with_hub("echo", hub.clone())
            .await
            .unwrap();
        let handle = transport
            .subscribe(Subscription::from("requests/echo"))
            .await
            .unwrap();
        (transport, handle)
    }

    #[tokio::test]
    async fn test_inject_trace_creates_root() {
        // ---
        let hub = MemoryHub::new();
        let config = RpcConfig::new("client").with_sampled_traces(Some(true));
        let dispatcher = dispatcher(&hub, config).await;

        let req = dispatcher.inject_trace(ClientRequest::new(
            Bytes::from_static(b"x"),
            DeliveryMode::RequestReply,
        ));

        let ctx = req.trace().expect("trace injected");
        assert!(ctx.parent_id().is_none());
        assert_eq!(ctx.sampled(), Some(true));
        assert_eq!(&req.payload()[..], b"x");
    }

    #[tokio::test]
    async fn test_inject_trace_keeps_existing_context() {
        // ---
        let hub = MemoryHub::new();
        let dispatcher = dispatcher(&hub, RpcConfig::new("client")).await;

        let ctx = Arc::new(TraceContext::root());
        let req = ClientRequest::with_trace(
            Bytes::from_static(b"x"),
            DeliveryMode::FireAndForget,
            ctx.clone(),
        );

        let req = dispatcher.inject_trace(req);
        assert!(Arc::ptr_eq(req.trace().unwrap(), &ctx));
    }

    #[tokio::test]
    async fn test_inject_trace_uses_current_as_parent() {
        // ---
        let hub = MemoryHub::new();
        let dispatcher = dispatcher(&hub, RpcConfig::new("client")).await;
        let parent = Arc::new(TraceContext::root());

        let req = ClientRequest::new(Bytes::new(), DeliveryMode::RequestReply);
        let req = trace_scope(parent.clone(), async { dispatcher.inject_trace(req) }).await;

        let ctx = req.trace().unwrap();
        assert_eq!(ctx.trace_id(), parent.trace_id());
        assert_eq!(ctx.parent_id(), Some(parent.span_id()));
    }

    #[tokio::test]
    async fn test_inject_trace_disabled() {
        // ---
        let hub = MemoryHub::new();
        let config = RpcConfig::new("client").with_trace_propagation(false);
        let dispatcher = dispatcher(&hub, config).await;

        let req = ClientRequest::new(Bytes::new(), DeliveryMode::RequestReply);
        let req = dispatcher.inject_trace(req);
        assert!(req.trace().is_none());
    }

    #[tokio::test]
    async fn test_oneway_returns_without_reply() {
        // ---
        let hub = MemoryHub::new();
        let (_service, mut inbox) = service_inbox(&hub).await;
        let dispatcher = dispatcher(&hub, RpcConfig::new("client")).await;

        let reply = dispatcher
            .dispatch(ClientRequest::new(
                Bytes::from_static(b"note"),
                DeliveryMode::FireAndForget,
            ))
            .await
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(dispatcher.pending_len(), 0);

        let frame = time::timeout(Duration::from_millis(200), inbox.inbox.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("inbox closed");

        assert_eq!(frame.delivery_mode, DeliveryMode::FireAndForget);
        assert!(frame.correlation_id.is_none());
        assert!(frame.reply_to.is_none());
        assert!(frame.trace.is_some());
        assert_eq!(&frame.payload[..], b"note");
    }

    #[tokio::test]
    async fn test_oneway_without_subscriber_does_not_block() {
        // ---
        let hub = MemoryHub::new();
        let dispatcher = dispatcher(&hub, RpcConfig::new("client")).await;

        let result = time::timeout(
            Duration::from_millis(100),
            dispatcher.dispatch(ClientRequest::new(Bytes::new(), DeliveryMode::FireAndForget)),
        )
        .await
        .expect("fire-and-forget dispatch blocked");

        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_reply_correlates() {
        // ---
        let hub = MemoryHub::new();
        let (service, mut inbox) = service_inbox(&hub).await;
        let dispatcher = dispatcher(&hub, RpcConfig::new("client")).await;

        tokio::spawn(async move {
            while let Some(frame) = inbox.inbox.recv().await {
                let reply = Frame::reply(
                    frame.reply_to.unwrap(),
                    frame.payload,
                    frame.correlation_id.unwrap(),
                );
                service.publish(reply).await.unwrap();
            }
        });

        let reply = dispatcher
            .dispatch(ClientRequest::new(
                Bytes::from_static(b"ping"),
                DeliveryMode::RequestReply,
            ))
            .await
            .unwrap();

        assert_eq!(reply.as_deref(), Some(&b"ping"[..]));
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_request_reply_times_out() {
        // ---
        let hub = MemoryHub::new();
        let (_service, _inbox) = service_inbox(&hub).await;
        let config = RpcConfig::new("client").with_request_timeout(Duration::from_millis(50));
        let dispatcher = dispatcher(&hub, config).await;

        let result = dispatcher
            .dispatch(ClientRequest::new(Bytes::new(), DeliveryMode::RequestReply))
            .await;

        assert!(matches!(result, Err(RpcError::Timeout)));
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_transport_close_fails_pending_call() {
        // ---
        let hub = MemoryHub::new();
        let (service, _inbox) = service_inbox(&hub).await;
        let dispatcher = dispatcher(&hub, RpcConfig::new("client")).await;

        let call = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch(ClientRequest::new(Bytes::new(), DeliveryMode::RequestReply))
                    .await
            })
        };

        while dispatcher.pending_len() == 0 {
            tokio::task::yield_now().await;
        }
        service.close().await.unwrap();

        let result = call.await.unwrap();
        assert!(matches!(result, Err(RpcError::Transport(_))));
    }

    #[tokio::test]
    async fn test_call_after_close_fails_immediately() {
        // ---
        let hub = MemoryHub::new();
        let (service, _inbox) = service_inbox(&hub).await;
        let config = RpcConfig::new("client").with_request_timeout(Duration::from_secs(5));
        let dispatcher = dispatcher(&hub, config).await;

        service.close().await.unwrap();
        while !dispatcher.is_closed() {
            tokio::task::yield_now().await;
        }

        let result = time::timeout(
            Duration::from_millis(200),
            dispatcher.dispatch(ClientRequest::new(Bytes::new(), DeliveryMode::RequestReply)),
        )
        .await
        .expect("call waited for the request timeout");

        assert!(matches!(result, Err(RpcError::Transport(_))));
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_request_reply_publish_failure() {
        // ---
        let transport = Arc::new(BrokenTransport::default());
        let dispatcher = Dispatcher::new(transport.clone(), "echo", RpcConfig::new("client"))
            .await
            .unwrap();

        let result = dispatcher
            .dispatch(ClientRequest::new(Bytes::new(), DeliveryMode::RequestReply))
            .await;

        assert!(matches!(result, Err(RpcError::Transport(_))));
        assert_eq!(dispatcher.pending_len(), 0);
        assert_eq!(transport.publishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oneway_publish_failure_is_dropped() {
        // ---
        let transport = Arc::new(BrokenTransport::default());
        let dispatcher = Dispatcher::new(transport.clone(), "echo", RpcConfig::new("client"))
            .await
            .unwrap();

        let reply = dispatcher
            .dispatch(ClientRequest::new(
                Bytes::from_static(b"note"),
                DeliveryMode::FireAndForget,
            ))
            .await
            .unwrap();
        assert!(reply.is_none());

        time::timeout(Duration::from_millis(200), async {
            while transport.publishes.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("fire-and-forget publish never attempted");

        assert_eq!(dispatcher.pending_len(), 0);
        assert!(!dispatcher.is_closed());
    }
}
