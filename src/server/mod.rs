// src/server/mod.rs
//! RPC server implementation.
//!
//! The server subscribes to `requests/{service}`, decodes each incoming
//! call with the codec and runs the registered handler. Request-reply calls
//! get a [`ReplyMessage`] published to their `reply_to` address with the
//! original correlation id. Fire-and-forget calls never get a reply; a
//! failing oneway handler is only logged.
//!
//! A trace header on the incoming frame is turned back into a
//! [`TraceContext`] and installed as the task-local current context while
//! the handler runs, so calls the handler makes continue the same trace.

mod handler;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::client::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    trace_scope,
    Codec,
    Frame,
    JsonCodec,
    ReplyMessage,
    Result,
    Subscription,
    TraceContext,
    TransportPtr,
};
use handler::{wrap_handler, BoxedHandler};

/// RPC server for one named service.
///
/// Cheap to clone (internally `Arc`-backed).
///
/// # Example
///
/// ```no_run
/// # use rpc_envelope::{create_memory_transport, RpcServer};
/// # async fn example() -> rpc_envelope::Result<()> {
/// let transport = create_memory_transport("calculator").await?;
/// let server = RpcServer::with_transport(transport, "calculator");
///
/// server.register("add", |(a, b): (i32, i32)| async move { Ok(a + b) });
///
/// let handle = server.spawn().await?;
/// # server.shutdown().await?;
/// # handle.await.ok();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcServer {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    service: String,
    codec: Arc<dyn Codec>,
    handlers: Mutex<HashMap<String, BoxedHandler>>,
}

impl RpcServer {
    // ---
    /// Create a server for `service` using the JSON codec.
    pub fn with_transport(transport: TransportPtr, service: impl Into<String>) -> Self {
        // ---
        Self::with_codec(transport, service, Arc::new(JsonCodec))
    }

    /// Create a server with a specific payload codec.
    pub fn with_codec(
        transport: TransportPtr,
        service: impl Into<String>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        // ---
        Self {
            inner: Arc::new(Inner {
                transport,
                service: service.into(),
                codec,
                handlers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a handler for `method`, replacing any previous one.
    ///
    /// Handlers may be registered before or after [`spawn`](Self::spawn).
    pub fn register<TReq, TResp, F, Fut>(&self, method: &str, handler: F)
    where
        TReq: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TReq) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        // ---
        let mut handlers = lock_ignore_poison(&self.inner.handlers);
        handlers.insert(method.to_string(), wrap_handler(handler));
    }

    /// Subscribe and start the receive loop.
    ///
    /// The subscription is in place when this returns. The loop ends when the
    /// transport closes; each call is handled on its own task.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the subscription fails.
    pub async fn spawn(&self) -> Result<JoinHandle<()>> {
        // ---
        let subscription = Subscription::from(format!("requests/{}", self.inner.service));
        let mut handle = self.inner.transport.subscribe(subscription).await?;
        let inner = self.inner.clone();

        Ok(tokio::spawn(async move {
            // ---
            log_info!("server task started for requests/{}", inner.service);

            while let Some(frame) = handle.inbox.recv().await {
                let inner = inner.clone();
                tokio::spawn(async move { inner.process(frame).await });
            }

            log_debug!("server task stopped for requests/{}", inner.service);
        }))
    }

    /// Close the transport, which ends the receive loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.transport.close().await
    }
}

impl Inner {
    // ---
    async fn process(&self, frame: Frame) {
        // ---
        let trace = frame.trace.as_ref().and_then(|header| {
            let ctx = TraceContext::from_header(header);
            if ctx.is_none() {
                log_warn!("ignoring malformed trace header {header:?}");
            }
            ctx.map(Arc::new)
        });

        let outcome = match trace {
            Some(ctx) => trace_scope(ctx, self.run_handler(&frame)).await,
            None => self.run_handler(&frame).await,
        };

        if frame.delivery_mode.is_oneway() {
            if let ReplyMessage::Failure(_msg) = &outcome {
                log_warn!("fire-and-forget call failed: {_msg}");
            }
            return;
        }

        let (Some(reply_to), Some(correlation_id)) = (frame.reply_to, frame.correlation_id) else {
            log_warn!("request-reply frame without reply_to or correlation_id dropped");
            return;
        };

        let payload = match self.codec.encode_reply(&outcome) {
            Ok(payload) => payload,
            Err(_err) => {
                log_error!("failed to encode reply: {_err}");
                return;
            }
        };

        if let Err(_err) = self
            .transport
            .publish(Frame::reply(reply_to, payload, correlation_id))
            .await
        {
            log_error!("failed to publish reply: {_err}");
        }
    }

    async fn run_handler(&self, frame: &Frame) -> ReplyMessage {
        // ---
        let call = match self.codec.decode_call(&frame.payload) {
            Ok(call) => call,
            Err(err) => return ReplyMessage::Failure(format!("undecodable call: {err}")),
        };

        let handler = lock_ignore_poison(&self.handlers).get(&call.method).cloned();
        let Some(handler) = handler else {
            log_warn!("no handler for method: {}", call.method);
            return ReplyMessage::Failure(format!("no handler for method: {}", call.method));
        };

        match handler.call(call.args).await {
            Ok(value) => ReplyMessage::Success(value),
            Err(err) => ReplyMessage::Failure(err.to_string()),
        }
    }
}
