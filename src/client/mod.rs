// src/client/mod.rs
//! RPC client implementation.
//!
//! [`RpcClient`] is the call layer on top of the [`Dispatcher`]: it encodes a
//! typed request into payload bytes with the codec, wraps them in a
//! [`ClientRequest`] with the right delivery mode, and decodes the reply.
//!
//! # Concurrency
//!
//! Multiple calls can be in flight at once. Each request-reply call gets its
//! own correlation id; fire-and-forget calls hold no state at all once
//! handed off.

mod dispatcher;
mod pending;

pub use dispatcher::Dispatcher;
pub(crate) use pending::lock_ignore_poison;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time;

use crate::{
    // ---
    CallMessage,
    ClientRequest,
    Codec,
    DeliveryMode,
    JsonCodec,
    ReplyMessage,
    Result,
    RpcConfig,
    RpcError,
    TransportPtr,
};

/// Typed RPC client bound to one remote service.
///
/// Cheap to clone (internally `Arc`-backed).
///
/// # Example
///
/// ```no_run
/// # use rpc_envelope::{create_memory_transport, RpcClient, RpcConfig};
/// # use serde::{Deserialize, Serialize};
/// #[derive(Serialize)]
/// struct AddRequest { a: i32, b: i32 }
/// #[derive(Deserialize)]
/// struct AddResponse { sum: i32 }
/// # async fn example() -> rpc_envelope::Result<()> {
/// let transport = create_memory_transport("client").await?;
/// let client = RpcClient::with_transport(transport, "calculator", RpcConfig::new("client")).await?;
///
/// let resp: AddResponse = client.call("add", AddRequest { a: 2, b: 3 }).await?;
/// assert_eq!(resp.sum, 5);
/// client.send_oneway("log", "added two numbers").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    // ---
    dispatcher: Dispatcher,
    codec: Arc<dyn Codec>,
}

impl RpcClient {
    // ---
    /// Create a client for `service` using the given transport and the JSON codec.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::InvalidConfig` for an invalid config, or the
    /// transport's error if the reply subscription cannot be established.
    pub async fn with_transport(
        transport: TransportPtr,
        service: &str,
        config: RpcConfig,
    ) -> Result<Self> {
        // ---
        let dispatcher = Dispatcher::new(transport, service, config).await?;
        Ok(Self {
            dispatcher,
            codec: Arc::new(JsonCodec),
        })
    }

    /// Replace the payload codec. The server must use a compatible one.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Call `method` and wait for the reply.
    ///
    /// # Errors
    ///
    /// - `RpcError::Encoding` if the request or reply cannot be (de)serialized
    /// - `RpcError::Timeout` if no reply arrives within `request_timeout`
    /// - `RpcError::Transport` if the publish fails or the transport closes
    /// - `RpcError::Remote` if the server reports a failure
    pub async fn call<TReq, TResp>(&self, method: &str, req: TReq) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        // ---
        let payload = self.encode(method, req)?;
        let reply = self
            .dispatcher
            .dispatch(ClientRequest::new(payload, DeliveryMode::RequestReply))
            .await?
            .ok_or(RpcError::InvalidResponse)?;

        match self.codec.decode_reply(&reply)? {
            ReplyMessage::Success(value) => Ok(serde_json::from_value(value)?),
            ReplyMessage::Failure(msg) => Err(RpcError::Remote(msg)),
        }
    }

    /// Call `method` with an overall deadline.
    ///
    /// The deadline covers encoding, dispatch and decoding. If it expires
    /// the call is abandoned and its pending entry removed.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), with `RpcError::Timeout` when `timeout` expires.
    pub async fn call_with_timeout<TReq, TResp>(
        &self,
        method: &str,
        req: TReq,
        timeout: Duration,
    ) -> Result<TResp>
    where
        TReq: Serialize,
        TResp: DeserializeOwned,
    {
        time::timeout(timeout, self.call(method, req))
            .await
            .map_err(|_| RpcError::Timeout)?
    }

    /// Send a fire-and-forget call.
    ///
    /// Returns once the call has been handed to the transport; the server
    /// never replies. Transport failures after hand-off are logged, not
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Encoding` if the request cannot be serialized.
    pub async fn send_oneway<TReq>(&self, method: &str, req: TReq) -> Result<()>
    where
        TReq: Serialize,
    {
        // ---
        let payload = self.encode(method, req)?;
        self.dispatcher
            .dispatch(ClientRequest::new(payload, DeliveryMode::FireAndForget))
            .await?;
        Ok(())
    }

    /// Dispatch a prebuilt envelope as-is.
    ///
    /// For callers that produce payloads with their own codec. Returns the
    /// raw reply bytes for request-reply envelopes and `None` otherwise.
    pub async fn dispatch_raw(&self, request: ClientRequest) -> Result<Option<Bytes>> {
        self.dispatcher.dispatch(request).await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn encode<TReq: Serialize>(&self, method: &str, req: TReq) -> Result<Bytes> {
        // ---
        let args = serde_json::to_value(req)?;
        self.codec.encode_call(&CallMessage::new(method, args))
    }
}
