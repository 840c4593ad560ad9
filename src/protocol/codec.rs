// src/protocol/codec.rs

//! Payload codec.
//!
//! The codec is the only component that knows what is inside a payload. It
//! produces the bytes a [`ClientRequest`](crate::ClientRequest) carries and
//! parses the bytes of a reply. The envelope, the dispatcher and the
//! transport never look inside.

use bytes::Bytes;

use super::{CallMessage, ReplyMessage};
use crate::Result;

/// Serializes calls and replies to payload bytes.
///
/// Every failure is reported as [`RpcError::Encoding`](crate::RpcError::Encoding).
pub trait Codec: Send + Sync {
    // ---
    fn encode_call(&self, call: &CallMessage) -> Result<Bytes>;

    fn decode_call(&self, payload: &[u8]) -> Result<CallMessage>;

    fn encode_reply(&self, reply: &ReplyMessage) -> Result<Bytes>;

    fn decode_reply(&self, payload: &[u8]) -> Result<ReplyMessage>;
}

/// JSON codec backed by `serde_json`. The default for clients and servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    // ---
    fn encode_call(&self, call: &CallMessage) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(call)?))
    }

    fn decode_call(&self, payload: &[u8]) -> Result<CallMessage> {
        Ok(serde_json::from_slice(payload)?)
    }

    fn encode_reply(&self, reply: &ReplyMessage) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(reply)?))
    }

    fn decode_reply(&self, payload: &[u8]) -> Result<ReplyMessage> {
        Ok(serde_json::from_slice(payload)?)
    }
}
