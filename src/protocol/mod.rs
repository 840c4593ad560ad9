//! Call and reply messages and the codec that turns them into payload bytes.
//!
//! Everything in here sits on the far side of the request envelope: the
//! codec produces the payload, the envelope only carries it.

mod codec;
mod message;

pub use codec::{Codec, JsonCodec};
pub use message::{CallMessage, ReplyMessage};
