use thiserror::Error;

/// Errors surfaced by the codec, dispatcher and transport layers.
///
/// A [`ClientRequest`](crate::ClientRequest) itself never fails; every
/// variant here belongs to one of the collaborators that consume it.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Payload could not be encoded or decoded by the codec.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Publish failed or the transport shut down underneath a call.
    #[error("transport error: {0}")]
    Transport(String),

    /// A request-reply call did not receive its reply in time.
    #[error("request timed out")]
    Timeout,

    /// A reply arrived that could not be matched or interpreted.
    #[error("invalid response")]
    InvalidResponse,

    /// The remote handler reported a failure.
    #[error("remote failure: {0}")]
    Remote(String),

    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
