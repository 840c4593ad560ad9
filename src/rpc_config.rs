//! Client-side RPC configuration.
//!
//! Holds no transport settings; those belong to whoever builds the transport.

use std::time::Duration;

use crate::{Result, RpcError};

/// Default time a request-reply call waits for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatcher and client configuration.
///
/// # Example
///
/// ```
/// use rpc_envelope::RpcConfig;
/// use std::time::Duration;
///
/// let config = RpcConfig::new("billing-client")
///     .with_request_timeout(Duration::from_secs(5))
///     .with_sampled_traces(Some(true));
///
/// assert!(config.propagate_trace);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Identity of this node. Replies are addressed to `responses/{node_id}`.
    pub node_id: String,

    /// How long a request-reply call waits for its reply.
    ///
    /// Fire-and-forget calls never wait.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Attach a trace context to calls that do not already carry one.
    ///
    /// Default: true
    pub propagate_trace: bool,

    /// Sampling decision stamped on root contexts the dispatcher creates.
    ///
    /// `None` leaves the decision to whoever receives the call.
    pub sample_traces: Option<bool>,
}

impl RpcConfig {
    /// Create a config with defaults for everything but the node id.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            propagate_trace: true,
            sample_traces: None,
        }
    }

    /// Set the request timeout for request-reply calls.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable or disable trace injection.
    pub fn with_trace_propagation(mut self, enabled: bool) -> Self {
        self.propagate_trace = enabled;
        self
    }

    pub fn with_sampled_traces(mut self, sampled: Option<bool>) -> Self {
        self.sample_traces = sampled;
        self
    }

    /// Check the settings before a dispatcher is built from them.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::InvalidConfig` for an empty node id or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.node_id.is_empty() {
            return Err(RpcError::InvalidConfig("node_id must not be empty".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(RpcError::InvalidConfig(
                "request_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_defaults() {
        // ---
        let config = RpcConfig::new("client");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.propagate_trace);
        assert!(config.sample_traces.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_node_id() {
        // ---
        let result = RpcConfig::new("").validate();
        assert!(matches!(result, Err(RpcError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        // ---
        let result = RpcConfig::new("client")
            .with_request_timeout(Duration::ZERO)
            .validate();
        assert!(matches!(result, Err(RpcError::InvalidConfig(_))));
    }
}
