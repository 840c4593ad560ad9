use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Correlation ID for matching a request-reply call to its reply
///
/// Uses UUID v4 in standard 36-byte string format. Fire-and-forget frames
/// carry no correlation ID at all.
///
/// # Format
///
/// Standard UUID format: `550e8400-e29b-41d4-a9b6-446655440000`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    // ---

    /// Generate a new unique correlation ID
    pub fn generate() -> Self {
        // ---
        Self(Uuid::new_v4().to_string())
    }

    /// Get the correlation ID as a string slice
    pub fn as_str(&self) -> &str {
        // ---
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    // ---

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.write_str(&self.0)
    }
}

impl From<&CorrelationId> for Arc<str> {
    // ---

    fn from(id: &CorrelationId) -> Self {
        // ---
        Arc::from(id.as_str())
    }
}
