use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A call as the codec sees it: method name plus arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMessage {
    pub method: String,
    pub args: Value,
}

/// Outcome of a request-reply call, written by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMessage {
    Success(Value),
    Failure(String),
}

impl CallMessage {
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}
