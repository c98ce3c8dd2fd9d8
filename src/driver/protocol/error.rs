use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DbError;

/// Error payload carried in the error slot of a response frame
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{error} ({status}): {reason}")]
pub struct RpcError {
    pub status: u16,
    pub error: String,
    pub reason: String,
}

impl RpcError {
    pub fn new(status: u16, error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            reason: reason.into(),
        }
    }

    /// Database name not present in the registry
    pub fn database_not_found(name: &str) -> Self {
        Self::new(404, "not_found", format!("Database '{}' is not registered", name))
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(404, "unknown_method", format!("Unknown method: {}", method))
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(400, "bad_request", reason)
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(403, "forbidden", reason)
    }

    pub fn timeout(after_ms: u128) -> Self {
        Self::new(408, "timeout", format!("Handler did not complete within {}ms", after_ms))
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(500, "internal_error", reason)
    }
}

impl From<DbError> for RpcError {
    fn from(err: DbError) -> Self {
        Self::new(err.status(), err.name(), err.reason())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("Serialization failed: {}", err))
    }
}

/// Errors raised while framing messages on a byte transport
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Serialization failed: {0}")]
    Encode(String),

    #[error("Deserialization failed: {0}")]
    Decode(String),

    #[error("Invalid handshake header")]
    BadMagic,
}
