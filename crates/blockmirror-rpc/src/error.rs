//! Transport-level error types.

use std::time::Duration;

use thiserror::Error;

use blockmirror_core::MirrorError;

use crate::request::JsonRpcError;

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success status that is not a rate limit.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// HTTP 429. Wait `backoff` before the next pass.
    #[error("Rate limit exceeded, backoff {backoff:?}")]
    RateLimited { backoff: Duration },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A value could not be decoded (bad hex, unexpected id, ...).
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<TransportError> for MirrorError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Http(msg) => MirrorError::Transport(msg),
            TransportError::Status { status, body } => MirrorError::HttpStatus { status, body },
            TransportError::Rpc(err) => MirrorError::Rpc {
                code: err.code,
                message: err.message,
            },
            TransportError::RateLimited { backoff } => MirrorError::RateLimited { backoff },
            TransportError::Deserialization(err) => MirrorError::Decode(err.to_string()),
            TransportError::Decode(msg) => MirrorError::Decode(msg),
        }
    }
}
