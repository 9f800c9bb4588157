//! Error types shared by every component of the mirror.

use std::time::Duration;

use thiserror::Error;

/// JSON-RPC code a node returns when it has announced a block it cannot serve yet.
pub const NOT_YET_AVAILABLE_CODE: i64 = -32000;

/// Errors that can occur while mirroring the chain.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Connection refused, timeout, TLS failure, body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The bulk provider asked us to slow down.
    #[error("rate limited, backoff {backoff:?}")]
    RateLimited { backoff: Duration },

    /// Any non-success HTTP status other than 429.
    #[error("unexpected HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// A payload could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The store already exists with capacity parameters different from the configured ones.
    #[error(
        "store capacity mismatch: existing {existing_documents} docs / {existing_bytes} bytes, \
         configured {configured_documents} docs / {configured_bytes} bytes"
    )]
    CapacityMismatch {
        existing_documents: u64,
        existing_bytes: u64,
        configured_documents: u64,
        configured_bytes: u64,
    },

    #[error("invalid store capacity: {0}")]
    InvalidCapacity(String),

    /// Live subscription connect/send/receive failure.
    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MirrorError {
    /// Returns `true` if the node reported that the block is not available yet.
    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == NOT_YET_AVAILABLE_CODE)
    }

    /// Returns `true` for upstream conditions that are expected to clear on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited { .. }) || self.is_not_yet_available()
    }
}
