//! Configuration value objects.
//!
//! The binary builds one [`MirrorConfig`] at startup and hands the relevant
//! parts to each component constructor. Nothing below reads the environment.

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

/// Default public Avalanche C-Chain JSON-RPC endpoint.
pub const DEFAULT_CHAIN_RPC: &str = "https://api.avax.network/ext/bc/C/rpc";
/// Default public Avalanche C-Chain WebSocket endpoint.
pub const DEFAULT_WS: &str = "wss://api.avax.network/ext/bc/C/ws";
/// Default retention window (blocks).
pub const DEFAULT_WINDOW: u64 = 10_000;
/// Default average document size estimate (KB).
pub const DEFAULT_AVG_DOC_SIZE_KB: u64 = 50;

// ─── SecretValue ──────────────────────────────────────────────────────────────

/// A string that never shows up in logs.
///
/// Both `Debug` and `Display` print a fixed mask; use [`SecretValue::expose`]
/// at the single place the raw value is needed.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("********")
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("********")
    }
}

// ─── StoreCapacity ────────────────────────────────────────────────────────────

/// Bounds of the capped block store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCapacity {
    /// Maximum number of block documents kept.
    pub max_documents: u64,
    /// Maximum total size of all documents, in bytes.
    pub max_bytes: u64,
}

impl StoreCapacity {
    pub fn new(max_documents: u64, max_bytes: u64) -> Result<Self, MirrorError> {
        if max_documents == 0 {
            return Err(MirrorError::InvalidCapacity("max_documents must be > 0".into()));
        }
        if max_bytes == 0 {
            return Err(MirrorError::InvalidCapacity("max_bytes must be > 0".into()));
        }
        Ok(Self {
            max_documents,
            max_bytes,
        })
    }

    /// Capacity for a window of `blocks` documents averaging `avg_doc_size_kb` KB each.
    pub fn from_window(blocks: u64, avg_doc_size_kb: u64) -> Result<Self, MirrorError> {
        let max_bytes = blocks
            .checked_mul(avg_doc_size_kb)
            .and_then(|b| b.checked_mul(1000))
            .ok_or_else(|| MirrorError::InvalidCapacity("byte budget overflows u64".into()))?;
        Self::new(blocks, max_bytes)
    }
}

// ─── CatchUpMode ──────────────────────────────────────────────────────────────

/// How the reconciliation path is sequenced against the live path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatchUpMode {
    /// Catch up fully, then open the live subscription.
    #[default]
    Sequential,
    /// Open the live subscription and catch up in the background.
    Concurrent,
}

impl std::fmt::Display for CatchUpMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

// ─── MirrorConfig ─────────────────────────────────────────────────────────────

/// Process-wide configuration, constructed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Chain JSON-RPC endpoint: head polling and by-hash fetch.
    pub chain_rpc_url: String,
    /// Batch-capable endpoint used for catch-up. Usually carries a credential.
    pub bulk_rpc_url: SecretValue,
    /// Live `newHeads` subscription endpoint.
    pub ws_url: String,
    /// Store location (SQLite path or URL).
    pub store_url: SecretValue,
    /// Retention window in blocks.
    pub window: u64,
    /// Average document size estimate in KB, used for the byte budget.
    pub avg_doc_size_kb: u64,
    pub catch_up: CatchUpMode,
    /// Stop retrying in-flight blocks once shutdown is requested.
    pub abandon_on_shutdown: bool,
}

impl MirrorConfig {
    /// Check required fields and derive the store capacity.
    pub fn capacity(&self) -> Result<StoreCapacity, MirrorError> {
        StoreCapacity::from_window(self.window, self.avg_doc_size_kb)
    }

    /// Reject configurations the process cannot start with.
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.bulk_rpc_url.is_empty() {
            return Err(MirrorError::Config("bulk RPC URL is required".into()));
        }
        if self.store_url.is_empty() {
            return Err(MirrorError::Config("store URL is required".into()));
        }
        if self.chain_rpc_url.is_empty() || self.ws_url.is_empty() {
            return Err(MirrorError::Config("chain RPC and WS URLs must not be empty".into()));
        }
        self.capacity().map(|_| ())
    }
}
