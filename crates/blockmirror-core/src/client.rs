//! Upstream seams: the chain endpoint and the bulk historical endpoint.

use async_trait::async_trait;

use crate::error::MirrorError;
use crate::types::Block;

/// The live chain JSON-RPC endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number.
    async fn block_number(&self) -> Result<u64, MirrorError>;

    /// Full block (with transactions) by hash. `Ok(None)` when the node does
    /// not know the block yet.
    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, MirrorError>;
}

/// A batch-capable historical endpoint.
#[async_trait]
pub trait BulkClient: Send + Sync {
    /// Fetch every block in `numbers` with a single batched request.
    ///
    /// The result is in the same order as `numbers`; an entry is `None` when
    /// the provider returned a null result for it. An empty response body
    /// yields an empty vector. HTTP 429 surfaces as
    /// [`MirrorError::RateLimited`] carrying the provider's backoff.
    async fn blocks_by_number(&self, numbers: &[u64]) -> Result<Vec<Option<Block>>, MirrorError>;
}
