//! The storage contract both sync paths write through.

use async_trait::async_trait;

use crate::error::MirrorError;
use crate::types::Block;

/// Idempotent, capacity-bounded persistence for blocks.
///
/// Implementations must be safe under arbitrary concurrent callers: writes are
/// keyed by block hash, so overlapping or duplicate deliveries from the
/// reconciliation and live paths collapse into a single document.
///
/// Eviction is the store's own business. Callers never delete.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Replace-or-insert one block, keyed by hash.
    async fn upsert_one(&self, block: &Block) -> Result<(), MirrorError>;

    /// Replace-or-insert a batch, one atomic write per item.
    ///
    /// Items are applied in ascending block-number order regardless of the
    /// order they are passed in, so an interrupted batch leaves a contiguous
    /// prefix behind.
    async fn upsert_many(&self, blocks: &[Block]) -> Result<(), MirrorError>;

    /// Highest block number currently stored, or `0` when empty.
    async fn last_head(&self) -> Result<u64, MirrorError>;
}

/// Order a batch for application: ascending by block number.
///
/// The sort is stable, so two documents with the same number keep their
/// relative order and the later one wins.
pub fn oldest_first(blocks: &[Block]) -> Vec<&Block> {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|b| b.number);
    ordered
}
