//! In-memory capped block store.
//!
//! Behaves like a capped collection: documents are kept in first-insertion
//! order, and once either the document count or the byte budget is exceeded
//! the oldest documents are dropped. Replacing a document keeps its slot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use blockmirror_core::store::oldest_first;
use blockmirror_core::{Block, BlockStore, MirrorError, StoreCapacity};

struct Entry {
    seq: u64,
    bytes: u64,
    block: Block,
}

#[derive(Default)]
struct Ring {
    by_hash: HashMap<String, Entry>,
    /// seq → hash, oldest first.
    order: BTreeMap<u64, String>,
    total_bytes: u64,
    next_seq: u64,
    /// Remaining successful item writes before every write fails.
    write_budget: Option<usize>,
}

impl Ring {
    fn upsert(&mut self, block: &Block, bytes: u64, capacity: &StoreCapacity) -> Result<(), MirrorError> {
        match self.write_budget.as_mut() {
            Some(0) => return Err(MirrorError::Storage("store unavailable".into())),
            Some(n) => *n -= 1,
            None => {}
        }

        if let Some(entry) = self.by_hash.get_mut(&block.hash) {
            self.total_bytes = self.total_bytes - entry.bytes + bytes;
            entry.bytes = bytes;
            entry.block = block.clone();
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.order.insert(seq, block.hash.clone());
            self.by_hash.insert(
                block.hash.clone(),
                Entry {
                    seq,
                    bytes,
                    block: block.clone(),
                },
            );
            self.total_bytes += bytes;
        }
        self.evict(capacity);
        Ok(())
    }

    fn evict(&mut self, capacity: &StoreCapacity) {
        while self.by_hash.len() as u64 > capacity.max_documents
            || self.total_bytes > capacity.max_bytes
        {
            let Some((_, hash)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.by_hash.remove(&hash) {
                self.total_bytes -= entry.bytes;
                tracing::trace!(hash = %hash, number = entry.block.number, seq = entry.seq, "evicted block");
            }
        }
    }
}

/// In-memory capped block storage.
///
/// All data is lost when the process exits.
pub struct InMemoryBlockStore {
    capacity: StoreCapacity,
    ring: Mutex<Ring>,
}

impl InMemoryBlockStore {
    pub fn new(capacity: StoreCapacity) -> Self {
        Self {
            capacity,
            ring: Mutex::new(Ring::default()),
        }
    }

    /// A store large enough that tests never hit eviction.
    pub fn unbounded() -> Self {
        Self::new(StoreCapacity {
            max_documents: u64::MAX,
            max_bytes: u64::MAX,
        })
    }

    pub fn capacity(&self) -> StoreCapacity {
        self.capacity
    }

    /// Fail every item write after the next `n` succeed. Simulates the store
    /// going away in the middle of a batch.
    pub fn fail_writes_after(&self, n: usize) {
        self.ring.lock().unwrap().write_budget = Some(n);
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.ring.lock().unwrap().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a stored block by hash.
    pub fn get(&self, hash: &str) -> Option<Block> {
        self.ring.lock().unwrap().by_hash.get(hash).map(|e| e.block.clone())
    }

    /// Stored block numbers, ascending.
    pub fn numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self
            .ring
            .lock()
            .unwrap()
            .by_hash
            .values()
            .map(|e| e.block.number)
            .collect();
        numbers.sort_unstable();
        numbers
    }

    /// Sum of stored document sizes.
    pub fn total_bytes(&self) -> u64 {
        self.ring.lock().unwrap().total_bytes
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn upsert_one(&self, block: &Block) -> Result<(), MirrorError> {
        let bytes = block.document_size()?;
        self.ring.lock().unwrap().upsert(block, bytes, &self.capacity)
    }

    async fn upsert_many(&self, blocks: &[Block]) -> Result<(), MirrorError> {
        for block in oldest_first(blocks) {
            let bytes = block.document_size()?;
            self.ring.lock().unwrap().upsert(block, bytes, &self.capacity)?;
        }
        Ok(())
    }

    async fn last_head(&self) -> Result<u64, MirrorError> {
        Ok(self
            .ring
            .lock()
            .unwrap()
            .by_hash
            .values()
            .map(|e| e.block.number)
            .max()
            .unwrap_or(0))
    }
}
