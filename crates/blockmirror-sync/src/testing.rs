//! Hand-written doubles for the core traits.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use blockmirror_core::{Block, BlockStore, BulkClient, ChainClient, MirrorError};

pub(crate) fn block(number: u64) -> Block {
    block_with_hash(number, &format!("0x{number:064x}"))
}

pub(crate) fn block_with_hash(number: u64, hash: &str) -> Block {
    Block {
        number,
        hash: hash.to_string(),
        parent_hash: format!("0x{:064x}", number.saturating_sub(1)),
        nonce: "0x0000000000000000".into(),
        sha3_uncles: "0x1dcc".into(),
        logs_bloom: "0x00".into(),
        transactions_root: "0x56e8".into(),
        state_root: "0xd7f8".into(),
        miner: "0x0100000000000000000000000000000000000000".into(),
        difficulty: "1".into(),
        total_difficulty: number.to_string(),
        extra_data: "0x".into(),
        size: 700,
        gas_limit: 15_000_000,
        gas_used: 0,
        timestamp: 1_700_000_000 + number * 2,
        uncles: vec![],
        transactions: vec![],
    }
}

// ─── Chain ───────────────────────────────────────────────────────────────────

/// Scripted chain endpoint.
///
/// `heads` are served in order and the last one repeats. `by_hash` answers are
/// served in order; once exhausted, the block is returned.
pub(crate) struct MockChain {
    heads: Mutex<VecDeque<u64>>,
    last_head: Mutex<u64>,
    by_hash: Mutex<VecDeque<Result<Option<Block>, MirrorError>>>,
    found: Option<Block>,
    head_calls: Mutex<u32>,
    fetch_calls: Mutex<u32>,
}

impl MockChain {
    pub(crate) fn heads(heads: &[u64]) -> Self {
        Self {
            heads: Mutex::new(heads.iter().copied().collect()),
            last_head: Mutex::new(0),
            by_hash: Mutex::new(VecDeque::new()),
            found: None,
            head_calls: Mutex::new(0),
            fetch_calls: Mutex::new(0),
        }
    }

    /// Serve `script` for by-hash fetches, then `found` forever.
    pub(crate) fn fetches(
        script: Vec<Result<Option<Block>, MirrorError>>,
        found: Option<Block>,
    ) -> Self {
        let mut chain = Self::heads(&[]);
        chain.by_hash = Mutex::new(script.into());
        chain.found = found;
        chain
    }

    pub(crate) fn head_calls(&self) -> u32 {
        *self.head_calls.lock().unwrap()
    }

    pub(crate) fn fetch_calls(&self) -> u32 {
        *self.fetch_calls.lock().unwrap()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, MirrorError> {
        *self.head_calls.lock().unwrap() += 1;
        let mut last = self.last_head.lock().unwrap();
        if let Some(head) = self.heads.lock().unwrap().pop_front() {
            *last = head;
        }
        Ok(*last)
    }

    async fn block_by_hash(&self, _hash: &str) -> Result<Option<Block>, MirrorError> {
        *self.fetch_calls.lock().unwrap() += 1;
        match self.by_hash.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => Ok(self.found.clone()),
        }
    }
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

/// Scripted bulk endpoint. Unscripted calls return every requested block.
pub(crate) struct ScriptedBulk {
    script: Mutex<VecDeque<Result<Vec<Option<Block>>, MirrorError>>>,
    requests: Mutex<Vec<Vec<u64>>>,
}

impl ScriptedBulk {
    pub(crate) fn new(script: Vec<Result<Vec<Option<Block>>, MirrorError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn serving() -> Self {
        Self::new(vec![])
    }

    pub(crate) fn requests(&self) -> Vec<Vec<u64>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BulkClient for ScriptedBulk {
    async fn blocks_by_number(&self, numbers: &[u64]) -> Result<Vec<Option<Block>>, MirrorError> {
        self.requests.lock().unwrap().push(numbers.to_vec());
        match self.script.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => Ok(numbers.iter().map(|n| Some(block(*n))).collect()),
        }
    }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Store wrapper that fails (or stalls) its first writes.
pub(crate) struct FlakyStore<S> {
    inner: S,
    failures: Mutex<u32>,
    stall: Option<Duration>,
    attempts: Mutex<u32>,
}

impl<S> FlakyStore<S> {
    pub(crate) fn failing(inner: S, failures: u32) -> Self {
        Self { inner, failures: Mutex::new(failures), stall: None, attempts: Mutex::new(0) }
    }

    pub(crate) fn stalling(inner: S, failures: u32, stall: Duration) -> Self {
        Self { inner, failures: Mutex::new(failures), stall: Some(stall), attempts: Mutex::new(0) }
    }

    pub(crate) fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }

    pub(crate) fn inner(&self) -> &S {
        &self.inner
    }

    fn take_failure(&self) -> bool {
        *self.attempts.lock().unwrap() += 1;
        let mut left = self.failures.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl<S: BlockStore> BlockStore for FlakyStore<S> {
    async fn upsert_one(&self, block: &Block) -> Result<(), MirrorError> {
        if self.take_failure() {
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            return Err(MirrorError::Storage("store unavailable".into()));
        }
        self.inner.upsert_one(block).await
    }

    async fn upsert_many(&self, blocks: &[Block]) -> Result<(), MirrorError> {
        if self.take_failure() {
            return Err(MirrorError::Storage("store unavailable".into()));
        }
        self.inner.upsert_many(blocks).await
    }

    async fn last_head(&self) -> Result<u64, MirrorError> {
        self.inner.last_head().await
    }
}
