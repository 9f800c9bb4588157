//! Per-hash fetch-and-store for blocks announced by the live feed.
//!
//! Two phases, each retried with a fixed delay and no attempt limit:
//! fetch the block by hash (waiting before every attempt, including the
//! first, so the node has time to serve what it just announced), then upsert
//! it under a short per-attempt timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use blockmirror_core::{Block, BlockStore, ChainClient};

/// Retry policy for [`BlockWorker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Fixed wait between attempts (and before the first fetch).
    pub retry_delay: Duration,
    /// Upper bound on a single store attempt.
    pub store_timeout: Duration,
    /// Give up in-flight blocks once shutdown is requested.
    pub abandon_on_shutdown: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            store_timeout: Duration::from_secs(1),
            abandon_on_shutdown: false,
        }
    }
}

/// How a worker invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Stored { number: u64 },
    /// Shutdown was requested and the policy allows dropping the block.
    Abandoned,
}

/// Fetches one announced block and writes it to the store.
///
/// Cheap to clone; the live feed clones it once per notification.
#[derive(Clone)]
pub struct BlockWorker {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn BlockStore>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl BlockWorker {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn BlockStore>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            chain,
            store,
            config,
            shutdown,
        }
    }

    /// Run for `hash` on a new task. The caller does not wait for it.
    pub fn spawn(&self, hash: String) -> JoinHandle<WorkerOutcome> {
        let worker = self.clone();
        tokio::spawn(async move { worker.run(&hash).await })
    }

    /// Fetch then store `hash`. Never fails; only returns early when abandoned.
    pub async fn run(&self, hash: &str) -> WorkerOutcome {
        let Some(block) = self.fetch(hash).await else {
            info!(hash, "shutdown requested, abandoning block fetch");
            return WorkerOutcome::Abandoned;
        };

        let number = block.number;
        if self.store(&block).await {
            debug!(number, hash, "live block stored");
            WorkerOutcome::Stored { number }
        } else {
            info!(number, hash, "shutdown requested, abandoning block store");
            WorkerOutcome::Abandoned
        }
    }

    async fn fetch(&self, hash: &str) -> Option<Block> {
        let mut attempt: u64 = 0;
        loop {
            if !self.pause().await {
                return None;
            }
            attempt += 1;

            match self.chain.block_by_hash(hash).await {
                Ok(Some(block)) => return Some(block),
                Ok(None) => debug!(hash, attempt, "block not served yet, retrying"),
                Err(e) if e.is_not_yet_available() => {
                    debug!(hash, attempt, "block not available yet, retrying")
                }
                Err(e) => warn!(hash, attempt, error = %e, "block fetch failed, retrying"),
            }
        }
    }

    async fn store(&self, block: &Block) -> bool {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;

            match tokio::time::timeout(self.config.store_timeout, self.store.upsert_one(block)).await {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => {
                    warn!(number = block.number, attempt, error = %e, "block store failed, retrying")
                }
                Err(_) => warn!(number = block.number, attempt, "block store timed out, retrying"),
            }

            if !self.pause().await {
                return false;
            }
        }
    }

    /// Wait one retry delay. Returns `false` if the worker should give up.
    async fn pause(&self) -> bool {
        if !self.config.abandon_on_shutdown {
            tokio::time::sleep(self.config.retry_delay).await;
            return true;
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.config.retry_delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_with_hash, FlakyStore, MockChain};
    use blockmirror_core::MirrorError;
    use blockmirror_storage::InMemoryBlockStore;
    use tokio::time::Instant;

    const HASH: &str = "0xfeed";

    fn worker(chain: Arc<MockChain>, store: Arc<dyn BlockStore>, config: WorkerConfig) -> BlockWorker {
        BlockWorker::new(chain, store, config, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_twice_then_stored_once() {
        let chain = Arc::new(MockChain::fetches(
            vec![Ok(None), Ok(None)],
            Some(block_with_hash(7, HASH)),
        ));
        let store = Arc::new(InMemoryBlockStore::unbounded());

        let start = Instant::now();
        let outcome = worker(chain.clone(), store.clone(), WorkerConfig::default()).run(HASH).await;

        assert_eq!(outcome, WorkerOutcome::Stored { number: 7 });
        assert_eq!(chain.fetch_calls(), 3);
        assert_eq!(store.len(), 1);
        assert!(store.get(HASH).is_some());
        // One delay before each of the three attempts.
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn not_yet_available_and_other_errors_are_retried() {
        let chain = Arc::new(MockChain::fetches(
            vec![
                Err(MirrorError::Rpc { code: -32000, message: "cannot query unfinalized data".into() }),
                Err(MirrorError::Transport("connection reset".into())),
            ],
            Some(block_with_hash(8, HASH)),
        ));
        let store = Arc::new(InMemoryBlockStore::unbounded());

        let outcome = worker(chain.clone(), store.clone(), WorkerConfig::default()).run(HASH).await;

        assert_eq!(outcome, WorkerOutcome::Stored { number: 8 });
        assert_eq!(chain.fetch_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn store_errors_are_retried() {
        let chain = Arc::new(MockChain::fetches(vec![], Some(block_with_hash(9, HASH))));
        let store = Arc::new(FlakyStore::failing(InMemoryBlockStore::unbounded(), 2));

        let outcome = worker(chain.clone(), store.clone(), WorkerConfig::default()).run(HASH).await;

        assert_eq!(outcome, WorkerOutcome::Stored { number: 9 });
        assert_eq!(store.attempts(), 3);
        assert_eq!(chain.fetch_calls(), 1);
        assert_eq!(store.inner().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_attempt_times_out_and_retries() {
        let chain = Arc::new(MockChain::fetches(vec![], Some(block_with_hash(10, HASH))));
        let store = Arc::new(FlakyStore::stalling(
            InMemoryBlockStore::unbounded(),
            1,
            Duration::from_secs(30),
        ));

        let start = Instant::now();
        let outcome = worker(chain, store.clone(), WorkerConfig::default()).run(HASH).await;

        assert_eq!(outcome, WorkerOutcome::Stored { number: 10 });
        assert_eq!(store.attempts(), 2);
        // fetch delay + timed-out attempt + retry delay, nowhere near the stall.
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_keeps_retrying_after_shutdown() {
        let chain = Arc::new(MockChain::fetches(vec![Ok(None)], Some(block_with_hash(11, HASH))));
        let store = Arc::new(InMemoryBlockStore::unbounded());
        let token = CancellationToken::new();
        token.cancel();

        let w = BlockWorker::new(chain, store.clone(), WorkerConfig::default(), token);
        assert_eq!(w.run(HASH).await, WorkerOutcome::Stored { number: 11 });
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_policy_gives_up_on_shutdown() {
        let chain = Arc::new(MockChain::fetches(vec![], None));
        let store = Arc::new(InMemoryBlockStore::unbounded());
        let token = CancellationToken::new();
        let config = WorkerConfig { abandon_on_shutdown: true, ..WorkerConfig::default() };

        let w = BlockWorker::new(chain.clone(), store.clone(), config, token.clone());
        let handle = w.spawn(HASH.to_string());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        token.cancel();

        assert_eq!(handle.await.unwrap(), WorkerOutcome::Abandoned);
        assert_eq!(chain.fetch_calls(), 3);
        assert!(store.is_empty());
    }
}
