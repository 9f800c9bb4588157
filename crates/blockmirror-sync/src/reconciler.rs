//! Batched catch-up from the stored head to the live chain head.
//!
//! Each pass reads both heads, plans a newest-first window of block numbers,
//! fetches it as one batch from the bulk endpoint and writes it through
//! [`BlockStore::upsert_many`]. Passes repeat while the chain keeps moving,
//! and after rate limiting (the provider's backoff is honoured before the whole
//! pass is re-run, since the head may have moved during the wait).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use blockmirror_core::{Block, BlockStore, BulkClient, ChainClient, MirrorError};

/// Delay before re-running a pass whose batch came back with missing blocks.
pub const DEFAULT_UNAVAILABLE_DELAY: Duration = Duration::from_secs(1);

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing left to fetch; `head` is the stored head.
    Converged { head: u64 },
    /// A batch was written. `observed_head` is the live head the pass planned against.
    Stored { observed_head: u64, count: usize },
    /// HTTP 429; wait `backoff`, then run a fresh pass.
    RateLimited(Duration),
    /// The bulk provider answered `null` for some blocks it does not have yet.
    Unavailable,
}

/// Summary of a completed catch-up, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub passes: u32,
    pub batches: u32,
    pub blocks_stored: u64,
    pub rate_limited: u32,
    pub final_head: u64,
}

/// Block numbers to fetch for one pass, newest first.
///
/// The budget is 90% of the retention window so live writes landing during
/// catch-up do not push the window over capacity. When something is already
/// stored only the gap is fetched (capped at the budget); on an empty store a
/// full budget is fetched rather than the whole chain. The range never goes
/// below block 0.
pub fn plan_fetch(current_head: u64, stored_head: u64, window: u64) -> Vec<u64> {
    let budget = (window.saturating_mul(9) / 10).max(1);
    let wanted = if stored_head == 0 {
        budget
    } else {
        budget.min(current_head.saturating_sub(stored_head))
    };
    let count = wanted.min(current_head.saturating_add(1));
    (0..count).map(|offset| current_head - offset).collect()
}

/// Catch-up driver.
pub struct Reconciler {
    chain: Arc<dyn ChainClient>,
    bulk: Arc<dyn BulkClient>,
    store: Arc<dyn BlockStore>,
    window: u64,
    unavailable_delay: Duration,
}

impl Reconciler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        bulk: Arc<dyn BulkClient>,
        store: Arc<dyn BlockStore>,
        window: u64,
    ) -> Self {
        Self {
            chain,
            bulk,
            store,
            window,
            unavailable_delay: DEFAULT_UNAVAILABLE_DELAY,
        }
    }

    pub fn with_unavailable_delay(mut self, delay: Duration) -> Self {
        self.unavailable_delay = delay;
        self
    }

    /// Run passes until the store has caught up with the chain.
    ///
    /// Rate limiting and lagging bulk providers are waited out. Every other
    /// error (transport, decode, non-429 status, storage) aborts the catch-up.
    pub async fn run(&self) -> Result<ReconcileReport, MirrorError> {
        let mut report = ReconcileReport::default();

        loop {
            report.passes += 1;

            match self.pass().await? {
                PassOutcome::Converged { head } => {
                    report.final_head = head;
                    info!(head, passes = report.passes, "catch-up converged");
                    return Ok(report);
                }
                PassOutcome::Stored { observed_head, count } => {
                    report.batches += 1;
                    report.blocks_stored += count as u64;

                    let live = self.chain.block_number().await?;
                    if live > observed_head {
                        debug!(observed_head, live, "chain advanced during catch-up, running another pass");
                        continue;
                    }
                    report.final_head = observed_head;
                    info!(
                        head = observed_head,
                        batches = report.batches,
                        blocks = report.blocks_stored,
                        "catch-up complete"
                    );
                    return Ok(report);
                }
                PassOutcome::RateLimited(backoff) => {
                    report.rate_limited += 1;
                    warn!(?backoff, "bulk endpoint rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                }
                PassOutcome::Unavailable => {
                    warn!(
                        delay = ?self.unavailable_delay,
                        "bulk endpoint is missing blocks, retrying pass"
                    );
                    tokio::time::sleep(self.unavailable_delay).await;
                }
            }
        }
    }

    /// One pass: read heads, fetch one batch, store it.
    pub async fn pass(&self) -> Result<PassOutcome, MirrorError> {
        let current = self.chain.block_number().await?;
        let stored = self.store.last_head().await?;

        if current == stored {
            return Ok(PassOutcome::Converged { head: stored });
        }
        if stored > current {
            warn!(stored, current, "stored head is ahead of the chain endpoint, treating as converged");
            return Ok(PassOutcome::Converged { head: stored });
        }

        let numbers = plan_fetch(current, stored, self.window);
        info!(
            current,
            stored,
            from = numbers.last().copied().unwrap_or(current),
            to = current,
            count = numbers.len(),
            "fetching catch-up batch"
        );

        let fetched = match self.bulk.blocks_by_number(&numbers).await {
            Ok(fetched) => fetched,
            Err(MirrorError::RateLimited { backoff }) => return Ok(PassOutcome::RateLimited(backoff)),
            Err(e) => return Err(e),
        };

        if fetched.is_empty() {
            info!("bulk endpoint returned no items, nothing to catch up");
            return Ok(PassOutcome::Converged { head: stored });
        }

        let Some(blocks) = fetched.into_iter().collect::<Option<Vec<Block>>>() else {
            return Ok(PassOutcome::Unavailable);
        };

        self.store.upsert_many(&blocks).await?;
        Ok(PassOutcome::Stored {
            observed_head: current,
            count: blocks.len(),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
