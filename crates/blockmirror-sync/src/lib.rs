//! blockmirror-sync — the two ingestion paths.
//!
//! - [`Reconciler`] — batched catch-up from the stored head to the live head
//! - [`LiveFeed`] — one `newHeads` subscription, one read loop
//! - [`BlockWorker`] — per-hash fetch-and-store, retried until it succeeds

pub mod live;
pub mod reconciler;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use live::{HeadNotification, LiveFeed};
pub use reconciler::{PassOutcome, ReconcileReport, Reconciler};
pub use worker::{BlockWorker, WorkerConfig, WorkerOutcome};
