//! blockmirror-storage — capped [`BlockStore`](blockmirror_core::BlockStore) backends.
//!
//! Backends:
//! - [`memory`] — in-memory ring (tests, ephemeral runs)
//! - [`sqlite`] — SQLite via `sqlx`, eviction enforced by triggers

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryBlockStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBlockStore;
