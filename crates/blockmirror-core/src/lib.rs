//! blockmirror-core — foundation for the bounded block mirror.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────── Reconciler ──── BulkClient (batched getBlockByNumber)
//! chain head ─────┤                 │
//!                 │                 ▼
//!                 │            BlockStore (capped, hash-keyed upsert)
//!                 │                 ▲
//!                 └── LiveFeed ─► BlockWorker ── ChainClient (getBlockByHash)
//! ```
//!
//! This crate owns the domain types and the seams; transports live in
//! `blockmirror-rpc`, backends in `blockmirror-storage` and the two sync
//! paths in `blockmirror-sync`.

pub mod client;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use client::{BulkClient, ChainClient};
pub use config::{CatchUpMode, MirrorConfig, SecretValue, StoreCapacity};
pub use error::MirrorError;
pub use store::BlockStore;
pub use types::{Block, Transaction};
