//! SQLite capped block store.
//!
//! Blocks are kept as full JSON documents in a `blocks` table; the embedded
//! transactions are mirrored into a `transactions` table so the usual lookups
//! (by sender, recipient, hash, position) are index-backed.
//!
//! The table behaves like a capped collection. The configured capacity is
//! persisted in `blocks_capacity`, and triggers evict the oldest documents (by
//! first insertion) whenever the count or the byte budget is exceeded. The
//! mirror itself never issues a delete.
//!
//! # Usage
//! ```rust,no_run
//! use blockmirror_core::StoreCapacity;
//! use blockmirror_storage::sqlite::SqliteBlockStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let capacity = StoreCapacity::from_window(10_000, 50)?;
//!
//! // File-backed (persistent)
//! let store = SqliteBlockStore::open("./blocks.db", capacity).await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteBlockStore::in_memory(capacity).await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use blockmirror_core::store::oldest_first;
use blockmirror_core::{Block, BlockStore, MirrorError, StoreCapacity};

fn storage(e: sqlx::Error) -> MirrorError {
    MirrorError::Storage(e.to_string())
}

fn to_i64(v: u64, what: &str) -> Result<i64, MirrorError> {
    i64::try_from(v).map_err(|_| MirrorError::InvalidCapacity(format!("{what} exceeds i64::MAX")))
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks_capacity (
        id              INTEGER PRIMARY KEY CHECK (id = 0),
        max_documents   INTEGER NOT NULL,
        max_bytes       INTEGER NOT NULL,
        total_documents INTEGER NOT NULL DEFAULT 0,
        total_bytes     INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE TABLE IF NOT EXISTS blocks (
        seq        INTEGER PRIMARY KEY AUTOINCREMENT,
        hash       TEXT    NOT NULL UNIQUE,
        number     INTEGER NOT NULL,
        timestamp  INTEGER NOT NULL,
        document   TEXT    NOT NULL,
        doc_bytes  INTEGER NOT NULL,
        indexed_at INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS transactions (
        block_hash        TEXT    NOT NULL,
        hash              TEXT    NOT NULL,
        block_number      INTEGER,
        transaction_index INTEGER,
        from_addr         TEXT    NOT NULL,
        to_addr           TEXT,
        value             TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_blocks_number ON blocks (number DESC);",
    "CREATE INDEX IF NOT EXISTS idx_blocks_timestamp ON blocks (timestamp DESC);",
    "CREATE INDEX IF NOT EXISTS idx_tx_parent ON transactions (block_hash);",
    "CREATE INDEX IF NOT EXISTS idx_tx_from_value ON transactions (from_addr, value);",
    "CREATE INDEX IF NOT EXISTS idx_tx_to_value ON transactions (to_addr, value);",
    "CREATE INDEX IF NOT EXISTS idx_tx_hash ON transactions (hash);",
    "CREATE INDEX IF NOT EXISTS idx_tx_position ON transactions (block_number, transaction_index);",
    // Running totals are kept in the capacity row so a write never scans the
    // table. Count overflow is at most one row per insert; the byte scan only
    // runs while the budget is exceeded and stops at the rows it frees.
    "CREATE TRIGGER IF NOT EXISTS blocks_cap_insert AFTER INSERT ON blocks
     BEGIN
        UPDATE blocks_capacity
           SET total_documents = total_documents + 1,
               total_bytes     = total_bytes + NEW.doc_bytes
         WHERE id = 0;
        DELETE FROM blocks
         WHERE seq = (SELECT MIN(seq) FROM blocks)
           AND (SELECT total_documents > max_documents FROM blocks_capacity WHERE id = 0);
        DELETE FROM blocks WHERE seq IN (
            SELECT seq FROM (
                SELECT seq, doc_bytes, SUM(doc_bytes) OVER (ORDER BY seq ASC) AS freed
                FROM blocks
                WHERE (SELECT total_bytes > max_bytes FROM blocks_capacity WHERE id = 0)
            )
            WHERE freed - doc_bytes < (SELECT total_bytes - max_bytes FROM blocks_capacity WHERE id = 0)
        );
     END;",
    // A replace may grow the document.
    "CREATE TRIGGER IF NOT EXISTS blocks_cap_update AFTER UPDATE OF doc_bytes ON blocks
     BEGIN
        UPDATE blocks_capacity
           SET total_bytes = total_bytes - OLD.doc_bytes + NEW.doc_bytes
         WHERE id = 0;
        DELETE FROM blocks WHERE seq IN (
            SELECT seq FROM (
                SELECT seq, doc_bytes, SUM(doc_bytes) OVER (ORDER BY seq ASC) AS freed
                FROM blocks
                WHERE (SELECT total_bytes > max_bytes FROM blocks_capacity WHERE id = 0)
            )
            WHERE freed - doc_bytes < (SELECT total_bytes - max_bytes FROM blocks_capacity WHERE id = 0)
        );
     END;",
    "CREATE TRIGGER IF NOT EXISTS blocks_drop AFTER DELETE ON blocks
     BEGIN
        UPDATE blocks_capacity
           SET total_documents = total_documents - 1,
               total_bytes     = total_bytes - OLD.doc_bytes
         WHERE id = 0;
        DELETE FROM transactions WHERE block_hash = OLD.hash;
     END;",
];

/// SQLite-backed capped block store.
pub struct SqliteBlockStore {
    pool: SqlitePool,
    capacity: StoreCapacity,
}

impl SqliteBlockStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./blocks.db"`) or a full
    /// SQLite URL (`"sqlite:./blocks.db?mode=rwc"`).
    pub async fn open(path: &str, capacity: StoreCapacity) -> Result<Self, MirrorError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(storage)?;

        let store = Self { pool, capacity };
        store.init().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// A single connection is used so every query sees the same database.
    pub async fn in_memory(capacity: StoreCapacity) -> Result<Self, MirrorError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(storage)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(storage)?;

        let store = Self { pool, capacity };
        store.init().await?;
        Ok(store)
    }

    /// Create tables, indexes and eviction triggers, then pin the capacity.
    ///
    /// Safe to run against an existing store. Fails if the store was created
    /// with a different capacity.
    async fn init(&self) -> Result<(), MirrorError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await.map_err(storage)?;
        }

        let max_documents = to_i64(self.capacity.max_documents, "max_documents")?;
        let max_bytes = to_i64(self.capacity.max_bytes, "max_bytes")?;

        sqlx::query(
            "INSERT OR IGNORE INTO blocks_capacity (id, max_documents, max_bytes) VALUES (0, ?, ?)",
        )
        .bind(max_documents)
        .bind(max_bytes)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        let row = sqlx::query("SELECT max_documents, max_bytes FROM blocks_capacity WHERE id = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        let existing_documents = row.get::<i64, _>("max_documents") as u64;
        let existing_bytes = row.get::<i64, _>("max_bytes") as u64;

        if existing_documents != self.capacity.max_documents || existing_bytes != self.capacity.max_bytes {
            return Err(MirrorError::CapacityMismatch {
                existing_documents,
                existing_bytes,
                configured_documents: self.capacity.max_documents,
                configured_bytes: self.capacity.max_bytes,
            });
        }

        info!(
            max_documents = self.capacity.max_documents,
            max_bytes = self.capacity.max_bytes,
            "capped block store ready"
        );
        Ok(())
    }

    pub fn capacity(&self) -> StoreCapacity {
        self.capacity
    }

    /// Close the pool. Pending writes on other handles will fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ─── Writes ──────────────────────────────────────────────────────────────────

    /// Replace-or-insert one block and its transactions as a single unit.
    async fn write(&self, block: &Block) -> Result<(), MirrorError> {
        let document =
            serde_json::to_string(block).map_err(|e| MirrorError::Storage(e.to_string()))?;
        let doc_bytes = document.len() as i64;
        let number = to_i64(block.number, "block number")?;
        let timestamp = to_i64(block.timestamp, "timestamp")?;

        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("DELETE FROM transactions WHERE block_hash = ?")
            .bind(&block.hash)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        for t in &block.transactions {
            sqlx::query(
                "INSERT INTO transactions
                 (block_hash, hash, block_number, transaction_index, from_addr, to_addr, value)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&block.hash)
            .bind(&t.hash)
            .bind(t.block_number.map(|n| n as i64))
            .bind(t.transaction_index.map(|i| i as i64))
            .bind(&t.from)
            .bind(t.to.as_deref())
            .bind(&t.value)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        // The block row goes last: if its own insert is evicted, the
        // delete trigger also removes the rows written above.
        sqlx::query(
            "INSERT INTO blocks (hash, number, timestamp, document, doc_bytes, indexed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(hash) DO UPDATE SET
                number     = excluded.number,
                timestamp  = excluded.timestamp,
                document   = excluded.document,
                doc_bytes  = excluded.doc_bytes,
                indexed_at = excluded.indexed_at",
        )
        .bind(&block.hash)
        .bind(number)
        .bind(timestamp)
        .bind(&document)
        .bind(doc_bytes)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        debug!(number = block.number, hash = %block.hash, txs = block.transactions.len(), "block stored");
        Ok(())
    }

    // ─── Inspection ──────────────────────────────────────────────────────────────

    /// Number of stored blocks.
    pub async fn len(&self) -> Result<u64, MirrorError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    /// Look up a stored block by hash.
    pub async fn get(&self, hash: &str) -> Result<Option<Block>, MirrorError> {
        let row = sqlx::query("SELECT document FROM blocks WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        row.map(|r| {
            let document: String = r.get("document");
            serde_json::from_str(&document).map_err(|e| MirrorError::Decode(e.to_string()))
        })
        .transpose()
    }

    /// Stored block numbers, ascending.
    pub async fn numbers(&self) -> Result<Vec<u64>, MirrorError> {
        let rows = sqlx::query("SELECT number FROM blocks ORDER BY number ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("number") as u64).collect())
    }

    /// Sum of stored document sizes, from the running total.
    pub async fn total_bytes(&self) -> Result<u64, MirrorError> {
        let row = sqlx::query("SELECT total_bytes FROM blocks_capacity WHERE id = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get::<i64, _>("total_bytes") as u64)
    }

    /// Number of mirrored transaction rows.
    pub async fn transaction_count(&self) -> Result<u64, MirrorError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM transactions")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }
}

// ─── BlockStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn upsert_one(&self, block: &Block) -> Result<(), MirrorError> {
        self.write(block).await
    }

    async fn upsert_many(&self, blocks: &[Block]) -> Result<(), MirrorError> {
        for block in oldest_first(blocks) {
            self.write(block).await?;
        }
        debug!(count = blocks.len(), "batch stored");
        Ok(())
    }

    async fn last_head(&self) -> Result<u64, MirrorError> {
        let row = sqlx::query("SELECT number FROM blocks ORDER BY number DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| r.get::<i64, _>("number") as u64).unwrap_or(0))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
