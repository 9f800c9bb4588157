//! Block and transaction snapshots as they are persisted by the mirror.
//!
//! Quantities that can exceed 64 bits (difficulty, value, gas price) are kept
//! as decimal strings so they survive any storage round-trip exactly.

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

// ─── Block ────────────────────────────────────────────────────────────────────

/// Immutable snapshot of one chain block at ingestion time.
///
/// `hash` is the identity of a block inside the store; every write is keyed
/// on it, never on `number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    pub parent_hash: String,
    pub nonce: String,
    pub sha3_uncles: String,
    pub logs_bloom: String,
    pub transactions_root: String,
    pub state_root: String,
    pub miner: String,
    /// Decimal string.
    pub difficulty: String,
    /// Decimal string.
    pub total_difficulty: String,
    pub extra_data: String,
    pub size: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub uncles: Vec<String>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Size in bytes of the persisted JSON document.
    ///
    /// Used by the capped backends to account the byte budget.
    pub fn document_size(&self) -> Result<u64, MirrorError> {
        serde_json::to_vec(self)
            .map(|v| v.len() as u64)
            .map_err(|e| MirrorError::Decode(e.to_string()))
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A transaction embedded in its parent [`Block`].
///
/// It has no identity of its own in the store and is replaced together with
/// the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub nonce: u64,
    pub block_hash: String,
    pub block_number: Option<u64>,
    /// `None` for pending transactions.
    pub transaction_index: Option<u64>,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    /// Decimal string (wei).
    pub value: String,
    pub gas: u64,
    /// Decimal string (wei).
    pub gas_price: String,
    pub input: String,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Block {
        Block {
            number: 42,
            hash: "0x2a".into(),
            parent_hash: "0x29".into(),
            nonce: "0x0000000000000000".into(),
            sha3_uncles: "0x1dcc".into(),
            logs_bloom: "0x00".into(),
            transactions_root: "0x56e8".into(),
            state_root: "0xd7f8".into(),
            miner: "0x0100000000000000000000000000000000000000".into(),
            difficulty: "1".into(),
            total_difficulty: "340282366920938463463374607431768211456".into(),
            extra_data: "0x".into(),
            size: 1_234,
            gas_limit: 15_000_000,
            gas_used: 21_000,
            timestamp: 1_700_000_000,
            uncles: vec![],
            transactions: vec![Transaction {
                hash: "0xt1".into(),
                nonce: 7,
                block_hash: "0x2a".into(),
                block_number: Some(42),
                transaction_index: Some(0),
                from: "0xaaa".into(),
                to: None,
                value: "1000000000000000000".into(),
                gas: 21_000,
                gas_price: "25000000000".into(),
                input: "0x".into(),
            }],
        }
    }

    #[test]
    fn document_uses_snake_case_fields() {
        let json = serde_json::to_value(block()).unwrap();
        assert_eq!(json["parent_hash"], "0x29");
        assert_eq!(json["transactions"][0]["gas_price"], "25000000000");
        assert!(json["transactions"][0]["to"].is_null());
    }

    #[test]
    fn big_quantities_survive_round_trip() {
        let b = block();
        let text = serde_json::to_string(&b).unwrap();
        let back: Block = serde_json::from_str(&text).unwrap();
        assert_eq!(back.total_difficulty, "340282366920938463463374607431768211456");
        assert_eq!(back, b);
    }

    #[test]
    fn document_size_grows_with_transactions() {
        let mut b = block();
        let one = b.document_size().unwrap();
        b.transactions.push(b.transactions[0].clone());
        assert!(b.document_size().unwrap() > one);
    }
}
