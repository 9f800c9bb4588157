//! The node's JSON block representation.
//!
//! Decoding is explicit and field-by-field: every hex quantity goes through a
//! [`codec`](crate::codec) decoder, and the domain [`Block`] is assembled by
//! value in the `From` impls below.

use serde::Deserialize;

use blockmirror_core::{Block, Transaction};

use crate::codec::{de_hex_decimal, de_hex_u64, de_hex_u64_opt};

fn zero() -> String {
    "0".into()
}

/// A block as returned by `eth_getBlockByNumber` / `eth_getBlockByHash` with
/// full transaction objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    #[serde(deserialize_with = "de_hex_u64")]
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub sha3_uncles: String,
    #[serde(default)]
    pub logs_bloom: String,
    #[serde(default)]
    pub transactions_root: String,
    #[serde(default)]
    pub state_root: String,
    #[serde(default)]
    pub miner: String,
    #[serde(default = "zero", deserialize_with = "de_hex_decimal")]
    pub difficulty: String,
    /// Absent on some post-merge clients.
    #[serde(default = "zero", deserialize_with = "de_hex_decimal")]
    pub total_difficulty: String,
    #[serde(default)]
    pub extra_data: String,
    #[serde(deserialize_with = "de_hex_u64")]
    pub size: u64,
    #[serde(deserialize_with = "de_hex_u64")]
    pub gas_limit: u64,
    #[serde(deserialize_with = "de_hex_u64")]
    pub gas_used: u64,
    #[serde(deserialize_with = "de_hex_u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub uncles: Vec<String>,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

/// A full transaction object embedded in an [`RpcBlock`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    #[serde(deserialize_with = "de_hex_u64")]
    pub nonce: u64,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default, deserialize_with = "de_hex_u64_opt")]
    pub block_number: Option<u64>,
    #[serde(default, deserialize_with = "de_hex_u64_opt")]
    pub transaction_index: Option<u64>,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default = "zero", deserialize_with = "de_hex_decimal")]
    pub value: String,
    #[serde(deserialize_with = "de_hex_u64")]
    pub gas: u64,
    #[serde(default = "zero", deserialize_with = "de_hex_decimal")]
    pub gas_price: String,
    #[serde(default)]
    pub input: String,
}

impl From<RpcTransaction> for Transaction {
    fn from(tx: RpcTransaction) -> Self {
        Self {
            hash: tx.hash,
            nonce: tx.nonce,
            block_hash: tx.block_hash.unwrap_or_default(),
            block_number: tx.block_number,
            transaction_index: tx.transaction_index,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            gas: tx.gas,
            gas_price: tx.gas_price,
            input: tx.input,
        }
    }
}

impl From<RpcBlock> for Block {
    fn from(b: RpcBlock) -> Self {
        Self {
            number: b.number,
            hash: b.hash,
            parent_hash: b.parent_hash,
            nonce: b.nonce,
            sha3_uncles: b.sha3_uncles,
            logs_bloom: b.logs_bloom,
            transactions_root: b.transactions_root,
            state_root: b.state_root,
            miner: b.miner,
            difficulty: b.difficulty,
            total_difficulty: b.total_difficulty,
            extra_data: b.extra_data,
            size: b.size,
            gas_limit: b.gas_limit,
            gas_used: b.gas_used,
            timestamp: b.timestamp,
            uncles: b.uncles,
            transactions: b.transactions.into_iter().map(Transaction::from).collect(),
        }
    }
}

/// A node-shaped block JSON payload, for tests across this crate.
#[cfg(test)]
pub(crate) fn sample_block_json(number: u64, hash: &str) -> serde_json::Value {
    serde_json::json!({
        "number": format!("{number:#x}"),
        "hash": hash,
        "parentHash": "0x4d3a2e5b1f0c9e8d7a6b5c4d3e2f1a0b9c8d7e6f5a4b3c2d1e0f9a8b7c6d5e4f",
        "nonce": "0x0000000000000000",
        "sha3Uncles": "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
        "logsBloom": "0x00",
        "transactionsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
        "stateRoot": "0xd7f8974fb5ac78d9ac099b9ad5018bedc2ce0a72dad1827a1709da30580f0544",
        "receiptsRoot": "0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421",
        "miner": "0x0100000000000000000000000000000000000000",
        "difficulty": "0x1",
        "totalDifficulty": "0x18cba80",
        "extraData": "0x",
        "size": "0x2bd",
        "gasLimit": "0xe4e1c0",
        "gasUsed": "0x5208",
        "timestamp": "0x6553f100",
        "baseFeePerGas": "0x5d21dba00",
        "uncles": [],
        "transactions": [{
            "hash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "nonce": "0x15",
            "blockHash": hash,
            "blockNumber": format!("{number:#x}"),
            "transactionIndex": "0x0",
            "from": "0xa7d9ddbe1f17865597fbd27ec712455208b6b76d",
            "to": null,
            "value": "0xde0b6b3a7640000",
            "gas": "0x5208",
            "gasPrice": "0x5d21dba00",
            "input": "0x60806040"
        }]
    })
}
