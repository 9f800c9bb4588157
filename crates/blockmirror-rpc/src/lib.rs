//! blockmirror-rpc — JSON-RPC transport for the mirror.
//!
//! - [`HttpRpcClient`] — the chain endpoint (`eth_blockNumber`, `eth_getBlockByHash`)
//! - [`BulkRpcClient`] — one HTTP POST carrying a batch of `eth_getBlockByNumber`
//! - [`codec`] — hex quantity decoders used by the wire types
//! - [`wire`] — the node's block representation and its conversion into [`blockmirror_core::Block`]

pub mod bulk;
pub mod client;
pub mod codec;
pub mod error;
pub mod rate_limit;
pub mod request;
pub mod wire;

pub use bulk::BulkRpcClient;
pub use client::{HttpClientConfig, HttpRpcClient};
pub use error::TransportError;
pub use rate_limit::ProviderRateLimit;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use wire::{RpcBlock, RpcTransaction};
