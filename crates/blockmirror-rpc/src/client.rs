//! HTTP JSON-RPC client for the chain endpoint, backed by `reqwest`.
//!
//! The client makes exactly one attempt per call. Retry policy belongs to
//! the callers: the block worker retries forever, the reconciler treats a
//! failed head query as fatal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use blockmirror_core::{Block, ChainClient, MirrorError};

use crate::codec::parse_hex_u64;
use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::wire::RpcBlock;

/// Configuration for [`HttpRpcClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// JSON-RPC client for the live chain endpoint.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpClientConfig::default())
    }

    async fn send(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }

    /// Call a method and deserialize the result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.call_request(JsonRpcRequest::new(id, method, params)).await
    }

    async fn call_request<T: DeserializeOwned>(
        &self,
        req: JsonRpcRequest,
    ) -> Result<T, TransportError> {
        let resp = self.send(&req).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(TransportError::Deserialization)
    }
}

#[async_trait]
impl ChainClient for HttpRpcClient {
    async fn block_number(&self) -> Result<u64, MirrorError> {
        let hex: String = self.call("eth_blockNumber", vec![]).await?;
        Ok(parse_hex_u64(&hex)?)
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, MirrorError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let block: Option<RpcBlock> = self
            .call_request(JsonRpcRequest::block_by_hash(id, hash))
            .await?;
        Ok(block.map(Block::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    use crate::wire::sample_block_json;

    async fn node(Json(req): Json<Value>) -> Json<Value> {
        let id = req["id"].clone();
        let body = match req["method"].as_str() {
            Some("eth_blockNumber") => json!({"jsonrpc": "2.0", "id": id, "result": "0x18cba80"}),
            Some("eth_getBlockByHash") => match req["params"][0].as_str() {
                Some("0xmissing") => json!({"jsonrpc": "2.0", "id": id, "result": null}),
                Some("0xearly") => json!({
                    "jsonrpc": "2.0", "id": id,
                    "error": {"code": -32000, "message": "cannot query unfinalized data"}
                }),
                Some(hash) => json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": sample_block_json(26_000_000, hash)
                }),
                None => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32602, "message": "bad params"}}),
            },
            _ => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "method not found"}}),
        };
        Json(body)
    }

    async fn spawn_node() -> String {
        let app = Router::new().route("/", post(node));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn block_number_decodes_hex() {
        let client = HttpRpcClient::default_for(spawn_node().await).unwrap();
        assert_eq!(client.block_number().await.unwrap(), 26_000_000);
    }

    #[tokio::test]
    async fn block_by_hash_found() {
        let client = HttpRpcClient::default_for(spawn_node().await).unwrap();
        let block = client.block_by_hash("0xfeed").await.unwrap().unwrap();
        assert_eq!(block.hash, "0xfeed");
        assert_eq!(block.number, 26_000_000);
        assert_eq!(block.transactions.len(), 1);
    }

    #[tokio::test]
    async fn block_by_hash_null_is_none() {
        let client = HttpRpcClient::default_for(spawn_node().await).unwrap();
        assert!(client.block_by_hash("0xmissing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn not_yet_available_keeps_code() {
        let client = HttpRpcClient::default_for(spawn_node().await).unwrap();
        let err = client.block_by_hash("0xearly").await.unwrap_err();
        assert!(err.is_not_yet_available(), "got {err:?}");
    }

    #[tokio::test]
    async fn connection_refused_is_transport() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpRpcClient::default_for(format!("http://{addr}")).unwrap();
        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, MirrorError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn garbled_body_is_decode_error() {
        let app = Router::new().route("/", post(|| async { "<html>gateway</html>" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = HttpRpcClient::default_for(format!("http://{addr}")).unwrap();
        let err = client.block_number().await.unwrap_err();
        assert!(matches!(err, MirrorError::Decode(_)), "got {err:?}");
    }
}
