//! Batched historical fetch: one HTTP POST, many `eth_getBlockByNumber` calls.
//!
//! The bulk endpoint is typically a third-party provider whose URL embeds a
//! credential, so it is held as a [`SecretValue`] and never logged.

use std::time::Duration;

use async_trait::async_trait;

use blockmirror_core::{Block, BulkClient, MirrorError, SecretValue};

use crate::error::TransportError;
use crate::rate_limit::ProviderRateLimit;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::wire::RpcBlock;

/// Default timeout for one batch round-trip. Batches are large.
pub const DEFAULT_BULK_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for a batch-capable JSON-RPC provider.
pub struct BulkRpcClient {
    url: SecretValue,
    http: reqwest::Client,
}

impl BulkRpcClient {
    pub fn new(url: SecretValue, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { url, http })
    }

    /// Create with [`DEFAULT_BULK_TIMEOUT`].
    pub fn default_for(url: SecretValue) -> Result<Self, TransportError> {
        Self::new(url, DEFAULT_BULK_TIMEOUT)
    }

    /// Build the batch: one request per number, `id` = position in the batch.
    pub fn build_batch(numbers: &[u64]) -> Vec<JsonRpcRequest> {
        numbers
            .iter()
            .enumerate()
            .map(|(i, n)| JsonRpcRequest::block_by_number(i as u64, *n))
            .collect()
    }

    async fn post_batch(&self, reqs: &[JsonRpcRequest]) -> Result<Vec<Option<Block>>, TransportError> {
        let resp = self
            .http
            .post(self.url.expose())
            .json(reqs)
            .send()
            .await
            .map_err(|e| TransportError::Http(redact(&e, &self.url)))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(redact(&e, &self.url)))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let limit: ProviderRateLimit = serde_json::from_slice(&body)
                .map_err(|e| TransportError::Decode(format!("failed to decode rate-limit body: {e}")))?;
            return Err(TransportError::RateLimited {
                backoff: limit.backoff(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(vec![]);
        }
        let responses: Vec<JsonRpcResponse> = serde_json::from_slice(&body)?;
        decode_batch(responses, reqs.len())
    }
}

/// Place every response at the position its `id` names and decode it.
///
/// An empty array means the provider had nothing to return. Otherwise every
/// position must be answered: an item answered with `null` stays `None`, an
/// unanswered position or an item carrying a JSON-RPC error fails the batch.
pub fn decode_batch(
    responses: Vec<JsonRpcResponse>,
    expected: usize,
) -> Result<Vec<Option<Block>>, TransportError> {
    if responses.is_empty() {
        return Ok(vec![]);
    }

    let mut slots: Vec<Option<Block>> = vec![None; expected];
    let mut answered = vec![false; expected];
    for resp in responses {
        let id = resp
            .id
            .as_number()
            .ok_or_else(|| TransportError::Decode(format!("non-numeric batch id {}", resp.id)))?;
        let idx = id as usize;
        if idx >= expected {
            return Err(TransportError::Decode(format!("batch id {id} out of range")));
        }
        answered[idx] = true;

        let result = resp.into_result().map_err(TransportError::Rpc)?;
        if result.is_null() {
            continue;
        }
        let block: RpcBlock = serde_json::from_value(result)?;
        slots[idx] = Some(Block::from(block));
    }

    let missing = answered.iter().filter(|a| !**a).count();
    if missing > 0 {
        let first = answered.iter().position(|a| !*a).unwrap_or_default();
        return Err(TransportError::Decode(format!(
            "truncated batch: {missing} of {expected} items unanswered, first id {first}"
        )));
    }
    Ok(slots)
}

/// `reqwest` errors embed the request URL; strip it.
fn redact(e: &reqwest::Error, url: &SecretValue) -> String {
    e.to_string().replace(url.expose(), "********")
}

#[async_trait]
impl BulkClient for BulkRpcClient {
    async fn blocks_by_number(&self, numbers: &[u64]) -> Result<Vec<Option<Block>>, MirrorError> {
        if numbers.is_empty() {
            return Ok(vec![]);
        }
        let reqs = Self::build_batch(numbers);
        tracing::debug!(count = reqs.len(), "sending block batch");
        Ok(self.post_batch(&reqs).await?)
    }
}
