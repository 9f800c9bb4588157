//! Structured HTTP 429 bodies from batch providers.
//!
//! Providers disagree on the exact shape. Both of these are accepted:
//!
//! ```text
//! {"code":-32005,"message":"...","data":{"see":"...","rate":{"backoff_seconds":2}}}
//! {"jsonrpc":"2.0","error":{"code":-32005,"message":"...","data":{"backoff_seconds":2}}}
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Backoff used when a 429 body carries no backoff hint.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Request-rate figures reported by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateInfo {
    pub current_rps: Option<f64>,
    pub allowed_rps: Option<f64>,
    pub backoff_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitData {
    pub see: Option<String>,
    pub rate: Option<RateInfo>,
    #[serde(flatten)]
    pub inline: RateInfo,
}

/// A provider's rate-limit error body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderRateLimit {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<RateLimitData>,
    /// JSON-RPC envelope variant.
    pub error: Option<Box<ProviderRateLimit>>,
}

impl ProviderRateLimit {
    /// The provider-requested backoff in seconds, if any.
    pub fn backoff_seconds(&self) -> Option<f64> {
        if let Some(inner) = &self.error {
            if let Some(secs) = inner.backoff_seconds() {
                return Some(secs);
            }
        }
        let data = self.data.as_ref()?;
        data.rate
            .as_ref()
            .and_then(|r| r.backoff_seconds)
            .or(data.inline.backoff_seconds)
    }

    /// How long to wait before trying again.
    pub fn backoff(&self) -> Duration {
        match self.backoff_seconds() {
            Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
            _ => DEFAULT_BACKOFF,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_rate_shape() {
        let body: ProviderRateLimit = serde_json::from_str(
            r#"{"code":-32005,"message":"project ID request rate exceeded",
                "data":{"see":"https://infura.io/dashboard",
                        "rate":{"current_rps":13.3,"allowed_rps":10.0,"backoff_seconds":2}}}"#,
        )
        .unwrap();
        assert_eq!(body.code, -32005);
        assert_eq!(body.backoff(), Duration::from_secs(2));
    }

    #[test]
    fn json_rpc_envelope_shape() {
        let body: ProviderRateLimit = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"rate exceeded",
                "data":{"current_rps":13.3,"allowed_rps":10.0,"backoff_seconds":0.5}}}"#,
        )
        .unwrap();
        assert_eq!(body.backoff(), Duration::from_millis(500));
    }

    #[test]
    fn missing_hint_uses_default() {
        let body: ProviderRateLimit = serde_json::from_str(r#"{"message":"slow down"}"#).unwrap();
        assert_eq!(body.backoff(), DEFAULT_BACKOFF);
    }
}
