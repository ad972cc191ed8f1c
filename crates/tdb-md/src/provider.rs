//! Provider boundary for broker order-book rows.
//!
//! This module defines the provider trait, its error type and the retry
//! policy. Rows stay as loosely-typed JSON here; turning them into fill
//! events is [`crate::normalizer`]'s job.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that an [`OrderbookProvider`] may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Connection refused / reset, DNS, TLS.
    Transport(String),
    /// The request did not complete within the client timeout.
    Timeout(String),
    /// The upstream answered with a non-success status.
    Api { status: Option<u16>, message: String },
    /// The response body was not an array of rows or `{ data: [...] }`.
    Decode(String),
    /// A required configuration value (base URL, shared secret) is missing.
    Config(String),
}

impl ProviderError {
    /// 5xx, timeouts and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
            ProviderError::Api { status: Some(s), .. } => *s >= 500,
            _ => false,
        }
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => *status,
            _ => None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Timeout(msg) => write!(f, "timeout: {msg}"),
            ProviderError::Api {
                status: Some(s),
                message,
            } => write!(f, "provider api error status={s}: {message}"),
            ProviderError::Api {
                status: None,
                message,
            } => write!(f, "provider api error: {message}"),
            ProviderError::Decode(msg) => write!(f, "decode error: {msg}"),
            ProviderError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Upstream broker gateway contract. Object-safe so the daemon can hold an
/// `Arc<dyn OrderbookProvider>`.
#[async_trait::async_trait]
pub trait OrderbookProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// All order-book rows for `user_id`, in the order the broker returned
    /// them.
    async fn fetch_orderbook(&self, user_id: &str) -> Result<Vec<Value>, ProviderError>;
}

/// Accept either a bare array or an object carrying a `data` array.
pub fn extract_rows(body: Value) -> Result<Vec<Value>, ProviderError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Err(ProviderError::Decode(format!(
                "`data` is not an array (got {})",
                json_kind(&other)
            ))),
            None => Err(ProviderError::Decode("object without `data` field".into())),
        },
        other => Err(ProviderError::Decode(format!(
            "expected array or object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Capped exponential backoff: attempt `n` (0-based) waits
/// `min(base * 2^n, cap)` before the next try.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}
