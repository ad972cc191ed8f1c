//! tdb-md
//!
//! Broker order-book ingest: the provider abstraction, the HTTP gateway
//! provider, and the row normalizer that produces fill events.
//! This crate does not persist anything; callers hand rows to tdb-db.

pub mod fields;
pub mod normalizer;
pub mod provider;

use std::fmt;
use std::time::Duration;

use serde_json::Value;

pub use normalizer::{
    normalize_rows, NormalizeOptions, NormalizeReport, Normalized, StatusMatch,
    COMPLETION_MARKER, DEFAULT_ALGO_PREFIX,
};
pub use provider::{extract_rows, OrderbookProvider, ProviderError, RetryPolicy};

/// Header carrying the shared secret on outbound gateway calls.
pub const API_KEY_HEADER: &str = "x-api-key";

const ERROR_BODY_LIMIT: usize = 256;

/// Broker gateway reached over HTTP: `GET {base}/orderbook?user_id=...`.
///
/// The shared secret is passed in by the caller; it is never logged.
#[derive(Clone)]
pub struct HttpOrderbookProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl fmt::Debug for HttpOrderbookProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpOrderbookProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpOrderbookProvider {
    pub fn new_with_base_url(
        base_url: String,
        api_key: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        if base_url.trim().is_empty() {
            return Err(ProviderError::Config("broker base_url is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            retry,
        })
    }

    fn orderbook_url(&self) -> String {
        format!("{}/orderbook", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_once(&self, user_id: &str) -> Result<Vec<Value>, ProviderError> {
        let resp = self
            .http
            .get(self.orderbook_url())
            .query(&[("user_id", user_id)])
            .header(API_KEY_HEADER, self.api_key.as_str())
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = resp.status();
        if !status.is_success() {
            let mut message = resp.text().await.unwrap_or_default();
            if message.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(ProviderError::Api {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("orderbook json decode failed: {e}")))?;
        extract_rows(body)
    }
}

fn classify_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
impl OrderbookProvider for HttpOrderbookProvider {
    fn name(&self) -> &'static str {
        "http-gateway"
    }

    async fn fetch_orderbook(&self, user_id: &str) -> Result<Vec<Value>, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Config("broker shared secret is not set".into()));
        }

        let mut attempt = 0u32;
        loop {
            match self.fetch_once(user_id).await {
                Ok(rows) => {
                    tracing::debug!(user_id, rows = rows.len(), attempt, "orderbook fetched");
                    return Ok(rows);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        user_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "orderbook fetch failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(2),
        }
    }

    fn provider(server: &MockServer, key: &str) -> HttpOrderbookProvider {
        HttpOrderbookProvider::new_with_base_url(
            server.base_url(),
            key.to_string(),
            Duration::from_secs(5),
            fast_retry(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sends_user_and_key_and_unwraps_data() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/orderbook")
                    .query_param("user_id", "u1")
                    .header("x-api-key", "sekret");
                then.status(200)
                    .json_body(json!({"data": [{"order_id": "1"}, {"order_id": "2"}]}));
            })
            .await;

        let rows = provider(&server, "sekret").fetch_orderbook("u1").await.unwrap();
        assert_eq!(rows.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_5xx_until_budget_exhausted() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/orderbook");
                then.status(503).body("down");
            })
            .await;

        let err = provider(&server, "k").fetch_orderbook("u1").await.unwrap_err();
        assert_eq!(err.upstream_status(), Some(503));
        // 1 initial + 2 retries
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/orderbook");
                then.status(401).body("bad key");
            })
            .await;

        let err = provider(&server, "k").fetch_orderbook("u1").await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Api {
                status: Some(401),
                message: "bad key".into()
            }
        );
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn missing_secret_is_config_error() {
        let server = MockServer::start_async().await;
        let err = provider(&server, "").fetch_orderbook("u1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[tokio::test]
    async fn non_json_body_is_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/orderbook");
                then.status(200).body("<html>");
            })
            .await;

        let err = provider(&server, "k").fetch_orderbook("u1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[test]
    fn debug_redacts_secret() {
        let p = HttpOrderbookProvider::new_with_base_url(
            "http://localhost:1".into(),
            "topsecret".into(),
            Duration::from_secs(1),
            RetryPolicy::default(),
        )
        .unwrap();
        let dbg = format!("{p:?}");
        assert!(!dbg.contains("topsecret"));
        assert!(dbg.contains("<redacted>"));
    }
}
