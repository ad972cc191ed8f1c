//! Typed view of the daemon's config document.
//!
//! Every key has a default, so an empty document is a valid config. Values
//! that name secrets (`broker.keys_env.*`, `db.url_env`) are env var NAMES;
//! see [`crate::secrets`].

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tdb_portfolio::ZeroTimestampPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub pnl: PnlConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub db: DbConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8899".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub keys_env: BrokerKeysEnv,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            timeout_ms: 10_000,
            max_retries: 2,
            backoff_base_ms: 250,
            backoff_cap_ms: 2_000,
            keys_env: BrokerKeysEnv::default(),
        }
    }
}

impl BrokerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerKeysEnv {
    /// Name of the env var holding the gateway shared secret.
    pub shared_secret: String,
}

impl Default for BrokerKeysEnv {
    fn default() -> Self {
        Self {
            shared_secret: "TDB_BROKER_SHARED_SECRET".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PnlConfig {
    pub algo_tag_prefix: String,
    /// IANA timezone name; used for naive timestamps, date keys and "today".
    pub market_tz: String,
    pub zero_timestamp_policy: ZeroTimestampPolicy,
}

impl Default for PnlConfig {
    fn default() -> Self {
        Self {
            algo_tag_prefix: "ALGO".to_string(),
            market_tz: "Asia/Kolkata".to_string(),
            zero_timestamp_policy: ZeroTimestampPolicy::Keep,
        }
    }
}

impl PnlConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.market_tz
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("pnl.market_tz '{}' is not a valid timezone: {e}", self.market_tz))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub broker_rows_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            broker_rows_ttl_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Name of the env var holding the Postgres URL.
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url_env: "TDB_DATABASE_URL".to_string(),
            max_connections: 10,
        }
    }
}

impl DaemonConfig {
    /// Deserialize and validate a merged config document.
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: DaemonConfig =
            serde_json::from_value(v.clone()).context("config does not match daemon schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.pnl.tz()?;
        if self.broker.base_url.trim().is_empty() {
            bail!("CONFIG_INVALID: broker.base_url must not be empty");
        }
        if self.broker.timeout_ms == 0 {
            bail!("CONFIG_INVALID: broker.timeout_ms must be > 0");
        }
        if self.broker.backoff_cap_ms < self.broker.backoff_base_ms {
            bail!("CONFIG_INVALID: broker.backoff_cap_ms must be >= broker.backoff_base_ms");
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0 {
            bail!("CONFIG_INVALID: rate_limit.max_requests and rate_limit.window_ms must be > 0");
        }
        if self.db.max_connections == 0 {
            bail!("CONFIG_INVALID: db.max_connections must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = DaemonConfig::from_json(&json!({})).unwrap();
        assert_eq!(cfg, DaemonConfig::default());
        assert_eq!(cfg.broker.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.broker.max_retries, 2);
        assert_eq!(cfg.cache.broker_rows_ttl_ms, 5_000);
        assert_eq!(cfg.pnl.tz().unwrap(), chrono_tz::Asia::Kolkata);
        assert_eq!(cfg.pnl.zero_timestamp_policy, ZeroTimestampPolicy::Keep);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = DaemonConfig::from_json(&json!({
            "broker": {"max_retries": 5},
            "pnl": {"zero_timestamp_policy": "reject"}
        }))
        .unwrap();
        assert_eq!(cfg.broker.max_retries, 5);
        assert_eq!(cfg.broker.backoff_base_ms, 250);
        assert_eq!(cfg.pnl.zero_timestamp_policy, ZeroTimestampPolicy::Reject);
        assert_eq!(cfg.pnl.algo_tag_prefix, "ALGO");
    }

    #[test]
    fn rejects_bad_timezone_and_limits() {
        assert!(DaemonConfig::from_json(&json!({"pnl": {"market_tz": "Mars/Olympus"}})).is_err());
        assert!(DaemonConfig::from_json(&json!({"rate_limit": {"max_requests": 0}})).is_err());
        assert!(DaemonConfig::from_json(&json!({"broker": {"backoff_base_ms": 5000}})).is_err());
    }
}
