//! Shared runtime state for tdb-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The store and the
//! broker provider are injected so tests can swap in tdb-testkit doubles.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tdb_config::DaemonConfig;
use tdb_db::PnlStore;
use tdb_md::{NormalizeOptions, OrderbookProvider, StatusMatch};
use tdb_portfolio::{MatchOptions, Tz};

use crate::cache::TtlCache;
use crate::rate_limit::FixedWindowLimiter;

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

pub struct AppState {
    pub build: BuildInfo,
    pub config: DaemonConfig,
    /// Parsed `pnl.market_tz`.
    pub tz: Tz,
    pub store: Arc<dyn PnlStore>,
    pub provider: Arc<dyn OrderbookProvider>,
    /// Raw broker rows per user id.
    pub rows_cache: TtlCache<String, Vec<Value>>,
    /// Per-caller budget on `/api/*`.
    pub limiter: FixedWindowLimiter,
}

impl AppState {
    /// Fails only if the configured market timezone does not parse.
    pub fn new(
        config: DaemonConfig,
        store: Arc<dyn PnlStore>,
        provider: Arc<dyn OrderbookProvider>,
    ) -> Result<Self> {
        let tz = config.pnl.tz()?;
        let rows_cache = TtlCache::new(Duration::from_millis(config.cache.broker_rows_ttl_ms));
        let limiter = FixedWindowLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_millis(config.rate_limit.window_ms),
        );
        Ok(Self {
            build: BuildInfo {
                service: "tdb-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            config,
            tz,
            store,
            provider,
            rows_cache,
            limiter,
        })
    }

    pub fn normalize_options(&self, status_match: StatusMatch) -> NormalizeOptions {
        NormalizeOptions {
            algo_prefix: self.config.pnl.algo_tag_prefix.clone(),
            status_match,
            tz: self.tz,
        }
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            tz: self.tz,
            zero_ts_policy: self.config.pnl.zero_timestamp_policy,
        }
    }

    /// Current calendar date in the market timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
