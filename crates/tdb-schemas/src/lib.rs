//! Persisted row shapes shared by the store implementations and the daemon.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scope key used when a strategy report is not restricted to one user.
pub const ALL_USERS_SCOPE: &str = "*";

/// One raw broker order-book row, mirrored per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookMirrorRow {
    pub user_id: String,
    /// Normalizer identity of the row (unique id or `order_id:update_time`).
    pub row_identity: String,
    pub row: Value,
    pub fetched_at_utc: DateTime<Utc>,
}

/// Order tag -> strategy name mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyTag {
    pub tag: String,
    pub strategy_name: String,
}

/// One strategy-layer execution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLogRow {
    pub strategy_name: String,
    pub user_id: Option<String>,
    pub symbol: String,
    /// `BUY`, `SELL` or `EXIT`.
    pub action: String,
    /// Quantity in micro-units (1e-6). Ignored for `EXIT`.
    pub qty_micros: i64,
    pub price_micros: i64,
    pub ts_utc: DateTime<Utc>,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryRow {
    pub user_id: String,
    pub date_key: NaiveDate,
    pub total_pnl: f64,
    pub total_trades: i64,
    pub open_positions: i64,
    pub success_rate_pct: f64,
    pub risk_reward: f64,
    pub computed_at_utc: DateTime<Utc>,
}

/// Where a strategy report's fills came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategySource {
    Orderbook,
    ExecutionLog,
}

impl StrategySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategySource::Orderbook => "orderbook",
            StrategySource::ExecutionLog => "execution_log",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySummaryRow {
    /// A user id, or [`ALL_USERS_SCOPE`].
    pub user_scope: String,
    pub strategy_name: String,
    pub source: StrategySource,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    /// The response row as served.
    pub payload: Value,
    pub computed_at_utc: DateTime<Utc>,
}

/// Result of a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub inserted: u64,
    pub updated: u64,
}

impl UpsertCounts {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated
    }
}

impl std::ops::AddAssign for UpsertCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
    }
}
