//! Request and response types for the daemon's HTTP endpoints.
//!
//! No business logic lives here. Per-row payloads (`Summary`,
//! `StrategyPnl`, `StrategySummary`) come from tdb-portfolio.

use serde::{Deserialize, Serialize};
use tdb_portfolio::{StrategyPnl, StrategySummary};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
}

// ---------------------------------------------------------------------------
// Query strings
// ---------------------------------------------------------------------------

/// `?user_id=` / `?userId=`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id_camel: Option<String>,
}

/// `?strategy=<csv>&from=&to=[&user_id=]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyQuery {
    pub strategy: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub user_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id_camel: Option<String>,
}

// ---------------------------------------------------------------------------
// /api/pnl/trades/save
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTotals {
    pub events: u64,
    pub slices: u64,
    pub inserted: u64,
    pub updated: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
    pub ok: bool,
    pub totals: SaveTotals,
}

// ---------------------------------------------------------------------------
// /api/strategies/*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategiesPnlResponse {
    pub ok: bool,
    pub from: String,
    pub to: String,
    pub data: Vec<StrategyPnl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategiesSummaryResponse {
    pub ok: bool,
    pub data: Vec<StrategySummary>,
}
