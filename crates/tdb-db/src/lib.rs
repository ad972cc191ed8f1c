use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tdb_portfolio::TradeSlice;
use tdb_schemas::{
    DailySummaryRow, ExecutionLogRow, OrderbookMirrorRow, StrategySummaryRow, StrategyTag,
    UpsertCounts,
};

pub mod pnl;

pub use pnl::{
    insert_execution_log, list_trade_slice_ids, load_execution_log, load_orderbook_mirror,
    load_strategy_tags, upsert_daily_summary, upsert_orderbook_mirror, upsert_strategy_summaries,
    upsert_strategy_tags, upsert_trade_slices,
};

pub const ENV_DB_URL: &str = "TDB_DATABASE_URL";

/// Connect to Postgres at `url`.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Connect using TDB_DATABASE_URL. Test helper for the ignored DB scenarios.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 5).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='trade_slices'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_trade_slices_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_trade_slices_table: bool,
}

// ---------------------------------------------------------------------------
// Store boundary
// ---------------------------------------------------------------------------

/// Persistence surface the daemon needs. Implemented over Postgres here and
/// in memory by tdb-testkit.
#[async_trait::async_trait]
pub trait PnlStore: Send + Sync {
    /// Idempotent by `(user_scope, slice_id)`.
    async fn upsert_trade_slices(
        &self,
        user_scope: &str,
        slices: &[TradeSlice],
    ) -> Result<UpsertCounts>;

    async fn upsert_daily_summary(&self, row: &DailySummaryRow) -> Result<UpsertCounts>;

    async fn upsert_strategy_summaries(&self, rows: &[StrategySummaryRow])
        -> Result<UpsertCounts>;

    async fn upsert_orderbook_mirror(&self, rows: &[OrderbookMirrorRow]) -> Result<UpsertCounts>;

    async fn load_orderbook_mirror(&self, user_id: Option<&str>)
        -> Result<Vec<OrderbookMirrorRow>>;

    async fn load_strategy_tags(&self) -> Result<Vec<StrategyTag>>;

    /// Rows with `from_utc <= ts_utc < to_utc`, oldest first.
    async fn load_execution_log(
        &self,
        user_id: Option<&str>,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
    ) -> Result<Vec<ExecutionLogRow>>;
}

#[derive(Clone, Debug)]
pub struct PgPnlStore {
    pool: PgPool,
}

impl PgPnlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl PnlStore for PgPnlStore {
    async fn upsert_trade_slices(
        &self,
        user_scope: &str,
        slices: &[TradeSlice],
    ) -> Result<UpsertCounts> {
        pnl::upsert_trade_slices(&self.pool, user_scope, slices).await
    }

    async fn upsert_daily_summary(&self, row: &DailySummaryRow) -> Result<UpsertCounts> {
        pnl::upsert_daily_summary(&self.pool, row).await
    }

    async fn upsert_strategy_summaries(
        &self,
        rows: &[StrategySummaryRow],
    ) -> Result<UpsertCounts> {
        pnl::upsert_strategy_summaries(&self.pool, rows).await
    }

    async fn upsert_orderbook_mirror(&self, rows: &[OrderbookMirrorRow]) -> Result<UpsertCounts> {
        pnl::upsert_orderbook_mirror(&self.pool, rows).await
    }

    async fn load_orderbook_mirror(&self, user_id: Option<&str>)
        -> Result<Vec<OrderbookMirrorRow>> {
        pnl::load_orderbook_mirror(&self.pool, user_id).await
    }

    async fn load_strategy_tags(&self) -> Result<Vec<StrategyTag>> {
        pnl::load_strategy_tags(&self.pool).await
    }

    async fn load_execution_log(
        &self,
        user_id: Option<&str>,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
    ) -> Result<Vec<ExecutionLogRow>> {
        pnl::load_execution_log(&self.pool, user_id, from_utc, to_utc).await
    }
}
