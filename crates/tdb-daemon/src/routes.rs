//! Axum router and all HTTP handlers for tdb-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! the CORS / tracing layers. Every `/api/*` route sits behind the per-caller
//! rate limiter; health does not.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tdb_md::{normalize_rows, normalizer::resolve_identity, StatusMatch};
use tdb_portfolio::{
    group_books_by_strategy, run_matching, run_matching_books, FillEvent, Side, StrategyPnl,
    StrategySummary, Summary, Tz,
};
use tdb_schemas::{
    DailySummaryRow, ExecutionLogRow, OrderbookMirrorRow, StrategySource, StrategySummaryRow,
    ALL_USERS_SCOPE,
};
use tracing::{debug, info, warn};

use crate::{
    api_types::{
        HealthResponse, SaveResponse, SaveTotals, StrategiesPnlResponse,
        StrategiesSummaryResponse, StrategyQuery, UserQuery,
    },
    error::ApiError,
    state::{uptime_secs, AppState},
};

pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// CORS and request tracing are **not** applied here; `main.rs` attaches
/// them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/summary", get(summary))
        .route("/api/pnl/trades/save", get(trades_save))
        .route("/api/strategies/pnl", get(strategies_pnl))
        .route("/api/strategies/summary", get(strategies_summary))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit,
        ));

    Router::new()
        .route("/v1/health", get(health))
        .merge(api)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

pub(crate) async fn rate_limit(
    State(st): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let caller = caller_key(&req);
    if !st.limiter.check(&caller) {
        warn!(caller = %caller, "rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }
    next.run(req).await
}

/// Peer IP when the server was started with connect info, else the first
/// `x-forwarded-for` hop, else a shared bucket.
fn caller_key(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            uptime_secs: uptime_secs(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /api/summary
// ---------------------------------------------------------------------------

/// Realized P&L summary over the user's current broker order book.
/// The daily row is persisted opportunistically.
pub(crate) async fn summary(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<UserQuery>,
) -> Result<Json<Summary>, ApiError> {
    let user_id = require_user_id(&headers, q.user_id.as_deref(), q.user_id_camel.as_deref())?;
    let rows = fetch_rows(&st, &user_id).await?;

    let normalized = normalize_rows(&rows, &st.normalize_options(StatusMatch::Exact));
    let run = run_matching(normalized.events, st.match_options());
    let summary = Summary::from_run(&run);

    info!(
        user_id = %user_id,
        rows = normalized.report.seen,
        events = run.counters.events,
        slices = run.counters.slices,
        total_pnl = summary.total_pnl,
        "summary computed"
    );

    let row = daily_row(&st, &user_id, &summary);
    if let Err(err) = st.store.upsert_daily_summary(&row).await {
        warn!(user_id = %user_id, error = %format!("{err:#}"), "daily summary not persisted");
    }

    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// GET /api/pnl/trades/save
// ---------------------------------------------------------------------------

/// Match the user's order book and upsert every slice. Unlike the read
/// endpoints, persistence failure fails the request.
pub(crate) async fn trades_save(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<UserQuery>,
) -> Result<Json<SaveResponse>, ApiError> {
    let user_id = require_user_id(&headers, q.user_id.as_deref(), q.user_id_camel.as_deref())?;
    let rows = fetch_rows(&st, &user_id).await?;

    let normalized = normalize_rows(&rows, &st.normalize_options(StatusMatch::Exact));
    let run = run_matching(normalized.events, st.match_options());

    let counts = st
        .store
        .upsert_trade_slices(&user_id, &run.slices)
        .await
        .map_err(|e| ApiError::persistence(&e))?;

    let summary = Summary::from_run(&run);
    st.store
        .upsert_daily_summary(&daily_row(&st, &user_id, &summary))
        .await
        .map_err(|e| ApiError::persistence(&e))?;

    info!(
        user_id = %user_id,
        events = run.counters.events,
        slices = run.counters.slices,
        inserted = counts.inserted,
        updated = counts.updated,
        "trade slices saved"
    );

    Ok(Json(SaveResponse {
        ok: true,
        totals: SaveTotals {
            events: run.counters.events,
            slices: run.counters.slices,
            inserted: counts.inserted,
            updated: counts.updated,
        },
    }))
}

// ---------------------------------------------------------------------------
// GET /api/strategies/pnl
// ---------------------------------------------------------------------------

/// Per-strategy P&L from the mirrored order book. Order tags map to
/// strategies through `strategy_tags`; unmapped tags are ignored.
pub(crate) async fn strategies_pnl(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<StrategyQuery>,
) -> Result<Json<StrategiesPnlResponse>, ApiError> {
    let (from, to) = parse_range(q.from.as_deref(), q.to.as_deref(), st.today())?;
    let user_id = optional_user_id(&headers, q.user_id.as_deref(), q.user_id_camel.as_deref());

    let tag_map: BTreeMap<String, String> = st
        .store
        .load_strategy_tags()
        .await
        .map_err(|e| ApiError::persistence(&e))?
        .into_iter()
        .map(|t| (t.tag, t.strategy_name))
        .collect();

    let mirror = st
        .store
        .load_orderbook_mirror(user_id.as_deref())
        .await
        .map_err(|e| ApiError::persistence(&e))?;

    // one lot book per user; fills from different accounts never match
    let mut rows_by_user: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for r in mirror {
        rows_by_user.entry(r.user_id).or_default().push(r.row);
    }
    let opts = st.normalize_options(StatusMatch::Contains);
    let books: BTreeMap<String, Vec<FillEvent>> = rows_by_user
        .into_iter()
        .map(|(user, rows)| {
            let events = normalize_rows(&rows, &opts)
                .events
                .into_iter()
                .filter(|ev| in_range(st.tz, ev.ts_millis, from, to))
                .collect();
            (user, events)
        })
        .collect();
    let users = books.len();

    let targets = match requested_strategies(q.strategy.as_deref()) {
        Some(names) => names,
        None => tag_map.values().cloned().collect(),
    };

    let mut groups = group_books_by_strategy(books, &tag_map);
    let data: Vec<StrategyPnl> = targets
        .iter()
        .map(|name| {
            let books = groups.remove(name).unwrap_or_default();
            StrategyPnl::from_run(name.clone(), &run_matching_books(books, st.match_options()))
        })
        .collect();

    debug!(strategies = data.len(), users, %from, %to, "strategy pnl computed");

    let payloads: Vec<(String, Value)> = data
        .iter()
        .map(|r| (r.strategy_name.clone(), serde_json::to_value(r).unwrap_or_default()))
        .collect();
    persist_strategy_rows(&st, user_id.as_deref(), StrategySource::Orderbook, from, to, payloads)
        .await;

    Ok(Json(StrategiesPnlResponse {
        ok: true,
        from: from.to_string(),
        to: to.to_string(),
        data,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/strategies/summary
// ---------------------------------------------------------------------------

/// Per-strategy summary from the strategy-layer execution log. EXIT rows
/// flatten the symbol for that strategy.
pub(crate) async fn strategies_summary(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<StrategyQuery>,
) -> Result<Json<StrategiesSummaryResponse>, ApiError> {
    let (from, to) = parse_range(q.from.as_deref(), q.to.as_deref(), st.today())?;
    let user_id = optional_user_id(&headers, q.user_id.as_deref(), q.user_id_camel.as_deref());

    let from_utc = day_start_utc(st.tz, from)?;
    let end_day = to
        .succ_opt()
        .ok_or_else(|| ApiError::InvalidDate(to.to_string()))?;
    let to_utc = day_start_utc(st.tz, end_day)?;

    let log = st
        .store
        .load_execution_log(user_id.as_deref(), from_utc, to_utc)
        .await
        .map_err(|e| ApiError::persistence(&e))?;

    // strategy -> user -> events
    let mut groups: BTreeMap<String, BTreeMap<Option<String>, Vec<FillEvent>>> = BTreeMap::new();
    for row in &log {
        if let Some(ev) = execution_row_to_event(row) {
            groups
                .entry(row.strategy_name.clone())
                .or_default()
                .entry(row.user_id.clone())
                .or_default()
                .push(ev);
        }
    }

    let targets = match requested_strategies(q.strategy.as_deref()) {
        Some(names) => names,
        None => groups.keys().cloned().collect(),
    };

    let data: Vec<StrategySummary> = targets
        .iter()
        .map(|name| {
            let books = groups.remove(name).unwrap_or_default().into_values();
            StrategySummary::from_run(name.clone(), &run_matching_books(books, st.match_options()))
        })
        .collect();

    debug!(strategies = data.len(), rows = log.len(), %from, %to, "strategy summary computed");

    let payloads: Vec<(String, Value)> = data
        .iter()
        .map(|r| (r.strategy_name.clone(), serde_json::to_value(r).unwrap_or_default()))
        .collect();
    persist_strategy_rows(
        &st,
        user_id.as_deref(),
        StrategySource::ExecutionLog,
        from,
        to,
        payloads,
    )
    .await;

    Ok(Json(StrategiesSummaryResponse { ok: true, data }))
}

/// BUY/SELL rows need a positive quantity; EXIT ignores it.
/// Unknown actions are dropped.
fn execution_row_to_event(row: &ExecutionLogRow) -> Option<FillEvent> {
    let Some(side) = Side::from_action(&row.action) else {
        debug!(identity = %row.identity, action = %row.action, "execution row skipped: unknown action");
        return None;
    };
    if side != Side::Exit && row.qty_micros <= 0 {
        debug!(
            identity = %row.identity,
            qty_micros = row.qty_micros,
            "execution row skipped: non-positive qty"
        );
        return None;
    }
    Some(FillEvent {
        symbol: row.symbol.trim().to_ascii_uppercase(),
        side,
        qty_micros: row.qty_micros,
        price_micros: row.price_micros,
        ts_millis: row.ts_utc.timestamp_millis(),
        identity: row.identity.clone(),
        tag: row.strategy_name.clone(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `x-user-id` header, then `user_id`, then `userId`. Blank values are absent.
fn optional_user_id(
    headers: &HeaderMap,
    user_id: Option<&str>,
    user_id_camel: Option<&str>,
) -> Option<String> {
    let header = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
    [header, user_id, user_id_camel]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn require_user_id(
    headers: &HeaderMap,
    user_id: Option<&str>,
    user_id_camel: Option<&str>,
) -> Result<String, ApiError> {
    optional_user_id(headers, user_id, user_id_camel).ok_or(ApiError::MissingUserId)
}

/// Cached broker rows for `user_id`, else a provider fetch. Fresh rows are
/// mirrored for the strategy endpoints; mirroring failures only warn.
async fn fetch_rows(st: &AppState, user_id: &str) -> Result<Vec<Value>, ApiError> {
    let key = user_id.to_string();
    if let Some(rows) = st.rows_cache.get(&key) {
        debug!(user_id, rows = rows.len(), "broker rows served from cache");
        return Ok(rows);
    }

    let rows = st.provider.fetch_orderbook(user_id).await.map_err(|e| {
        warn!(user_id, provider = st.provider.name(), error = %e, "orderbook fetch failed");
        ApiError::from(e)
    })?;
    st.rows_cache.insert(key, rows.clone());

    let fetched_at_utc = Utc::now();
    let mirror: Vec<OrderbookMirrorRow> = rows
        .iter()
        .filter_map(|row| {
            let obj = row.as_object()?;
            Some(OrderbookMirrorRow {
                user_id: user_id.to_string(),
                row_identity: resolve_identity(obj),
                row: row.clone(),
                fetched_at_utc,
            })
        })
        .collect();
    if let Err(err) = st.store.upsert_orderbook_mirror(&mirror).await {
        warn!(user_id, error = %format!("{err:#}"), "orderbook mirror not persisted");
    }

    Ok(rows)
}

fn daily_row(st: &AppState, user_id: &str, summary: &Summary) -> DailySummaryRow {
    DailySummaryRow {
        user_id: user_id.to_string(),
        date_key: st.today(),
        total_pnl: summary.total_pnl,
        total_trades: i64::try_from(summary.total_trades).unwrap_or(i64::MAX),
        open_positions: i64::try_from(summary.open_positions).unwrap_or(i64::MAX),
        success_rate_pct: summary.success_rate_pct,
        risk_reward: summary.risk_reward,
        computed_at_utc: Utc::now(),
    }
}

async fn persist_strategy_rows(
    st: &AppState,
    user_id: Option<&str>,
    source: StrategySource,
    from: NaiveDate,
    to: NaiveDate,
    payloads: Vec<(String, Value)>,
) {
    let user_scope = user_id.unwrap_or(ALL_USERS_SCOPE);
    let computed_at_utc = Utc::now();
    let rows: Vec<StrategySummaryRow> = payloads
        .into_iter()
        .map(|(strategy_name, payload)| StrategySummaryRow {
            user_scope: user_scope.to_string(),
            strategy_name,
            source,
            from_date: from,
            to_date: to,
            payload,
            computed_at_utc,
        })
        .collect();
    if let Err(err) = st.store.upsert_strategy_summaries(&rows).await {
        warn!(
            user_scope,
            source = source.as_str(),
            error = %format!("{err:#}"),
            "strategy summaries not persisted"
        );
    }
}

/// Blank or absent → `today`.
fn parse_day(raw: Option<&str>, today: NaiveDate) -> Result<NaiveDate, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(today),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::InvalidDate(s.to_string())),
    }
}

fn parse_range(
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), ApiError> {
    let from = parse_day(from, today)?;
    let to = parse_day(to, today)?;
    if from > to {
        return Err(ApiError::InvalidRange {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok((from, to))
}

/// `None` when the parameter is absent or lists nothing.
fn requested_strategies(raw: Option<&str>) -> Option<BTreeSet<String>> {
    let names: BTreeSet<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!names.is_empty()).then_some(names)
}

fn day_start_utc(tz: Tz, day: NaiveDate) -> Result<DateTime<Utc>, ApiError> {
    day.and_hms_opt(0, 0, 0)
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ApiError::InvalidDate(day.to_string()))
}

/// Market-local date of `ts_millis` falls within `[from, to]`.
fn in_range(tz: Tz, ts_millis: i64, from: NaiveDate, to: NaiveDate) -> bool {
    match tz.timestamp_millis_opt(ts_millis).single() {
        Some(dt) => {
            let day = dt.date_naive();
            from <= day && day <= to
        }
        None => false,
    }
}
