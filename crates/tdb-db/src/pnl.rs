// Realized P&L persistence: trade slices, summaries, order-book mirror and
// the strategy-layer inputs (tag map, execution log).
//
// Every write is a single UNNEST bulk statement inside a transaction.
// Postgres rejects an ON CONFLICT DO UPDATE batch that touches the same key
// twice, so batches are collapsed by key first (last occurrence wins).
// inserted vs updated comes from `returning (xmax = 0)`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::debug;
use tdb_portfolio::TradeSlice;
use tdb_schemas::{
    DailySummaryRow, ExecutionLogRow, OrderbookMirrorRow, StrategySummaryRow, StrategyTag,
    UpsertCounts,
};

/// Keep the last item per key, in first-seen key order.
pub(crate) fn dedupe_last_by<T: Clone, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> Vec<T> {
    let mut order: Vec<K> = Vec::new();
    let mut by_key: BTreeMap<K, T> = BTreeMap::new();
    for it in items {
        let k = key(it);
        if by_key.insert(key(it), it.clone()).is_none() {
            order.push(k);
        }
    }
    order
        .into_iter()
        .filter_map(|k| by_key.remove(&k))
        .collect()
}

fn counts_from(table: &'static str, flags: &[bool]) -> UpsertCounts {
    let inserted = flags.iter().filter(|f| **f).count() as u64;
    let updated = flags.len() as u64 - inserted;
    debug!(table, inserted, updated, "bulk upsert");
    UpsertCounts { inserted, updated }
}

fn parse_date_key(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date_key '{s}'"))
}

// ---------------------------------------------------------------------------
// Trade slices
// ---------------------------------------------------------------------------

pub async fn upsert_trade_slices(
    pool: &PgPool,
    user_scope: &str,
    slices: &[TradeSlice],
) -> Result<UpsertCounts> {
    let slices = dedupe_last_by(slices, |s| s.slice_id.clone());
    if slices.is_empty() {
        return Ok(UpsertCounts::default());
    }

    let n = slices.len();
    let mut slice_id = Vec::with_capacity(n);
    let mut symbol = Vec::with_capacity(n);
    let mut side = Vec::with_capacity(n);
    let mut qty = Vec::with_capacity(n);
    let mut entry_px = Vec::with_capacity(n);
    let mut exit_px = Vec::with_capacity(n);
    let mut per_unit = Vec::with_capacity(n);
    let mut pnl = Vec::with_capacity(n);
    let mut notional = Vec::with_capacity(n);
    let mut outcome = Vec::with_capacity(n);
    let mut entry_ts = Vec::with_capacity(n);
    let mut entry_id = Vec::with_capacity(n);
    let mut exit_ts = Vec::with_capacity(n);
    let mut exit_id = Vec::with_capacity(n);
    let mut date_key = Vec::with_capacity(n);
    let mut tag = Vec::with_capacity(n);

    for s in &slices {
        slice_id.push(s.slice_id.clone());
        symbol.push(s.symbol.clone());
        side.push(s.side.as_str().to_string());
        qty.push(s.qty_micros);
        entry_px.push(s.entry_price_micros);
        exit_px.push(s.exit_price_micros);
        per_unit.push(s.pnl_per_unit_micros);
        pnl.push(s.pnl_micros);
        notional.push(s.notional_micros);
        outcome.push(s.outcome.as_str().to_string());
        entry_ts.push(s.entry.ts_millis);
        entry_id.push(s.entry.identity.clone());
        exit_ts.push(s.exit.ts_millis);
        exit_id.push(s.exit.identity.clone());
        date_key.push(parse_date_key(&s.date_key)?);
        tag.push(s.tag.clone());
    }

    let mut tx = pool.begin().await.context("begin trade_slices tx failed")?;

    let flags: Vec<bool> = sqlx::query_scalar(
        r#"
        insert into trade_slices (
          user_scope, slice_id, symbol, side, qty_micros,
          entry_price_micros, exit_price_micros, pnl_per_unit_micros, pnl_micros, notional_micros,
          outcome, entry_ts_millis, entry_identity, exit_ts_millis, exit_identity,
          date_key, tag, updated_at_utc
        )
        select
          $1, s.slice_id, s.symbol, s.side, s.qty,
          s.entry_px, s.exit_px, s.per_unit, s.pnl, s.notional,
          s.outcome, s.entry_ts, s.entry_id, s.exit_ts, s.exit_id,
          s.date_key, s.tag, now()
        from unnest(
          $2::text[], $3::text[], $4::text[], $5::int8[],
          $6::int8[], $7::int8[], $8::int8[], $9::int8[], $10::int8[],
          $11::text[], $12::int8[], $13::text[], $14::int8[], $15::text[],
          $16::date[], $17::text[]
        ) as s(
          slice_id, symbol, side, qty,
          entry_px, exit_px, per_unit, pnl, notional,
          outcome, entry_ts, entry_id, exit_ts, exit_id,
          date_key, tag
        )
        on conflict (user_scope, slice_id) do update set
          symbol = excluded.symbol,
          side = excluded.side,
          qty_micros = excluded.qty_micros,
          entry_price_micros = excluded.entry_price_micros,
          exit_price_micros = excluded.exit_price_micros,
          pnl_per_unit_micros = excluded.pnl_per_unit_micros,
          pnl_micros = excluded.pnl_micros,
          notional_micros = excluded.notional_micros,
          outcome = excluded.outcome,
          entry_ts_millis = excluded.entry_ts_millis,
          entry_identity = excluded.entry_identity,
          exit_ts_millis = excluded.exit_ts_millis,
          exit_identity = excluded.exit_identity,
          date_key = excluded.date_key,
          tag = excluded.tag,
          updated_at_utc = excluded.updated_at_utc
        returning (xmax = 0)
        "#,
    )
    .bind(user_scope)
    .bind(&slice_id)
    .bind(&symbol)
    .bind(&side)
    .bind(&qty)
    .bind(&entry_px)
    .bind(&exit_px)
    .bind(&per_unit)
    .bind(&pnl)
    .bind(&notional)
    .bind(&outcome)
    .bind(&entry_ts)
    .bind(&entry_id)
    .bind(&exit_ts)
    .bind(&exit_id)
    .bind(&date_key)
    .bind(&tag)
    .fetch_all(&mut *tx)
    .await
    .context("bulk upsert trade_slices failed")?;

    tx.commit().await.context("commit trade_slices tx failed")?;
    Ok(counts_from("trade_slices", &flags))
}

/// Slice ids stored for `user_scope`, ascending.
pub async fn list_trade_slice_ids(pool: &PgPool, user_scope: &str) -> Result<Vec<String>> {
    sqlx::query_scalar("select slice_id from trade_slices where user_scope = $1 order by slice_id")
        .bind(user_scope)
        .fetch_all(pool)
        .await
        .context("list_trade_slice_ids failed")
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

pub async fn upsert_daily_summary(pool: &PgPool, row: &DailySummaryRow) -> Result<UpsertCounts> {
    let inserted: bool = sqlx::query_scalar(
        r#"
        insert into daily_summaries (
          user_id, date_key, total_pnl, total_trades, open_positions,
          success_rate_pct, risk_reward, computed_at_utc
        ) values ($1,$2,$3,$4,$5,$6,$7,$8)
        on conflict (user_id, date_key) do update set
          total_pnl = excluded.total_pnl,
          total_trades = excluded.total_trades,
          open_positions = excluded.open_positions,
          success_rate_pct = excluded.success_rate_pct,
          risk_reward = excluded.risk_reward,
          computed_at_utc = excluded.computed_at_utc
        returning (xmax = 0)
        "#,
    )
    .bind(&row.user_id)
    .bind(row.date_key)
    .bind(row.total_pnl)
    .bind(row.total_trades)
    .bind(row.open_positions)
    .bind(row.success_rate_pct)
    .bind(row.risk_reward)
    .bind(row.computed_at_utc)
    .fetch_one(pool)
    .await
    .context("upsert daily_summaries failed")?;

    Ok(counts_from("daily_summaries", &[inserted]))
}

pub async fn upsert_strategy_summaries(
    pool: &PgPool,
    rows: &[StrategySummaryRow],
) -> Result<UpsertCounts> {
    let rows = dedupe_last_by(rows, |r| {
        (
            r.user_scope.clone(),
            r.strategy_name.clone(),
            r.source.as_str(),
            r.from_date,
            r.to_date,
        )
    });
    if rows.is_empty() {
        return Ok(UpsertCounts::default());
    }

    let user_scope: Vec<String> = rows.iter().map(|r| r.user_scope.clone()).collect();
    let strategy: Vec<String> = rows.iter().map(|r| r.strategy_name.clone()).collect();
    let source: Vec<String> = rows.iter().map(|r| r.source.as_str().to_string()).collect();
    let from_date: Vec<NaiveDate> = rows.iter().map(|r| r.from_date).collect();
    let to_date: Vec<NaiveDate> = rows.iter().map(|r| r.to_date).collect();
    let payload: Vec<Value> = rows.iter().map(|r| r.payload.clone()).collect();
    let computed: Vec<DateTime<Utc>> = rows.iter().map(|r| r.computed_at_utc).collect();

    let mut tx = pool.begin().await.context("begin strategy_summaries tx failed")?;

    let flags: Vec<bool> = sqlx::query_scalar(
        r#"
        insert into strategy_summaries (
          user_scope, strategy_name, source, from_date, to_date, payload, computed_at_utc
        )
        select * from unnest(
          $1::text[], $2::text[], $3::text[], $4::date[], $5::date[], $6::jsonb[], $7::timestamptz[]
        )
        on conflict (user_scope, strategy_name, source, from_date, to_date) do update set
          payload = excluded.payload,
          computed_at_utc = excluded.computed_at_utc
        returning (xmax = 0)
        "#,
    )
    .bind(&user_scope)
    .bind(&strategy)
    .bind(&source)
    .bind(&from_date)
    .bind(&to_date)
    .bind(&payload)
    .bind(&computed)
    .fetch_all(&mut *tx)
    .await
    .context("bulk upsert strategy_summaries failed")?;

    tx.commit().await.context("commit strategy_summaries tx failed")?;
    Ok(counts_from("strategy_summaries", &flags))
}

// ---------------------------------------------------------------------------
// Order-book mirror
// ---------------------------------------------------------------------------

pub async fn upsert_orderbook_mirror(
    pool: &PgPool,
    rows: &[OrderbookMirrorRow],
) -> Result<UpsertCounts> {
    let rows = dedupe_last_by(rows, |r| (r.user_id.clone(), r.row_identity.clone()));
    if rows.is_empty() {
        return Ok(UpsertCounts::default());
    }

    let user_id: Vec<String> = rows.iter().map(|r| r.user_id.clone()).collect();
    let identity: Vec<String> = rows.iter().map(|r| r.row_identity.clone()).collect();
    let row: Vec<Value> = rows.iter().map(|r| r.row.clone()).collect();
    let fetched: Vec<DateTime<Utc>> = rows.iter().map(|r| r.fetched_at_utc).collect();

    let mut tx = pool.begin().await.context("begin orderbook_mirror tx failed")?;

    let flags: Vec<bool> = sqlx::query_scalar(
        r#"
        insert into orderbook_mirror (user_id, row_identity, row_json, fetched_at_utc)
        select * from unnest($1::text[], $2::text[], $3::jsonb[], $4::timestamptz[])
        on conflict (user_id, row_identity) do update set
          row_json = excluded.row_json,
          fetched_at_utc = excluded.fetched_at_utc
        returning (xmax = 0)
        "#,
    )
    .bind(&user_id)
    .bind(&identity)
    .bind(&row)
    .bind(&fetched)
    .fetch_all(&mut *tx)
    .await
    .context("bulk upsert orderbook_mirror failed")?;

    tx.commit().await.context("commit orderbook_mirror tx failed")?;
    Ok(counts_from("orderbook_mirror", &flags))
}

/// Mirrored rows for one user, or for everyone when `user_id` is `None`.
pub async fn load_orderbook_mirror(
    pool: &PgPool,
    user_id: Option<&str>,
) -> Result<Vec<OrderbookMirrorRow>> {
    let rows = sqlx::query(
        r#"
        select user_id, row_identity, row_json, fetched_at_utc
        from orderbook_mirror
        where ($1::text is null or user_id = $1)
        order by fetched_at_utc asc, user_id asc, row_identity asc
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("load_orderbook_mirror failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        out.push(OrderbookMirrorRow {
            user_id: r.try_get("user_id")?,
            row_identity: r.try_get("row_identity")?,
            row: r.try_get("row_json")?,
            fetched_at_utc: r.try_get("fetched_at_utc")?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Strategy inputs
// ---------------------------------------------------------------------------

pub async fn load_strategy_tags(pool: &PgPool) -> Result<Vec<StrategyTag>> {
    let rows = sqlx::query("select tag, strategy_name from strategy_tags order by tag")
        .fetch_all(pool)
        .await
        .context("load_strategy_tags failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        out.push(StrategyTag {
            tag: r.try_get("tag")?,
            strategy_name: r.try_get("strategy_name")?,
        });
    }
    Ok(out)
}

pub async fn upsert_strategy_tags(pool: &PgPool, tags: &[StrategyTag]) -> Result<UpsertCounts> {
    let tags = dedupe_last_by(tags, |t| t.tag.clone());
    if tags.is_empty() {
        return Ok(UpsertCounts::default());
    }
    let tag: Vec<String> = tags.iter().map(|t| t.tag.clone()).collect();
    let name: Vec<String> = tags.iter().map(|t| t.strategy_name.clone()).collect();

    let flags: Vec<bool> = sqlx::query_scalar(
        r#"
        insert into strategy_tags (tag, strategy_name)
        select * from unnest($1::text[], $2::text[])
        on conflict (tag) do update set strategy_name = excluded.strategy_name
        returning (xmax = 0)
        "#,
    )
    .bind(&tag)
    .bind(&name)
    .fetch_all(pool)
    .await
    .context("upsert strategy_tags failed")?;

    Ok(counts_from("strategy_tags", &flags))
}

/// Execution-log rows with `from_utc <= ts_utc < to_utc`, oldest first.
pub async fn load_execution_log(
    pool: &PgPool,
    user_id: Option<&str>,
    from_utc: DateTime<Utc>,
    to_utc: DateTime<Utc>,
) -> Result<Vec<ExecutionLogRow>> {
    let rows = sqlx::query(
        r#"
        select strategy_name, user_id, symbol, action, qty_micros, price_micros, ts_utc, identity
        from execution_log
        where ts_utc >= $1 and ts_utc < $2
          and ($3::text is null or user_id = $3)
        order by ts_utc asc, id asc
        "#,
    )
    .bind(from_utc)
    .bind(to_utc)
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("load_execution_log failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        out.push(ExecutionLogRow {
            strategy_name: r.try_get("strategy_name")?,
            user_id: r.try_get("user_id")?,
            symbol: r.try_get("symbol")?,
            action: r.try_get("action")?,
            qty_micros: r.try_get("qty_micros")?,
            price_micros: r.try_get("price_micros")?,
            ts_utc: r.try_get("ts_utc")?,
            identity: r.try_get("identity")?,
        });
    }
    Ok(out)
}

pub async fn insert_execution_log(pool: &PgPool, rows: &[ExecutionLogRow]) -> Result<UpsertCounts> {
    let rows = dedupe_last_by(rows, |r| r.identity.clone());
    if rows.is_empty() {
        return Ok(UpsertCounts::default());
    }

    let strategy: Vec<String> = rows.iter().map(|r| r.strategy_name.clone()).collect();
    let user_id: Vec<Option<String>> = rows.iter().map(|r| r.user_id.clone()).collect();
    let symbol: Vec<String> = rows.iter().map(|r| r.symbol.clone()).collect();
    let action: Vec<String> = rows.iter().map(|r| r.action.to_ascii_uppercase()).collect();
    let qty: Vec<i64> = rows.iter().map(|r| r.qty_micros).collect();
    let price: Vec<i64> = rows.iter().map(|r| r.price_micros).collect();
    let ts: Vec<DateTime<Utc>> = rows.iter().map(|r| r.ts_utc).collect();
    let identity: Vec<String> = rows.iter().map(|r| r.identity.clone()).collect();

    let flags: Vec<bool> = sqlx::query_scalar(
        r#"
        insert into execution_log (
          strategy_name, user_id, symbol, action, qty_micros, price_micros, ts_utc, identity
        )
        select * from unnest(
          $1::text[], $2::text[], $3::text[], $4::text[], $5::int8[], $6::int8[],
          $7::timestamptz[], $8::text[]
        )
        on conflict (identity) do update set
          strategy_name = excluded.strategy_name,
          user_id = excluded.user_id,
          symbol = excluded.symbol,
          action = excluded.action,
          qty_micros = excluded.qty_micros,
          price_micros = excluded.price_micros,
          ts_utc = excluded.ts_utc
        returning (xmax = 0)
        "#,
    )
    .bind(&strategy)
    .bind(&user_id)
    .bind(&symbol)
    .bind(&action)
    .bind(&qty)
    .bind(&price)
    .bind(&ts)
    .bind(&identity)
    .fetch_all(pool)
    .await
    .context("insert execution_log failed")?;

    Ok(counts_from("execution_log", &flags))
}
