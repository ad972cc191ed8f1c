//! In-memory [`PnlStore`] with the same keys and inserted/updated accounting
//! as the Postgres store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tdb_db::PnlStore;
use tdb_portfolio::TradeSlice;
use tdb_schemas::{
    DailySummaryRow, ExecutionLogRow, OrderbookMirrorRow, StrategySummaryRow, StrategyTag,
    UpsertCounts,
};

type SummaryKey = (String, String, &'static str, NaiveDate, NaiveDate);

#[derive(Default)]
struct Inner {
    slices: BTreeMap<(String, String), TradeSlice>,
    daily: BTreeMap<(String, NaiveDate), DailySummaryRow>,
    strategy_summaries: BTreeMap<SummaryKey, StrategySummaryRow>,
    mirror: BTreeMap<(String, String), OrderbookMirrorRow>,
    tags: BTreeMap<String, String>,
    execution_log: BTreeMap<String, ExecutionLogRow>,
    fail_writes: bool,
}

#[derive(Default)]
pub struct InMemoryPnlStore {
    inner: Mutex<Inner>,
}

fn upsert<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: V, counts: &mut UpsertCounts) {
    if map.insert(key, value).is_some() {
        counts.updated += 1;
    } else {
        counts.inserted += 1;
    }
}

impl InMemoryPnlStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn lock_for_write(&self) -> Result<MutexGuard<'_, Inner>> {
        let g = self.lock()?;
        if g.fail_writes {
            bail!("in-memory store: writes disabled");
        }
        Ok(g)
    }

    /// Make every subsequent write fail, to exercise persistence-error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut g) = self.inner.lock() {
            g.fail_writes = fail;
        }
    }

    pub fn seed_tags(&self, tags: &[(&str, &str)]) {
        if let Ok(mut g) = self.inner.lock() {
            for (tag, name) in tags {
                g.tags.insert(tag.to_string(), name.to_string());
            }
        }
    }

    pub fn seed_execution_log(&self, rows: Vec<ExecutionLogRow>) {
        if let Ok(mut g) = self.inner.lock() {
            for r in rows {
                g.execution_log.insert(r.identity.clone(), r);
            }
        }
    }

    pub fn seed_mirror(&self, rows: Vec<OrderbookMirrorRow>) {
        if let Ok(mut g) = self.inner.lock() {
            for r in rows {
                g.mirror
                    .insert((r.user_id.clone(), r.row_identity.clone()), r);
            }
        }
    }

    /// Stored slices for `user_scope`, ordered by slice id.
    pub fn slices(&self, user_scope: &str) -> Vec<TradeSlice> {
        self.lock()
            .map(|g| {
                g.slices
                    .iter()
                    .filter(|((scope, _), _)| scope == user_scope)
                    .map(|(_, s)| s.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn daily_summaries(&self) -> Vec<DailySummaryRow> {
        self.lock()
            .map(|g| g.daily.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn strategy_summaries(&self) -> Vec<StrategySummaryRow> {
        self.lock()
            .map(|g| g.strategy_summaries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn mirror_len(&self) -> usize {
        self.lock().map(|g| g.mirror.len()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl PnlStore for InMemoryPnlStore {
    async fn upsert_trade_slices(
        &self,
        user_scope: &str,
        slices: &[TradeSlice],
    ) -> Result<UpsertCounts> {
        let mut g = self.lock_for_write()?;
        // collapse in-batch duplicates first so a repeated id counts once
        let mut batch: BTreeMap<String, &TradeSlice> = BTreeMap::new();
        for s in slices {
            batch.insert(s.slice_id.clone(), s);
        }
        let mut counts = UpsertCounts::default();
        for (id, s) in batch {
            upsert(
                &mut g.slices,
                (user_scope.to_string(), id),
                s.clone(),
                &mut counts,
            );
        }
        Ok(counts)
    }

    async fn upsert_daily_summary(&self, row: &DailySummaryRow) -> Result<UpsertCounts> {
        let mut g = self.lock_for_write()?;
        let mut counts = UpsertCounts::default();
        upsert(
            &mut g.daily,
            (row.user_id.clone(), row.date_key),
            row.clone(),
            &mut counts,
        );
        Ok(counts)
    }

    async fn upsert_strategy_summaries(
        &self,
        rows: &[StrategySummaryRow],
    ) -> Result<UpsertCounts> {
        let mut g = self.lock_for_write()?;
        let mut batch: BTreeMap<SummaryKey, &StrategySummaryRow> = BTreeMap::new();
        for r in rows {
            let key = (
                r.user_scope.clone(),
                r.strategy_name.clone(),
                r.source.as_str(),
                r.from_date,
                r.to_date,
            );
            batch.insert(key, r);
        }
        let mut counts = UpsertCounts::default();
        for (key, r) in batch {
            upsert(&mut g.strategy_summaries, key, r.clone(), &mut counts);
        }
        Ok(counts)
    }

    async fn upsert_orderbook_mirror(&self, rows: &[OrderbookMirrorRow]) -> Result<UpsertCounts> {
        let mut g = self.lock_for_write()?;
        let mut batch: BTreeMap<(String, String), &OrderbookMirrorRow> = BTreeMap::new();
        for r in rows {
            batch.insert((r.user_id.clone(), r.row_identity.clone()), r);
        }
        let mut counts = UpsertCounts::default();
        for (key, r) in batch {
            upsert(&mut g.mirror, key, r.clone(), &mut counts);
        }
        Ok(counts)
    }

    async fn load_orderbook_mirror(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<OrderbookMirrorRow>> {
        let g = self.lock()?;
        let mut rows: Vec<&OrderbookMirrorRow> = g
            .mirror
            .values()
            .filter(|r| user_id.map_or(true, |u| r.user_id == u))
            .collect();
        rows.sort_by(|a, b| {
            (a.fetched_at_utc, &a.user_id, &a.row_identity).cmp(&(
                b.fetched_at_utc,
                &b.user_id,
                &b.row_identity,
            ))
        });
        Ok(rows.into_iter().cloned().collect())
    }

    async fn load_strategy_tags(&self) -> Result<Vec<StrategyTag>> {
        let g = self.lock()?;
        Ok(g.tags
            .iter()
            .map(|(tag, name)| StrategyTag {
                tag: tag.clone(),
                strategy_name: name.clone(),
            })
            .collect())
    }

    async fn load_execution_log(
        &self,
        user_id: Option<&str>,
        from_utc: DateTime<Utc>,
        to_utc: DateTime<Utc>,
    ) -> Result<Vec<ExecutionLogRow>> {
        let g = self.lock()?;
        let mut rows: Vec<ExecutionLogRow> = g
            .execution_log
            .values()
            .filter(|r| r.ts_utc >= from_utc && r.ts_utc < to_utc)
            .filter(|r| user_id.map_or(true, |u| r.user_id.as_deref() == Some(u)))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.ts_utc);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tdb_portfolio::{run_matching, FillEvent, MatchOptions, Side};

    fn slices() -> Vec<TradeSlice> {
        let events = vec![
            FillEvent::new("A", Side::Buy, 2_000_000, 10_000_000, 1_000),
            FillEvent::new("A", Side::Sell, 2_000_000, 12_000_000, 2_000),
        ];
        run_matching(events, MatchOptions::default()).slices
    }

    #[tokio::test]
    async fn slice_upsert_counts_match_postgres_semantics() {
        let store = InMemoryPnlStore::new();
        let s = slices();

        let first = store.upsert_trade_slices("U1", &s).await.unwrap();
        assert_eq!(first, UpsertCounts { inserted: 1, updated: 0 });

        let mut doubled = s.clone();
        doubled.extend(s.iter().cloned());
        let second = store.upsert_trade_slices("U1", &doubled).await.unwrap();
        assert_eq!(second, UpsertCounts { inserted: 0, updated: 1 });

        // scopes are independent
        let other = store.upsert_trade_slices("U2", &s).await.unwrap();
        assert_eq!(other.inserted, 1);
        assert_eq!(store.slices("U1").len(), 1);
    }

    #[tokio::test]
    async fn failing_writes_surface_errors() {
        let store = InMemoryPnlStore::new();
        store.set_fail_writes(true);
        assert!(store.upsert_trade_slices("U1", &slices()).await.is_err());
        // reads still work
        assert!(store.load_strategy_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn execution_log_window_is_half_open() {
        let store = InMemoryPnlStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let row = |id: &str, ts| ExecutionLogRow {
            strategy_name: "S".into(),
            user_id: Some("U1".into()),
            symbol: "A".into(),
            action: "BUY".into(),
            qty_micros: 1_000_000,
            price_micros: 1,
            ts_utc: ts,
            identity: id.into(),
        };
        store.seed_execution_log(vec![
            row("1", t0),
            row("2", t0 + chrono::Duration::hours(1)),
        ]);

        let got = store
            .load_execution_log(None, t0, t0 + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].identity, "1");

        let other_user = store
            .load_execution_log(Some("U9"), t0, t0 + chrono::Duration::days(1))
            .await
            .unwrap();
        assert!(other_user.is_empty());
    }
}
