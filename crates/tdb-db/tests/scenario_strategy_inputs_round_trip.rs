//! Strategy tags, execution log and order-book mirror read back what was written.
//!
//! DB-backed test, skipped if TDB_DATABASE_URL is not set.

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tdb_db::PnlStore;
use tdb_schemas::{ExecutionLogRow, OrderbookMirrorRow, StrategyTag};

#[tokio::test]
async fn strategy_inputs_round_trip() -> anyhow::Result<()> {
    let url = match std::env::var(tdb_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: TDB_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = tdb_db::connect(&url, 2).await?;
    tdb_db::migrate(&pool).await?;
    let store = tdb_db::PgPnlStore::new(pool.clone());

    let nonce = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let tag = format!("ALGO_RT_{nonce}");
    let user = format!("rt-user-{nonce}");

    let c = tdb_db::upsert_strategy_tags(
        &pool,
        &[StrategyTag {
            tag: tag.clone(),
            strategy_name: "Momentum".into(),
        }],
    )
    .await?;
    assert_eq!(c.inserted, 1);

    let tags = store.load_strategy_tags().await?;
    assert!(tags
        .iter()
        .any(|t| t.tag == tag && t.strategy_name == "Momentum"));

    let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 4, 0, 0).single().expect("valid ts");
    let rows = vec![
        ExecutionLogRow {
            strategy_name: "Momentum".into(),
            user_id: Some(user.clone()),
            symbol: "TCS".into(),
            action: "buy".into(),
            qty_micros: 2_500_000,
            price_micros: 3_000_000_000,
            ts_utc: t0,
            identity: format!("{nonce}-1"),
        },
        ExecutionLogRow {
            strategy_name: "Momentum".into(),
            user_id: Some(user.clone()),
            symbol: "TCS".into(),
            action: "EXIT".into(),
            qty_micros: 0,
            price_micros: 3_100_000_000,
            ts_utc: t0 + Duration::minutes(5),
            identity: format!("{nonce}-2"),
        },
    ];
    let c = tdb_db::insert_execution_log(&pool, &rows).await?;
    assert_eq!(c.inserted, 2);

    let loaded = store
        .load_execution_log(Some(&user), t0, t0 + Duration::days(1))
        .await?;
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].action, "BUY");
    assert_eq!(loaded[0].qty_micros, 2_500_000);
    assert_eq!(loaded[1].action, "EXIT");

    // half-open window excludes the second row
    let early = store
        .load_execution_log(Some(&user), t0, t0 + Duration::minutes(5))
        .await?;
    assert_eq!(early.len(), 1);

    let mirror = vec![OrderbookMirrorRow {
        user_id: user.clone(),
        row_identity: "o1".into(),
        row: json!({"order_id": "o1", "status": "COMPLETE"}),
        fetched_at_utc: t0,
    }];
    assert_eq!(store.upsert_orderbook_mirror(&mirror).await?.inserted, 1);
    assert_eq!(store.upsert_orderbook_mirror(&mirror).await?.updated, 1);
    let back = store.load_orderbook_mirror(Some(&user)).await?;
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].user_id, user);
    assert_eq!(back[0].row, json!({"order_id": "o1", "status": "COMPLETE"}));

    Ok(())
}
