//! Matching order is timestamp-ascending and stable; replays are identical.

use std::collections::BTreeSet;

use tdb_portfolio::{
    run_matching, FillEvent, MatchOptions, Side, ZeroTimestampPolicy, MICROS_SCALE,
};

const M: i64 = MICROS_SCALE;

fn ev(side: Side, qty: i64, px: i64, ts: i64) -> FillEvent {
    FillEvent::new("X", side, qty * M, px * M, ts).with_identity(format!("{ts}"))
}

#[test]
fn permutations_with_distinct_timestamps_match_identically() {
    let a = ev(Side::Buy, 10, 100, 1);
    let b = ev(Side::Buy, 10, 110, 2);
    let c = ev(Side::Sell, 5, 120, 3);

    let base = run_matching(vec![a.clone(), b.clone(), c.clone()], MatchOptions::default());
    let rev = run_matching(vec![c.clone(), b.clone(), a.clone()], MatchOptions::default());
    let mid = run_matching(vec![b, c, a], MatchOptions::default());

    assert_eq!(base, rev);
    assert_eq!(base, mid);
    assert_eq!(base.realized_pnl_micros, 100 * M);
}

#[test]
fn same_timestamp_keeps_arrival_order() {
    // SELL arrives before BUY at the same instant: the SELL opens a short
    // and the BUY covers it. No buy-before-sell reordering.
    let run = run_matching(
        vec![ev(Side::Sell, 5, 100, 7), ev(Side::Buy, 5, 90, 7)],
        MatchOptions::default(),
    );
    assert_eq!(run.slices.len(), 1);
    assert_eq!(run.slices[0].pnl_micros, 50 * M);
}

#[test]
fn replay_produces_same_slice_ids_without_duplicates() {
    let fills = vec![
        ev(Side::Buy, 10, 50, 1),
        ev(Side::Sell, 4, 55, 2),
        ev(Side::Sell, 6, 60, 3),
    ];
    let first = run_matching(fills.clone(), MatchOptions::default());
    let second = run_matching(fills, MatchOptions::default());

    let ids_a: Vec<_> = first.slices.iter().map(|s| s.slice_id.clone()).collect();
    let ids_b: Vec<_> = second.slices.iter().map(|s| s.slice_id.clone()).collect();
    assert_eq!(ids_a, ids_b);

    let unique: BTreeSet<_> = ids_a.iter().collect();
    assert_eq!(unique.len(), ids_a.len());
    assert_eq!(ids_a[0], format!("X|LONG|1|2|{}|{}|{}", 50 * M, 55 * M, 4 * M));
}

#[test]
fn zero_timestamp_events_sort_first_when_kept() {
    // The unparseable-time SELL jumps ahead of the BUY and opens a short.
    let fills = vec![ev(Side::Buy, 5, 100, 10), ev(Side::Sell, 5, 110, 0)];
    let run = run_matching(fills, MatchOptions::default());
    assert_eq!(run.slices.len(), 1);
    assert_eq!(run.slices[0].pnl_micros, 50 * M);
    assert_eq!(run.counters.skipped_zero_ts, 0);
}

#[test]
fn zero_timestamp_events_dropped_when_rejected() {
    let fills = vec![ev(Side::Buy, 5, 100, 10), ev(Side::Sell, 5, 110, 0)];
    let opts = MatchOptions {
        zero_ts_policy: ZeroTimestampPolicy::Reject,
        ..MatchOptions::default()
    };
    let run = run_matching(fills, opts);
    assert!(run.slices.is_empty());
    assert_eq!(run.counters.skipped_zero_ts, 1);
    assert_eq!(run.counters.events, 1);
    assert_eq!(run.open_positions, 1);
}
