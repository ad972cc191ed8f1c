use tdb_portfolio::{
    run_matching, Direction, FillEvent, LotBook, MatchOptions, Outcome, Side, Summary,
    MICROS_SCALE,
};

const M: i64 = MICROS_SCALE;

fn fill(side: Side, qty: i64, px: i64, ts: i64) -> FillEvent {
    FillEvent::new("X", side, qty * M, px * M, ts)
        .with_identity(format!("o{ts}"))
        .with_tag("ALGO1")
}

#[test]
fn scenario_sell_closes_oldest_long_lots_first() {
    let mut book = LotBook::new();
    book.apply("X", Side::Buy, 5 * M, 100 * M, fill(Side::Buy, 5, 100, 1).fill_ref())
        .unwrap();
    book.apply("X", Side::Buy, 5 * M, 110 * M, fill(Side::Buy, 5, 110, 2).fill_ref())
        .unwrap();

    let pieces = book
        .apply("X", Side::Sell, 7, 120 * M, fill(Side::Sell, 7, 120, 3).fill_ref())
        .unwrap();

    assert_eq!(pieces.len(), 2);
    assert_eq!((pieces[0].qty_micros, pieces[0].entry_price_micros), (5 * M, 100 * M));
    assert_eq!((pieces[1].qty_micros, pieces[1].entry_price_micros), (2 * M, 110 * M));
    assert!(pieces.iter().all(|p| p.exit_price_micros == 120 * M));

    let left = book.lots("X");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].qty_micros, 3 * M);
    assert_eq!(left[0].price_micros, 110 * M);
    assert_eq!(book.net_qty("X"), 3 * M);
}

#[test]
fn scenario_long_round_trip_profit() {
    let run = run_matching(
        vec![fill(Side::Buy, 10, 100, 1), fill(Side::Sell, 10, 105, 2)],
        MatchOptions::default(),
    );

    assert_eq!(run.slices.len(), 1);
    let s = &run.slices[0];
    assert_eq!(s.side, Direction::Long);
    assert_eq!(s.qty_micros, 10 * M);
    assert_eq!(s.entry_price_micros, 100 * M);
    assert_eq!(s.exit_price_micros, 105 * M);
    assert_eq!(s.pnl_micros, 50 * M);
    assert_eq!(s.outcome, Outcome::Profit);

    let summary = Summary::from_run(&run);
    assert_eq!(summary.total_pnl, 50.0);
    assert_eq!(summary.total_trades, 1);
    assert_eq!(summary.open_positions, 0);
    assert_eq!(summary.success_rate_pct, 100.0);
    assert_eq!(summary.risk_reward, 0.0);
}

#[test]
fn scenario_short_round_trip_loss() {
    let run = run_matching(
        vec![fill(Side::Sell, 5, 200, 1), fill(Side::Buy, 5, 210, 2)],
        MatchOptions::default(),
    );

    assert_eq!(run.slices.len(), 1);
    let s = &run.slices[0];
    assert_eq!(s.side, Direction::Short);
    assert_eq!(s.qty_micros, 5 * M);
    assert_eq!(s.pnl_per_unit_micros, -10 * M);
    assert_eq!(s.pnl_micros, -50 * M);
    assert_eq!(s.outcome, Outcome::Loss);

    let summary = Summary::from_run(&run);
    assert_eq!(summary.total_pnl, -50.0);
    assert_eq!(summary.success_rate_pct, 0.0);
    assert_eq!(summary.risk_reward, 0.0);
}

#[test]
fn scenario_partial_exits_against_one_entry() {
    let run = run_matching(
        vec![
            fill(Side::Buy, 10, 50, 1),
            fill(Side::Sell, 4, 55, 2),
            fill(Side::Sell, 6, 60, 3),
        ],
        MatchOptions::default(),
    );

    assert_eq!(run.slices.len(), 2);
    assert_eq!(run.slices[0].qty_micros, 4 * M);
    assert_eq!(run.slices[0].entry_price_micros, 50 * M);
    assert_eq!(run.slices[0].exit_price_micros, 55 * M);
    assert_eq!(run.slices[0].pnl_micros, 20 * M);

    assert_eq!(run.slices[1].qty_micros, 6 * M);
    assert_eq!(run.slices[1].exit_price_micros, 60 * M);
    assert_eq!(run.slices[1].pnl_micros, 60 * M);

    assert_eq!(run.open_positions, 0);
    // Only the second slice empties the lot.
    assert_eq!(run.counters.round_trips, 1);
    assert_eq!(run.counters.wins, 2);
}

#[test]
fn scenario_slice_pnl_is_per_unit_times_qty() {
    let run = run_matching(
        vec![
            fill(Side::Buy, 3, 101, 1),
            fill(Side::Buy, 7, 97, 2),
            fill(Side::Sell, 9, 99, 3),
            fill(Side::Buy, 4, 98, 4),
        ],
        MatchOptions::default(),
    );

    for s in &run.slices {
        let units = s.qty_micros / M;
        assert_eq!(s.pnl_micros, s.pnl_per_unit_micros * units);
        assert_eq!(s.notional_micros, units * (s.entry_price_micros + s.exit_price_micros));
    }
    let total: i64 = run.slices.iter().map(|s| s.pnl_micros).sum();
    assert_eq!(total, run.realized_pnl_micros);
}
