use tdb_portfolio::{
    run_matching, Direction, FillEvent, MatchOptions, Outcome, Side, Summary, MICROS_SCALE,
};

const M: i64 = MICROS_SCALE;

fn ev(symbol: &str, side: Side, qty: i64, px: i64, ts: i64) -> FillEvent {
    FillEvent::new(symbol, side, qty * M, px * M, ts)
}

#[test]
fn scenario_sell_through_long_flips_to_short() {
    let run = run_matching(
        vec![ev("X", Side::Buy, 4, 100, 1), ev("X", Side::Sell, 10, 90, 2)],
        MatchOptions::default(),
    );

    assert_eq!(run.slices.len(), 1);
    assert_eq!(run.slices[0].qty_micros, 4 * M);
    assert_eq!(run.slices[0].pnl_micros, -40 * M);
    assert_eq!(run.open_positions, 1);
}

#[test]
fn scenario_exit_closes_longs_and_shorts() {
    let run = run_matching(
        vec![
            ev("X", Side::Buy, 3, 100, 1),
            ev("X", Side::Buy, 2, 102, 2),
            ev("Y", Side::Sell, 5, 50, 3),
            ev("X", Side::Exit, 1, 101, 4),
            ev("Y", Side::Exit, 5, 48, 5),
        ],
        MatchOptions::default(),
    );

    // X: 3@100 and 2@102 closed at 101; Y: 5@50 short closed at 48.
    assert_eq!(run.slices.len(), 3);
    assert_eq!(run.slices[0].pnl_micros, 3 * M);
    assert_eq!(run.slices[1].pnl_micros, -2 * M);
    assert_eq!(run.slices[2].side, Direction::Short);
    assert_eq!(run.slices[2].pnl_micros, 10 * M);
    assert_eq!(run.open_positions, 0);
    assert_eq!(run.counters.round_trips, 3);
}

#[test]
fn scenario_exit_without_inventory_is_a_no_op() {
    let run = run_matching(vec![ev("X", Side::Exit, 5, 10, 1)], MatchOptions::default());
    assert!(run.slices.is_empty());
    assert_eq!(run.counters.events, 1);
    assert_eq!(run.counters.rejected, 0);
}

#[test]
fn scenario_zero_pnl_is_neither_win_nor_loss() {
    let run = run_matching(
        vec![ev("X", Side::Buy, 5, 100, 1), ev("X", Side::Sell, 5, 100, 2)],
        MatchOptions::default(),
    );

    assert_eq!(run.slices.len(), 1);
    assert_eq!(run.slices[0].outcome, Outcome::Breakeven);
    assert_eq!(run.counters.wins, 0);
    assert_eq!(run.counters.losses, 0);
    assert_eq!(run.counters.round_trips, 1);

    let summary = Summary::from_run(&run);
    assert_eq!(summary.total_trades, 1);
    assert_eq!(summary.success_rate_pct, 0.0);
}

#[test]
fn scenario_open_positions_count_symbols_not_lots() {
    let run = run_matching(
        vec![
            ev("A", Side::Buy, 1, 10, 1),
            ev("A", Side::Buy, 1, 11, 2),
            ev("B", Side::Sell, 2, 20, 3),
            ev("C", Side::Buy, 1, 5, 4),
            ev("C", Side::Sell, 1, 6, 5),
        ],
        MatchOptions::default(),
    );
    assert_eq!(run.open_positions, 2);
}
