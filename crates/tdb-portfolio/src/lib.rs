//! tdb-portfolio
//!
//! Realized P&L core:
//! - FIFO lot book (per-symbol long/short queues)
//! - Matching engine producing trade slices + counters
//! - Summary / per-strategy reporting
//!
//! Pure deterministic logic: no IO, no clock, no logging.

mod fixedpoint;
mod lots;
mod matching;
mod ordering;
mod summary;
mod types;

pub use fixedpoint::{
    i128_to_i64_clamp, micros_from_f64, micros_to_money, mul_qty_price_micros,
    qty_micros_from_units, round_2dp, MICROS_SCALE, QTY_SCALE,
};
pub use lots::{LotBook, LotBookError};
pub use matching::{
    date_key, run_matching, run_matching_books, MatchCounters, MatchOptions, MatchRun,
    MatchingEngine, DEFAULT_MARKET_TZ,
};
pub use ordering::{is_time_ordered, prepare_events, sort_events_by_time};
pub use summary::{
    avg_rr, group_books_by_strategy, group_by_strategy, risk_reward, win_rate_pct, StrategyPnl,
    StrategySummary, Summary,
};
pub use types::{
    ClosedPiece, Direction, FillEvent, FillRef, Lot, Outcome, Side, TradeSlice,
    ZeroTimestampPolicy,
};

/// Re-exported so callers can build [`MatchOptions`] without a direct dependency.
pub use chrono_tz::Tz;
