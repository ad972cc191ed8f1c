//! Matching engine: drives a [`LotBook`] over a time-ordered event sequence.
//!
//! One engine instance covers one scope (a user, or a user + strategy) for
//! one request. It owns its lot book; nothing is shared between runs and no
//! open lot survives past [`MatchingEngine::finish`].
//!
//! The engine never fails. Events the lot book rejects (non-positive qty,
//! negative price, empty symbol) are skipped and counted in
//! [`MatchCounters::rejected`].

use chrono::TimeZone;
use chrono_tz::Tz;

use crate::fixedpoint::{i128_to_i64_clamp, mul_qty_price_micros};
use crate::lots::LotBook;
use crate::ordering::prepare_events;
use crate::types::{ClosedPiece, FillEvent, FillRef, Outcome, TradeSlice, ZeroTimestampPolicy};

/// Default market timezone for slice date keys.
pub const DEFAULT_MARKET_TZ: Tz = chrono_tz::Asia::Kolkata;

// ---------------------------------------------------------------------------
// Options / counters
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchOptions {
    /// Timezone used to derive `TradeSlice::date_key` from the exit timestamp.
    pub tz: Tz,
    pub zero_ts_policy: ZeroTimestampPolicy,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            tz: DEFAULT_MARKET_TZ,
            zero_ts_policy: ZeroTimestampPolicy::Keep,
        }
    }
}

/// Running aggregates for one run. Money is in micros.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchCounters {
    /// Events fed to the lot book (after the zero-timestamp policy).
    pub events: u64,
    pub slices: u64,
    pub wins: u64,
    pub losses: u64,
    pub sum_win_micros: i64,
    /// Absolute value of losing P&L.
    pub sum_loss_micros: i64,
    /// Lots closed exactly to zero.
    pub round_trips: u64,
    pub skipped_zero_ts: u64,
    pub rejected: u64,
}

/// Output of a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchRun {
    pub slices: Vec<TradeSlice>,
    pub counters: MatchCounters,
    /// Symbols with nonzero net inventory at the end of the run.
    pub open_positions: usize,
    pub realized_pnl_micros: i64,
}

impl MatchCounters {
    fn absorb(&mut self, o: &MatchCounters) {
        self.events += o.events;
        self.slices += o.slices;
        self.wins += o.wins;
        self.losses += o.losses;
        self.sum_win_micros = self.sum_win_micros.saturating_add(o.sum_win_micros);
        self.sum_loss_micros = self.sum_loss_micros.saturating_add(o.sum_loss_micros);
        self.round_trips += o.round_trips;
        self.skipped_zero_ts += o.skipped_zero_ts;
        self.rejected += o.rejected;
    }
}

impl MatchRun {
    /// Fold in a run over a separate lot book. Open positions add because
    /// the two books never net against each other.
    pub fn absorb(&mut self, other: MatchRun) {
        self.counters.absorb(&other.counters);
        self.open_positions += other.open_positions;
        self.realized_pnl_micros = self
            .realized_pnl_micros
            .saturating_add(other.realized_pnl_micros);
        self.slices.extend(other.slices);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct MatchingEngine {
    opts: MatchOptions,
    book: LotBook,
    slices: Vec<TradeSlice>,
    counters: MatchCounters,
    realized: i128,
}

impl MatchingEngine {
    pub fn new(opts: MatchOptions) -> Self {
        Self {
            opts,
            book: LotBook::new(),
            slices: Vec::new(),
            counters: MatchCounters::default(),
            realized: 0,
        }
    }

    /// Apply one event. Callers must feed events in ascending `ts_millis`;
    /// [`run_matching`] does the sort for them.
    pub fn push(&mut self, ev: &FillEvent) {
        self.counters.events += 1;

        let pieces = match self
            .book
            .apply(&ev.symbol, ev.side, ev.qty_micros, ev.price_micros, ev.fill_ref())
        {
            Ok(p) => p,
            Err(_) => {
                self.counters.rejected += 1;
                return;
            }
        };

        let exit = ev.fill_ref();
        for piece in pieces {
            self.record(&ev.symbol, piece, &exit);
        }
    }

    pub fn book(&self) -> &LotBook {
        &self.book
    }

    pub fn counters(&self) -> &MatchCounters {
        &self.counters
    }

    pub fn finish(self) -> MatchRun {
        MatchRun {
            open_positions: self.book.open_symbols(),
            slices: self.slices,
            counters: self.counters,
            realized_pnl_micros: i128_to_i64_clamp(self.realized),
        }
    }

    fn record(&mut self, symbol: &str, piece: ClosedPiece, exit: &FillRef) {
        let per_unit = piece.pnl_per_unit_micros();
        let pnl = mul_qty_price_micros(piece.qty_micros, per_unit);
        let notional = mul_qty_price_micros(
            piece.qty_micros,
            piece.entry_price_micros.saturating_add(piece.exit_price_micros),
        );
        let pnl_micros = i128_to_i64_clamp(pnl);

        self.counters.slices += 1;
        match pnl_micros.signum() {
            1 => {
                self.counters.wins += 1;
                self.counters.sum_win_micros = self.counters.sum_win_micros.saturating_add(pnl_micros);
            }
            -1 => {
                self.counters.losses += 1;
                self.counters.sum_loss_micros = self
                    .counters
                    .sum_loss_micros
                    .saturating_add(pnl_micros.saturating_abs());
            }
            _ => {}
        }
        if piece.lot_closed {
            self.counters.round_trips += 1;
        }
        self.realized += pnl_micros as i128;

        let tag = if piece.entry.tag.is_empty() {
            exit.tag.clone()
        } else {
            piece.entry.tag.clone()
        };

        self.slices.push(TradeSlice {
            slice_id: TradeSlice::identity_for(
                symbol,
                piece.direction,
                piece.entry.ts_millis,
                exit.ts_millis,
                piece.entry_price_micros,
                piece.exit_price_micros,
                piece.qty_micros,
            ),
            symbol: symbol.to_string(),
            side: piece.direction,
            qty_micros: piece.qty_micros,
            entry_price_micros: piece.entry_price_micros,
            exit_price_micros: piece.exit_price_micros,
            pnl_per_unit_micros: per_unit,
            pnl_micros,
            notional_micros: i128_to_i64_clamp(notional),
            outcome: Outcome::from_pnl(pnl_micros),
            date_key: date_key(self.opts.tz, exit.ts_millis),
            entry: piece.entry,
            exit: exit.clone(),
            tag,
        });
    }
}

/// Sort (stable, by timestamp), apply the zero-timestamp policy, and match.
pub fn run_matching(events: Vec<FillEvent>, opts: MatchOptions) -> MatchRun {
    let (events, dropped) = prepare_events(events, opts.zero_ts_policy);

    let mut engine = MatchingEngine::new(opts);
    engine.counters.skipped_zero_ts = dropped;
    for ev in &events {
        engine.push(ev);
    }
    engine.finish()
}

/// Match every book on its own lot book and fold the runs together.
pub fn run_matching_books<I>(books: I, opts: MatchOptions) -> MatchRun
where
    I: IntoIterator<Item = Vec<FillEvent>>,
{
    books
        .into_iter()
        .fold(MatchRun::default(), |mut acc, events| {
            acc.absorb(run_matching(events, opts));
            acc
        })
}

/// Calendar date (`YYYY-MM-DD`) of an epoch-millis instant in `tz`.
pub fn date_key(tz: Tz, ts_millis: i64) -> String {
    match tz.timestamp_millis_opt(ts_millis).single() {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => "1970-01-01".to_string(),
    }
}
