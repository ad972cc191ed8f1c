//! Reporting: roll a [`MatchRun`] into the response/persistence shapes.
//!
//! Money stays in micros until the constructors here. Each aggregate is
//! rounded once, to 2 dp, from the exact micros total.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixedpoint::{micros_to_money, round_2dp};
use crate::matching::{MatchCounters, MatchRun};
use crate::types::FillEvent;

/// `wins / (wins + losses) * 100`, 0 when nothing was won or lost.
pub fn win_rate_pct(c: &MatchCounters) -> f64 {
    let decided = c.wins + c.losses;
    if decided == 0 {
        return 0.0;
    }
    round_2dp(c.wins as f64 / decided as f64 * 100.0)
}

/// `sum_win / sum_loss`, 0 when there were no losses.
pub fn risk_reward(c: &MatchCounters) -> f64 {
    if c.sum_loss_micros <= 0 {
        return 0.0;
    }
    round_2dp(c.sum_win_micros as f64 / c.sum_loss_micros as f64)
}

/// Average win over average loss. 0 unless both sides have at least one slice.
pub fn avg_rr(c: &MatchCounters) -> f64 {
    if c.wins == 0 || c.losses == 0 || c.sum_loss_micros <= 0 {
        return 0.0;
    }
    let avg_win = c.sum_win_micros as f64 / c.wins as f64;
    let avg_loss = c.sum_loss_micros as f64 / c.losses as f64;
    round_2dp(avg_win / avg_loss)
}

// ---------------------------------------------------------------------------
// Per-user summary
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_pnl: f64,
    pub total_trades: u64,
    pub open_positions: usize,
    pub success_rate_pct: f64,
    pub risk_reward: f64,
}

impl Summary {
    pub fn from_run(run: &MatchRun) -> Self {
        Self {
            total_pnl: micros_to_money(run.realized_pnl_micros),
            total_trades: run.counters.slices,
            open_positions: run.open_positions,
            success_rate_pct: win_rate_pct(&run.counters),
            risk_reward: risk_reward(&run.counters),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-strategy rows
// ---------------------------------------------------------------------------

/// One row of `/api/strategies/pnl`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPnl {
    pub strategy_name: String,
    pub pnl: f64,
    /// Fill events that reached the matcher.
    pub orders: u64,
    pub round_trips: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate_pct: f64,
    pub rnr: f64,
    pub open_positions: usize,
}

impl StrategyPnl {
    pub fn from_run(strategy_name: impl Into<String>, run: &MatchRun) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            pnl: micros_to_money(run.realized_pnl_micros),
            orders: run.counters.events,
            round_trips: run.counters.round_trips,
            wins: run.counters.wins,
            losses: run.counters.losses,
            win_rate_pct: win_rate_pct(&run.counters),
            rnr: risk_reward(&run.counters),
            open_positions: run.open_positions,
        }
    }
}

/// One row of `/api/strategies/summary` (execution-log source).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySummary {
    pub strategy_name: String,
    pub pnl: f64,
    pub trades: u64,
    pub win_rate_pct: f64,
    #[serde(rename = "avgRR")]
    pub avg_rr: f64,
}

impl StrategySummary {
    pub fn from_run(strategy_name: impl Into<String>, run: &MatchRun) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            pnl: micros_to_money(run.realized_pnl_micros),
            trades: run.counters.slices,
            win_rate_pct: win_rate_pct(&run.counters),
            avg_rr: avg_rr(&run.counters),
        }
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Split events by strategy using an exact `tag -> strategy_name` lookup.
///
/// Events whose tag has no mapping are dropped. Input order is preserved
/// inside each group.
pub fn group_by_strategy(
    events: Vec<FillEvent>,
    tag_to_strategy: &BTreeMap<String, String>,
) -> BTreeMap<String, Vec<FillEvent>> {
    let mut groups: BTreeMap<String, Vec<FillEvent>> = BTreeMap::new();
    for ev in events {
        if let Some(name) = tag_to_strategy.get(&ev.tag) {
            groups.entry(name.clone()).or_default().push(ev);
        }
    }
    groups
}

/// [`group_by_strategy`] applied book by book. Each strategy keeps one
/// event list per book, in book key order.
pub fn group_books_by_strategy<K: Ord>(
    books: BTreeMap<K, Vec<FillEvent>>,
    tag_to_strategy: &BTreeMap<String, String>,
) -> BTreeMap<String, Vec<Vec<FillEvent>>> {
    let mut groups: BTreeMap<String, Vec<Vec<FillEvent>>> = BTreeMap::new();
    for events in books.into_values() {
        for (name, evs) in group_by_strategy(events, tag_to_strategy) {
            groups.entry(name).or_default().push(evs);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(wins: u64, losses: u64, sum_win: i64, sum_loss: i64) -> MatchCounters {
        MatchCounters {
            wins,
            losses,
            sum_win_micros: sum_win,
            sum_loss_micros: sum_loss,
            ..Default::default()
        }
    }

    #[test]
    fn ratios_are_zero_without_denominator() {
        let c = counters(0, 0, 0, 0);
        assert_eq!(win_rate_pct(&c), 0.0);
        assert_eq!(risk_reward(&c), 0.0);
        assert_eq!(avg_rr(&c), 0.0);

        let only_wins = counters(3, 0, 90, 0);
        assert_eq!(win_rate_pct(&only_wins), 100.0);
        assert_eq!(risk_reward(&only_wins), 0.0);
        assert_eq!(avg_rr(&only_wins), 0.0);
    }

    #[test]
    fn ratios_round_to_two_places() {
        let c = counters(2, 1, 100, 30);
        assert_eq!(win_rate_pct(&c), 66.67);
        assert_eq!(risk_reward(&c), 3.33);
        // avg win 50, avg loss 30
        assert_eq!(avg_rr(&c), 1.67);
    }

    #[test]
    fn book_grouping_keeps_books_apart() {
        use crate::types::Side;
        let tags: BTreeMap<String, String> = [("T1".to_string(), "S".to_string())].into();
        let tagged = |side, tag: &str| {
            let mut ev = FillEvent::new("X", side, 1_000_000, 1_000_000, 1);
            ev.tag = tag.to_string();
            ev
        };
        let books: BTreeMap<&str, Vec<FillEvent>> = [
            ("u1", vec![tagged(Side::Buy, "T1"), tagged(Side::Buy, "other")]),
            ("u2", vec![tagged(Side::Sell, "T1")]),
        ]
        .into();
        let groups = group_books_by_strategy(books, &tags);
        assert_eq!(groups.len(), 1);
        let s = &groups["S"];
        assert_eq!(s.len(), 2);
        assert_eq!(s[0][0].side, Side::Buy);
        assert_eq!(s[1][0].side, Side::Sell);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let s = Summary {
            total_pnl: 50.0,
            total_trades: 1,
            open_positions: 0,
            success_rate_pct: 100.0,
            risk_reward: 0.0,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["totalPnl"], 50.0);
        assert_eq!(v["successRatePct"], 100.0);
        assert!(v.get("riskReward").is_some());

        let row = StrategySummary {
            strategy_name: "s".into(),
            pnl: 0.0,
            trades: 0,
            win_rate_pct: 0.0,
            avg_rr: 1.5,
        };
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["avgRR"], 1.5);
        assert_eq!(v["strategyName"], "s");
    }
}
