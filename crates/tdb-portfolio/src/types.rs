use serde::{Deserialize, Serialize};

/// Direction of an incoming fill event.
///
/// `Exit` is synthetic: it never comes from the broker normalizer, only from
/// execution-log rows that liquidate a symbol outright.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
    Exit,
}

impl Side {
    /// Parse a broker transaction-type value. Anything that is not a SELL
    /// marker is treated as BUY.
    pub fn from_broker(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SELL" | "S" => Side::Sell,
            _ => Side::Buy,
        }
    }

    /// Parse an execution-log action (BUY / SELL / EXIT). Unknown → `None`.
    pub fn from_action(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" | "B" => Some(Side::Buy),
            "SELL" | "S" => Some(Side::Sell),
            "EXIT" | "X" => Some(Side::Exit),
            _ => None,
        }
    }

    /// Which lot queue this side closes first.
    pub fn closes(&self) -> Option<Direction> {
        match self {
            Side::Buy => Some(Direction::Short),
            Side::Sell => Some(Direction::Long),
            Side::Exit => None,
        }
    }

    /// Which lot queue the unmatched remainder opens.
    pub fn opens(&self) -> Option<Direction> {
        match self {
            Side::Buy => Some(Direction::Long),
            Side::Sell => Some(Direction::Short),
            Side::Exit => None,
        }
    }

    /// Signed quantity multiplier: +1 for BUY, -1 for SELL, 0 for EXIT.
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
            Side::Exit => 0,
        }
    }
}

/// Lot direction. Serialized as the closed side of a trade slice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// Per-unit realized P&L for closing a lot of this direction.
    /// LONG: exit - entry. SHORT: entry - exit.
    pub fn pnl_per_unit_micros(&self, entry_price_micros: i64, exit_price_micros: i64) -> i64 {
        match self {
            Direction::Long => exit_price_micros.saturating_sub(entry_price_micros),
            Direction::Short => entry_price_micros.saturating_sub(exit_price_micros),
        }
    }
}

/// Reference to the fill that opened or closed a lot.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FillRef {
    pub identity: String,
    pub ts_millis: i64,
    pub tag: String,
}

/// Canonical fill event produced by the normalizer (the matching atom).
///
/// `qty_micros` is the filled quantity in micro-units (1e-6) and is always
/// positive. `price_micros` is price per unit in micros; 0 means the broker
/// row carried no usable price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEvent {
    pub symbol: String,
    pub side: Side,
    pub qty_micros: i64,
    pub price_micros: i64,
    pub ts_millis: i64,
    pub identity: String,
    pub tag: String,
}

impl FillEvent {
    pub fn new<S: Into<String>>(
        symbol: S,
        side: Side,
        qty_micros: i64,
        price_micros: i64,
        ts_millis: i64,
    ) -> Self {
        debug_assert!(qty_micros > 0, "FillEvent.qty_micros must be > 0");
        Self {
            symbol: symbol.into(),
            side,
            qty_micros,
            price_micros,
            ts_millis,
            identity: String::new(),
            tag: String::new(),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn fill_ref(&self) -> FillRef {
        FillRef {
            identity: self.identity.clone(),
            ts_millis: self.ts_millis,
            tag: self.tag.clone(),
        }
    }
}

/// An open FIFO lot. `qty_micros` is the remaining open size (always > 0
/// while queued).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lot {
    pub direction: Direction,
    pub qty_micros: i64,
    pub price_micros: i64,
    pub entry: FillRef,
}

/// One step of a close: `qty_micros` of a single lot matched at
/// `exit_price_micros`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClosedPiece {
    pub direction: Direction,
    pub qty_micros: i64,
    pub entry_price_micros: i64,
    pub exit_price_micros: i64,
    pub entry: FillRef,
    /// The lot reached zero and was removed from its queue.
    pub lot_closed: bool,
}

impl ClosedPiece {
    pub fn pnl_per_unit_micros(&self) -> i64 {
        self.direction
            .pnl_per_unit_micros(self.entry_price_micros, self.exit_price_micros)
    }
}

/// Win/loss classification of a slice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Profit,
    Loss,
    Breakeven,
}

impl Outcome {
    pub fn from_pnl(pnl_micros: i64) -> Self {
        match pnl_micros.signum() {
            1 => Outcome::Profit,
            -1 => Outcome::Loss,
            _ => Outcome::Breakeven,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Profit => "profit",
            Outcome::Loss => "loss",
            Outcome::Breakeven => "breakeven",
        }
    }
}

/// A realized round-trip slice: one closed piece rendered for persistence.
///
/// `pnl_micros` is `pnl_per_unit_micros * qty_micros / QTY_SCALE`, rounded
/// half away from zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSlice {
    pub slice_id: String,
    pub symbol: String,
    pub side: Direction,
    pub qty_micros: i64,
    pub entry_price_micros: i64,
    pub exit_price_micros: i64,
    pub pnl_per_unit_micros: i64,
    pub pnl_micros: i64,
    /// qty × (entry + exit), in cash micros
    pub notional_micros: i64,
    pub outcome: Outcome,
    pub entry: FillRef,
    pub exit: FillRef,
    /// Market-timezone calendar date of the exit, `YYYY-MM-DD`.
    pub date_key: String,
    pub tag: String,
}

impl TradeSlice {
    /// Deterministic identity for idempotent upserts.
    pub fn identity_for(
        symbol: &str,
        side: Direction,
        entry_ts: i64,
        exit_ts: i64,
        entry_price_micros: i64,
        exit_price_micros: i64,
        qty_micros: i64,
    ) -> String {
        format!(
            "{symbol}|{}|{entry_ts}|{exit_ts}|{entry_price_micros}|{exit_price_micros}|{qty_micros}",
            side.as_str()
        )
    }
}

/// What to do with events whose timestamp could not be parsed (ts == 0).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroTimestampPolicy {
    /// Keep them; they sort to the front of the run.
    #[default]
    Keep,
    /// Drop them before matching.
    Reject,
}
