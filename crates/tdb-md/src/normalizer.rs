//! Broker order-book rows -> canonical [`FillEvent`]s.
//!
//! Pure transform. Rows are resolved through the table in [`crate::fields`],
//! filtered (algorithmic tag, completed status, positive quantity,
//! non-empty symbol) and returned sorted ascending by timestamp. A row that
//! fails any step is skipped and counted in [`NormalizeReport`]; nothing here
//! returns an error for data-shape problems.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tdb_portfolio::{micros_from_f64, sort_events_by_time, FillEvent, Side, DEFAULT_MARKET_TZ};

use crate::fields;

/// Status value that marks a fully executed order.
pub const COMPLETION_MARKER: &str = "COMPLETE";

/// Default algorithmic order-tag prefix.
pub const DEFAULT_ALGO_PREFIX: &str = "ALGO";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d-%m-%Y %H:%M:%S",
];

/// Epoch values below this are seconds; at or above, milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

// ---------------------------------------------------------------------------
// Options / report
// ---------------------------------------------------------------------------

/// How the status field is compared against [`COMPLETION_MARKER`].
/// Both modes are case-insensitive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMatch {
    Exact,
    Contains,
}

impl StatusMatch {
    pub fn is_complete(&self, status: &str) -> bool {
        let status = status.trim().to_ascii_uppercase();
        match self {
            StatusMatch::Exact => status == COMPLETION_MARKER,
            StatusMatch::Contains => status.contains(COMPLETION_MARKER),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NormalizeOptions {
    /// Case-sensitive prefix an order tag must start with.
    pub algo_prefix: String,
    pub status_match: StatusMatch,
    /// Timezone for naive (offset-less) timestamp strings.
    pub tz: Tz,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            algo_prefix: DEFAULT_ALGO_PREFIX.to_string(),
            status_match: StatusMatch::Exact,
            tz: DEFAULT_MARKET_TZ,
        }
    }
}

/// Per-call counts. `seen == accepted + skipped()`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub seen: u64,
    pub accepted: u64,
    pub not_algo: u64,
    pub not_complete: u64,
    pub no_qty: u64,
    pub no_symbol: u64,
    pub bad_row: u64,
    /// Accepted rows whose timestamp did not parse (carried as 0).
    pub zero_ts: u64,
}

impl NormalizeReport {
    pub fn skipped(&self) -> u64 {
        self.not_algo + self.not_complete + self.no_qty + self.no_symbol + self.bad_row
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Skip {
    BadRow,
    NotAlgo,
    NotComplete,
    NoQty,
    NoSymbol,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Skip::BadRow => "bad_row",
            Skip::NotAlgo => "not_algo",
            Skip::NotComplete => "not_complete",
            Skip::NoQty => "no_qty",
            Skip::NoSymbol => "no_symbol",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Normalized {
    pub events: Vec<FillEvent>,
    pub report: NormalizeReport,
}

/// Normalize raw broker rows. Output is stable-sorted by `ts_millis`.
pub fn normalize_rows(rows: &[Value], opts: &NormalizeOptions) -> Normalized {
    let mut report = NormalizeReport::default();
    let mut events = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        report.seen += 1;
        match normalize_row(row, opts) {
            Ok(ev) => {
                report.accepted += 1;
                if ev.ts_millis == 0 {
                    report.zero_ts += 1;
                }
                events.push(ev);
            }
            Err(skip) => {
                tracing::debug!(row = idx, reason = %skip, "orderbook row skipped");
                match skip {
                    Skip::BadRow => report.bad_row += 1,
                    Skip::NotAlgo => report.not_algo += 1,
                    Skip::NotComplete => report.not_complete += 1,
                    Skip::NoQty => report.no_qty += 1,
                    Skip::NoSymbol => report.no_symbol += 1,
                }
            }
        }
    }

    sort_events_by_time(&mut events);
    Normalized { events, report }
}

fn normalize_row(row: &Value, opts: &NormalizeOptions) -> Result<FillEvent, Skip> {
    let row = row.as_object().ok_or(Skip::BadRow)?;

    let tag = fields::first_text(row, fields::TAG).unwrap_or_default();
    if !tag.starts_with(opts.algo_prefix.as_str()) {
        return Err(Skip::NotAlgo);
    }

    let status = fields::first_text(row, fields::STATUS).unwrap_or_default();
    if !opts.status_match.is_complete(&status) {
        return Err(Skip::NotComplete);
    }

    let qty_micros = resolve_qty_micros(row).ok_or(Skip::NoQty)?;

    let symbol = fields::first_text(row, fields::SYMBOL)
        .map(|s| s.to_ascii_uppercase())
        .ok_or(Skip::NoSymbol)?;

    let side = fields::first_text(row, fields::SIDE)
        .map(|s| Side::from_broker(&s))
        .unwrap_or(Side::Buy);

    Ok(FillEvent {
        symbol,
        side,
        qty_micros,
        price_micros: resolve_price_micros(row),
        ts_millis: resolve_ts_millis(row, opts.tz),
        identity: resolve_identity(row),
        tag,
    })
}

// ---------------------------------------------------------------------------
// Attribute resolvers
// ---------------------------------------------------------------------------

/// First positive filled quantity, in qty micros. Decimal quantities are
/// exact to 6 places.
pub fn resolve_qty_micros(row: &Map<String, Value>) -> Option<i64> {
    fields::first_positive_with(row, fields::FILLED_QTY, value_to_micros)
}

/// Average price when present and > 0, else price, else 0.
pub fn resolve_price_micros(row: &Map<String, Value>) -> i64 {
    [fields::AVG_PRICE, fields::PRICE]
        .iter()
        .filter_map(|cands| fields::first_value(row, cands))
        .filter_map(value_to_micros)
        .find(|m| *m > 0)
        .unwrap_or(0)
}

/// First candidate timestamp that parses to a positive instant, else 0.
pub fn resolve_ts_millis(row: &Map<String, Value>, tz: Tz) -> i64 {
    fields::TIMESTAMP
        .iter()
        .filter_map(|k| row.get(*k))
        .find_map(|v| parse_ts_millis(v, tz))
        .unwrap_or(0)
}

/// Broker unique id, else `"{order_id}:{update_time}"`, else a SHA-256 of
/// the row's JSON when the row carries neither.
pub fn resolve_identity(row: &Map<String, Value>) -> String {
    if let Some(id) = fields::first_text(row, fields::UNIQUE_ID) {
        return id;
    }
    let order_id = fields::first_text(row, fields::ORDER_ID);
    let updated = fields::first_text(row, fields::UPDATE_TIME);
    if order_id.is_none() && updated.is_none() {
        return content_identity(row);
    }
    format!(
        "{}:{}",
        order_id.unwrap_or_default(),
        updated.unwrap_or_default()
    )
}

/// Keys serialize sorted, so equal rows hash equal.
fn content_identity(row: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(Value::Object(row.clone()).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn resolve_user(row: &Value) -> Option<String> {
    fields::first_text(row.as_object()?, fields::USER)
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Parse one timestamp value. Accepts epoch seconds or millis (number or
/// numeric string), RFC 3339, and naive date-times interpreted in `tz`.
pub fn parse_ts_millis(v: &Value, tz: Tz) -> Option<i64> {
    if let Some(n) = fields::as_number(v) {
        return epoch_to_millis(n);
    }
    let s = v.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return positive(dt.timestamp_millis());
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(s, fmt).ok()?;
        let local = tz.from_local_datetime(&naive).earliest()?;
        positive(local.timestamp_millis())
    })
}

fn epoch_to_millis(n: f64) -> Option<i64> {
    if n <= 0.0 {
        return None;
    }
    let ms = if n < EPOCH_MILLIS_THRESHOLD { n * 1000.0 } else { n };
    if ms > i64::MAX as f64 {
        return None;
    }
    Some(ms.round() as i64)
}

fn positive(ms: i64) -> Option<i64> {
    (ms > 0).then_some(ms)
}

fn value_to_micros(v: &Value) -> Option<i64> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    decimal_to_micros(&text).ok().or_else(|| micros_from_f64(fields::as_number(v)?))
}

// ---------------------------------------------------------------------------
// Decimal conversion
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum DecimalError {
    Empty,
    Invalid(String),
    /// More than 6 decimal places cannot be represented exactly in micros.
    TooManyDecimalPlaces(String),
}

impl fmt::Display for DecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalError::Empty => write!(f, "decimal is empty"),
            DecimalError::Invalid(raw) => write!(f, "decimal could not be parsed: '{raw}'"),
            DecimalError::TooManyDecimalPlaces(raw) => {
                write!(f, "decimal has more than 6 places: '{raw}'")
            }
        }
    }
}

impl std::error::Error for DecimalError {}

/// Decimal string (price or quantity) -> integer micros without going
/// through floating point.
pub fn decimal_to_micros(s: &str) -> Result<i64, DecimalError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DecimalError::Empty);
    }
    let invalid = || DecimalError::Invalid(s.to_string());

    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }
    if frac_part.len() > 6 {
        return Err(DecimalError::TooManyDecimalPlaces(s.to_string()));
    }

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| invalid())?
    };
    let frac_val: i64 = format!("{frac_part:0<6}").parse().map_err(|_| invalid())?;

    let micros = int_val
        .checked_mul(1_000_000)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(invalid)?;

    Ok(if negative { -micros } else { micros })
}
