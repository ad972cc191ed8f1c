//! Field-resolution table for broker order-book rows.
//!
//! Brokers disagree on key names for the same logical value. Each logical
//! attribute has one candidate list, in priority order; the first candidate
//! present on the row wins (for quantities: the first *positive* one).

use serde_json::{Map, Value};

pub const SYMBOL: &[&str] = &["tradingsymbol", "trading_symbol", "symbol", "tsym"];
pub const SIDE: &[&str] = &["transaction_type", "transactionType", "side", "trantype"];
pub const STATUS: &[&str] = &["status", "order_status", "orderStatus"];
pub const TAG: &[&str] = &["tag", "order_tag", "orderTag", "remarks"];
pub const FILLED_QTY: &[&str] = &[
    "filled_shares",
    "filled_quantity",
    "filledQty",
    "filled_qty",
    "quantity",
    "qty",
];
pub const AVG_PRICE: &[&str] = &["average_price", "averagePrice", "avg_price", "avgprc"];
pub const PRICE: &[&str] = &["price", "prc"];
pub const TIMESTAMP: &[&str] = &[
    "exchange_update_timestamp",
    "exchange_timestamp",
    "order_timestamp",
    "update_time",
    "updated_at",
    "timestamp",
    "created_at",
];
pub const UNIQUE_ID: &[&str] = &["unique_order_id", "trade_id", "fill_id"];
pub const ORDER_ID: &[&str] = &["order_id", "orderId", "norenordno"];
pub const UPDATE_TIME: &[&str] = &["exchange_update_timestamp", "update_time", "order_timestamp"];
pub const USER: &[&str] = &["user_id", "userId", "client_id"];

/// First candidate rendered as text. Strings are trimmed; numbers use their
/// JSON form; empty strings, null, bools, arrays and objects do not count.
pub fn first_text(row: &Map<String, Value>, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|k| match row.get(*k)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First candidate whose value `convert`s to a number strictly greater than 0.
pub fn first_positive_with(
    row: &Map<String, Value>,
    candidates: &[&str],
    convert: impl Fn(&Value) -> Option<i64>,
) -> Option<i64> {
    candidates
        .iter()
        .filter_map(|k| row.get(*k))
        .filter_map(convert)
        .find(|n| *n > 0)
}

/// Raw JSON value of the first candidate present and non-null.
pub fn first_value<'a>(row: &'a Map<String, Value>, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .find_map(|k| row.get(*k).filter(|v| !v.is_null()))
}

pub fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
