//! Deterministic paper order book.
//!
//! Emits rows in the shape the broker gateway returns, with sequential order
//! ids (`ORD-000001`, ...). No randomness, no clock.

use serde_json::{json, Value};

pub const DEFAULT_USER: &str = "U1";
pub const DEFAULT_TAG: &str = "ALGO_TEST";

pub struct PaperOrderbook {
    user_id: String,
    tag: String,
    next_order_id: u64,
    rows: Vec<Value>,
}

impl Default for PaperOrderbook {
    fn default() -> Self {
        Self::new(DEFAULT_USER)
    }
}

impl PaperOrderbook {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            tag: DEFAULT_TAG.to_string(),
            next_order_id: 1,
            rows: Vec::new(),
        }
    }

    /// Tag stamped on subsequent rows.
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }

    pub fn set_tag(&mut self, tag: &str) {
        self.tag = tag.to_string();
    }

    fn next_id(&mut self) -> String {
        let id = format!("ORD-{:06}", self.next_order_id);
        self.next_order_id += 1;
        id
    }

    /// A COMPLETE fill. `ts` is a naive market-local `YYYY-MM-DD HH:MM:SS`.
    pub fn fill(&mut self, symbol: &str, side: &str, qty: i64, price: f64, ts: &str) -> Value {
        self.push_row(symbol, side, qty, price, ts, "COMPLETE")
    }

    /// A row the normalizer must skip (not complete).
    pub fn open_order(&mut self, symbol: &str, side: &str, qty: i64, price: f64, ts: &str) -> Value {
        self.push_row(symbol, side, qty, price, ts, "OPEN")
    }

    /// Append an arbitrary row as-is.
    pub fn push_raw(&mut self, row: Value) {
        self.rows.push(row);
    }

    fn push_row(
        &mut self,
        symbol: &str,
        side: &str,
        qty: i64,
        price: f64,
        ts: &str,
        status: &str,
    ) -> Value {
        let row = json!({
            "order_id": self.next_id(),
            "user_id": self.user_id,
            "tradingsymbol": symbol,
            "transaction_type": side,
            "status": status,
            "tag": self.tag,
            "filled_quantity": qty,
            "average_price": price,
            "order_timestamp": ts,
        });
        self.rows.push(row.clone());
        row
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Value> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tdb_md::{normalize_rows, NormalizeOptions};
    use tdb_portfolio::Side;

    #[test]
    fn order_ids_are_sequential() {
        let mut book = PaperOrderbook::default();
        let a = book.fill("INFY", "BUY", 1, 10.0, "2024-01-02 09:15:00");
        let b = book.fill("INFY", "SELL", 1, 11.0, "2024-01-02 09:16:00");
        assert_eq!(a["order_id"], "ORD-000001");
        assert_eq!(b["order_id"], "ORD-000002");
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn rows_normalize_into_fill_events() {
        let mut book = PaperOrderbook::default();
        book.fill("INFY", "BUY", 5, 100.0, "2024-01-02 09:15:00");
        book.open_order("INFY", "SELL", 5, 101.0, "2024-01-02 09:16:00");
        book.fill("INFY", "SELL", 5, 102.5, "2024-01-02 09:17:00");

        let out = normalize_rows(book.rows(), &NormalizeOptions::default());
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.report.not_complete, 1);
        assert_eq!(out.events[0].side, Side::Buy);
        assert_eq!(out.events[1].price_micros, 102_500_000);
        assert_eq!(out.events[1].tag, DEFAULT_TAG);
    }
}
