//! FIFO lot book.
//!
//! Per symbol, two queues: open long lots and open short lots, each in the
//! order the lots were opened. Incoming fills consume the opposite queue from
//! the head (oldest first); whatever is left over is appended to the tail of
//! the fill's own queue.
//!
//! Matching is strictly FIFO. There is no price- or size-aware selection, so
//! the same fill sequence always yields the same closed pieces.

use std::collections::{BTreeMap, VecDeque};

use crate::types::{ClosedPiece, Direction, FillRef, Lot, Side};

/// Input violations surfaced by [`LotBook::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotBookError {
    NonPositiveQty { qty_micros: i64 },
    NegativePrice { price_micros: i64 },
    EmptySymbol,
}

impl std::fmt::Display for LotBookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveQty { qty_micros } => {
                write!(f, "lot book: qty_micros must be > 0, got {qty_micros}")
            },
            Self::NegativePrice { price_micros } => {
                write!(f, "lot book: price_micros must be >= 0, got {price_micros}")
            }
            Self::EmptySymbol => write!(f, "lot book: symbol must not be empty"),
        }
    }
}

impl std::error::Error for LotBookError {}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct SymbolBook {
    longs: VecDeque<Lot>,
    shorts: VecDeque<Lot>,
}

impl SymbolBook {
    fn queue_mut(&mut self, direction: Direction) -> &mut VecDeque<Lot> {
        match direction {
            Direction::Long => &mut self.longs,
            Direction::Short => &mut self.shorts,
        }
    }

    fn long_qty(&self) -> i64 {
        self.longs.iter().map(|l| l.qty_micros).sum()
    }

    fn short_qty(&self) -> i64 {
        self.shorts.iter().map(|l| l.qty_micros).sum()
    }

    fn is_empty(&self) -> bool {
        self.longs.is_empty() && self.shorts.is_empty()
    }
}

/// Open inventory for one matching run. Never shared across requests.
#[derive(Clone, Debug, Default)]
pub struct LotBook {
    books: BTreeMap<String, SymbolBook>,
}

impl LotBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new lot to the tail of `direction`'s queue.
    pub fn open(
        &mut self,
        symbol: &str,
        direction: Direction,
        qty_micros: i64,
        price_micros: i64,
        entry: FillRef,
    ) {
        debug_assert!(qty_micros > 0);
        self.books
            .entry(symbol.to_string())
            .or_default()
            .queue_mut(direction)
            .push_back(Lot {
                direction,
                qty_micros,
                price_micros,
                entry,
            });
    }

    /// Match up to `qty_micros` against the head of `closing`'s queue.
    ///
    /// Returns the closed pieces (oldest lot first) and the unconsumed
    /// remainder.
    pub fn close(
        &mut self,
        symbol: &str,
        closing: Direction,
        qty_micros: i64,
        exit_price_micros: i64,
    ) -> (Vec<ClosedPiece>, i64) {
        let mut remaining = qty_micros;
        let mut pieces = Vec::new();

        let Some(book) = self.books.get_mut(symbol) else {
            return (pieces, remaining);
        };
        let queue = book.queue_mut(closing);

        while remaining > 0 {
            let Some(head) = queue.front_mut() else {
                break;
            };

            let take = head.qty_micros.min(remaining);
            head.qty_micros -= take;
            remaining -= take;

            let lot_closed = head.qty_micros == 0;
            pieces.push(ClosedPiece {
                direction: closing,
                qty_micros: take,
                entry_price_micros: head.price_micros,
                exit_price_micros,
                entry: head.entry.clone(),
                lot_closed,
            });

            if lot_closed {
                queue.pop_front();
            }
        }

        self.drop_if_empty(symbol);
        (pieces, remaining)
    }

    /// Close opposite inventory first, then open the remainder on the fill's
    /// own side. BUY closes shorts then goes long; SELL closes longs then
    /// goes short; EXIT closes everything and never opens.
    pub fn apply(
        &mut self,
        symbol: &str,
        side: Side,
        qty_micros: i64,
        price_micros: i64,
        fill: FillRef,
    ) -> Result<Vec<ClosedPiece>, LotBookError> {
        if symbol.trim().is_empty() {
            return Err(LotBookError::EmptySymbol);
        }
        if price_micros < 0 {
            return Err(LotBookError::NegativePrice { price_micros });
        }

        let (Some(closing), Some(opening)) = (side.closes(), side.opens()) else {
            return Ok(self.close_all(symbol, price_micros));
        };

        if qty_micros <= 0 {
            return Err(LotBookError::NonPositiveQty { qty_micros });
        }

        let (pieces, remaining) = self.close(symbol, closing, qty_micros, price_micros);
        if remaining > 0 {
            self.open(symbol, opening, remaining, price_micros, fill);
        }
        Ok(pieces)
    }

    /// Liquidate every open lot for `symbol`: all longs, then all shorts.
    pub fn close_all(&mut self, symbol: &str, exit_price_micros: i64) -> Vec<ClosedPiece> {
        let long_qty = self.long_qty(symbol);
        let (mut pieces, _) = self.close(symbol, Direction::Long, long_qty, exit_price_micros);

        let short_qty = self.short_qty(symbol);
        let (shorts, _) = self.close(symbol, Direction::Short, short_qty, exit_price_micros);
        pieces.extend(shorts);
        pieces
    }

    pub fn long_qty(&self, symbol: &str) -> i64 {
        self.books.get(symbol).map(|b| b.long_qty()).unwrap_or(0)
    }

    pub fn short_qty(&self, symbol: &str) -> i64 {
        self.books.get(symbol).map(|b| b.short_qty()).unwrap_or(0)
    }

    /// Signed net inventory: long total minus short total.
    pub fn net_qty(&self, symbol: &str) -> i64 {
        self.long_qty(symbol) - self.short_qty(symbol)
    }

    /// Number of symbols whose net inventory is nonzero.
    pub fn open_symbols(&self) -> usize {
        self.books
            .values()
            .filter(|b| b.long_qty() - b.short_qty() != 0)
            .count()
    }

    /// Open lots for `symbol` in FIFO order (longs, then shorts).
    pub fn lots(&self, symbol: &str) -> Vec<Lot> {
        self.books
            .get(symbol)
            .map(|b| b.longs.iter().chain(b.shorts.iter()).cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_flat(&self) -> bool {
        self.books.is_empty()
    }

    fn drop_if_empty(&mut self, symbol: &str) {
        if self.books.get(symbol).is_some_and(|b| b.is_empty()) {
            self.books.remove(symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MICROS_SCALE;

    const M: i64 = MICROS_SCALE;

    fn r(id: &str, ts: i64) -> FillRef {
        FillRef {
            identity: id.to_string(),
            ts_millis: ts,
            tag: String::new(),
        }
    }

    #[test]
    fn sell_consumes_oldest_long_first() {
        let mut book = LotBook::new();
        book.open("X", Direction::Long, 5 * M, 100 * M, r("a", 1));
        book.open("X", Direction::Long, 5 * M, 110 * M, r("b", 2));

        let (pieces, rem) = book.close("X", Direction::Long, 7 * M, 120 * M);
        assert_eq!(rem, 0);
        assert_eq!(pieces.len(), 2);

        assert_eq!(pieces[0].qty_micros, 5 * M);
        assert_eq!(pieces[0].entry_price_micros, 100 * M);
        assert!(pieces[0].lot_closed);

        assert_eq!(pieces[1].qty_micros, 2 * M);
        assert_eq!(pieces[1].entry_price_micros, 110 * M);
        assert!(!pieces[1].lot_closed);

        let left = book.lots("X");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].qty_micros, 3 * M);
        assert_eq!(left[0].entry.identity, "b");
    }

    #[test]
    fn close_on_empty_queue_returns_full_remainder() {
        let mut book = LotBook::new();
        let (pieces, rem) = book.close("X", Direction::Short, 4 * M, 10 * M);
        assert!(pieces.is_empty());
        assert_eq!(rem, 4 * M);
    }

    #[test]
    fn buy_larger_than_shorts_flips_to_long() {
        let mut book = LotBook::new();
        book.apply("X", Side::Sell, 3 * M, 50 * M, r("s", 1)).unwrap();
        let pieces = book.apply("X", Side::Buy, 5 * M, 45 * M, r("b", 2)).unwrap();

        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].direction, Direction::Short);
        assert_eq!(pieces[0].qty_micros, 3 * M);
        assert_eq!(book.short_qty("X"), 0);
        assert_eq!(book.long_qty("X"), 2 * M);
        assert_eq!(book.lots("X")[0].entry.identity, "b");
    }

    #[test]
    fn close_all_liquidates_both_queues_longs_first() {
        let mut book = LotBook::new();
        book.open("X", Direction::Long, 2 * M, 10 * M, r("l", 1));
        book.open("X", Direction::Short, 3 * M, 12 * M, r("s", 2));

        let pieces = book.close_all("X", 11 * M);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].direction, Direction::Long);
        assert_eq!(pieces[1].direction, Direction::Short);
        assert!(book.is_flat());
    }

    #[test]
    fn exit_side_never_opens() {
        let mut book = LotBook::new();
        let pieces = book.apply("X", Side::Exit, 10 * M, 5 * M, r("e", 1)).unwrap();
        assert!(pieces.is_empty());
        assert!(book.is_flat());
    }

    #[test]
    fn rejects_bad_input_without_mutation() {
        let mut book = LotBook::new();
        assert_eq!(
            book.apply("X", Side::Buy, 0, M, r("a", 1)),
            Err(LotBookError::NonPositiveQty { qty_micros: 0 })
        );
        assert_eq!(
            book.apply("X", Side::Buy, M, -1, r("a", 1)),
            Err(LotBookError::NegativePrice { price_micros: -1 })
        );
        assert_eq!(
            book.apply("  ", Side::Buy, M, M, r("a", 1)),
            Err(LotBookError::EmptySymbol)
        );
        assert!(book.is_flat());
    }

    #[test]
    fn open_symbols_counts_nonzero_net_only() {
        let mut book = LotBook::new();
        book.apply("A", Side::Buy, M, M, r("1", 1)).unwrap();
        book.apply("B", Side::Sell, M, M, r("2", 1)).unwrap();
        book.apply("C", Side::Buy, M, M, r("3", 1)).unwrap();
        book.apply("C", Side::Sell, M, M, r("4", 2)).unwrap();
        assert_eq!(book.open_symbols(), 2);
        assert_eq!(book.net_qty("B"), -M);
    }

    #[test]
    fn fractional_quantities_match_exactly() {
        let mut book = LotBook::new();
        book.apply("X", Side::Buy, 2_500_000, 10 * M, r("b", 1)).unwrap();
        let pieces = book.apply("X", Side::Sell, 1_250_000, 12 * M, r("s", 2)).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].qty_micros, 1_250_000);
        assert!(!pieces[0].lot_closed);
        assert_eq!(book.net_qty("X"), 1_250_000);
    }
}
