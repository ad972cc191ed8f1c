//! Test doubles for the daemon and scenario tests: an in-memory store, a
//! scripted order-book provider and a deterministic paper order book that
//! emits broker-shaped rows.

pub mod paper_orderbook;
pub mod provider;
pub mod store;

pub use paper_orderbook::PaperOrderbook;
pub use provider::ScriptedOrderbookProvider;
pub use store::InMemoryPnlStore;
