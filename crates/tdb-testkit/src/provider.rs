//! Scripted order-book provider.
//!
//! Scripted responses are served first, in order; once exhausted every call
//! returns the fallback rows for the requested user.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tdb_md::{OrderbookProvider, ProviderError};

#[derive(Default)]
pub struct ScriptedOrderbookProvider {
    script: Mutex<VecDeque<Result<Vec<Value>, ProviderError>>>,
    rows_by_user: Mutex<HashMap<String, Vec<Value>>>,
    calls: AtomicUsize,
}

impl ScriptedOrderbookProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return `rows` for `user_id` once the script is drained.
    pub fn with_rows(self, user_id: &str, rows: Vec<Value>) -> Self {
        self.set_rows(user_id, rows);
        self
    }

    pub fn set_rows(&self, user_id: &str, rows: Vec<Value>) {
        if let Ok(mut map) = self.rows_by_user.lock() {
            map.insert(user_id.to_string(), rows);
        }
    }

    /// Queue one response ahead of the fallback rows.
    pub fn push_response(&self, resp: Result<Vec<Value>, ProviderError>) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(resp);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl OrderbookProvider for ScriptedOrderbookProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_orderbook(&self, user_id: &str) -> Result<Vec<Value>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .script
            .lock()
            .map_err(|_| ProviderError::Transport("script lock poisoned".into()))?
            .pop_front();
        if let Some(resp) = scripted {
            return resp;
        }

        let map = self
            .rows_by_user
            .lock()
            .map_err(|_| ProviderError::Transport("rows lock poisoned".into()))?;
        Ok(map.get(user_id).cloned().unwrap_or_default())
    }
}
