//! Fixed-window request limiter keyed by caller.
//!
//! Each key gets `max_requests` per `window`; the window restarts on the
//! first request after it elapses. Once the map reaches the sweep threshold
//! a new key triggers a sweep of every elapsed window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    count: u32,
}

pub const DEFAULT_SWEEP_THRESHOLD: usize = 4096;

struct Windows {
    map: HashMap<String, Window>,
    sweep_at: usize,
}

pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    min_sweep_at: usize,
    windows: Mutex<Windows>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_sweep_threshold(max_requests, window, DEFAULT_SWEEP_THRESHOLD)
    }

    pub fn with_sweep_threshold(max_requests: u32, window: Duration, threshold: usize) -> Self {
        let min_sweep_at = threshold.max(1);
        Self {
            max_requests,
            window,
            min_sweep_at,
            windows: Mutex::new(Windows {
                map: HashMap::new(),
                sweep_at: min_sweep_at,
            }),
        }
    }

    /// Count one request for `key`. `false` means the caller is over budget.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            // poisoned: fail open
            return true;
        };
        if windows.map.len() >= windows.sweep_at && !windows.map.contains_key(key) {
            let window = self.window;
            windows
                .map
                .retain(|_, w| now.saturating_duration_since(w.started) < window);
            windows.sweep_at = self.min_sweep_at.max(windows.map.len() * 2);
        }
        let w = windows.map.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(w.started) >= self.window {
            *w = Window {
                started: now,
                count: 0,
            };
        }
        if w.count >= self.max_requests {
            return false;
        }
        w.count += 1;
        true
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Callers currently holding a window, elapsed or not.
    pub fn tracked(&self) -> usize {
        self.windows.lock().map(|w| w.map.len()).unwrap_or_default()
    }
}
