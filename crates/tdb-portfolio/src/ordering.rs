//! Event ordering policy.
//!
//! Fill events are matched in ascending `ts_millis` order. The sort is
//! stable: events sharing a timestamp keep the order the broker returned
//! them in. There is no secondary key (no side or symbol tie-break), so two
//! runs over the same input sequence always match identically.
//!
//! Events whose timestamp failed to parse carry `ts_millis == 0` and would
//! otherwise sort ahead of everything else. [`ZeroTimestampPolicy`] decides
//! whether they are kept in that position or dropped before matching.

use crate::types::{FillEvent, ZeroTimestampPolicy};

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

/// Stable ascending sort by `ts_millis`, in place.
pub fn sort_events_by_time(events: &mut [FillEvent]) {
    events.sort_by_key(|e| e.ts_millis);
}

/// `true` when `events` is already in matching order.
pub fn is_time_ordered(events: &[FillEvent]) -> bool {
    events.windows(2).all(|w| w[0].ts_millis <= w[1].ts_millis)
}

// ---------------------------------------------------------------------------
// Zero-timestamp policy
// ---------------------------------------------------------------------------

/// Apply `policy` then sort. Returns the ordered events and how many were
/// dropped for carrying a zero timestamp.
pub fn prepare_events(
    mut events: Vec<FillEvent>,
    policy: ZeroTimestampPolicy,
) -> (Vec<FillEvent>, u64) {
    let mut dropped = 0u64;
    if policy == ZeroTimestampPolicy::Reject {
        let before = events.len();
        events.retain(|e| e.ts_millis != 0);
        dropped = (before - events.len()) as u64;
    }
    sort_events_by_time(&mut events);
    (events, dropped)
}
