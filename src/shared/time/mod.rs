//! Wall-clock helpers shared by messages, records and caches.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current Unix time in milliseconds.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i64
}

/// Milliseconds elapsed since `then_ms`, zero if `then_ms` lies in the future.
pub fn millis_since(then_ms: i64) -> u64 {
    (unix_millis() - then_ms).max(0) as u64
}

/// Returns true if a record stamped at `at_ms` is older than `age`.
pub fn is_older_than(at_ms: i64, age: Duration) -> bool {
    millis_since(at_ms) > age.as_millis() as u64
}
