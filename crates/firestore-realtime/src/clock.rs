//! Wall-clock source for event timestamps and retention cutoffs (§4.9).

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch, matching `RealtimeEvent::timestamp`'s unit.
pub fn now_nanos() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as i64
}
