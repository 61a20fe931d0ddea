//! Wall-clock source for the `timestamp` field of ad-hoc `SecurityContext`s
//! and realtime events this crate constructs directly (§3 SecurityContext,
//! §6.4).

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as i64
}
