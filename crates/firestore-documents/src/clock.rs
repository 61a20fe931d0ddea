//! Wall-clock source for `createTime`/`updateTime` stamps (§4.4, §4.5).

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch, matching `Document::create_time`'s unit.
pub fn now_nanos() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_nanos() as i64
}
