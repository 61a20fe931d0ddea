//! C9 `RealtimeEventStore` (§4.9): one append-only stream per `fullPath`,
//! monotone resume tokens, bounded non-blocking reads, approximate retention.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::timeout;

use firestore_types::error::FsResult;
use firestore_types::event::RealtimeEvent;
use firestore_types::prelude::debug;

use crate::clock::now_nanos;

/// Bounded-resource tunable, following this workspace's `*Config` pattern.
#[derive(Debug, Clone, Copy)]
pub struct RealtimeEventStoreConfig {
	/// Safety bound a stream is trimmed back to once exceeded (§4.9 "Retention").
	pub max_events_per_stream: usize,
	/// Non-blocking read bound (§4.9 "Read semantics").
	pub read_timeout: Duration,
	/// Per-call cap on events returned by `GetEventsSince` (§4.9).
	pub max_batch_size: usize,
}

impl Default for RealtimeEventStoreConfig {
	fn default() -> Self {
		Self { max_events_per_stream: 10_000, read_timeout: Duration::from_secs(5), max_batch_size: 1_000 }
	}
}

#[derive(Debug, Default)]
struct Stream {
	events: Vec<RealtimeEvent>,
}

#[derive(Debug)]
pub struct RealtimeEventStore {
	streams: RwLock<HashMap<String, Stream>>,
	next_sequence: std::sync::atomic::AtomicU64,
	config: RealtimeEventStoreConfig,
}

impl RealtimeEventStore {
	pub fn new(config: RealtimeEventStoreConfig) -> Self {
		Self { streams: RwLock::new(HashMap::new()), next_sequence: std::sync::atomic::AtomicU64::new(1), config }
	}

	/// `StoreEvent(event)`: appends to the stream named by `event.full_path`,
	/// assigning the next monotone sequence number and deriving
	/// `resume_token` from it (§4.9 "Stream model").
	pub async fn store_event(&self, mut event: RealtimeEvent) -> FsResult<RealtimeEvent> {
		let sequence = self.next_sequence.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
		event.sequence_number = sequence;
		event.resume_token = sequence.to_string();

		let mut streams = self.streams.write().await;
		let stream = streams.entry(event.full_path.clone()).or_default();
		stream.events.push(event.clone());
		debug!(full_path = %event.full_path, sequence_number = sequence, "appended realtime event");
		Ok(event)
	}

	/// `GetEventsSince(fullPath, resumeToken)` (§4.9 "Read semantics"): empty
	/// token starts from the beginning, a missing stream yields an empty
	/// sequence, the read is bounded by `max_batch_size` and by
	/// `read_timeout` — a timeout returns an empty batch without error.
	pub async fn get_events_since(&self, full_path: &str, resume_token: &str) -> FsResult<Vec<RealtimeEvent>> {
		let after: u64 = if resume_token.is_empty() {
			0
		} else {
			resume_token.parse().unwrap_or(0)
		};
		match timeout(self.config.read_timeout, self.read_since(full_path, after)).await {
			Ok(events) => Ok(events),
			Err(_) => {
				debug!(full_path, "get_events_since timed out, returning empty batch");
				Ok(Vec::new())
			}
		}
	}

	async fn read_since(&self, full_path: &str, after: u64) -> Vec<RealtimeEvent> {
		let streams = self.streams.read().await;
		let Some(stream) = streams.get(full_path) else { return Vec::new() };
		stream
			.events
			.iter()
			.filter(|e| e.sequence_number > after)
			.take(self.config.max_batch_size)
			.cloned()
			.collect()
	}

	/// `GetEventCount(fullPath?)`: the length of one stream, or the sum
	/// across every stream when `full_path` is `None`.
	pub async fn get_event_count(&self, full_path: Option<&str>) -> FsResult<usize> {
		let streams = self.streams.read().await;
		Ok(match full_path {
			Some(path) => streams.get(path).map_or(0, |s| s.events.len()),
			None => streams.values().map(|s| s.events.len()).sum(),
		})
	}

	/// `CleanupOldEvents(retention)` (§4.9 "Retention"): age-based trim first
	/// (genuinely stale events beyond `retention`), then a hard length trim
	/// down to `max_events_per_stream` for any stream still over the bound.
	/// Returns the total number of events dropped.
	pub async fn cleanup_old_events(&self, retention: Duration) -> FsResult<u64> {
		let cutoff = now_nanos().saturating_sub(retention.as_nanos() as i64);
		let mut streams = self.streams.write().await;
		let mut dropped = 0u64;
		for stream in streams.values_mut() {
			let before = stream.events.len();
			stream.events.retain(|e| e.timestamp >= cutoff);
			dropped += (before - stream.events.len()) as u64;

			if stream.events.len() > self.config.max_events_per_stream {
				let excess = stream.events.len() - self.config.max_events_per_stream;
				stream.events.drain(0..excess);
				dropped += excess as u64;
			}
		}
		if dropped > 0 {
			debug!(dropped, "cleaned up old realtime events");
		}
		Ok(dropped)
	}
}

impl Default for RealtimeEventStore {
	fn default() -> Self {
		Self::new(RealtimeEventStoreConfig::default())
	}
}
