//! Realtime event stream entries (§3 RealtimeEvent, §6.4).

/// The kind of change a `RealtimeEvent` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
	Added,
	Modified,
	Removed,
}

impl EventType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Added => "added",
			Self::Modified => "modified",
			Self::Removed => "removed",
		}
	}
}

/// An append-only stream entry (§3, §6.4). **Invariant:** within a stream,
/// `sequence_number` is strictly increasing; `resume_token` uniquely
/// identifies a position.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeEvent {
	pub event_type: EventType,
	pub full_path: String,
	pub project_id: String,
	pub database_id: String,
	pub document_path: String,
	/// Serialized document snapshot after the change, opaque JSON text.
	pub data: Option<String>,
	/// Serialized document snapshot before the change, opaque JSON text.
	pub old_data: Option<String>,
	/// Nanoseconds since the Unix epoch.
	pub timestamp: i64,
	pub resume_token: String,
	pub sequence_number: u64,
	pub subscription_id: Option<String>,
}
