pub use crate::event_store::{RealtimeEventStore, RealtimeEventStoreConfig};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
