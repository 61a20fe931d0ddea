pub use crate::store::{MemoryBackingStore, MemoryStoreConfig};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
