pub use crate::context::{AuthContext, DatabaseScope, RequestContext};
pub use crate::engine::{Firestore, FirestoreCore};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
