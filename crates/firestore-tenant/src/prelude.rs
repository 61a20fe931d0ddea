pub use crate::router::{BackingStoreFactory, TenantEngines, TenantRouter, TenantRouterConfig};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
