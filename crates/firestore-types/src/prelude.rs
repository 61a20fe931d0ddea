pub use crate::error::{Error, FsResult};
pub use crate::document::{Document, DocumentIdentity};
pub use crate::field_path::FieldPath;
pub use crate::field_value::{FieldValue, FieldValueType, GeoPoint};
pub use crate::ids::{DatabaseId, OrgId, ProjectId};
pub use crate::query::{Capabilities, Cursor, Direction, Filter, Operator, Order, Query};
pub use crate::security::{Operation, SecurityContext, SecurityRule};
pub use crate::event::{EventType, RealtimeEvent};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
