pub use crate::backing_store::BackingStore;
pub use crate::codec::{decode_document, decode_field_value, encode_document, encode_field_value, plain_json};
pub use crate::cursor::{collect_documents, collect_pipeline, DocumentCursor, PipelineCursor};
pub use crate::find::{FindOneAndUpdateOptions, FindOptions, SortDirection};
pub use crate::stored_document::{StoreFilter, StoredDocument};
pub use crate::transaction::StoreTransaction;
pub use crate::update::{Update, UpdateResult};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
