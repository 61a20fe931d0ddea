pub use crate::atomic_transforms::{AtomicTransform, AtomicTransforms};
pub use crate::canonical_path::parse_document_path;
pub use crate::document_operations::{
	DocumentOperations, ListOrder, ListOrderField, ListPage, Transaction, TransactionFuture, WriteOp,
};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
