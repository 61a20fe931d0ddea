pub use crate::field_path_resolver::FieldPathResolver;
pub use crate::filter_compiler::FilterCompiler;
pub use crate::query_engine::{QueryEngine, QueryEngineConfig};
pub use crate::type_inference_cache::{TypeInferenceCache, TypeInferenceCacheConfig};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
