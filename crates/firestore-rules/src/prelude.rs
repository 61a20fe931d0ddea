pub use crate::evaluator::Evaluator;
pub use crate::expr::{parse as parse_expr, Expr};
pub use crate::pattern::{compile as compile_pattern, CompiledPattern};
pub use crate::resource_accessor::{DefaultResourceAccessor, ResourceAccessor};
pub use crate::rules_engine::{AccessDecision, RulesEngineConfig, RulesEngineStats, SecurityRulesEngine};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
