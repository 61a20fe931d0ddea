//! Security rules engine (§4.7 SecurityRulesEngine, §4.8 ResourceAccessor):
//! match-pattern compilation, a restricted CEL-subset expression language,
//! and deny-over-allow priority-ordered evaluation with default deny.

pub mod evaluator;
pub mod expr;
pub mod pattern;
pub mod prelude;
pub mod resource_accessor;
pub mod rules_engine;

// vim: ts=4
