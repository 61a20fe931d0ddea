//! Security rule and evaluation-context primitives (§3 SecurityRule /
//! SecurityContext, §4.7). Expression *compilation* belongs to the rules
//! engine crate; these types carry the raw, uncompiled rule shape.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::{Error, FsResult};

/// The operation a rule condition is evaluated against (§4.7 Validation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
	Read,
	Write,
	Delete,
	Create,
	Update,
}

impl Operation {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Write => "write",
			Self::Delete => "delete",
			Self::Create => "create",
			Self::Update => "update",
		}
	}

	pub fn parse(raw: &str) -> FsResult<Self> {
		match raw {
			"read" => Ok(Self::Read),
			"write" => Ok(Self::Write),
			"delete" => Ok(Self::Delete),
			"create" => Ok(Self::Create),
			"update" => Ok(Self::Update),
			other => Err(Error::InvalidArgument(format!("unknown rule operation {other:?}"))),
		}
	}
}

/// A security rule document (§3, §6.5) before pattern/expression compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityRule {
	pub project_id: String,
	pub database_id: String,
	/// Path-pattern, e.g. `/users/{userId}` or `/users/{userId}/posts/{rest=**}`.
	pub path_match: String,
	pub priority: i64,
	pub allow: BTreeMap<Operation, String>,
	pub deny: BTreeMap<Operation, String>,
	pub description: Option<String>,
	pub created_at: i64,
	pub updated_at: i64,
}

impl SecurityRule {
	/// Structural checks shared by `ValidateRules` and `SaveRules` (§4.7):
	/// non-empty match, balanced braces, at least one allow/deny condition.
	/// Variable-identifier and expression-syntax checks live in the rules
	/// engine, which owns the pattern compiler and expression parser.
	pub fn validate_shape(&self) -> FsResult<()> {
		if self.path_match.is_empty() {
			return Err(Error::InvalidArgument("rule match pattern must not be empty".into()));
		}
		if !braces_balanced(&self.path_match) {
			return Err(Error::InvalidArgument(format!(
				"unbalanced braces in match pattern {:?}",
				self.path_match
			)));
		}
		if self.allow.is_empty() && self.deny.is_empty() {
			return Err(Error::InvalidArgument(
				"rule must declare at least one allow or deny condition".into(),
			));
		}
		Ok(())
	}
}

fn braces_balanced(pattern: &str) -> bool {
	let mut depth = 0i32;
	for c in pattern.chars() {
		match c {
			'{' => depth += 1,
			'}' => {
				depth -= 1;
				if depth < 0 {
					return false;
				}
			}
			_ => {}
		}
	}
	depth == 0
}

/// The runtime inputs to rule evaluation (§3, glossary "Security context").
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityContext {
	pub user: Option<String>,
	pub project_id: String,
	pub database_id: String,
	pub path: String,
	pub request: BTreeMap<String, JsonValue>,
	pub resource: BTreeMap<String, JsonValue>,
	pub variables: BTreeMap<String, String>,
	/// Nanoseconds since the Unix epoch.
	pub timestamp: i64,
}

impl SecurityContext {
	pub fn new(project_id: impl Into<String>, database_id: impl Into<String>, path: impl Into<String>, timestamp: i64) -> Self {
		Self {
			user: None,
			project_id: project_id.into(),
			database_id: database_id.into(),
			path: path.into(),
			request: BTreeMap::new(),
			resource: BTreeMap::new(),
			variables: BTreeMap::new(),
			timestamp,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rule() -> SecurityRule {
		SecurityRule {
			project_id: "p".into(),
			database_id: "(default)".into(),
			path_match: "/users/{userId}".into(),
			priority: 0,
			allow: BTreeMap::from([(Operation::Read, "auth.uid == userId".into())]),
			deny: BTreeMap::new(),
			description: None,
			created_at: 0,
			updated_at: 0,
		}
	}

	#[test]
	fn rejects_empty_match() {
		let mut r = rule();
		r.path_match = String::new();
		assert!(r.validate_shape().is_err());
	}

	#[test]
	fn rejects_unbalanced_braces() {
		let mut r = rule();
		r.path_match = "/users/{userId".into();
		assert!(r.validate_shape().is_err());
	}

	#[test]
	fn rejects_rule_with_no_conditions() {
		let mut r = rule();
		r.allow.clear();
		assert!(r.validate_shape().is_err());
	}

	#[test]
	fn accepts_well_formed_rule() {
		assert!(rule().validate_shape().is_ok());
	}

	#[test]
	fn operation_round_trips_through_str() {
		for op in [Operation::Read, Operation::Write, Operation::Delete, Operation::Create, Operation::Update] {
			assert_eq!(Operation::parse(op.as_str()).unwrap(), op);
		}
	}
}
