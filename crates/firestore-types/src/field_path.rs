//! Dotted field paths (§3 FieldPath, §4.1).

use crate::error::{Error, FsResult};

/// Firestore allows up to 100 levels of path nesting.
pub const MAX_FIELD_PATH_DEPTH: usize = 100;

/// An ordered, validated sequence of path segments split on `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
	segments: Vec<String>,
}

impl FieldPath {
	/// Parses and validates a dotted path: non-empty, no empty segments
	/// (`a..b` is invalid), depth at most [`MAX_FIELD_PATH_DEPTH`].
	pub fn parse(raw: &str) -> FsResult<Self> {
		if raw.is_empty() {
			return Err(Error::NilFieldPath);
		}
		let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
		if segments.iter().any(String::is_empty) {
			return Err(Error::InvalidArgument(format!("empty segment in field path {raw:?}")));
		}
		if segments.len() > MAX_FIELD_PATH_DEPTH {
			return Err(Error::FieldPathTooDeep(segments.len()));
		}
		Ok(Self { segments })
	}

	pub fn segments(&self) -> &[String] {
		&self.segments
	}

	pub fn depth(&self) -> usize {
		self.segments.len()
	}

	/// The first segment — the leaf name for a simple (non-nested) path.
	pub fn root(&self) -> &str {
		// Safe: `parse` rejects empty segment lists.
		&self.segments[0]
	}

	pub fn is_nested(&self) -> bool {
		self.segments.len() > 1
	}

	pub fn as_dotted(&self) -> String {
		self.segments.join(".")
	}
}

impl std::fmt::Display for FieldPath {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_dotted())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_empty_segments() {
		assert!(FieldPath::parse("a..b").is_err());
	}

	#[test]
	fn rejects_too_deep() {
		let raw = vec!["a"; MAX_FIELD_PATH_DEPTH + 1].join(".");
		assert!(matches!(FieldPath::parse(&raw), Err(Error::FieldPathTooDeep(_))));
	}

	#[test]
	fn accepts_max_depth() {
		let raw = vec!["a"; MAX_FIELD_PATH_DEPTH].join(".");
		assert!(FieldPath::parse(&raw).is_ok());
	}

	#[test]
	fn single_segment_is_not_nested() {
		let p = FieldPath::parse("status").unwrap();
		assert!(!p.is_nested());
		assert_eq!(p.root(), "status");
	}

	#[test]
	fn nested_path_reports_root() {
		let p = FieldPath::parse("customer.ruc").unwrap();
		assert!(p.is_nested());
		assert_eq!(p.root(), "customer");
		assert_eq!(p.segments(), &["customer", "ruc"]);
	}
}
