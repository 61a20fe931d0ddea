//! Identifiers (§6.1). `OrgId` is a numeric newtype mirroring the tenant
//! identifiers used elsewhere in the ecosystem; project/database IDs are
//! charset-validated strings, collection/document IDs allow unicode (observed
//! in tests, §6.1) but never a path separator.

use crate::error::{Error, FsResult};

/// Organization identifier used by the tenant router (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrgId(pub u64);

impl std::fmt::Display for OrgId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

fn is_identifier_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validates the `[A-Za-z0-9_\-]+` charset required of project and database
/// IDs (§6.1). `(default)` is the one database-ID literal exempt from it.
pub fn validate_identifier(kind: &str, raw: &str) -> FsResult<()> {
	if raw.is_empty() {
		return Err(Error::InvalidArgument(format!("{kind} must not be empty")));
	}
	if !raw.chars().all(is_identifier_char) {
		return Err(Error::InvalidArgument(format!(
			"{kind} {raw:?} contains characters outside [A-Za-z0-9_-]"
		)));
	}
	Ok(())
}

/// Validates a collection or document ID segment: non-empty, no `/`. Unicode
/// is permitted (§6.1).
pub fn validate_path_segment(kind: &str, raw: &str) -> FsResult<()> {
	if raw.is_empty() {
		return Err(Error::InvalidArgument(format!("{kind} must not be empty")));
	}
	if raw.contains('/') {
		return Err(Error::InvalidArgument(format!("{kind} {raw:?} must not contain '/'")));
	}
	Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseId(pub String);

impl ProjectId {
	pub fn parse(raw: impl Into<String>) -> FsResult<Self> {
		let raw = raw.into();
		validate_identifier("projectID", &raw)?;
		Ok(Self(raw))
	}
}

impl DatabaseId {
	/// `(default)` is the canonical default-database literal (§6.1) and is
	/// accepted even though its parentheses fall outside the identifier
	/// charset.
	pub fn parse(raw: impl Into<String>) -> FsResult<Self> {
		let raw = raw.into();
		if raw == "(default)" {
			return Ok(Self(raw));
		}
		validate_identifier("databaseID", &raw)?;
		Ok(Self(raw))
	}
}

impl std::fmt::Display for ProjectId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::fmt::Display for DatabaseId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_slash_in_project_id() {
		assert!(ProjectId::parse("a/b").is_err());
	}

	#[test]
	fn accepts_default_database_literal() {
		assert!(DatabaseId::parse("(default)").is_ok());
	}

	#[test]
	fn rejects_malformed_database_id() {
		assert!(DatabaseId::parse("my db").is_err());
	}

	#[test]
	fn unicode_path_segment_is_allowed() {
		assert!(validate_path_segment("collectionID", "reseñas").is_ok());
	}
}
