//! Error taxonomy (§7) shared by every crate in the workspace.
//!
//! A flat enum, hand-written `Display`/`std::error::Error` impls, and `From`
//! conversions for the external error types this crate's dependencies can
//! produce. No response-shaping lives here — that is a transport adapter's
//! job — but the variant set maps 1:1 onto the taxonomy a transport layer
//! needs.

pub type FsResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Document, project, database or collection does not exist.
	NotFound,
	/// A transform's filter matched zero documents *and* the target field
	/// already holds a value — distinct from plain `NotFound` (§7, §9.4).
	NotFoundOrFieldAlreadyHasValue,
	AlreadyExists,
	InvalidPath(String),
	InvalidArgument(String),
	PermissionDenied(String),
	FailedPrecondition(String),
	Unauthenticated,
	Unavailable(String),
	DeadlineExceeded,
	/// Transaction contention (optimistic-concurrency retry exhausted).
	Aborted,
	Internal(String),

	// Path/Model primitives (§4.1, §3)
	NilFieldPath,
	FieldPathTooDeep(usize),
	UnsupportedOperation(String),

	// QueryEngine (§4.3)
	QueryValidation(String),
	UnsupportedOperator(String),

	// Backing-store seam (§6.2)
	BackingStoreError(String),

	// SecurityRulesEngine (§4.7)
	RuleSyntax(String),

	// TenantRouter (§4.10): context carried no `organizationID`.
	OrganizationRequired,

	// externals
	Json(serde_json::Error),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Json(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::NotFound => write!(f, "not found"),
			Self::NotFoundOrFieldAlreadyHasValue => {
				write!(f, "document not found or field already has a value")
			}
			Self::AlreadyExists => write!(f, "already exists"),
			Self::InvalidPath(msg) => write!(f, "invalid path: {msg}"),
			Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
			Self::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
			Self::FailedPrecondition(msg) => write!(f, "failed precondition: {msg}"),
			Self::Unauthenticated => write!(f, "unauthenticated"),
			Self::Unavailable(msg) => write!(f, "backing store unavailable: {msg}"),
			Self::DeadlineExceeded => write!(f, "deadline exceeded"),
			Self::Aborted => write!(f, "aborted"),
			Self::Internal(msg) => write!(f, "internal error: {msg}"),
			Self::NilFieldPath => write!(f, "nil field path"),
			Self::FieldPathTooDeep(depth) => write!(f, "field path too deep: {depth}"),
			Self::UnsupportedOperation(msg) => write!(f, "unsupported operation: {msg}"),
			Self::QueryValidation(msg) => write!(f, "query validation failed: {msg}"),
			Self::UnsupportedOperator(op) => write!(f, "unsupported operator: {op}"),
			Self::BackingStoreError(msg) => write!(f, "backing store error: {msg}"),
			Self::RuleSyntax(msg) => write!(f, "rule syntax error: {msg}"),
			Self::OrganizationRequired => write!(f, "organizationID is required"),
			Self::Json(err) => write!(f, "json error: {err}"),
		}
	}
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn displays_without_panicking() {
		assert_eq!(Error::NotFound.to_string(), "not found");
		assert_eq!(Error::FieldPathTooDeep(101).to_string(), "field path too deep: 101");
	}
}
