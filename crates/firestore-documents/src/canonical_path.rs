//! Canonical path parsing for the `*ByPath` operation variants (§4.4, §6.1).

use regex::Regex;
use std::sync::OnceLock;

use firestore_types::document::DocumentIdentity;
use firestore_types::error::{Error, FsResult};
use firestore_types::ids::{DatabaseId, ProjectId};

fn path_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"^projects/([^/]+)/databases/([^/]+)/documents/(.+)$")
			.unwrap_or_else(|e| unreachable!("canonical path pattern must compile: {e}"))
	})
}

/// Parses `projects/{p}/databases/{d}/documents/{collection}/{docID...}`
/// into a [`DocumentIdentity`]. `docID...` must alternate
/// collection/document segments (subcollections), ending on a document
/// segment; anything else is `InvalidPath`.
pub fn parse_document_path(full_path: &str) -> FsResult<DocumentIdentity> {
	let caps = path_regex()
		.captures(full_path)
		.ok_or_else(|| Error::InvalidPath(full_path.to_string()))?;
	let project_id = ProjectId::parse(&caps[1]).map_err(|_| Error::InvalidPath(full_path.to_string()))?;
	let database_id = DatabaseId::parse(&caps[2]).map_err(|_| Error::InvalidPath(full_path.to_string()))?;
	let rest = &caps[3];

	let segments: Vec<&str> = rest.split('/').collect();
	if segments.len() < 2 || segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
		return Err(Error::InvalidPath(full_path.to_string()));
	}

	let collection_segments: Vec<&str> = segments.iter().step_by(2).copied().collect();
	let collection_id = collection_segments.join(".");
	let document_id = segments[segments.len() - 1].to_string();

	DocumentIdentity::new(project_id, database_id, collection_id, document_id)
		.map_err(|_| Error::InvalidPath(full_path.to_string()))
}
