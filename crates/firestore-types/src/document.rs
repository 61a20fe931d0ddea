//! Documents and their canonical paths (§3 Document, §6.1).

use std::collections::BTreeMap;

use crate::error::{Error, FsResult};
use crate::field_value::FieldValue;
use crate::ids::{validate_path_segment, DatabaseId, ProjectId};

/// The `(projectID, databaseID, collectionID, documentID)` tuple a document
/// is identified by. `collection_id` is the *physical* collection name —
/// subcollection segments are already joined with `.` (§4.4 "Path parsing").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentIdentity {
	pub project_id: ProjectId,
	pub database_id: DatabaseId,
	pub collection_id: String,
	pub document_id: String,
}

impl DocumentIdentity {
	pub fn new(
		project_id: ProjectId,
		database_id: DatabaseId,
		collection_id: impl Into<String>,
		document_id: impl Into<String>,
	) -> FsResult<Self> {
		let collection_id = collection_id.into();
		let document_id = document_id.into();
		for segment in collection_id.split('.') {
			validate_path_segment("collectionID", segment)?;
		}
		validate_path_segment("documentID", &document_id)?;
		Ok(Self { project_id, database_id, collection_id, document_id })
	}

	/// `projects/{p}/databases/{d}/documents/{collectionPath}/{documentID}`
	/// (§6.1). `collection_id` is re-expanded from its `.`-joined physical
	/// form back into `/`-separated path segments.
	pub fn canonical_path(&self) -> String {
		let collection_path = self.collection_id.replace('.', "/");
		format!(
			"projects/{}/databases/{}/documents/{}/{}",
			self.project_id, self.database_id, collection_path, self.document_id
		)
	}

	pub fn parent_path(&self) -> String {
		format!("projects/{}/databases/{}/documents/{}", self.project_id, self.database_id, {
			self.collection_id.replace('.', "/")
		})
	}
}

/// A document (§3). **Invariant:** `path` is derivable from `identity`;
/// `update_time >= create_time`; `version` is monotonically non-decreasing
/// across successful updates on the same document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
	pub identity: DocumentIdentity,
	pub path: String,
	pub parent_path: String,
	pub fields: BTreeMap<String, FieldValue>,
	/// Nanoseconds since the Unix epoch.
	pub create_time: i64,
	pub update_time: i64,
	pub version: i64,
	pub exists: bool,
}

impl Document {
	/// Builds a document whose `path`/`parent_path` are derived from
	/// `identity`, enforcing the version and time-ordering invariants.
	pub fn new(
		identity: DocumentIdentity,
		fields: BTreeMap<String, FieldValue>,
		create_time: i64,
		update_time: i64,
		version: i64,
		exists: bool,
	) -> FsResult<Self> {
		if version < 1 {
			return Err(Error::Internal(format!("document version must be >= 1, got {version}")));
		}
		if update_time < create_time {
			return Err(Error::Internal("updateTime must be >= createTime".into()));
		}
		let path = identity.canonical_path();
		let parent_path = identity.parent_path();
		Ok(Self { identity, path, parent_path, fields, create_time, update_time, version, exists })
	}
}
