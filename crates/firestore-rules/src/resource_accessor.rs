//! C8 `ResourceAccessor` (§4.8): the narrow read-only seam the expression
//! evaluator uses for `get()`/`exists()` calls, kept separate from the full
//! `DocumentOperations` facade so this crate does not need to depend on it
//! (§9 "Layering": the rules engine only ever reads, never writes, through
//! this port).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use firestore_store::codec::decode_document;
use firestore_store::prelude::*;
use firestore_types::error::FsResult;

/// Resolves a `get()`/`exists()` path reference into plain JSON, decoupled
/// from any particular backing store.
#[async_trait]
pub trait ResourceAccessor: std::fmt::Debug + Send + Sync {
	/// `path` is a slash-separated relative document path, e.g.
	/// `users/u1/posts/p1` (no `projects/.../documents/` prefix — callers
	/// inside a rule condition never see the full canonical form).
	async fn get(&self, project_id: &str, database_id: &str, path: &str) -> FsResult<Option<JsonValue>>;

	async fn exists(&self, project_id: &str, database_id: &str, path: &str) -> FsResult<bool> {
		Ok(self.get(project_id, database_id, path).await?.is_some())
	}
}

/// Splits `users/u1/posts/p1` into collection id `users.posts` and document
/// id `p1`, mirroring `firestore-documents::canonical_path`'s subcollection
/// join-by-dot convention without depending on that crate.
fn split_relative_path(path: &str) -> Option<(String, String)> {
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	if segments.is_empty() || segments.len() % 2 != 0 {
		return None;
	}
	let collection_segments: Vec<&str> = segments.iter().step_by(2).copied().collect();
	let collection_id = collection_segments.join(".");
	let document_id = segments[segments.len() - 1].to_string();
	Some((collection_id, document_id))
}

/// The production accessor: reads through a `BackingStore`, decoding each
/// stored document into plain (untagged) JSON so expressions can compare
/// `get(path).data.status == "paid"` without knowing about storage tags.
#[derive(Debug)]
pub struct DefaultResourceAccessor {
	store: Arc<dyn BackingStore>,
}

impl DefaultResourceAccessor {
	pub fn new(store: Arc<dyn BackingStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl ResourceAccessor for DefaultResourceAccessor {
	async fn get(&self, project_id: &str, database_id: &str, path: &str) -> FsResult<Option<JsonValue>> {
		let Some((collection_id, document_id)) = split_relative_path(path) else {
			return Ok(None);
		};
		let filter = StoreFilter(serde_json::json!({
			"$and": [
				{ "projectID": { "$eq": project_id } },
				{ "databaseID": { "$eq": database_id } },
				{ "documentID": { "$eq": document_id } },
			]
		}));
		let Some(stored) = self.store.find_one(&collection_id, &filter).await? else {
			return Ok(None);
		};
		if !stored.exists {
			return Ok(None);
		}
		let document = decode_document(&stored)?;
		let fields: serde_json::Map<String, JsonValue> =
			document.fields.iter().map(|(k, v)| (k.clone(), firestore_store::codec::plain_json(v))).collect();
		Ok(Some(serde_json::json!({
			"id": document.identity.document_id,
			"path": document.path,
			"data": JsonValue::Object(fields),
		})))
	}
}
