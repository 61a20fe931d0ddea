//! The in-memory `BackingStore` (§6.2). One `Vec<StoredDocument>` per
//! physical collection name, guarded by a single reader/writer lock —
//! adequate for a reference/test adapter, not a production topology.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use firestore_store::backing_store::BackingStore;
use firestore_store::cursor::{DocumentCursor, PipelineCursor};
use firestore_store::find::{FindOneAndUpdateOptions, FindOptions, SortDirection};
use firestore_store::stored_document::{StoreFilter, StoredDocument};
use firestore_store::transaction::StoreTransaction;
use firestore_store::update::{Update, UpdateResult};
use firestore_types::error::FsResult;
use firestore_types::prelude::debug;

use crate::matcher;
use crate::mutate;
use crate::path;

/// Bounded-resource tunable. The in-memory adapter holds everything, so the
/// only knob worth exposing is a soft document-count cap for tests that want
/// to exercise a "store full" failure path.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStoreConfig {
	pub max_documents_per_collection: usize,
}

impl Default for MemoryStoreConfig {
	fn default() -> Self {
		Self { max_documents_per_collection: 1_000_000 }
	}
}

#[derive(Debug)]
pub struct MemoryBackingStore {
	config: MemoryStoreConfig,
	collections: RwLock<HashMap<String, Vec<StoredDocument>>>,
	next_id: AtomicU64,
}

impl MemoryBackingStore {
	pub fn new(config: MemoryStoreConfig) -> Self {
		Self { config, collections: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1) }
	}

	pub fn next_document_id(&self) -> String {
		format!("mem-{}", self.next_id.fetch_add(1, AtomicOrdering::Relaxed))
	}
}

impl Default for MemoryBackingStore {
	fn default() -> Self {
		Self::new(MemoryStoreConfig::default())
	}
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
	async fn count_documents(&self, collection: &str, filter: &StoreFilter) -> FsResult<u64> {
		let collections = self.collections.read().await;
		let count = collections
			.get(collection)
			.map(|docs| docs.iter().filter(|d| matcher::matches(d, &filter.0)).count())
			.unwrap_or(0);
		Ok(count as u64)
	}

	async fn insert_one(&self, collection: &str, doc: StoredDocument) -> FsResult<String> {
		let id = doc.document_id.clone();
		let mut collections = self.collections.write().await;
		let docs = collections.entry(collection.to_string()).or_default();
		if docs.len() >= self.config.max_documents_per_collection {
			return Err(firestore_types::error::Error::Unavailable(format!(
				"collection {collection} is at capacity"
			)));
		}
		docs.push(doc);
		debug!(collection, document_id = %id, "inserted document");
		Ok(id)
	}

	async fn find_one(&self, collection: &str, filter: &StoreFilter) -> FsResult<Option<StoredDocument>> {
		let collections = self.collections.read().await;
		Ok(collections
			.get(collection)
			.and_then(|docs| docs.iter().find(|d| matcher::matches(d, &filter.0)))
			.cloned())
	}

	async fn update_one(&self, collection: &str, filter: &StoreFilter, update: &Update) -> FsResult<UpdateResult> {
		let mut collections = self.collections.write().await;
		let docs = collections.entry(collection.to_string()).or_default();
		let Some(doc) = docs.iter_mut().find(|d| matcher::matches(d, &filter.0)) else {
			if update.upsert {
				let mut fresh = StoredDocument {
					project_id: String::new(),
					database_id: String::new(),
					collection_id: collection.to_string(),
					document_id: self.next_document_id(),
					path: String::new(),
					parent_path: String::new(),
					fields: Default::default(),
					create_time: 0,
					update_time: 0,
					version: 1,
					exists: true,
				};
				mutate::apply_to_document(&mut fresh, update, true);
				let id = fresh.document_id.clone();
				docs.push(fresh);
				return Ok(UpdateResult { matched_count: 0, modified_count: 1, upserted_id: Some(id) });
			}
			return Ok(UpdateResult::none_matched());
		};
		mutate::apply_to_document(doc, update, false);
		Ok(UpdateResult { matched_count: 1, modified_count: 1, upserted_id: None })
	}

	async fn replace_one(
		&self,
		collection: &str,
		filter: &StoreFilter,
		replacement: StoredDocument,
		upsert: bool,
	) -> FsResult<UpdateResult> {
		let mut collections = self.collections.write().await;
		let docs = collections.entry(collection.to_string()).or_default();
		if let Some(slot) = docs.iter_mut().find(|d| matcher::matches(d, &filter.0)) {
			*slot = replacement;
			return Ok(UpdateResult { matched_count: 1, modified_count: 1, upserted_id: None });
		}
		if upsert {
			let id = replacement.document_id.clone();
			docs.push(replacement);
			return Ok(UpdateResult { matched_count: 0, modified_count: 1, upserted_id: Some(id) });
		}
		Ok(UpdateResult::none_matched())
	}

	async fn delete_one(&self, collection: &str, filter: &StoreFilter) -> FsResult<u64> {
		let mut collections = self.collections.write().await;
		let Some(docs) = collections.get_mut(collection) else { return Ok(0) };
		let Some(idx) = docs.iter().position(|d| matcher::matches(d, &filter.0)) else { return Ok(0) };
		docs.remove(idx);
		Ok(1)
	}

	async fn find(
		&self,
		collection: &str,
		filter: &StoreFilter,
		opts: &FindOptions,
	) -> FsResult<Box<dyn DocumentCursor>> {
		let collections = self.collections.read().await;
		let mut matched: Vec<StoredDocument> = collections
			.get(collection)
			.map(|docs| docs.iter().filter(|d| matcher::matches(d, &filter.0)).cloned().collect())
			.unwrap_or_default();

		for (field_ref, direction) in opts.sort.iter().rev() {
			matched.sort_by(|a, b| {
				let cmp = compare_sort_key(a, b, field_ref);
				match direction {
					SortDirection::Asc => cmp,
					SortDirection::Desc => cmp.reverse(),
				}
			});
		}

		let skip = opts.skip.unwrap_or(0) as usize;
		if skip > 0 {
			matched = matched.into_iter().skip(skip).collect();
		}
		if let Some(limit) = opts.limit {
			matched.truncate(limit as usize);
		}

		Ok(Box::new(VecDocumentCursor { items: matched, index: 0 }))
	}

	async fn aggregate(&self, collection: &str, pipeline: &[JsonValue]) -> FsResult<Box<dyn PipelineCursor>> {
		let collections = self.collections.read().await;
		let mut docs: Vec<StoredDocument> = collections.get(collection).cloned().unwrap_or_default();

		for stage in pipeline {
			if let Some(filter) = stage.get("$match") {
				docs.retain(|d| matcher::matches(d, filter));
			}
			if let Some(n) = stage.get("$limit").and_then(JsonValue::as_u64) {
				docs.truncate(n as usize);
			}
		}

		let rows: Vec<JsonValue> = docs.iter().map(|d| JsonValue::Object(stored_as_map(d))).collect();
		Ok(Box::new(VecPipelineCursor { items: rows, index: 0 }))
	}

	async fn find_one_and_update(
		&self,
		collection: &str,
		filter: &StoreFilter,
		update: &Update,
		opts: &FindOneAndUpdateOptions,
	) -> FsResult<Option<StoredDocument>> {
		let mut collections = self.collections.write().await;
		let docs = collections.entry(collection.to_string()).or_default();
		if let Some(pos) = docs.iter().position(|d| matcher::matches(d, &filter.0)) {
			let before = docs[pos].clone();
			mutate::apply_to_document(&mut docs[pos], update, false);
			return Ok(Some(if opts.return_new { docs[pos].clone() } else { before }));
		}
		if opts.upsert {
			let mut fresh = StoredDocument {
				project_id: String::new(),
				database_id: String::new(),
				collection_id: collection.to_string(),
				document_id: self.next_document_id(),
				path: String::new(),
				parent_path: String::new(),
				fields: Default::default(),
				create_time: 0,
				update_time: 0,
				version: 1,
				exists: true,
			};
			mutate::apply_to_document(&mut fresh, update, true);
			docs.push(fresh.clone());
			return Ok(Some(fresh));
		}
		Ok(None)
	}

	/// No transaction support (§6.2 "Optional"): always `None`, exercising
	/// the sequential fallback described in §4.4/§9.
	async fn begin_transaction(&self) -> FsResult<Option<Box<dyn StoreTransaction>>> {
		Ok(None)
	}

	async fn list_collections_with_suffix(&self, collection_id: &str) -> FsResult<Vec<String>> {
		let collections = self.collections.read().await;
		Ok(collections
			.keys()
			.filter(|name| name.rsplit('.').next() == Some(collection_id))
			.cloned()
			.collect())
	}
}

fn compare_sort_key(a: &StoredDocument, b: &StoredDocument, field_ref: &str) -> std::cmp::Ordering {
	if field_ref.starts_with("fields.") {
		let av = path::get(&a.fields, field_ref);
		let bv = path::get(&b.fields, field_ref);
		return match (av, bv) {
			(Some(x), Some(y)) => compare_json(x, y),
			(Some(_), None) => std::cmp::Ordering::Greater,
			(None, Some(_)) => std::cmp::Ordering::Less,
			(None, None) => std::cmp::Ordering::Equal,
		};
	}
	let av = matcher::metadata_value(a, field_ref);
	let bv = matcher::metadata_value(b, field_ref);
	match (av, bv) {
		(Some(x), Some(y)) => compare_json(&x, &y),
		(Some(_), None) => std::cmp::Ordering::Greater,
		(None, Some(_)) => std::cmp::Ordering::Less,
		(None, None) => std::cmp::Ordering::Equal,
	}
}

fn compare_json(a: &JsonValue, b: &JsonValue) -> std::cmp::Ordering {
	if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
		return x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal);
	}
	if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
		return x.cmp(y);
	}
	std::cmp::Ordering::Equal
}

fn stored_as_map(doc: &StoredDocument) -> serde_json::Map<String, JsonValue> {
	let mut map = serde_json::Map::new();
	map.insert("fields".to_string(), JsonValue::Object(doc.fields.clone().into_iter().collect()));
	map.insert("documentID".to_string(), JsonValue::String(doc.document_id.clone()));
	map.insert("path".to_string(), JsonValue::String(doc.path.clone()));
	map
}

/// `index` points at the slot `decode()` will return once `next()` has
/// advanced past it — `next()` returns `false` (and leaves `index` one past
/// the end) once exhausted, matching §6.2's `Next`/`Decode` pairing.
struct VecDocumentCursor {
	items: Vec<StoredDocument>,
	index: usize,
}

#[async_trait]
impl DocumentCursor for VecDocumentCursor {
	async fn next(&mut self) -> FsResult<bool> {
		if self.index >= self.items.len() {
			return Ok(false);
		}
		self.index += 1;
		Ok(true)
	}

	fn decode(&self) -> FsResult<StoredDocument> {
		Ok(self.items[self.index - 1].clone())
	}

	async fn close(&mut self) -> FsResult<()> {
		Ok(())
	}
}

struct VecPipelineCursor {
	items: Vec<JsonValue>,
	index: usize,
}

#[async_trait]
impl PipelineCursor for VecPipelineCursor {
	async fn next(&mut self) -> FsResult<bool> {
		if self.index >= self.items.len() {
			return Ok(false);
		}
		self.index += 1;
		Ok(true)
	}

	fn decode(&self) -> FsResult<JsonValue> {
		Ok(self.items[self.index - 1].clone())
	}

	async fn close(&mut self) -> FsResult<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use firestore_store::cursor::collect_documents;
	use serde_json::json;

	fn doc(id: &str, status: &str) -> StoredDocument {
		let mut fields = std::collections::BTreeMap::new();
		fields.insert("status".to_string(), json!({"stringValue": status}));
		StoredDocument {
			project_id: "p".into(),
			database_id: "(default)".into(),
			collection_id: "orders".into(),
			document_id: id.into(),
			path: format!("projects/p/databases/(default)/documents/orders/{id}"),
			parent_path: "projects/p/databases/(default)/documents/orders".into(),
			fields,
			create_time: 1,
			update_time: 1,
			version: 1,
			exists: true,
		}
	}

	#[tokio::test]
	async fn insert_then_find_round_trips() {
		let store = MemoryBackingStore::default();
		store.insert_one("orders", doc("o1", "paid")).await.unwrap();
		let found = store
			.find_one("orders", &StoreFilter(json!({"fields.status.stringValue": {"$eq": "paid"}})))
			.await
			.unwrap();
		assert_eq!(found.unwrap().document_id, "o1");
	}

	#[tokio::test]
	async fn find_returns_matching_documents_via_cursor() {
		let store = MemoryBackingStore::default();
		store.insert_one("orders", doc("o1", "paid")).await.unwrap();
		store.insert_one("orders", doc("o2", "due")).await.unwrap();
		let cursor = store
			.find("orders", &StoreFilter(json!({"fields.status.stringValue": {"$eq": "paid"}})), &FindOptions::default())
			.await
			.unwrap();
		let docs = collect_documents(cursor).await.unwrap();
		assert_eq!(docs.len(), 1);
		assert_eq!(docs[0].document_id, "o1");
	}

	#[tokio::test]
	async fn delete_then_delete_again_matches_nothing() {
		let store = MemoryBackingStore::default();
		store.insert_one("orders", doc("o1", "paid")).await.unwrap();
		let filter = StoreFilter(json!({"fields.status.stringValue": {"$eq": "paid"}}));
		assert_eq!(store.delete_one("orders", &filter).await.unwrap(), 1);
		assert_eq!(store.delete_one("orders", &filter).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn find_one_by_document_id_metadata_filter() {
		let store = MemoryBackingStore::default();
		store.insert_one("orders", doc("o1", "paid")).await.unwrap();
		store.insert_one("orders", doc("o2", "due")).await.unwrap();
		let found = store.find_one("orders", &StoreFilter(json!({"documentID": {"$eq": "o2"}}))).await.unwrap();
		assert_eq!(found.unwrap().document_id, "o2");
	}

	#[tokio::test]
	async fn find_sorts_by_document_id_metadata_key_descending() {
		let store = MemoryBackingStore::default();
		store.insert_one("orders", doc("o1", "paid")).await.unwrap();
		store.insert_one("orders", doc("o2", "paid")).await.unwrap();
		store.insert_one("orders", doc("o3", "paid")).await.unwrap();
		let opts = FindOptions { sort: vec![("documentID".to_string(), SortDirection::Desc)], ..Default::default() };
		let cursor = store.find("orders", &StoreFilter::all_pass(), &opts).await.unwrap();
		let docs = collect_documents(cursor).await.unwrap();
		let ids: Vec<&str> = docs.iter().map(|d| d.document_id.as_str()).collect();
		assert_eq!(ids, vec!["o3", "o2", "o1"]);
	}

	#[tokio::test]
	async fn list_collections_with_suffix_matches_physical_names() {
		let store = MemoryBackingStore::default();
		store.insert_one("orders", doc("o1", "paid")).await.unwrap();
		store.insert_one("orders.items", doc("i1", "paid")).await.unwrap();
		let mut found = store.list_collections_with_suffix("orders").await.unwrap();
		found.sort();
		assert_eq!(found, vec!["orders".to_string()]);
	}
}
