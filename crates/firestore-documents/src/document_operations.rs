//! `DocumentOperations` (§4.4): `Get`/`Create`/`Update`/`Set`/`Delete` and
//! their `*ByPath` variants, `List`, `BatchWrite`, `RunTransaction`.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

use firestore_store::backing_store::BackingStore;
use firestore_store::codec::{decode_document, encode_document};
use firestore_store::cursor::collect_documents;
use firestore_store::find::{FindOptions, SortDirection};
use firestore_store::stored_document::{StoreFilter, StoredDocument};
use firestore_store::transaction::StoreTransaction;
use firestore_store::update::{Update, UpdateResult};
use firestore_types::document::{Document, DocumentIdentity};
use firestore_types::error::{Error, FsResult};
use firestore_types::field_value::FieldValue;
use firestore_types::ids::{DatabaseId, ProjectId};
use firestore_types::prelude::{debug, warn};

use crate::canonical_path::parse_document_path;
use crate::clock::now_nanos;

/// `orderBy` keys `List` accepts (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrderField {
	DocumentId,
	CreateTime,
	UpdateTime,
}

impl ListOrderField {
	fn metadata_key(self) -> &'static str {
		match self {
			Self::DocumentId => "documentID",
			Self::CreateTime => "createTime",
			Self::UpdateTime => "updateTime",
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct ListOrder {
	pub field: ListOrderField,
	pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct ListPage {
	pub documents: Vec<Document>,
	pub next_page_token: Option<String>,
}

/// One write in a `BatchWrite` call (§4.4), addressed by canonical path —
/// applied in order with no cross-op atomicity; each result is reported
/// independently.
#[derive(Debug, Clone)]
pub enum WriteOp {
	Create { full_path: String, fields: BTreeMap<String, FieldValue> },
	Update { full_path: String, fields: BTreeMap<String, FieldValue>, update_mask: Option<Vec<String>> },
	Set { full_path: String, fields: BTreeMap<String, FieldValue>, merge: bool },
	Delete { full_path: String },
}

pub(crate) fn identity_filter(project_id: &str, database_id: &str, document_id: &str) -> StoreFilter {
	StoreFilter(json!({
		"$and": [
			{ "projectID": { "$eq": project_id } },
			{ "databaseID": { "$eq": database_id } },
			{ "documentID": { "$eq": document_id } },
		]
	}))
}

/// The session `RunTransaction`'s closure operates on (§4.4, §6.2). Backed
/// by the store's real `StoreTransaction` when available; otherwise every
/// call goes straight to the plain `BackingStore` (§9 "Transactions
/// fallback") — the closure's code is identical either way, only the
/// snapshot/isolation guarantee differs.
pub enum Transaction {
	Backed(Box<dyn StoreTransaction>),
	Fallback(Arc<dyn BackingStore>),
}

impl Transaction {
	pub async fn find_one(&mut self, collection_id: &str, filter: &StoreFilter) -> FsResult<Option<StoredDocument>> {
		match self {
			Self::Backed(txn) => txn.find_one(collection_id, filter).await,
			Self::Fallback(store) => store.find_one(collection_id, filter).await,
		}
	}

	pub async fn insert_one(&mut self, collection_id: &str, doc: StoredDocument) -> FsResult<String> {
		match self {
			Self::Backed(txn) => txn.insert_one(collection_id, doc).await,
			Self::Fallback(store) => store.insert_one(collection_id, doc).await,
		}
	}

	pub async fn update_one(&mut self, collection_id: &str, filter: &StoreFilter, update: &Update) -> FsResult<UpdateResult> {
		match self {
			Self::Backed(txn) => txn.update_one(collection_id, filter, update).await,
			Self::Fallback(store) => store.update_one(collection_id, filter, update).await,
		}
	}

	pub async fn delete_one(&mut self, collection_id: &str, filter: &StoreFilter) -> FsResult<u64> {
		match self {
			Self::Backed(txn) => txn.delete_one(collection_id, filter).await,
			Self::Fallback(store) => store.delete_one(collection_id, filter).await,
		}
	}
}

/// A `RunTransaction` closure, boxed so it can borrow the `&mut Transaction`
/// it's handed without forcing a named lifetime onto `run_transaction`'s
/// signature (no stable `AsyncFnOnce` at this crate's MSRV).
pub type TransactionFuture<'a, T> = Pin<Box<dyn Future<Output = FsResult<T>> + Send + 'a>>;

/// Wraps a single `BackingStore` (already scoped to one tenant by whatever
/// injected it, §4.10) with the document-level CRUD contract (§4.4).
pub struct DocumentOperations {
	store: Arc<dyn BackingStore>,
}

impl DocumentOperations {
	pub fn new(store: Arc<dyn BackingStore>) -> Self {
		Self { store }
	}

	pub async fn get(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
	) -> FsResult<Document> {
		let filter = identity_filter(&project_id.0, &database_id.0, document_id);
		let stored = self.store.find_one(collection_id, &filter).await?.ok_or(Error::NotFound)?;
		decode_document(&stored)
	}

	pub async fn get_by_path(&self, full_path: &str) -> FsResult<Document> {
		let identity = parse_document_path(full_path)?;
		self.get(&identity.project_id, &identity.database_id, &identity.collection_id, &identity.document_id).await
	}

	/// `Create`: `AlreadyExists` if a document with this identity is already
	/// present. The existence check and the insert are two separate
	/// backing-store calls — concurrent creators can both observe "absent"
	/// and both insert, same as any non-transactional adapter;
	/// `RunTransaction` is the documented escape hatch when that race matters.
	pub async fn create(
		&self,
		project_id: ProjectId,
		database_id: DatabaseId,
		collection_id: impl Into<String>,
		document_id: impl Into<String>,
		fields: BTreeMap<String, FieldValue>,
	) -> FsResult<Document> {
		let collection_id = collection_id.into();
		let document_id = document_id.into();
		let filter = identity_filter(&project_id.0, &database_id.0, &document_id);
		if self.store.find_one(&collection_id, &filter).await?.is_some() {
			return Err(Error::AlreadyExists);
		}
		let identity = DocumentIdentity::new(project_id, database_id, collection_id.clone(), document_id)?;
		let now = now_nanos();
		let document = Document::new(identity, fields, now, now, 1, true)?;
		self.store.insert_one(&collection_id, encode_document(&document)).await?;
		debug!(collection = %collection_id, document_id = %document.identity.document_id, "created document");
		Ok(document)
	}

	pub async fn create_by_path(&self, full_path: &str, fields: BTreeMap<String, FieldValue>) -> FsResult<Document> {
		let identity = parse_document_path(full_path)?;
		self.create(identity.project_id, identity.database_id, identity.collection_id, identity.document_id, fields)
			.await
	}

	/// `Update`: empty `update_mask` replaces the whole `fields` map; a
	/// non-empty mask updates only the named fields (absent from `fields` ⇒
	/// removed). Reads the current document first so `createTime` survives
	/// and a whole-map replace knows which stale fields to drop — `Update`
	/// carries no single-backing-store-call atomicity requirement (unlike
	/// `AtomicTransforms`, §4.5), so this is acceptable.
	pub async fn update(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		fields: BTreeMap<String, FieldValue>,
		update_mask: Option<Vec<String>>,
	) -> FsResult<Document> {
		let filter = identity_filter(&project_id.0, &database_id.0, document_id);
		let current = self.store.find_one(collection_id, &filter).await?.ok_or(Error::NotFound)?;

		let merged_fields = match update_mask {
			None => fields,
			Some(mask) if mask.is_empty() => fields,
			Some(mask) => {
				let mut merged = decode_document(&current)?.fields;
				for name in mask {
					match fields.get(&name) {
						Some(value) => {
							merged.insert(name, value.clone());
						}
						None => {
							merged.remove(&name);
						}
					}
				}
				merged
			}
		};

		let identity = DocumentIdentity::new(
			ProjectId::parse(current.project_id.clone())?,
			DatabaseId::parse(current.database_id.clone())?,
			collection_id.to_string(),
			document_id.to_string(),
		)?;
		let now = now_nanos();
		let document = Document::new(identity, merged_fields, current.create_time, now, current.version + 1, true)?;
		let result = self.store.replace_one(collection_id, &filter, encode_document(&document), false).await?;
		if result.matched_count == 0 {
			return Err(Error::NotFound);
		}
		Ok(document)
	}

	pub async fn update_by_path(
		&self,
		full_path: &str,
		fields: BTreeMap<String, FieldValue>,
		update_mask: Option<Vec<String>>,
	) -> FsResult<Document> {
		let identity = parse_document_path(full_path)?;
		self.update(
			&identity.project_id,
			&identity.database_id,
			&identity.collection_id,
			&identity.document_id,
			fields,
			update_mask,
		)
		.await
	}

	/// `Set`: `merge=false` upserts a full replacement, preserving
	/// `createTime` only when the document already existed; `merge=true`
	/// upserts field-by-field, leaving fields absent from `fields`
	/// untouched.
	pub async fn set(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		fields: BTreeMap<String, FieldValue>,
		merge: bool,
	) -> FsResult<Document> {
		let filter = identity_filter(&project_id.0, &database_id.0, document_id);
		let current = self.store.find_one(collection_id, &filter).await?;
		let now = now_nanos();

		let (create_time, version, merged_fields) = match (&current, merge) {
			(Some(stored), true) => {
				let mut merged = decode_document(stored)?.fields;
				for (name, value) in fields {
					merged.insert(name, value);
				}
				(stored.create_time, stored.version + 1, merged)
			}
			(Some(stored), false) => (stored.create_time, stored.version + 1, fields),
			(None, _) => (now, 1, fields),
		};

		let identity =
			DocumentIdentity::new(project_id.clone(), database_id.clone(), collection_id.to_string(), document_id.to_string())?;
		let document = Document::new(identity, merged_fields, create_time, now, version, true)?;
		self.store.replace_one(collection_id, &filter, encode_document(&document), true).await?;
		Ok(document)
	}

	pub async fn set_by_path(
		&self,
		full_path: &str,
		fields: BTreeMap<String, FieldValue>,
		merge: bool,
	) -> FsResult<Document> {
		let identity = parse_document_path(full_path)?;
		self.set(&identity.project_id, &identity.database_id, &identity.collection_id, &identity.document_id, fields, merge)
			.await
	}

	pub async fn delete(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
	) -> FsResult<()> {
		let filter = identity_filter(&project_id.0, &database_id.0, document_id);
		let deleted = self.store.delete_one(collection_id, &filter).await?;
		if deleted == 0 {
			return Err(Error::NotFound);
		}
		Ok(())
	}

	pub async fn delete_by_path(&self, full_path: &str) -> FsResult<()> {
		let identity = parse_document_path(full_path)?;
		self.delete(&identity.project_id, &identity.database_id, &identity.collection_id, &identity.document_id).await
	}

	/// `List(p,d,c,pageSize,pageToken,orderBy,showMissing)` (§4.4). The page
	/// token is an opaque base64-encoded row offset: simple, terminates
	/// (offsets strictly increase and are bounded by the collection size),
	/// and makes forward progress on every call that returns a non-empty
	/// page.
	pub async fn list(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		page_size: u32,
		page_token: Option<&str>,
		order_by: &[ListOrder],
		show_missing: bool,
	) -> FsResult<ListPage> {
		let offset = decode_page_token(page_token)?;

		let mut clauses = vec![
			json!({ "projectID": { "$eq": project_id.0.clone() } }),
			json!({ "databaseID": { "$eq": database_id.0.clone() } }),
		];
		if !show_missing {
			clauses.push(json!({ "exists": { "$eq": true } }));
		}
		let filter = StoreFilter(json!({ "$and": clauses }));

		let sort = if order_by.is_empty() {
			vec![("documentID".to_string(), SortDirection::Asc)]
		} else {
			order_by
				.iter()
				.map(|o| {
					(o.field.metadata_key().to_string(), if o.descending { SortDirection::Desc } else { SortDirection::Asc })
				})
				.collect()
		};

		let opts = FindOptions { sort, skip: Some(offset), limit: Some(u64::from(page_size) + 1), projection: None };
		let cursor = self.store.find(collection_id, &filter, &opts).await?;
		let mut stored = collect_documents(cursor).await?;

		let has_more = stored.len() as u64 > u64::from(page_size);
		stored.truncate(page_size as usize);
		let documents = stored.iter().map(decode_document).collect::<FsResult<Vec<_>>>()?;

		let next_page_token = has_more.then(|| encode_page_token(offset + u64::from(page_size)));
		Ok(ListPage { documents, next_page_token })
	}

	/// `BatchWrite([WriteOp])` (§4.4): applies writes in order; each op's
	/// result is reported independently, with no rollback on a later
	/// failure.
	pub async fn batch_write(&self, ops: Vec<WriteOp>) -> Vec<FsResult<Option<Document>>> {
		let mut results = Vec::with_capacity(ops.len());
		for op in ops {
			let result = match op {
				WriteOp::Create { full_path, fields } => self.create_by_path(&full_path, fields).await.map(Some),
				WriteOp::Update { full_path, fields, update_mask } => {
					self.update_by_path(&full_path, fields, update_mask).await.map(Some)
				}
				WriteOp::Set { full_path, fields, merge } => self.set_by_path(&full_path, fields, merge).await.map(Some),
				WriteOp::Delete { full_path } => self.delete_by_path(&full_path).await.map(|()| None),
			};
			if let Err(ref err) = result {
				warn!("batch write op failed: {err}");
			}
			results.push(result);
		}
		results
	}

	/// `RunTransaction`: uses the backing store's transaction primitive when
	/// available, committing on success and aborting on error; falls back to
	/// running `f` against the plain store otherwise, surfacing a warning
	/// (§4.4, §9 "Transactions fallback"). Writes remain per-op atomic
	/// either way.
	pub async fn run_transaction<T>(&self, f: impl for<'a> FnOnce(&'a mut Transaction) -> TransactionFuture<'a, T>) -> FsResult<T> {
		let mut transaction = match self.store.begin_transaction().await? {
			Some(txn) => Transaction::Backed(txn),
			None => {
				warn!("backing store has no transaction primitive; RunTransaction executing non-transactionally");
				Transaction::Fallback(Arc::clone(&self.store))
			}
		};

		let result = f(&mut transaction).await;

		match transaction {
			Transaction::Backed(txn) => {
				if result.is_ok() {
					txn.commit().await?;
				} else {
					txn.abort().await?;
				}
			}
			Transaction::Fallback(_) => {}
		}

		result
	}
}

fn encode_page_token(offset: u64) -> String {
	URL_SAFE_NO_PAD.encode(offset.to_string())
}

fn decode_page_token(token: Option<&str>) -> FsResult<u64> {
	let Some(token) = token.filter(|t| !t.is_empty()) else { return Ok(0) };
	let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| Error::InvalidArgument("malformed page token".into()))?;
	let text = String::from_utf8(raw).map_err(|_| Error::InvalidArgument("malformed page token".into()))?;
	text.parse::<u64>().map_err(|_| Error::InvalidArgument("malformed page token".into()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use firestore_store_memory::MemoryBackingStore;

	fn ids() -> (ProjectId, DatabaseId) {
		(ProjectId::parse("acme").unwrap(), DatabaseId::parse("(default)").unwrap())
	}

	fn ops() -> DocumentOperations {
		DocumentOperations::new(Arc::new(MemoryBackingStore::default()))
	}

	#[tokio::test]
	async fn create_then_get_round_trips() {
		let ops = ops();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("status".to_string(), FieldValue::String("paid".into()));
		let created = ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();
		assert_eq!(created.version, 1);

		let fetched = ops.get(&project, &database, "orders", "o1").await.unwrap();
		assert_eq!(fetched.fields.get("status"), Some(&FieldValue::String("paid".into())));
	}

	#[tokio::test]
	async fn create_twice_is_already_exists() {
		let ops = ops();
		let (project, database) = ids();
		ops.create(project.clone(), database.clone(), "orders", "o1", BTreeMap::new()).await.unwrap();
		let err = ops.create(project, database, "orders", "o1", BTreeMap::new()).await.unwrap_err();
		assert!(matches!(err, Error::AlreadyExists));
	}

	#[tokio::test]
	async fn update_with_empty_mask_replaces_whole_document() {
		let ops = ops();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("a".to_string(), FieldValue::Int64(1));
		fields.insert("b".to_string(), FieldValue::Int64(2));
		ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let mut replacement = BTreeMap::new();
		replacement.insert("a".to_string(), FieldValue::Int64(9));
		let updated = ops.update(&project, &database, "orders", "o1", replacement, None).await.unwrap();
		assert_eq!(updated.version, 2);
		assert_eq!(updated.fields.get("a"), Some(&FieldValue::Int64(9)));
		assert!(!updated.fields.contains_key("b"));
	}

	#[tokio::test]
	async fn update_with_mask_preserves_unlisted_fields() {
		let ops = ops();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("a".to_string(), FieldValue::Int64(1));
		fields.insert("b".to_string(), FieldValue::Int64(2));
		ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let mut patch = BTreeMap::new();
		patch.insert("a".to_string(), FieldValue::Int64(9));
		let updated =
			ops.update(&project, &database, "orders", "o1", patch, Some(vec!["a".to_string()])).await.unwrap();
		assert_eq!(updated.fields.get("a"), Some(&FieldValue::Int64(9)));
		assert_eq!(updated.fields.get("b"), Some(&FieldValue::Int64(2)));
	}

	#[tokio::test]
	async fn update_missing_document_is_not_found() {
		let ops = ops();
		let (project, database) = ids();
		let err = ops.update(&project, &database, "orders", "missing", BTreeMap::new(), None).await.unwrap_err();
		assert!(matches!(err, Error::NotFound));
	}

	#[tokio::test]
	async fn set_with_merge_preserves_unspecified_fields() {
		let ops = ops();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("a".to_string(), FieldValue::Int64(1));
		ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let mut patch = BTreeMap::new();
		patch.insert("b".to_string(), FieldValue::Int64(2));
		let merged = ops.set(&project, &database, "orders", "o1", patch, true).await.unwrap();
		assert_eq!(merged.fields.get("a"), Some(&FieldValue::Int64(1)));
		assert_eq!(merged.fields.get("b"), Some(&FieldValue::Int64(2)));
	}

	#[tokio::test]
	async fn set_without_merge_upserts_fresh_document() {
		let ops = ops();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("a".to_string(), FieldValue::Int64(1));
		let created = ops.set(&project, &database, "orders", "o1", fields, false).await.unwrap();
		assert_eq!(created.version, 1);
	}

	#[tokio::test]
	async fn delete_then_delete_again_is_not_found() {
		let ops = ops();
		let (project, database) = ids();
		ops.create(project.clone(), database.clone(), "orders", "o1", BTreeMap::new()).await.unwrap();
		ops.delete(&project, &database, "orders", "o1").await.unwrap();
		let err = ops.delete(&project, &database, "orders", "o1").await.unwrap_err();
		assert!(matches!(err, Error::NotFound));
	}

	#[tokio::test]
	async fn list_paginates_with_opaque_token() {
		let ops = ops();
		let (project, database) = ids();
		for i in 0..5 {
			ops.create(project.clone(), database.clone(), "orders", format!("o{i}"), BTreeMap::new()).await.unwrap();
		}
		let page1 = ops.list(&project, &database, "orders", 2, None, &[], false).await.unwrap();
		assert_eq!(page1.documents.len(), 2);
		assert!(page1.next_page_token.is_some());

		let page2 = ops.list(&project, &database, "orders", 2, page1.next_page_token.as_deref(), &[], false).await.unwrap();
		assert_eq!(page2.documents.len(), 2);

		let page3 = ops.list(&project, &database, "orders", 2, page2.next_page_token.as_deref(), &[], false).await.unwrap();
		assert_eq!(page3.documents.len(), 1);
		assert!(page3.next_page_token.is_none());
	}

	#[tokio::test]
	async fn get_by_path_parses_canonical_path() {
		let ops = ops();
		let (project, database) = ids();
		ops.create(project, database, "orders", "o1", BTreeMap::new()).await.unwrap();
		let doc = ops.get_by_path("projects/acme/databases/(default)/documents/orders/o1").await.unwrap();
		assert_eq!(doc.identity.document_id, "o1");
	}

	#[tokio::test]
	async fn batch_write_reports_per_op_results() {
		let ops = ops();
		let mut fields = BTreeMap::new();
		fields.insert("a".to_string(), FieldValue::Int64(1));
		let batch = vec![
			WriteOp::Create { full_path: "projects/acme/databases/(default)/documents/orders/o1".into(), fields },
			WriteOp::Delete { full_path: "projects/acme/databases/(default)/documents/orders/missing".into() },
		];
		let results = ops.batch_write(batch).await;
		assert!(results[0].is_ok());
		assert!(matches!(results[1], Err(Error::NotFound)));
	}

	#[tokio::test]
	async fn run_transaction_falls_back_when_store_has_no_transactions() {
		let ops = ops();
		let (project, database) = ids();
		ops.create(project.clone(), database.clone(), "orders", "o1", BTreeMap::new()).await.unwrap();

		let filter = identity_filter(&project.0, &database.0, "o1");
		let found = ops
			.run_transaction(|txn| Box::pin(async move { txn.find_one("orders", &filter).await }))
			.await
			.unwrap();
		assert!(found.is_some());
	}
}
