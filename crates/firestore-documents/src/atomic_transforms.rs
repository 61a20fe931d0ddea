//! `AtomicTransforms` (§4.5): field-level atomic mutations, each applied in
//! a single backing-store call so the existence/matched-count semantics
//! hold even under concurrent callers (§8 scenario 5).

use std::sync::Arc;

use serde_json::json;

use firestore_query::FieldPathResolver;
use firestore_store::backing_store::BackingStore;
use firestore_store::codec::{decode_document, encode_field_value, plain_json};
use firestore_store::find::FindOneAndUpdateOptions;
use firestore_store::stored_document::StoreFilter;
use firestore_store::update::Update;
use firestore_types::document::Document;
use firestore_types::error::{Error, FsResult};
use firestore_types::field_path::FieldPath;
use firestore_types::field_value::{FieldValue, FieldValueType};
use firestore_types::ids::{DatabaseId, ProjectId};

use crate::clock::now_nanos;
use crate::document_operations::identity_filter;

/// One field-level transform (§4.5 "Operations"). `apply` is the single
/// entry point every variant funnels through; the individual methods on
/// [`AtomicTransforms`] are thin constructors for callers that prefer a
/// named method over building the enum by hand.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicTransform {
	Increment { field: FieldPath, delta: i64 },
	ArrayUnion { field: FieldPath, values: Vec<FieldValue> },
	ArrayRemove { field: FieldPath, values: Vec<FieldValue> },
	ServerTimestamp { field: FieldPath },
	/// Field-level unset; targets a whole top-level field, never a leaf
	/// inside a nested map (§4.5, mirrors the memory adapter's `unset`).
	Delete { fields: Vec<String> },
	SetIfEmpty { field: FieldPath, value: FieldValue },
	Maximum { field: FieldPath, value: FieldValue },
	Minimum { field: FieldPath, value: FieldValue },
}

/// Wraps a single `BackingStore` (already tenant-scoped, §4.10) with the
/// atomic field-transform contract (§4.5). Never creates a document —
/// every transform targets an existing one by identity.
pub struct AtomicTransforms {
	store: Arc<dyn BackingStore>,
	resolver: FieldPathResolver,
}

impl AtomicTransforms {
	pub fn new(store: Arc<dyn BackingStore>) -> Self {
		Self { store, resolver: FieldPathResolver }
	}

	/// Applies `transform` to the document at the standard identity tuple.
	/// `NotFound` when matched-count is 0, except `SetIfEmpty` which
	/// reports `NotFoundOrFieldAlreadyHasValue` instead (§4.5).
	pub async fn apply(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		transform: AtomicTransform,
	) -> FsResult<Document> {
		self.validate(&transform)?;

		let mut filter = identity_filter(&project_id.0, &database_id.0, document_id);
		let mut update = Update::default();
		let now = now_nanos();
		update.set.insert("updateTime".to_string(), json!(now));

		let not_found_err = match &transform {
			AtomicTransform::SetIfEmpty { field, .. } => {
				let existence_ref = format!("fields.{}", field.root());
				add_and_clause(&mut filter, json!({ existence_ref: { "$exists": false } }));
				Error::NotFoundOrFieldAlreadyHasValue
			}
			_ => Error::NotFound,
		};

		match transform {
			AtomicTransform::Increment { field, delta } => {
				let field_ref = self.resolver.resolve(&field, FieldValueType::Int64)?;
				update.inc.insert(field_ref, json!(delta));
			}
			AtomicTransform::ArrayUnion { field, values } => {
				let field_ref = self.resolver.resolve_array(&field)?;
				update.add_to_set.insert(field_ref, values.iter().map(encode_field_value).collect());
			}
			AtomicTransform::ArrayRemove { field, values } => {
				let field_ref = self.resolver.resolve_array(&field)?;
				update.pull_all.insert(field_ref, values.iter().map(encode_field_value).collect());
			}
			AtomicTransform::ServerTimestamp { field } => {
				let field_ref = self.resolver.resolve(&field, FieldValueType::Timestamp)?;
				update.set.insert(field_ref, json!(now));
			}
			AtomicTransform::Delete { fields } => {
				update.unset = fields;
			}
			AtomicTransform::SetIfEmpty { field, value } => {
				let field_ref = self.resolver.resolve(&field, value.value_type())?;
				update.set.insert(field_ref, plain_json(&value));
			}
			AtomicTransform::Maximum { field, value } => {
				let field_ref = self.resolver.resolve(&field, value.value_type())?;
				update.max.insert(field_ref, plain_json(&value));
			}
			AtomicTransform::Minimum { field, value } => {
				let field_ref = self.resolver.resolve(&field, value.value_type())?;
				update.min.insert(field_ref, plain_json(&value));
			}
		}

		let opts = FindOneAndUpdateOptions { upsert: false, return_new: true, sort: Vec::new() };
		let stored = self.store.find_one_and_update(collection_id, &filter, &update, &opts).await?.ok_or(not_found_err)?;
		decode_document(&stored)
	}

	fn validate(&self, transform: &AtomicTransform) -> FsResult<()> {
		match transform {
			AtomicTransform::ArrayUnion { values, .. } | AtomicTransform::ArrayRemove { values, .. } => {
				if values.is_empty() {
					return Err(Error::InvalidArgument("array union/remove requires a non-empty values sequence".into()));
				}
			}
			AtomicTransform::Delete { fields } => {
				if fields.is_empty() {
					return Err(Error::InvalidArgument("delete transform requires a non-empty field list".into()));
				}
			}
			_ => {}
		}
		Ok(())
	}

	pub async fn increment(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		field: FieldPath,
		delta: i64,
	) -> FsResult<Document> {
		self.apply(project_id, database_id, collection_id, document_id, AtomicTransform::Increment { field, delta }).await
	}

	pub async fn array_union(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		field: FieldPath,
		values: Vec<FieldValue>,
	) -> FsResult<Document> {
		self.apply(project_id, database_id, collection_id, document_id, AtomicTransform::ArrayUnion { field, values }).await
	}

	pub async fn array_remove(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		field: FieldPath,
		values: Vec<FieldValue>,
	) -> FsResult<Document> {
		self.apply(project_id, database_id, collection_id, document_id, AtomicTransform::ArrayRemove { field, values }).await
	}

	pub async fn server_timestamp(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		field: FieldPath,
	) -> FsResult<Document> {
		self.apply(project_id, database_id, collection_id, document_id, AtomicTransform::ServerTimestamp { field }).await
	}

	pub async fn delete_fields(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		fields: Vec<String>,
	) -> FsResult<Document> {
		self.apply(project_id, database_id, collection_id, document_id, AtomicTransform::Delete { fields }).await
	}

	pub async fn set_if_empty(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		field: FieldPath,
		value: FieldValue,
	) -> FsResult<Document> {
		self.apply(project_id, database_id, collection_id, document_id, AtomicTransform::SetIfEmpty { field, value }).await
	}

	pub async fn maximum(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		field: FieldPath,
		value: FieldValue,
	) -> FsResult<Document> {
		self.apply(project_id, database_id, collection_id, document_id, AtomicTransform::Maximum { field, value }).await
	}

	pub async fn minimum(
		&self,
		project_id: &ProjectId,
		database_id: &DatabaseId,
		collection_id: &str,
		document_id: &str,
		field: FieldPath,
		value: FieldValue,
	) -> FsResult<Document> {
		self.apply(project_id, database_id, collection_id, document_id, AtomicTransform::Minimum { field, value }).await
	}
}

/// Folds an extra clause into a `StoreFilter`'s top-level `$and`, creating
/// one if the filter is currently the bare identity object.
fn add_and_clause(filter: &mut StoreFilter, clause: serde_json::Value) {
	let existing = filter.0.take();
	filter.0 = json!({ "$and": [existing, clause] });
}

#[cfg(test)]
mod tests {
	use super::*;
	use firestore_store_memory::MemoryBackingStore;
	use std::collections::BTreeMap;

	fn ids() -> (ProjectId, DatabaseId) {
		(ProjectId::parse("acme").unwrap(), DatabaseId::parse("(default)").unwrap())
	}

	fn transforms() -> (AtomicTransforms, crate::document_operations::DocumentOperations) {
		let store = Arc::new(MemoryBackingStore::default());
		(AtomicTransforms::new(store.clone()), crate::document_operations::DocumentOperations::new(store))
	}

	#[tokio::test]
	async fn increment_on_missing_document_is_not_found() {
		let (xf, _ops) = transforms();
		let (project, database) = ids();
		let err = xf
			.increment(&project, &database, "orders", "missing", FieldPath::parse("counter").unwrap(), 1)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::NotFound));
	}

	#[tokio::test]
	async fn increment_accumulates_and_bumps_update_time() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("counter".to_string(), FieldValue::Int64(5));
		let created = ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let updated = xf
			.increment(&project, &database, "orders", "o1", FieldPath::parse("counter").unwrap(), 3)
			.await
			.unwrap();
		assert_eq!(updated.fields.get("counter"), Some(&FieldValue::Int64(8)));
		assert!(updated.update_time >= created.update_time);
	}

	#[tokio::test]
	async fn increment_by_zero_is_a_value_noop_but_bumps_update_time() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("counter".to_string(), FieldValue::Int64(5));
		ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let updated =
			xf.increment(&project, &database, "orders", "o1", FieldPath::parse("counter").unwrap(), 0).await.unwrap();
		assert_eq!(updated.fields.get("counter"), Some(&FieldValue::Int64(5)));
	}

	#[tokio::test]
	async fn array_union_is_idempotent() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		ops.create(project.clone(), database.clone(), "orders", "o1", BTreeMap::new()).await.unwrap();

		let field = FieldPath::parse("tags").unwrap();
		xf.array_union(&project, &database, "orders", "o1", field.clone(), vec![FieldValue::String("x".into())])
			.await
			.unwrap();
		let again = xf
			.array_union(&project, &database, "orders", "o1", field, vec![FieldValue::String("x".into())])
			.await
			.unwrap();
		assert_eq!(again.fields.get("tags"), Some(&FieldValue::Array(vec![FieldValue::String("x".into())])));
	}

	#[tokio::test]
	async fn array_remove_drops_matching_elements() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("tags".to_string(), FieldValue::Array(vec![FieldValue::String("x".into()), FieldValue::String("y".into())]));
		ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let updated = xf
			.array_remove(&project, &database, "orders", "o1", FieldPath::parse("tags").unwrap(), vec![FieldValue::String("x".into())])
			.await
			.unwrap();
		assert_eq!(updated.fields.get("tags"), Some(&FieldValue::Array(vec![FieldValue::String("y".into())])));
	}

	#[tokio::test]
	async fn server_timestamp_writes_a_timestamp_value() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		ops.create(project.clone(), database.clone(), "orders", "o1", BTreeMap::new()).await.unwrap();

		let updated =
			xf.server_timestamp(&project, &database, "orders", "o1", FieldPath::parse("syncedAt").unwrap()).await.unwrap();
		assert!(matches!(updated.fields.get("syncedAt"), Some(FieldValue::Timestamp(_))));
	}

	#[tokio::test]
	async fn delete_removes_named_fields() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("a".to_string(), FieldValue::Int64(1));
		fields.insert("b".to_string(), FieldValue::Int64(2));
		ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let updated = xf.delete_fields(&project, &database, "orders", "o1", vec!["a".to_string()]).await.unwrap();
		assert!(!updated.fields.contains_key("a"));
		assert_eq!(updated.fields.get("b"), Some(&FieldValue::Int64(2)));
	}

	#[tokio::test]
	async fn set_if_empty_succeeds_once_then_fails() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		ops.create(project.clone(), database.clone(), "orders", "o1", BTreeMap::new()).await.unwrap();

		let field = FieldPath::parse("status").unwrap();
		let first = xf
			.set_if_empty(&project, &database, "orders", "o1", field.clone(), FieldValue::String("active".into()))
			.await
			.unwrap();
		assert_eq!(first.fields.get("status"), Some(&FieldValue::String("active".into())));

		let second =
			xf.set_if_empty(&project, &database, "orders", "o1", field, FieldValue::String("active".into())).await.unwrap_err();
		assert!(matches!(second, Error::NotFoundOrFieldAlreadyHasValue));
	}

	#[tokio::test]
	async fn maximum_keeps_the_larger_value() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("high".to_string(), FieldValue::Int64(10));
		ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let updated =
			xf.maximum(&project, &database, "orders", "o1", FieldPath::parse("high").unwrap(), FieldValue::Int64(3)).await.unwrap();
		assert_eq!(updated.fields.get("high"), Some(&FieldValue::Int64(10)));
	}

	#[tokio::test]
	async fn minimum_keeps_the_smaller_value() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		let mut fields = BTreeMap::new();
		fields.insert("low".to_string(), FieldValue::Int64(10));
		ops.create(project.clone(), database.clone(), "orders", "o1", fields).await.unwrap();

		let updated =
			xf.minimum(&project, &database, "orders", "o1", FieldPath::parse("low").unwrap(), FieldValue::Int64(3)).await.unwrap();
		assert_eq!(updated.fields.get("low"), Some(&FieldValue::Int64(3)));
	}

	#[tokio::test]
	async fn array_union_rejects_empty_values() {
		let (xf, ops) = transforms();
		let (project, database) = ids();
		ops.create(project.clone(), database.clone(), "orders", "o1", BTreeMap::new()).await.unwrap();
		let err = xf.array_union(&project, &database, "orders", "o1", FieldPath::parse("tags").unwrap(), vec![]).await.unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)));
	}
}
