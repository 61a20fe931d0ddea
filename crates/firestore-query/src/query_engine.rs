//! Validate, plan, and execute queries: filter + sort + cursor + projection
//! (§4.3).

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use firestore_store::backing_store::BackingStore;
use firestore_store::codec::decode_document;
use firestore_store::cursor::{collect_documents, collect_pipeline};
use firestore_store::find::{FindOptions, SortDirection};
use firestore_store::stored_document::StoreFilter;
use firestore_types::document::Document;
use firestore_types::error::FsResult;
use firestore_types::field_path::FieldPath;
use firestore_types::field_value::FieldValue;
use firestore_types::prelude::debug;
use firestore_types::query::{Capabilities, Cursor, Direction, Order, Query};

use crate::field_path_resolver::FieldPathResolver;
use crate::filter_compiler::{field_value_to_json, FilterCompiler};
use crate::type_inference_cache::{TypeInferenceCache, TypeInferenceCacheConfig};

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngineConfig {
	pub type_cache: TypeInferenceCacheConfig,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CursorEdge {
	StartAt,
	StartAfter,
	EndAt,
	EndBefore,
}

/// Owns the type cache it needs (§3 "Ownership": each engine instance
/// exclusively owns its caches); the backing store is injected.
pub struct QueryEngine {
	store: Arc<dyn BackingStore>,
	filter_compiler: FilterCompiler,
	resolver: FieldPathResolver,
	type_cache: TypeInferenceCache,
}

impl QueryEngine {
	pub fn new(store: Arc<dyn BackingStore>, config: QueryEngineConfig) -> Self {
		Self {
			store,
			filter_compiler: FilterCompiler::new(),
			resolver: FieldPathResolver,
			type_cache: TypeInferenceCache::new(config.type_cache),
		}
	}

	pub fn validate(&self, query: &Query) -> FsResult<()> {
		query.validate()
	}

	/// `Execute(collectionPath, q) → [Document]` (§4.3).
	pub async fn execute(&self, collection_path: &str, query: &Query) -> FsResult<Vec<Document>> {
		self.validate(query)?;
		if query.limit == Some(0) {
			// §8 boundary: `limit=0` never reaches the backing store.
			return Ok(Vec::new());
		}
		if query.all_descendants {
			self.execute_collection_group(collection_path, query).await
		} else {
			self.execute_single_collection(collection_path, query).await
		}
	}

	/// `ExecuteWithProjection` (§4.3): `Execute` with `selectFields` set,
	/// always widened with the metadata fields every projection carries.
	pub async fn execute_with_projection(
		&self,
		collection_path: &str,
		query: &Query,
		fields: Vec<FieldPath>,
	) -> FsResult<Vec<Document>> {
		let mut projected = query.clone();
		projected.select_fields = Some(fields);
		self.execute(collection_path, &projected).await
	}

	/// `Count(collectionPath, q) → int64`, ignoring cursor and limit (§4.3).
	pub async fn count(&self, collection_path: &str, query: &Query) -> FsResult<i64> {
		self.validate(query)?;
		let filter = self
			.filter_compiler
			.compile_all(collection_path, &query.filters, &self.type_cache, self.store.as_ref())
			.await?;
		let n = self.store.count_documents(collection_path, &filter).await?;
		Ok(n as i64)
	}

	/// `ExecutePipeline` (§4.3): escape hatch for aggregation-style
	/// execution; stage vocabulary is delegated to the backing store (§9).
	pub async fn execute_pipeline(&self, collection_path: &str, stages: &[JsonValue]) -> FsResult<Vec<JsonValue>> {
		let cursor = self.store.aggregate(collection_path, stages).await?;
		collect_pipeline(cursor).await
	}

	pub fn capabilities(&self) -> Capabilities {
		Capabilities::default()
	}

	async fn execute_single_collection(&self, collection_path: &str, query: &Query) -> FsResult<Vec<Document>> {
		let mut docs = self.fetch_matching_documents(collection_path, query).await?;
		finalize_limit(&mut docs, query);
		Ok(docs)
	}

	/// Runs the compiled query against one physical collection and decodes
	/// the hits, applying no limit of its own when `limit_to_last` is set
	/// (§4.3 "limitToLast semantics": the store-side `limit` would truncate
	/// to the *first* N in the configured order, not the last N — see
	/// [`build_find_options`]). Callers finish the job with [`finalize_limit`].
	async fn fetch_matching_documents(&self, collection_path: &str, query: &Query) -> FsResult<Vec<Document>> {
		let store_filter = self.build_store_filter(collection_path, query).await?;
		let find_opts = self.build_find_options(query)?;
		let cursor = self.store.find(collection_path, &store_filter, &find_opts).await?;
		let stored = collect_documents(cursor).await?;
		stored.iter().map(decode_document).collect::<FsResult<Vec<_>>>()
	}

	/// §4.3 "Collection-group queries": enumerate every concrete collection
	/// whose suffix matches `collection_id`, run the compiled query against
	/// each, and union the results. Per-collection limit/offset are applied
	/// locally (the backing store has no cross-collection cursor); the
	/// union is then re-sorted and `limitToLast`/`limit` are applied exactly
	/// once, against the whole union rather than each sub-collection.
	async fn execute_collection_group(&self, collection_id: &str, query: &Query) -> FsResult<Vec<Document>> {
		let collections = self.store.list_collections_with_suffix(collection_id).await?;
		debug!(collection_id, count = collections.len(), "collection-group fan-out");
		let mut all = Vec::new();
		for collection_path in collections {
			let mut docs = self.fetch_matching_documents(&collection_path, query).await?;
			all.append(&mut docs);
		}
		order_results(&mut all, &query.orders);
		finalize_limit(&mut all, query);
		Ok(all)
	}

	async fn build_store_filter(&self, collection_path: &str, query: &Query) -> FsResult<StoreFilter> {
		let user_filter = self
			.filter_compiler
			.compile_all(collection_path, &query.filters, &self.type_cache, self.store.as_ref())
			.await?;
		let mut clauses = vec![user_filter.0];

		if let Some(cursor) = &query.start_at {
			clauses.extend(self.build_cursor_clauses(&query.orders, cursor, CursorEdge::StartAt)?);
		} else if let Some(cursor) = &query.start_after {
			clauses.extend(self.build_cursor_clauses(&query.orders, cursor, CursorEdge::StartAfter)?);
		}
		if let Some(cursor) = &query.end_at {
			clauses.extend(self.build_cursor_clauses(&query.orders, cursor, CursorEdge::EndAt)?);
		} else if let Some(cursor) = &query.end_before {
			clauses.extend(self.build_cursor_clauses(&query.orders, cursor, CursorEdge::EndBefore)?);
		}

		if clauses.len() == 1 {
			return Ok(StoreFilter(clauses.remove(0)));
		}
		Ok(StoreFilter(json!({ "$and": clauses })))
	}

	/// One clause per `Order[i]` (§4.3 "Cursor algorithm"). Uses the
	/// cursor value's own type tag to resolve the field reference, since —
	/// unlike a bare sort key — a cursor clause always carries a concrete
	/// typed value.
	fn build_cursor_clauses(&self, orders: &[Order], cursor: &Cursor, edge: CursorEdge) -> FsResult<Vec<JsonValue>> {
		let mut clauses = Vec::with_capacity(cursor.values.len());
		for (i, value) in cursor.values.iter().enumerate() {
			let Some(order) = orders.get(i) else {
				continue;
			};
			let field_ref = self.resolver.resolve(&order.field_path, value.value_type())?;
			let op = cursor_operator(edge, order.direction);
			clauses.push(json!({ field_ref: { op: field_value_to_json(value) } }));
		}
		Ok(clauses)
	}

	fn build_find_options(&self, query: &Query) -> FsResult<FindOptions> {
		let sort = query
			.orders
			.iter()
			.map(|order| {
				// §4.3 "Ordering": order-mode resolution defaults to the
				// string tag when no value type is available, which is
				// always the case for a bare `Order`.
				let field_ref = self.resolver.resolve_default(&order.field_path)?;
				let direction = match order.direction {
					Direction::Asc => SortDirection::Asc,
					Direction::Desc => SortDirection::Desc,
				};
				Ok((field_ref, direction))
			})
			.collect::<FsResult<Vec<_>>>()?;

		let projection = query.select_fields.as_ref().map(|fields| {
			let mut names: Vec<String> = fields.iter().map(FieldPath::as_dotted).collect();
			names.extend(
				[
					"projectID",
					"databaseID",
					"collectionID",
					"documentID",
					"path",
					"parentPath",
					"createTime",
					"updateTime",
					"version",
					"exists",
				]
				.iter()
				.map(|s| (*s).to_string()),
			);
			names
		});

		Ok(FindOptions {
			sort,
			skip: query.offset.map(u64::from),
			// A `limitToLast` query must see every candidate in the
			// configured order — the last N can only be recovered from the
			// full result, not from the store's own first-N truncation.
			limit: if query.limit_to_last { None } else { query.limit.map(u64::from) },
			projection,
		})
	}
}

fn cursor_operator(edge: CursorEdge, direction: Direction) -> &'static str {
	use CursorEdge::{EndAt, EndBefore, StartAfter, StartAt};
	use Direction::{Asc, Desc};
	match (edge, direction) {
		(StartAt, Asc) | (EndAt, Desc) => "$gte",
		(StartAt, Desc) | (EndAt, Asc) => "$lte",
		(StartAfter, Asc) | (EndBefore, Desc) => "$gt",
		(StartAfter, Desc) | (EndBefore, Asc) => "$lt",
	}
}

fn field_at_path<'a>(doc: &'a Document, path: &FieldPath) -> Option<&'a FieldValue> {
	let segments = path.segments();
	let mut current = doc.fields.get(segments.first()?)?;
	for segment in &segments[1..] {
		match current {
			FieldValue::Map(m) => current = m.get(segment)?,
			_ => return None,
		}
	}
	Some(current)
}

/// Applies the query's `limit`/`limitToLast` to an already-ordered result
/// set (§4.3 "limitToLast semantics"). `docs` is in the query's configured
/// order, so the last N are recovered by reversing, truncating to the tail,
/// then reversing back — the executed order itself is never inverted, only
/// this local selection is. A plain `limit` (no `limitToLast`) is re-applied
/// here too, since the collection-group union has none applied yet.
fn finalize_limit(docs: &mut Vec<Document>, query: &Query) {
	if query.limit_to_last {
		docs.reverse();
		if let Some(limit) = query.limit {
			docs.truncate(limit as usize);
		}
		docs.reverse();
	} else if let Some(limit) = query.limit {
		docs.truncate(limit as usize);
	}
}

/// §4.3 "ordering across collections is defined only by the query's
/// `orders` (ties broken by `path`)".
fn order_results(docs: &mut [Document], orders: &[Order]) {
	docs.sort_by(|a, b| {
		for order in orders {
			let cmp = match (field_at_path(a, &order.field_path), field_at_path(b, &order.field_path)) {
				(Some(x), Some(y)) => x.partial_cmp_typed(y).unwrap_or(Ordering::Equal),
				(Some(_), None) => Ordering::Greater,
				(None, Some(_)) => Ordering::Less,
				(None, None) => Ordering::Equal,
			};
			let cmp = if order.direction == Direction::Desc { cmp.reverse() } else { cmp };
			if cmp != Ordering::Equal {
				return cmp;
			}
		}
		a.path.cmp(&b.path)
	});
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use firestore_store::codec::encode_document;
	use firestore_store_memory::MemoryBackingStore;
	use firestore_types::document::DocumentIdentity;
	use firestore_types::ids::{DatabaseId, ProjectId};

	use super::*;

	#[test]
	fn default_capabilities_match_spec_boundaries() {
		let caps = Capabilities::default();
		assert_eq!(caps.max_filter_count, 100);
		assert_eq!(caps.max_order_by_count, 32);
		assert_eq!(caps.max_nesting_depth, 100);
	}

	#[test]
	fn cursor_operator_table_matches_spec() {
		assert_eq!(cursor_operator(CursorEdge::StartAt, Direction::Asc), "$gte");
		assert_eq!(cursor_operator(CursorEdge::StartAt, Direction::Desc), "$lte");
		assert_eq!(cursor_operator(CursorEdge::StartAfter, Direction::Asc), "$gt");
		assert_eq!(cursor_operator(CursorEdge::StartAfter, Direction::Desc), "$lt");
		assert_eq!(cursor_operator(CursorEdge::EndAt, Direction::Asc), "$lte");
		assert_eq!(cursor_operator(CursorEdge::EndAt, Direction::Desc), "$gte");
		assert_eq!(cursor_operator(CursorEdge::EndBefore, Direction::Asc), "$lt");
		assert_eq!(cursor_operator(CursorEdge::EndBefore, Direction::Desc), "$gt");
	}

	fn fp(s: &str) -> FieldPath {
		FieldPath::parse(s).unwrap()
	}

	async fn seed(store: &MemoryBackingStore, collection: &str, values: &[i64]) {
		let project = ProjectId::parse("acme").unwrap();
		let database = DatabaseId::parse("(default)").unwrap();
		for x in values {
			let mut fields = BTreeMap::new();
			fields.insert("x".to_string(), FieldValue::Int64(*x));
			let identity =
				DocumentIdentity::new(project.clone(), database.clone(), collection, format!("d{x}")).unwrap();
			let doc = Document::new(identity, fields, 1, 1, 1, true).unwrap();
			store.insert_one(collection, encode_document(&doc)).await.unwrap();
		}
	}

	fn xs(docs: &[Document]) -> Vec<i64> {
		docs.iter()
			.map(|d| match d.fields.get("x") {
				Some(FieldValue::Int64(n)) => *n,
				other => panic!("expected integer x field, got {other:?}"),
			})
			.collect()
	}

	#[tokio::test]
	async fn limit_to_last_keeps_the_tail_in_ascending_order() {
		let store = MemoryBackingStore::default();
		seed(&store, "nums", &[1, 2, 3, 4, 5]).await;

		let engine = QueryEngine::new(Arc::new(store), QueryEngineConfig::default());
		let query = Query {
			orders: vec![Order { field_path: fp("x"), direction: Direction::Asc }],
			limit: Some(2),
			limit_to_last: true,
			..Default::default()
		};

		let docs = engine.execute("nums", &query).await.unwrap();
		assert_eq!(xs(&docs), vec![4, 5]);
	}

	#[tokio::test]
	async fn collection_group_limit_to_last_reverses_the_union_once() {
		let store = MemoryBackingStore::default();
		seed(&store, "a.nums", &[1, 3, 5]).await;
		seed(&store, "b.nums", &[2, 4]).await;

		let engine = QueryEngine::new(Arc::new(store), QueryEngineConfig::default());
		let query = Query {
			all_descendants: true,
			orders: vec![Order { field_path: fp("x"), direction: Direction::Asc }],
			limit: Some(2),
			limit_to_last: true,
			..Default::default()
		};

		let docs = engine.execute("nums", &query).await.unwrap();
		assert_eq!(xs(&docs), vec![4, 5]);
	}
}
