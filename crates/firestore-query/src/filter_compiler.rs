//! Build backing-store filter trees from composite Firestore filters (§4.2).

use serde_json::{json, Map as JsonMap, Value as JsonValue};

use firestore_store::backing_store::BackingStore;
use firestore_store::stored_document::StoreFilter;
use firestore_types::error::{Error, FsResult};
use firestore_types::field_value::{FieldValue, FieldValueType};
use firestore_types::query::{CompositeKind, Filter, Operator};

use crate::field_path_resolver::FieldPathResolver;
use crate::type_inference_cache::TypeInferenceCache;

/// Stateless transform, parameterized by the two collaborators it needs to
/// resolve a leaf's backing-store reference and infer its type when the
/// filter doesn't carry one explicitly (§4.2 "Value typing").
#[derive(Debug, Default)]
pub struct FilterCompiler {
	resolver: FieldPathResolver,
}

impl FilterCompiler {
	pub fn new() -> Self {
		Self { resolver: FieldPathResolver }
	}

	/// Compiles a filter tree into the backing store's native representation.
	/// Empty filter sets and single-child composites are special-cased per
	/// §4.2 "Edge cases".
	pub async fn compile(
		&self,
		collection_path: &str,
		filter: &Filter,
		type_cache: &TypeInferenceCache,
		store: &dyn BackingStore,
	) -> FsResult<StoreFilter> {
		Ok(StoreFilter(self.compile_node(collection_path, filter, type_cache, store).await?))
	}

	/// Compiles a top-level filter *list* (as carried by `Query::filters`,
	/// conjoined), applying the same empty/singleton identities.
	pub async fn compile_all(
		&self,
		collection_path: &str,
		filters: &[Filter],
		type_cache: &TypeInferenceCache,
		store: &dyn BackingStore,
	) -> FsResult<StoreFilter> {
		match filters {
			[] => Ok(StoreFilter::all_pass()),
			[only] => self.compile(collection_path, only, type_cache, store).await,
			many => {
				let mut clauses = Vec::with_capacity(many.len());
				for f in many {
					clauses.push(self.compile_node(collection_path, f, type_cache, store).await?);
				}
				Ok(StoreFilter(json!({ "$and": clauses })))
			}
		}
	}

	/// Manually boxed because the recursion through composite filters would
	/// otherwise give this `async fn` an infinite, self-referential size.
	fn compile_node<'a>(
		&'a self,
		collection_path: &'a str,
		filter: &'a Filter,
		type_cache: &'a TypeInferenceCache,
		store: &'a dyn BackingStore,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = FsResult<JsonValue>> + Send + 'a>> {
		Box::pin(async move {
			match filter {
				Filter::Leaf { field_path, operator, value, value_type } => {
					let resolved_type = match value_type {
						Some(t) => *t,
						None if operator.is_array_op() => FieldValueType::Array,
						None => type_cache.infer_type(collection_path, field_path.root(), store).await?,
					};
					self.compile_leaf(field_path, *operator, value, resolved_type)
				}
				Filter::Composite { kind, sub_filters } => {
					if sub_filters.is_empty() {
						return Ok(StoreFilter::all_pass().0);
					}
					if sub_filters.len() == 1 {
						return self.compile_node(collection_path, &sub_filters[0], type_cache, store).await;
					}
					let mut clauses = Vec::with_capacity(sub_filters.len());
					for f in sub_filters {
						clauses.push(self.compile_node(collection_path, f, type_cache, store).await?);
					}
					let key = match kind {
						CompositeKind::And => "$and",
						CompositeKind::Or => "$or",
					};
					Ok(json!({ key: clauses }))
				}
			}
		})
	}

	fn compile_leaf(
		&self,
		field_path: &firestore_types::field_path::FieldPath,
		operator: Operator,
		value: &FieldValue,
		resolved_type: FieldValueType,
	) -> FsResult<JsonValue> {
		if operator.is_array_op() {
			let array_ref = self.resolver.resolve_array(field_path)?;
			return self.compile_array_op(&array_ref, operator, value);
		}
		let field_ref = self.resolver.resolve(field_path, resolved_type)?;
		let literal = field_value_to_json(value);
		let op_doc = match operator {
			Operator::Eq => json!({ "$eq": literal }),
			Operator::Ne => json!({ "$ne": literal }),
			Operator::Lt => json!({ "$lt": literal }),
			Operator::Le => json!({ "$lte": literal }),
			Operator::Gt => json!({ "$gt": literal }),
			Operator::Ge => json!({ "$gte": literal }),
			Operator::In => json!({ "$in": literal }),
			Operator::NotIn => json!({ "$nin": literal }),
			Operator::ArrayContains | Operator::ArrayContainsAny => {
				return Err(Error::Internal("array operators handled separately".into()))
			}
		};
		let mut doc = JsonMap::new();
		doc.insert(field_ref, op_doc);
		Ok(JsonValue::Object(doc))
	}

	fn compile_array_op(&self, array_ref: &str, operator: Operator, value: &FieldValue) -> FsResult<JsonValue> {
		let mut doc = JsonMap::new();
		match operator {
			Operator::ArrayContains => {
				let op_doc = match value {
					FieldValue::Map(_) => json!({ "$elemMatch": field_value_to_json(value) }),
					scalar => json!({ "$eq": field_value_to_json(scalar) }),
				};
				doc.insert(array_ref.to_string(), op_doc);
			}
			Operator::ArrayContainsAny => {
				doc.insert(array_ref.to_string(), json!({ "$in": field_value_to_json(value) }));
			}
			_ => return Err(Error::Internal("not an array operator".into())),
		}
		Ok(JsonValue::Object(doc))
	}
}

/// Converts a typed filter literal into the raw JSON the backing store
/// compares against. This is *not* the §6.3 tagged storage encoding (that
/// lives in `firestore_store::codec`) — filter literals are compared
/// against already-tagged storage paths, so only the bare scalar/sequence is
/// needed here. Re-exported so call sites can keep importing it from this
/// module; the conversion itself lives in `firestore_store::codec::plain_json`
/// since a `BackingStore` adapter needs the identical conversion to decode a
/// stored tagged element before comparing it to such a literal.
pub(crate) use firestore_store::codec::plain_json as field_value_to_json;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::unreachable_store;
	use firestore_types::field_path::FieldPath;

	fn fp(s: &str) -> FieldPath {
		FieldPath::parse(s).unwrap()
	}

	fn typed_leaf(path: &str, operator: Operator, value: FieldValue, value_type: FieldValueType) -> Filter {
		Filter::Leaf { field_path: fp(path), operator, value, value_type: Some(value_type) }
	}

	#[tokio::test]
	async fn empty_filter_set_compiles_to_all_pass() {
		let compiler = FilterCompiler::new();
		let cache = TypeInferenceCache::new(Default::default());
		let store = unreachable_store();
		let compiled = compiler.compile_all("orders", &[], &cache, &store).await.unwrap();
		assert_eq!(compiled, StoreFilter::all_pass());
	}

	#[tokio::test]
	async fn single_child_composite_equals_compiling_the_child() {
		let compiler = FilterCompiler::new();
		let cache = TypeInferenceCache::new(Default::default());
		let store = unreachable_store();
		let leaf = typed_leaf("status", Operator::Eq, FieldValue::String("paid".into()), FieldValueType::String);
		let composite = Filter::Composite { kind: CompositeKind::And, sub_filters: vec![leaf.clone()] };

		let via_composite = compiler.compile("orders", &composite, &cache, &store).await.unwrap();
		let via_leaf = compiler.compile("orders", &leaf, &cache, &store).await.unwrap();
		assert_eq!(via_composite, via_leaf);
	}

	#[tokio::test]
	async fn composite_and_with_nested_field_and_boolean() {
		let compiler = FilterCompiler::new();
		let cache = TypeInferenceCache::new(Default::default());
		let store = unreachable_store();
		let status = typed_leaf("status", Operator::Eq, FieldValue::String("paid".into()), FieldValueType::String);
		let ruc = typed_leaf(
			"customer.ruc",
			Operator::Eq,
			FieldValue::String("20123456789".into()),
			FieldValueType::String,
		);
		let composite = Filter::Composite { kind: CompositeKind::And, sub_filters: vec![status, ruc] };
		let compiled = compiler.compile("orders", &composite, &cache, &store).await.unwrap();
		let expected = json!({
			"$and": [
				{ "fields.status.stringValue": { "$eq": "paid" } },
				{ "fields.customer.value.ruc.stringValue": { "$eq": "20123456789" } },
			]
		});
		assert_eq!(compiled.0, expected);
	}

	#[tokio::test]
	async fn array_contains_with_object_uses_elem_match() {
		let compiler = FilterCompiler::new();
		let cache = TypeInferenceCache::new(Default::default());
		let store = unreachable_store();
		let mut item = std::collections::BTreeMap::new();
		item.insert("itemId".to_string(), FieldValue::String("PROD001".into()));
		let filter = Filter::Leaf {
			field_path: fp("items"),
			operator: Operator::ArrayContains,
			value: FieldValue::Map(item),
			value_type: None,
		};
		let compiled = compiler.compile("orders", &filter, &cache, &store).await.unwrap();
		let expected = json!({
			"fields.items.arrayValue.values": { "$elemMatch": { "itemId": "PROD001" } }
		});
		assert_eq!(compiled.0, expected);
	}
}
