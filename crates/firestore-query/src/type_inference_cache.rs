//! Per-`(collection, field)` value-type cache with sample-based inference
//! fallback (§4.6).

use std::num::NonZeroUsize;

use lru::LruCache;
use serde_json::json;
use tokio::sync::RwLock;

use firestore_store::backing_store::BackingStore;
use firestore_store::stored_document::StoreFilter;
use firestore_types::error::FsResult;
use firestore_types::field_value::FieldValueType;
use firestore_types::prelude::debug;

/// Bounded-resource tunable, following this workspace's `*Config` pattern.
#[derive(Debug, Clone, Copy)]
pub struct TypeInferenceCacheConfig {
	pub capacity: usize,
}

impl Default for TypeInferenceCacheConfig {
	fn default() -> Self {
		Self { capacity: 4096 }
	}
}

/// Safe for concurrent lookups; writers serialize on the cache's internal
/// lock (§4.6 "Concurrency").
#[derive(Debug)]
pub struct TypeInferenceCache {
	cache: RwLock<LruCache<String, FieldValueType>>,
}

impl TypeInferenceCache {
	pub fn new(config: TypeInferenceCacheConfig) -> Self {
		let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
		Self { cache: RwLock::new(LruCache::new(capacity)) }
	}

	fn cache_key(collection_path: &str, field_name: &str) -> String {
		format!("{collection_path}.{field_name}")
	}

	/// (1) in-memory cache hit; (2) sample one document where
	/// `fields.<fieldName>` exists and inspect its tag; (3) default to
	/// `string` (§4.6). Both hits and fallbacks are memoized.
	pub async fn infer_type(
		&self,
		collection_path: &str,
		field_name: &str,
		store: &dyn BackingStore,
	) -> FsResult<FieldValueType> {
		let key = Self::cache_key(collection_path, field_name);
		if let Some(cached) = self.cache.write().await.get(&key).copied() {
			return Ok(cached);
		}
		let inferred = Self::sample(collection_path, field_name, store).await?;
		debug!(collection_path, field_name, ?inferred, "type inference cache miss, sampled");
		self.cache.write().await.put(key, inferred);
		Ok(inferred)
	}

	async fn sample(
		collection_path: &str,
		field_name: &str,
		store: &dyn BackingStore,
	) -> FsResult<FieldValueType> {
		let field_ref = format!("fields.{field_name}");
		let filter = StoreFilter(json!({ field_ref: { "$exists": true } }));
		let Some(doc) = store.find_one(collection_path, &filter).await? else {
			return Ok(FieldValueType::String);
		};
		let Some(raw) = doc.fields.get(field_name) else {
			return Ok(FieldValueType::String);
		};
		let Some(tag) = raw.as_object().and_then(|obj| obj.keys().next()) else {
			return Ok(FieldValueType::String);
		};
		Ok(FieldValueType::from_storage_tag(tag).unwrap_or(FieldValueType::String))
	}

	/// Explicit invalidation for external schema migration (§4.6 "Cache
	/// entries are stable within a process").
	pub async fn invalidate(&self, collection_path: &str, field_name: &str) {
		self.cache.write().await.pop(&Self::cache_key(collection_path, field_name));
	}

	pub async fn clear(&self) {
		self.cache.write().await.clear();
	}
}
