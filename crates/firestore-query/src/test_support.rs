//! Test-only `BackingStore` stub that panics if touched — used to prove a
//! code path never reaches the backing store (e.g. a warm cache, or a
//! compiled filter that only needs explicit value types).

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use firestore_store::backing_store::BackingStore;
use firestore_store::cursor::{DocumentCursor, PipelineCursor};
use firestore_store::find::{FindOneAndUpdateOptions, FindOptions};
use firestore_store::stored_document::{StoreFilter, StoredDocument};
use firestore_store::transaction::StoreTransaction;
use firestore_store::update::{Update, UpdateResult};
use firestore_types::error::FsResult;

#[derive(Debug)]
pub struct UnreachableStore;

pub fn unreachable_store() -> UnreachableStore {
	UnreachableStore
}

#[async_trait]
impl BackingStore for UnreachableStore {
	async fn count_documents(&self, _: &str, _: &StoreFilter) -> FsResult<u64> {
		unreachable!("test path must not touch the backing store")
	}
	async fn insert_one(&self, _: &str, _: StoredDocument) -> FsResult<String> {
		unreachable!()
	}
	async fn find_one(&self, _: &str, _: &StoreFilter) -> FsResult<Option<StoredDocument>> {
		unreachable!("test path must not touch the backing store")
	}
	async fn update_one(&self, _: &str, _: &StoreFilter, _: &Update) -> FsResult<UpdateResult> {
		unreachable!()
	}
	async fn replace_one(&self, _: &str, _: &StoreFilter, _: StoredDocument, _: bool) -> FsResult<UpdateResult> {
		unreachable!()
	}
	async fn delete_one(&self, _: &str, _: &StoreFilter) -> FsResult<u64> {
		unreachable!()
	}
	async fn find(&self, _: &str, _: &StoreFilter, _: &FindOptions) -> FsResult<Box<dyn DocumentCursor>> {
		unreachable!()
	}
	async fn aggregate(&self, _: &str, _: &[JsonValue]) -> FsResult<Box<dyn PipelineCursor>> {
		unreachable!()
	}
	async fn find_one_and_update(
		&self,
		_: &str,
		_: &StoreFilter,
		_: &Update,
		_: &FindOneAndUpdateOptions,
	) -> FsResult<Option<StoredDocument>> {
		unreachable!()
	}
	async fn begin_transaction(&self) -> FsResult<Option<Box<dyn StoreTransaction>>> {
		unreachable!()
	}
	async fn list_collections_with_suffix(&self, _: &str) -> FsResult<Vec<String>> {
		unreachable!()
	}
}
