//! Optional multi-statement transaction scope (§6.2, §4.4 `RunTransaction`).

use async_trait::async_trait;

use firestore_types::error::FsResult;

use crate::stored_document::{StoreFilter, StoredDocument};
use crate::update::{Update, UpdateResult};

/// A session that batches reads and writes with snapshot semantics. Stores
/// without transaction support return `None` from
/// `BackingStore::begin_transaction`, and `DocumentOperations::RunTransaction`
/// falls back to non-transactional, per-op-atomic execution (§4.4, §9
/// "Transactions fallback").
#[async_trait]
pub trait StoreTransaction: Send {
	async fn find_one(&mut self, collection: &str, filter: &StoreFilter) -> FsResult<Option<StoredDocument>>;
	async fn insert_one(&mut self, collection: &str, doc: StoredDocument) -> FsResult<String>;
	async fn update_one(&mut self, collection: &str, filter: &StoreFilter, update: &Update) -> FsResult<UpdateResult>;
	async fn delete_one(&mut self, collection: &str, filter: &StoreFilter) -> FsResult<u64>;

	async fn commit(self: Box<Self>) -> FsResult<()>;
	async fn abort(self: Box<Self>) -> FsResult<()>;
}
