//! The backing-store port (§6.2): a capability set, not a class hierarchy
//! (§9 "Runtime reflection / dynamic dispatch") — alternate implementations
//! (in-memory test adapter, production store) are swapped by dependency
//! injection behind this one trait.

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use firestore_types::error::FsResult;

use crate::cursor::{DocumentCursor, PipelineCursor};
use crate::find::{FindOneAndUpdateOptions, FindOptions};
use crate::stored_document::{StoreFilter, StoredDocument};
use crate::transaction::StoreTransaction;
use crate::update::{Update, UpdateResult};

#[async_trait]
pub trait BackingStore: Debug + Send + Sync {
	async fn count_documents(&self, collection: &str, filter: &StoreFilter) -> FsResult<u64>;

	async fn insert_one(&self, collection: &str, doc: StoredDocument) -> FsResult<String>;

	async fn find_one(&self, collection: &str, filter: &StoreFilter) -> FsResult<Option<StoredDocument>>;

	async fn update_one(&self, collection: &str, filter: &StoreFilter, update: &Update) -> FsResult<UpdateResult>;

	async fn replace_one(
		&self,
		collection: &str,
		filter: &StoreFilter,
		replacement: StoredDocument,
		upsert: bool,
	) -> FsResult<UpdateResult>;

	async fn delete_one(&self, collection: &str, filter: &StoreFilter) -> FsResult<u64>;

	async fn find(
		&self,
		collection: &str,
		filter: &StoreFilter,
		opts: &FindOptions,
	) -> FsResult<Box<dyn DocumentCursor>>;

	async fn aggregate(&self, collection: &str, pipeline: &[JsonValue]) -> FsResult<Box<dyn PipelineCursor>>;

	async fn find_one_and_update(
		&self,
		collection: &str,
		filter: &StoreFilter,
		update: &Update,
		opts: &FindOneAndUpdateOptions,
	) -> FsResult<Option<StoredDocument>>;

	/// `None` when the store has no transaction primitive (§6.2 "Optional").
	async fn begin_transaction(&self) -> FsResult<Option<Box<dyn StoreTransaction>>>;

	/// Lists physical collection names whose terminal segment (joined on
	/// `.`) equals `collection_id`, used by collection-group enumeration
	/// (§4.3). Stores unable to list collections should declare
	/// `supports_collection_group: false` in their `Capabilities` rather
	/// than implement this as a stub (§9 "Collection-group enumeration").
	async fn list_collections_with_suffix(&self, collection_id: &str) -> FsResult<Vec<String>>;
}
