//! Cursors exposed by `Find`/`Aggregate` (§6.2: `Next`, `Decode`, `Err`, `Close`).

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use firestore_types::error::FsResult;

use crate::stored_document::StoredDocument;

/// A cursor over `StoredDocument`s, returned by `BackingStore::find`.
#[async_trait]
pub trait DocumentCursor: Send {
	/// Advances the cursor. Returns `false` when exhausted.
	async fn next(&mut self) -> FsResult<bool>;
	/// Decodes the item the cursor currently points at. Only valid after a
	/// `next()` call returned `true`.
	fn decode(&self) -> FsResult<StoredDocument>;
	async fn close(&mut self) -> FsResult<()>;
}

/// A cursor over raw pipeline-stage output documents, returned by
/// `BackingStore::aggregate` — the escape hatch of §4.3's `ExecutePipeline`.
#[async_trait]
pub trait PipelineCursor: Send {
	async fn next(&mut self) -> FsResult<bool>;
	fn decode(&self) -> FsResult<JsonValue>;
	async fn close(&mut self) -> FsResult<()>;
}

/// Drains a `DocumentCursor` into a plain `Vec`, closing it afterwards.
/// Convenience used by every `BackingStore` consumer that does not need
/// incremental streaming (§4.3 `Execute`).
pub async fn collect_documents(
	mut cursor: Box<dyn DocumentCursor>,
) -> FsResult<Vec<StoredDocument>> {
	let mut out = Vec::new();
	while cursor.next().await? {
		out.push(cursor.decode()?);
	}
	cursor.close().await?;
	Ok(out)
}

/// Drains a `PipelineCursor` into a plain `Vec`, closing it afterwards.
pub async fn collect_pipeline(mut cursor: Box<dyn PipelineCursor>) -> FsResult<Vec<JsonValue>> {
	let mut out = Vec::new();
	while cursor.next().await? {
		out.push(cursor.decode()?);
	}
	cursor.close().await?;
	Ok(out)
}
