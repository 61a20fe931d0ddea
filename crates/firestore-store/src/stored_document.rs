//! The flat, tagged-field storage shape the backing store persists (§6.3).

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

/// A document as the backing store sees it: `fields` is a map of
/// `{name: {<typeTag>: <value>}}` objects, not the domain `FieldValue` tree
/// (§6.3). Encoding/decoding between the two lives in `codec`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
	pub project_id: String,
	pub database_id: String,
	pub collection_id: String,
	pub document_id: String,
	pub path: String,
	pub parent_path: String,
	pub fields: BTreeMap<String, JsonValue>,
	pub create_time: i64,
	pub update_time: i64,
	pub version: i64,
	pub exists: bool,
}

/// An opaque native filter payload compiled by `FilterCompiler` (§4.2). The
/// backing store interprets its shape; the core never inspects it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreFilter(pub JsonValue);

impl StoreFilter {
	/// The all-pass filter (§4.2 "Edge cases"): an empty filter document.
	pub fn all_pass() -> Self {
		Self(JsonValue::Object(serde_json::Map::new()))
	}
}
