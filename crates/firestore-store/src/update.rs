//! Update-document operators (§6.2): `$set`, `$inc`, `$min`, `$max`,
//! `$unset`, `$addToSet`+`$each`, `$pullAll`, `$setOnInsert`.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
	pub set: BTreeMap<String, JsonValue>,
	pub inc: BTreeMap<String, JsonValue>,
	pub min: BTreeMap<String, JsonValue>,
	pub max: BTreeMap<String, JsonValue>,
	pub unset: Vec<String>,
	/// `$addToSet` with `$each`: field → values to add if not already present.
	pub add_to_set: BTreeMap<String, Vec<JsonValue>>,
	/// `$pullAll`: field → values to remove.
	pub pull_all: BTreeMap<String, Vec<JsonValue>>,
	/// Applied only when the `UpdateOne`/`ReplaceOne` call performs an insert.
	pub set_on_insert: BTreeMap<String, JsonValue>,
	pub upsert: bool,
}

impl Update {
	pub fn is_empty(&self) -> bool {
		self.set.is_empty()
			&& self.inc.is_empty()
			&& self.min.is_empty()
			&& self.max.is_empty()
			&& self.unset.is_empty()
			&& self.add_to_set.is_empty()
			&& self.pull_all.is_empty()
			&& self.set_on_insert.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateResult {
	pub matched_count: u64,
	pub modified_count: u64,
	pub upserted_id: Option<String>,
}

impl UpdateResult {
	pub fn none_matched() -> Self {
		Self::default()
	}
}
