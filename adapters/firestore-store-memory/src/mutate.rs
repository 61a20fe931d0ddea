//! Applies an `Update` document's operators (§6.2: `$set`, `$inc`, `$min`,
//! `$max`, `$unset`, `$addToSet`+`$each`, `$pullAll`, `$setOnInsert`) to a
//! document's tagged `fields` map.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use firestore_store::stored_document::StoredDocument;
use firestore_store::update::Update;

use crate::path;

/// Applies `update` to a whole `StoredDocument`. Keys under `update.set`/
/// `update.set_on_insert` that name a top-level metadata attribute
/// (`updateTime`, `version`, `exists`, `createTime`) patch the document
/// struct directly; everything else (always `fields.*`-prefixed) goes
/// through [`apply`] against the tagged field tree.
pub fn apply_to_document(doc: &mut StoredDocument, update: &Update, is_insert: bool) {
	apply_meta(&mut doc.update_time, &mut doc.version, &mut doc.exists, &mut doc.create_time, &update.set);
	if is_insert {
		apply_meta(&mut doc.update_time, &mut doc.version, &mut doc.exists, &mut doc.create_time, &update.set_on_insert);
	}
	// `version` is the one metadata attribute a caller bumps via `$inc` rather
	// than `$set` — an atomic transform has no prior read to compute `current+1`
	// from (§4.5 "atomic at the backing-store level").
	if let Some(delta) = update.inc.get("version").and_then(JsonValue::as_i64) {
		doc.version += delta;
	}
	apply(&mut doc.fields, update, is_insert);
}

fn apply_meta(
	update_time: &mut i64,
	version: &mut i64,
	exists: &mut bool,
	create_time: &mut i64,
	set: &BTreeMap<String, JsonValue>,
) {
	if let Some(v) = set.get("updateTime").and_then(JsonValue::as_i64) {
		*update_time = v;
	}
	if let Some(v) = set.get("createTime").and_then(JsonValue::as_i64) {
		*create_time = v;
	}
	if let Some(v) = set.get("version").and_then(JsonValue::as_i64) {
		*version = v;
	}
	if let Some(v) = set.get("exists").and_then(JsonValue::as_bool) {
		*exists = v;
	}
}

/// Applies every operator in `update` to `fields` in place. `is_insert`
/// gates `$set_on_insert` (only takes effect on the write that creates the
/// document, §6.2).
pub fn apply(fields: &mut BTreeMap<String, JsonValue>, update: &Update, is_insert: bool) {
	for (field_ref, value) in &update.set {
		path::set(fields, field_ref, value.clone());
	}
	if is_insert {
		for (field_ref, value) in &update.set_on_insert {
			path::set(fields, field_ref, value.clone());
		}
	}
	for (field_ref, delta) in &update.inc {
		apply_numeric(fields, field_ref, delta, |a, b| a + b);
	}
	for (field_ref, candidate) in &update.min {
		apply_numeric(fields, field_ref, candidate, f64::min);
	}
	for (field_ref, candidate) in &update.max {
		apply_numeric(fields, field_ref, candidate, f64::max);
	}
	for (field_ref, additions) in &update.add_to_set {
		apply_add_to_set(fields, field_ref, additions);
	}
	for (field_ref, removals) in &update.pull_all {
		apply_pull_all(fields, field_ref, removals);
	}
	for field_name in &update.unset {
		path::unset(fields, field_name);
	}
}

fn apply_numeric(
	fields: &mut BTreeMap<String, JsonValue>,
	field_ref: &str,
	operand: &JsonValue,
	combine: impl Fn(f64, f64) -> f64,
) {
	let Some(operand) = operand.as_f64() else { return };
	let current = path::get(fields, field_ref).and_then(JsonValue::as_f64).unwrap_or(0.0);
	let result = combine(current, operand);
	let encoded = if result.fract() == 0.0 && result.abs() < (i64::MAX as f64) {
		JsonValue::from(result as i64)
	} else {
		JsonValue::from(result)
	};
	path::set(fields, field_ref, encoded);
}

fn apply_add_to_set(fields: &mut BTreeMap<String, JsonValue>, array_ref: &str, additions: &[JsonValue]) {
	let mut items = path::get(fields, array_ref).and_then(JsonValue::as_array).cloned().unwrap_or_default();
	for addition in additions {
		if !items.contains(addition) {
			items.push(addition.clone());
		}
	}
	path::set(fields, array_ref, JsonValue::Array(items));
}

fn apply_pull_all(fields: &mut BTreeMap<String, JsonValue>, array_ref: &str, removals: &[JsonValue]) {
	let mut items = path::get(fields, array_ref).and_then(JsonValue::as_array).cloned().unwrap_or_default();
	items.retain(|item| !removals.contains(item));
	path::set(fields, array_ref, JsonValue::Array(items));
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn increment_accumulates_onto_existing_value() {
		let mut fields = BTreeMap::new();
		fields.insert("counter".to_string(), json!({"integerValue": 5}));
		let mut update = Update::default();
		update.inc.insert("fields.counter.integerValue".to_string(), json!(3));
		apply(&mut fields, &update, false);
		assert_eq!(path::get(&fields, "fields.counter.integerValue").unwrap(), 8);
	}

	#[test]
	fn increment_by_zero_is_a_value_noop() {
		let mut fields = BTreeMap::new();
		fields.insert("counter".to_string(), json!({"integerValue": 5}));
		let mut update = Update::default();
		update.inc.insert("fields.counter.integerValue".to_string(), json!(0));
		apply(&mut fields, &update, false);
		assert_eq!(path::get(&fields, "fields.counter.integerValue").unwrap(), 5);
	}

	#[test]
	fn add_to_set_is_idempotent() {
		let mut fields = BTreeMap::new();
		let mut update = Update::default();
		update.add_to_set.insert("fields.tags.arrayValue.values".to_string(), vec![json!({"stringValue": "x"})]);
		apply(&mut fields, &update, false);
		apply(&mut fields, &update, false);
		let arr = path::get(&fields, "fields.tags.arrayValue.values").unwrap().as_array().unwrap();
		assert_eq!(arr.len(), 1);
	}

	#[test]
	fn version_metadata_bumps_via_inc() {
		let mut doc = StoredDocument {
			project_id: "p".into(),
			database_id: "(default)".into(),
			collection_id: "orders".into(),
			document_id: "o1".into(),
			path: "projects/p/databases/(default)/documents/orders/o1".into(),
			parent_path: "projects/p/databases/(default)/documents/orders".into(),
			fields: BTreeMap::new(),
			create_time: 1,
			update_time: 1,
			version: 3,
			exists: true,
		};
		let mut update = Update::default();
		update.inc.insert("version".to_string(), json!(1));
		apply_to_document(&mut doc, &update, false);
		assert_eq!(doc.version, 4);
	}

	#[test]
	fn set_on_insert_only_applies_when_inserting() {
		let mut update = Update::default();
		update.set_on_insert.insert("fields.createdBy".to_string(), json!({"stringValue": "system"}));

		let mut on_update = BTreeMap::new();
		apply(&mut on_update, &update, false);
		assert!(path::get(&on_update, "fields.createdBy").is_none());

		let mut on_insert = BTreeMap::new();
		apply(&mut on_insert, &update, true);
		assert!(path::get(&on_insert, "fields.createdBy").is_some());
	}
}
