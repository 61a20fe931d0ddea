//! Evaluates the native `StoreFilter` JSON tree `FilterCompiler` produces
//! (§4.2) against a document's tagged `fields` map, plus this adapter's own
//! convention for addressing a `StoredDocument`'s own metadata attributes:
//! a bare key (`documentID`, `path`, `exists`, `createTime`, `updateTime`,
//! `version`, `collectionID`, `parentPath`) targets the document itself
//! rather than its `fields` tree, the same way `fields.*`-prefixed update
//! keys and bare metadata keys are split in `mutate::apply_to_document`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use firestore_store::codec::decode_field_value;
use firestore_store::stored_document::StoredDocument;

use crate::path;

/// Matches a `StoreFilter`'s inner JSON document against `doc` (§4.2
/// "Edge cases": an empty object is the all-pass filter).
pub fn matches(doc: &StoredDocument, filter: &JsonValue) -> bool {
	let Some(obj) = filter.as_object() else { return true };
	if obj.is_empty() {
		return true;
	}
	if let Some(JsonValue::Array(clauses)) = obj.get("$and") {
		return clauses.iter().all(|c| matches(doc, c));
	}
	if let Some(JsonValue::Array(clauses)) = obj.get("$or") {
		return clauses.iter().any(|c| matches(doc, c));
	}
	obj.iter().all(|(key, op_doc)| {
		if key.starts_with("fields.") {
			matches_leaf(&doc.fields, key, op_doc)
		} else {
			matches_metadata(doc, key, op_doc)
		}
	})
}

/// Reads one of `StoredDocument`'s own metadata attributes by the bare key
/// name this adapter's filter/sort conventions use for it. Shared with
/// `store::compare_sort_key` so `List`'s `orderBy` on `documentID`/
/// `createTime`/`updateTime` sorts the same attributes this matches on.
pub(crate) fn metadata_value(doc: &StoredDocument, key: &str) -> Option<JsonValue> {
	match key {
		"projectID" => Some(JsonValue::String(doc.project_id.clone())),
		"databaseID" => Some(JsonValue::String(doc.database_id.clone())),
		"documentID" => Some(JsonValue::String(doc.document_id.clone())),
		"collectionID" => Some(JsonValue::String(doc.collection_id.clone())),
		"path" => Some(JsonValue::String(doc.path.clone())),
		"parentPath" => Some(JsonValue::String(doc.parent_path.clone())),
		"createTime" => Some(JsonValue::from(doc.create_time)),
		"updateTime" => Some(JsonValue::from(doc.update_time)),
		"version" => Some(JsonValue::from(doc.version)),
		"exists" => Some(JsonValue::Bool(doc.exists)),
		_ => None,
	}
}

fn matches_metadata(doc: &StoredDocument, key: &str, op_doc: &JsonValue) -> bool {
	let Some(op_obj) = op_doc.as_object() else { return false };
	let cur = metadata_value(doc, key);
	if let Some(want_exists) = op_obj.get("$exists").and_then(JsonValue::as_bool) {
		return cur.is_some() == want_exists;
	}
	op_obj.iter().all(|(op, rhs)| apply_op(false, cur.as_ref(), op, rhs))
}

fn matches_leaf(fields: &BTreeMap<String, JsonValue>, field_ref: &str, op_doc: &JsonValue) -> bool {
	let Some(op_obj) = op_doc.as_object() else { return false };
	let cur = path::get(fields, field_ref);
	if let Some(want_exists) = op_obj.get("$exists").and_then(JsonValue::as_bool) {
		return cur.is_some() == want_exists;
	}
	let is_array = path::is_array_ref(field_ref);
	op_obj.iter().all(|(op, rhs)| apply_op(is_array, cur, op, rhs))
}

fn apply_op(is_array: bool, cur: Option<&JsonValue>, op: &str, rhs: &JsonValue) -> bool {
	if is_array {
		return apply_array_op(cur, op, rhs);
	}
	match op {
		"$eq" => cur.is_some_and(|c| c == rhs),
		"$ne" => cur.is_none_or(|c| c != rhs),
		"$lt" => compare(cur, rhs) == Some(Ordering::Less),
		"$lte" => matches!(compare(cur, rhs), Some(Ordering::Less | Ordering::Equal)),
		"$gt" => compare(cur, rhs) == Some(Ordering::Greater),
		"$gte" => matches!(compare(cur, rhs), Some(Ordering::Greater | Ordering::Equal)),
		"$in" => cur.is_some_and(|c| rhs.as_array().is_some_and(|arr| arr.contains(c))),
		"$nin" => !cur.is_some_and(|c| rhs.as_array().is_some_and(|arr| arr.contains(c))),
		_ => false,
	}
}

fn apply_array_op(cur: Option<&JsonValue>, op: &str, rhs: &JsonValue) -> bool {
	let Some(items) = cur.and_then(JsonValue::as_array) else { return false };
	match op {
		"$eq" => items.iter().any(|tagged| decode_plain(tagged).as_ref() == Some(rhs)),
		"$in" => {
			let wanted = rhs.as_array().cloned().unwrap_or_default();
			items.iter().any(|tagged| decode_plain(tagged).is_some_and(|v| wanted.contains(&v)))
		}
		"$elemMatch" => items.iter().any(|tagged| decode_plain(tagged).is_some_and(|v| subdocument_matches(&v, rhs))),
		_ => false,
	}
}

fn decode_plain(tagged: &JsonValue) -> Option<JsonValue> {
	let value = decode_field_value(tagged).ok()?;
	Some(firestore_store::codec::plain_json(&value))
}

fn subdocument_matches(doc: &JsonValue, criteria: &JsonValue) -> bool {
	let Some(criteria) = criteria.as_object() else { return false };
	let Some(doc) = doc.as_object() else { return false };
	criteria.iter().all(|(k, v)| doc.get(k) == Some(v))
}

fn compare(cur: Option<&JsonValue>, rhs: &JsonValue) -> Option<Ordering> {
	let cur = cur?;
	if let (Some(a), Some(b)) = (cur.as_f64(), rhs.as_f64()) {
		return a.partial_cmp(&b);
	}
	if let (Some(a), Some(b)) = (cur.as_str(), rhs.as_str()) {
		return Some(a.cmp(b));
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn doc() -> StoredDocument {
		let mut fields = BTreeMap::new();
		fields.insert("status".to_string(), json!({"stringValue": "paid"}));
		fields.insert("rating".to_string(), json!({"integerValue": 5}));
		StoredDocument {
			project_id: "p".into(),
			database_id: "(default)".into(),
			collection_id: "orders".into(),
			document_id: "o1".into(),
			path: "projects/p/databases/(default)/documents/orders/o1".into(),
			parent_path: "projects/p/databases/(default)/documents/orders".into(),
			fields,
			create_time: 1,
			update_time: 1,
			version: 1,
			exists: true,
		}
	}

	#[test]
	fn all_pass_on_empty_filter() {
		assert!(matches(&doc(), &json!({})));
	}

	#[test]
	fn equality_leaf_matches() {
		assert!(matches(&doc(), &json!({"fields.status.stringValue": {"$eq": "paid"}})));
		assert!(!matches(&doc(), &json!({"fields.status.stringValue": {"$eq": "due"}})));
	}

	#[test]
	fn and_composite_requires_all_clauses() {
		let f = json!({"$and": [
			{"fields.status.stringValue": {"$eq": "paid"}},
			{"fields.rating.integerValue": {"$gte": 5}},
		]});
		assert!(matches(&doc(), &f));
	}

	#[test]
	fn exists_check_on_absent_field() {
		assert!(!matches(&doc(), &json!({"fields.missing": {"$exists": true}})));
		assert!(matches(&doc(), &json!({"fields.missing": {"$exists": false}})));
	}

	#[test]
	fn document_id_metadata_filter_matches() {
		assert!(matches(&doc(), &json!({"documentID": {"$eq": "o1"}})));
		assert!(!matches(&doc(), &json!({"documentID": {"$eq": "o2"}})));
	}
}
