//! Navigation/mutation over a `StoredDocument`'s tagged `fields` tree using
//! the dotted reference strings `FieldPathResolver` produces (§4.1, §6.3).
//!
//! The resolver's nested-path convention (`fields.a.value.b.value.c.<tag>`)
//! does not literally match the tagged storage shape `firestore_store::codec`
//! writes (`fields.a -> {"mapValue": {"fields": {"b": ...}}}`); the single
//! synonym this module translates is `value` → descend into
//! `mapValue.fields`. Every other segment (a real key or a tag name like
//! `stringValue`/`arrayValue`/`values`) is looked up literally.

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;

/// Splits a resolver reference (`"fields.a.value.b.stringValue"`) into the
/// root field name and the remaining segments past `fields.<root>`.
fn split_ref(field_ref: &str) -> Option<(&str, Vec<&str>)> {
	let mut parts = field_ref.split('.');
	if parts.next() != Some("fields") {
		return None;
	}
	let root = parts.next()?;
	Some((root, parts.collect()))
}

/// Reads the value a resolver reference addresses, or `None` if any segment
/// along the way is absent.
pub fn get<'a>(fields: &'a BTreeMap<String, JsonValue>, field_ref: &str) -> Option<&'a JsonValue> {
	let (root, rest) = split_ref(field_ref)?;
	let mut cur = fields.get(root)?;
	let mut i = 0;
	while i < rest.len() {
		if rest[i] == "value" {
			cur = cur.get("mapValue")?.get("fields")?;
			i += 1;
		} else {
			cur = cur.get(rest[i])?;
			i += 1;
		}
	}
	Some(cur)
}

/// True when `field_ref` addresses an array leaf's element list
/// (`fields.<root>.arrayValue.values`), the shape `FilterCompiler` and
/// `FieldPathResolver` use for every array operator (§4.1, §4.2).
pub fn is_array_ref(field_ref: &str) -> bool {
	field_ref.ends_with(".arrayValue.values")
}

/// Writes `value` at the location a resolver reference addresses,
/// autovivifying intermediate objects as needed. Used by atomic transforms
/// and plain field writes (§4.4, §4.5); mirrors MongoDB's dotted-path `$set`
/// semantics, adapted to this store's tagged shape.
pub fn set(fields: &mut BTreeMap<String, JsonValue>, field_ref: &str, value: JsonValue) {
	let Some((root, rest)) = split_ref(field_ref) else { return };
	if rest.is_empty() {
		fields.insert(root.to_string(), value);
		return;
	}
	let entry = fields.entry(root.to_string()).or_insert_with(|| JsonValue::Object(JsonMap::new()));
	set_nested(entry, &rest, value);
}

fn set_nested(cur: &mut JsonValue, rest: &[&str], value: JsonValue) {
	if rest.is_empty() {
		*cur = value;
		return;
	}
	if !cur.is_object() {
		*cur = JsonValue::Object(JsonMap::new());
	}
	let obj = cur.as_object_mut().unwrap_or_else(|| unreachable!("just coerced to an object"));
	if rest[0] == "value" {
		let map_value = obj.entry("mapValue").or_insert_with(|| JsonValue::Object(JsonMap::new()));
		if !map_value.is_object() {
			*map_value = JsonValue::Object(JsonMap::new());
		}
		let map_obj = map_value.as_object_mut().unwrap_or_else(|| unreachable!("just coerced to an object"));
		let inner_fields = map_obj.entry("fields").or_insert_with(|| JsonValue::Object(JsonMap::new()));
		if !inner_fields.is_object() {
			*inner_fields = JsonValue::Object(JsonMap::new());
		}
		let inner_obj = inner_fields.as_object_mut().unwrap_or_else(|| unreachable!("just coerced to an object"));
		let next = inner_obj.entry(rest[1].to_string()).or_insert_with(|| JsonValue::Object(JsonMap::new()));
		set_nested(next, &rest[2..], value);
	} else {
		let next = obj.entry(rest[0].to_string()).or_insert_with(|| JsonValue::Object(JsonMap::new()));
		set_nested(next, &rest[1..], value);
	}
}

/// Removes the whole tagged field named by `field_name` (§4.5 `Delete`:
/// field-level unset, never a leaf inside a nested map).
pub fn unset(fields: &mut BTreeMap<String, JsonValue>, field_name: &str) {
	fields.remove(field_name);
}
