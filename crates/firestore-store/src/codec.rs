//! The canonical encode/decode between the domain `Document`/`FieldValue`
//! tree and the flat, tagged `StoredDocument` shape (§6.3). Lives here
//! (rather than in `firestore-types`) because it is the one place that knows
//! about both the domain model and the storage shape, and both
//! `firestore-query` and `firestore-documents` depend on this crate.

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Value as JsonValue};

use firestore_types::document::{Document, DocumentIdentity};
use firestore_types::error::{Error, FsResult};
use firestore_types::field_value::{FieldValue, FieldValueType, GeoPoint};
use firestore_types::ids::{DatabaseId, ProjectId};

use crate::stored_document::StoredDocument;

/// Encodes a `FieldValue` into its tagged storage object, e.g.
/// `{"stringValue": "paid"}` or `{"arrayValue": {"values": [...]}}`.
pub fn encode_field_value(value: &FieldValue) -> JsonValue {
	let (tag, inner) = match value {
		FieldValue::Null => (FieldValueType::Null, JsonValue::Null),
		FieldValue::Bool(b) => (FieldValueType::Bool, JsonValue::Bool(*b)),
		FieldValue::Int64(n) => (FieldValueType::Int64, JsonValue::from(*n)),
		FieldValue::Double(d) => (FieldValueType::Double, JsonValue::from(*d)),
		FieldValue::String(s) => (FieldValueType::String, JsonValue::String(s.clone())),
		FieldValue::Bytes(b) => {
			(FieldValueType::Bytes, JsonValue::Array(b.iter().map(|byte| JsonValue::from(*byte)).collect()))
		}
		FieldValue::Timestamp(ns) => (FieldValueType::Timestamp, JsonValue::from(*ns)),
		FieldValue::Reference(path) => (FieldValueType::Reference, JsonValue::String(path.clone())),
		FieldValue::GeoPoint(g) => {
			let mut obj = JsonMap::new();
			obj.insert("latitude".into(), JsonValue::from(g.latitude));
			obj.insert("longitude".into(), JsonValue::from(g.longitude));
			(FieldValueType::GeoPoint, JsonValue::Object(obj))
		}
		FieldValue::Array(items) => {
			let values: Vec<JsonValue> = items.iter().map(encode_field_value).collect();
			let mut obj = JsonMap::new();
			obj.insert("values".into(), JsonValue::Array(values));
			(FieldValueType::Array, JsonValue::Object(obj))
		}
		FieldValue::Map(fields) => {
			let mut obj = JsonMap::new();
			let encoded: JsonMap<String, JsonValue> =
				fields.iter().map(|(k, v)| (k.clone(), encode_field_value(v))).collect();
			obj.insert("fields".into(), JsonValue::Object(encoded));
			(FieldValueType::Map, JsonValue::Object(obj))
		}
	};
	let mut obj = JsonMap::new();
	obj.insert(tag.storage_tag().to_string(), inner);
	JsonValue::Object(obj)
}

/// The inverse of [`encode_field_value`]. Fails on malformed tagged objects
/// rather than guessing a type (§4.1 "the resolver never guesses").
pub fn decode_field_value(raw: &JsonValue) -> FsResult<FieldValue> {
	let obj = raw
		.as_object()
		.ok_or_else(|| Error::Internal(format!("expected tagged field value object, got {raw}")))?;
	let (tag, inner) = obj
		.iter()
		.next()
		.ok_or_else(|| Error::Internal("tagged field value object has no tag".into()))?;
	match tag.as_str() {
		"nullValue" => Ok(FieldValue::Null),
		"booleanValue" => Ok(FieldValue::Bool(inner.as_bool().unwrap_or(false))),
		"integerValue" => Ok(FieldValue::Int64(
			inner.as_i64().ok_or_else(|| Error::Internal("integerValue not an i64".into()))?,
		)),
		"doubleValue" => Ok(FieldValue::Double(
			inner.as_f64().ok_or_else(|| Error::Internal("doubleValue not an f64".into()))?,
		)),
		"stringValue" => Ok(FieldValue::String(
			inner.as_str().ok_or_else(|| Error::Internal("stringValue not a string".into()))?.to_string(),
		)),
		"bytesValue" => {
			let arr = inner.as_array().ok_or_else(|| Error::Internal("bytesValue not an array".into()))?;
			let bytes = arr
				.iter()
				.map(|b| b.as_u64().map(|n| n as u8).ok_or_else(|| Error::Internal("bytesValue element not a byte".into())))
				.collect::<FsResult<Vec<u8>>>()?;
			Ok(FieldValue::Bytes(bytes))
		}
		"timestampValue" => Ok(FieldValue::Timestamp(
			inner.as_i64().ok_or_else(|| Error::Internal("timestampValue not an i64".into()))?,
		)),
		"referenceValue" => Ok(FieldValue::Reference(
			inner.as_str().ok_or_else(|| Error::Internal("referenceValue not a string".into()))?.to_string(),
		)),
		"geoPointValue" => {
			let latitude = inner.get("latitude").and_then(JsonValue::as_f64).unwrap_or(0.0);
			let longitude = inner.get("longitude").and_then(JsonValue::as_f64).unwrap_or(0.0);
			Ok(FieldValue::GeoPoint(GeoPoint { latitude, longitude }))
		}
		"arrayValue" => {
			let values = inner.get("values").and_then(JsonValue::as_array).cloned().unwrap_or_default();
			let decoded = values.iter().map(decode_field_value).collect::<FsResult<Vec<_>>>()?;
			Ok(FieldValue::Array(decoded))
		}
		"mapValue" => {
			let fields = inner.get("fields").and_then(JsonValue::as_object).cloned().unwrap_or_default();
			let mut map = BTreeMap::new();
			for (k, v) in fields {
				map.insert(k, decode_field_value(&v)?);
			}
			Ok(FieldValue::Map(map))
		}
		other => Err(Error::Internal(format!("unknown field value tag {other:?}"))),
	}
}

/// Encodes a domain `Document` into the flat storage shape the backing
/// store persists (§6.3).
pub fn encode_document(doc: &Document) -> StoredDocument {
	let fields = doc.fields.iter().map(|(k, v)| (k.clone(), encode_field_value(v))).collect();
	StoredDocument {
		project_id: doc.identity.project_id.0.clone(),
		database_id: doc.identity.database_id.0.clone(),
		collection_id: doc.identity.collection_id.clone(),
		document_id: doc.identity.document_id.clone(),
		path: doc.path.clone(),
		parent_path: doc.parent_path.clone(),
		fields,
		create_time: doc.create_time,
		update_time: doc.update_time,
		version: doc.version,
		exists: doc.exists,
	}
}

/// Converts a `FieldValue` into its bare, untagged JSON representation —
/// the literal a filter compares a resolved (already-tagged) storage path
/// against, and the shape a `BackingStore` adapter must decode a stored
/// tagged element into before comparing it to such a literal (§4.2, §6.2
/// `$elemMatch`). Not the §6.3 storage encoding — that is [`encode_field_value`].
pub fn plain_json(value: &FieldValue) -> JsonValue {
	match value {
		FieldValue::Null => JsonValue::Null,
		FieldValue::Bool(b) => JsonValue::Bool(*b),
		FieldValue::Int64(n) => JsonValue::from(*n),
		FieldValue::Double(d) => JsonValue::from(*d),
		FieldValue::String(s) => JsonValue::String(s.clone()),
		FieldValue::Bytes(b) => JsonValue::Array(b.iter().map(|byte| JsonValue::from(*byte)).collect()),
		FieldValue::Timestamp(ns) => JsonValue::from(*ns),
		FieldValue::Reference(path) => JsonValue::String(path.clone()),
		FieldValue::GeoPoint(g) => {
			let mut obj = JsonMap::new();
			obj.insert("latitude".into(), JsonValue::from(g.latitude));
			obj.insert("longitude".into(), JsonValue::from(g.longitude));
			JsonValue::Object(obj)
		}
		FieldValue::Array(items) => JsonValue::Array(items.iter().map(plain_json).collect()),
		FieldValue::Map(fields) => {
			let obj: JsonMap<String, JsonValue> = fields.iter().map(|(k, v)| (k.clone(), plain_json(v))).collect();
			JsonValue::Object(obj)
		}
	}
}

/// The inverse of [`encode_document`]. Round-trips without information loss
/// on every supported tag (§8 "Round-trip and idempotence laws").
pub fn decode_document(stored: &StoredDocument) -> FsResult<Document> {
	let mut fields = BTreeMap::new();
	for (k, v) in &stored.fields {
		fields.insert(k.clone(), decode_field_value(v)?);
	}
	let identity = DocumentIdentity::new(
		ProjectId::parse(stored.project_id.clone())?,
		DatabaseId::parse(stored.database_id.clone())?,
		stored.collection_id.clone(),
		stored.document_id.clone(),
	)?;
	Document::new(identity, fields, stored.create_time, stored.update_time, stored.version, stored.exists)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scalar_field_values_round_trip() {
		for value in [
			FieldValue::Null,
			FieldValue::Bool(true),
			FieldValue::Int64(-7),
			FieldValue::Double(1.5),
			FieldValue::String("paid".into()),
			FieldValue::Bytes(vec![1, 2, 3]),
			FieldValue::Timestamp(1_700_000_000_000_000_000),
			FieldValue::Reference("projects/p/databases/(default)/documents/c/d".into()),
			FieldValue::GeoPoint(GeoPoint { latitude: 1.0, longitude: -2.0 }),
		] {
			let encoded = encode_field_value(&value);
			let decoded = decode_field_value(&encoded).unwrap();
			assert_eq!(decoded, value);
		}
	}

	#[test]
	fn nested_array_and_map_round_trip() {
		let mut map = BTreeMap::new();
		map.insert("ruc".to_string(), FieldValue::String("20123456789".into()));
		let value = FieldValue::Array(vec![FieldValue::Map(map), FieldValue::Int64(5)]);
		let encoded = encode_field_value(&value);
		let decoded = decode_field_value(&encoded).unwrap();
		assert_eq!(decoded, value);
	}

	#[test]
	fn document_round_trips_through_stored_shape() {
		let identity = DocumentIdentity::new(
			ProjectId::parse("p").unwrap(),
			DatabaseId::parse("(default)").unwrap(),
			"orders",
			"o1",
		)
		.unwrap();
		let mut fields = BTreeMap::new();
		fields.insert("status".to_string(), FieldValue::String("paid".into()));
		let doc = Document::new(identity, fields, 10, 10, 1, true).unwrap();
		let stored = encode_document(&doc);
		let decoded = decode_document(&stored).unwrap();
		assert_eq!(decoded, doc);
	}
}
