//! Typed field values (§3 FieldValue) and the type tag used throughout the
//! core to decide which backing-store leaf a field path resolves to.

use std::collections::BTreeMap;
use std::cmp::Ordering;

/// The tag carried by every `FieldValue`. Mirrors the Firestore wire value
/// kinds (`stringValue`, `integerValue`, ...) that the backing store's
/// `fields.<name>.<tag>Value` storage convention is keyed on (§4.1, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldValueType {
	Null,
	Bool,
	Int64,
	Double,
	String,
	Bytes,
	Timestamp,
	Reference,
	GeoPoint,
	Array,
	Map,
}

impl FieldValueType {
	/// The storage tag used in `fields.<name>.<tag>` (§4.1 "Rules").
	pub fn storage_tag(self) -> &'static str {
		match self {
			Self::Null => "nullValue",
			Self::Bool => "booleanValue",
			Self::Int64 => "integerValue",
			Self::Double => "doubleValue",
			Self::String => "stringValue",
			Self::Bytes => "bytesValue",
			Self::Timestamp => "timestampValue",
			Self::Reference => "referenceValue",
			Self::GeoPoint => "geoPointValue",
			Self::Array => "arrayValue",
			Self::Map => "mapValue",
		}
	}

	/// The inverse of [`Self::storage_tag`], used by `TypeInferenceCache`
	/// when sampling a stored document's tag (§4.6).
	pub fn from_storage_tag(tag: &str) -> Option<Self> {
		match tag {
			"nullValue" => Some(Self::Null),
			"booleanValue" => Some(Self::Bool),
			"integerValue" => Some(Self::Int64),
			"doubleValue" => Some(Self::Double),
			"stringValue" => Some(Self::String),
			"bytesValue" => Some(Self::Bytes),
			"timestampValue" => Some(Self::Timestamp),
			"referenceValue" => Some(Self::Reference),
			"geoPointValue" => Some(Self::GeoPoint),
			"arrayValue" => Some(Self::Array),
			"mapValue" => Some(Self::Map),
			_ => None,
		}
	}
}

/// A geographic point, compared lexicographically on `(latitude, longitude)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
	pub latitude: f64,
	pub longitude: f64,
}

/// A tagged sum over Firestore's value types (§3). Arrays and maps are
/// recursive but never cyclic — documents form a tree (§9 "Cyclic and
/// polymorphic data").
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
	Null,
	Bool(bool),
	Int64(i64),
	Double(f64),
	String(String),
	Bytes(Vec<u8>),
	/// Nanoseconds since the Unix epoch.
	Timestamp(i64),
	/// A canonical document path, e.g. `projects/p/databases/d/documents/c/id`.
	Reference(String),
	GeoPoint(GeoPoint),
	Array(Vec<FieldValue>),
	Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
	pub fn value_type(&self) -> FieldValueType {
		match self {
			Self::Null => FieldValueType::Null,
			Self::Bool(_) => FieldValueType::Bool,
			Self::Int64(_) => FieldValueType::Int64,
			Self::Double(_) => FieldValueType::Double,
			Self::String(_) => FieldValueType::String,
			Self::Bytes(_) => FieldValueType::Bytes,
			Self::Timestamp(_) => FieldValueType::Timestamp,
			Self::Reference(_) => FieldValueType::Reference,
			Self::GeoPoint(_) => FieldValueType::GeoPoint,
			Self::Array(_) => FieldValueType::Array,
			Self::Map(_) => FieldValueType::Map,
		}
	}

	pub fn is_array(&self) -> bool {
		matches!(self, Self::Array(_))
	}

	/// Tag-first, then value-wise comparison (§3). Returns `None` across tags
	/// — callers (the query planner) must reject such comparisons rather than
	/// silently picking an order.
	pub fn partial_cmp_typed(&self, other: &Self) -> Option<Ordering> {
		if self.value_type() != other.value_type() {
			return None;
		}
		match (self, other) {
			(Self::Null, Self::Null) => Some(Ordering::Equal),
			(Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
			(Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
			(Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
			(Self::String(a), Self::String(b)) => Some(a.cmp(b)),
			(Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
			(Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
			(Self::Reference(a), Self::Reference(b)) => Some(a.cmp(b)),
			(Self::GeoPoint(a), Self::GeoPoint(b)) => (a.latitude, a.longitude)
				.partial_cmp(&(b.latitude, b.longitude)),
			// Arrays and maps have no defined order; callers should never
			// compile an ordered comparison against them.
			_ => None,
		}
	}
}
