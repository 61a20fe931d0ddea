//! Translate a dotted field path + typed value into a backing-store field
//! reference (§4.1).

use firestore_types::error::{Error, FsResult};
use firestore_types::field_path::FieldPath;
use firestore_types::field_value::FieldValueType;

/// Stateless — the rules are pure functions of `(path, type)` (§4.1
/// "Rules"), so this is a unit struct rather than something with a cache;
/// `TypeInferenceCache` is the piece that remembers anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldPathResolver;

impl FieldPathResolver {
	/// Resolves a non-array field reference: `fields.<root>` for a simple
	/// path, `fields.a.value.b...value.<leaf>` for a nested one, with the
	/// final segment carrying the type tag.
	pub fn resolve(&self, path: &FieldPath, value_type: FieldValueType) -> FsResult<String> {
		let segments = path.segments();
		if segments.is_empty() {
			return Err(Error::NilFieldPath);
		}
		let mut resolved = format!("fields.{}", segments[0]);
		for segment in &segments[1..] {
			resolved.push_str(&format!(".value.{segment}"));
		}
		resolved.push_str(&format!(".{}", value_type.storage_tag()));
		Ok(resolved)
	}

	/// Resolves an array-operator reference: `fields.<root>.arrayValue.values`.
	/// Rejects nested paths — array operators on `a.b` have no defined
	/// storage shape (§4.1 "Errors").
	pub fn resolve_array(&self, path: &FieldPath) -> FsResult<String> {
		if path.is_nested() {
			return Err(Error::UnsupportedOperation(format!(
				"array operator forbidden on nested field path {path}"
			)));
		}
		Ok(format!("fields.{}.arrayValue.values", path.root()))
	}

	/// Resolves a map-projection reference (§4.1 "Map access").
	pub fn resolve_map(&self, path: &FieldPath, field_name: &str) -> FsResult<String> {
		let base = self.resolve_map_base(path)?;
		Ok(format!("{base}.mapValue.fields.{field_name}"))
	}

	fn resolve_map_base(&self, path: &FieldPath) -> FsResult<String> {
		let segments = path.segments();
		if segments.is_empty() {
			return Err(Error::NilFieldPath);
		}
		let mut resolved = format!("fields.{}", segments[0]);
		for segment in &segments[1..] {
			resolved.push_str(&format!(".value.{segment}"));
		}
		Ok(resolved)
	}

	/// Resolves with the default value type (`string`) when the caller has
	/// no explicit or inferred type (§4.1 "the resolver never guesses").
	pub fn resolve_default(&self, path: &FieldPath) -> FsResult<String> {
		self.resolve(path, FieldValueType::String)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fp(s: &str) -> FieldPath {
		FieldPath::parse(s).unwrap()
	}

	#[test]
	fn simple_leaf_resolves_to_tagged_field() {
		let r = FieldPathResolver;
		assert_eq!(r.resolve(&fp("x"), FieldValueType::Int64).unwrap(), "fields.x.integerValue");
	}

	#[test]
	fn nested_leaf_uses_value_convention() {
		let r = FieldPathResolver;
		assert_eq!(
			r.resolve(&fp("a.b.c"), FieldValueType::String).unwrap(),
			"fields.a.value.b.value.c.stringValue"
		);
	}

	#[test]
	fn array_leaf_targets_values_list() {
		let r = FieldPathResolver;
		assert_eq!(r.resolve_array(&fp("items")).unwrap(), "fields.items.arrayValue.values");
	}

	#[test]
	fn array_op_rejects_nested_path() {
		let r = FieldPathResolver;
		assert!(r.resolve_array(&fp("a.b")).is_err());
	}

	#[test]
	fn resolution_is_deterministic_and_idempotent() {
		let r = FieldPathResolver;
		let a = r.resolve(&fp("customer.ruc"), FieldValueType::String).unwrap();
		let b = r.resolve(&fp("customer.ruc"), FieldValueType::String).unwrap();
		assert_eq!(a, b);
	}
}
