//! Filters, orders and queries (§3 Filter/Order/Query, §4.3 capability limits).

use crate::error::{Error, FsResult};
use crate::field_path::FieldPath;
use crate::field_value::{FieldValue, FieldValueType};

/// Maximum filters accepted by a single query (§8 "Boundary behaviors").
pub const MAX_FILTER_COUNT: usize = 100;
/// Maximum `Order` entries per query (§3).
pub const MAX_ORDER_COUNT: usize = 32;
/// Maximum field-path nesting depth a query may reference (§4.3).
pub const MAX_NESTING_DEPTH: usize = 100;
/// `in`/`not-in`/`array-contains-any` sequence length bound (§3).
pub const MAX_SEQUENCE_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	ArrayContains,
	ArrayContainsAny,
	In,
	NotIn,
}

impl Operator {
	pub fn is_array_op(self) -> bool {
		matches!(self, Self::ArrayContains | Self::ArrayContainsAny)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Eq => "==",
			Self::Ne => "!=",
			Self::Lt => "<",
			Self::Le => "<=",
			Self::Gt => ">",
			Self::Ge => ">=",
			Self::ArrayContains => "array-contains",
			Self::ArrayContainsAny => "array-contains-any",
			Self::In => "in",
			Self::NotIn => "not-in",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
	And,
	Or,
}

/// A `Filter` (§3): either a leaf comparison or a composite AND/OR tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
	Leaf {
		field_path: FieldPath,
		operator: Operator,
		value: FieldValue,
		value_type: Option<FieldValueType>,
	},
	Composite {
		kind: CompositeKind,
		sub_filters: Vec<Filter>,
	},
}

impl Filter {
	pub fn leaf(field_path: FieldPath, operator: Operator, value: FieldValue) -> FsResult<Self> {
		Self::validate_leaf(&field_path, operator, &value)?;
		Ok(Self::Leaf { field_path, operator, value, value_type: None })
	}

	fn validate_leaf(field_path: &FieldPath, operator: Operator, value: &FieldValue) -> FsResult<()> {
		if operator.is_array_op() && field_path.is_nested() {
			return Err(Error::UnsupportedOperation(format!(
				"{} forbidden on nested field path {field_path}",
				operator.as_str()
			)));
		}
		match operator {
			Operator::In | Operator::NotIn | Operator::ArrayContainsAny => {
				let FieldValue::Array(items) = value else {
					return Err(Error::InvalidArgument(format!(
						"{} requires a sequence value",
						operator.as_str()
					)));
				};
				if items.is_empty() || items.len() > MAX_SEQUENCE_LEN {
					return Err(Error::InvalidArgument(format!(
						"{} sequence must have length 1..={MAX_SEQUENCE_LEN}, got {}",
						operator.as_str(),
						items.len()
					)));
				}
				if operator != Operator::ArrayContainsAny {
					let tag = items[0].value_type();
					if items.iter().any(|v| v.value_type() != tag) {
						return Err(Error::InvalidArgument(format!(
							"{} sequence elements must share a single type tag",
							operator.as_str()
						)));
					}
				}
			}
			_ => {}
		}
		Ok(())
	}

	/// Recursively validates nesting depth and array-op placement, returning
	/// the count of leaf filters encountered (used by `Query::validate`).
	fn count_leaves(&self, depth: usize) -> FsResult<usize> {
		if depth > MAX_NESTING_DEPTH {
			return Err(Error::QueryValidation(format!("filter nesting exceeds {MAX_NESTING_DEPTH}")));
		}
		match self {
			Self::Leaf { .. } => Ok(1),
			Self::Composite { sub_filters, .. } => {
				let mut total = 0;
				for f in sub_filters {
					total += f.count_leaves(depth + 1)?;
				}
				Ok(total)
			}
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Asc,
	Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
	pub field_path: FieldPath,
	pub direction: Direction,
}

/// A cursor boundary: one value per `Order` entry, aligned positionally.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cursor {
	pub values: Vec<FieldValue>,
}

/// A `Query` (§3). Cursor fields align positionally with `orders`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
	pub collection_path: String,
	pub all_descendants: bool,
	pub filters: Vec<Filter>,
	pub orders: Vec<Order>,
	pub limit: Option<u32>,
	pub offset: Option<u32>,
	pub limit_to_last: bool,
	pub start_at: Option<Cursor>,
	pub start_after: Option<Cursor>,
	pub end_at: Option<Cursor>,
	pub end_before: Option<Cursor>,
	pub select_fields: Option<Vec<FieldPath>>,
}

impl Query {
	/// Verifies the invariants of §3 and the capability limits of §4.3.
	pub fn validate(&self) -> FsResult<()> {
		let mut leaf_count = 0;
		for filter in &self.filters {
			leaf_count += filter.count_leaves(0)?;
		}
		if leaf_count > MAX_FILTER_COUNT {
			return Err(Error::QueryValidation(format!(
				"query has {leaf_count} filters, maximum is {MAX_FILTER_COUNT}"
			)));
		}
		if self.orders.len() > MAX_ORDER_COUNT {
			return Err(Error::QueryValidation(format!(
				"query has {} orders, maximum is {MAX_ORDER_COUNT}",
				self.orders.len()
			)));
		}
		if self.limit_to_last && self.orders.is_empty() {
			return Err(Error::QueryValidation("limitToLast requires at least one order".into()));
		}
		for cursor in [&self.start_at, &self.start_after, &self.end_at, &self.end_before]
			.into_iter()
			.flatten()
		{
			if cursor.values.len() > self.orders.len() {
				return Err(Error::QueryValidation(
					"cursor values must align positionally with orders".into(),
				));
			}
		}
		Ok(())
	}
}

/// Declared backing-store capabilities (§4.3) with conservative defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
	pub supports_nested: bool,
	pub supports_array_contains: bool,
	pub supports_collection_group: bool,
	pub supports_transactions: bool,
	pub max_filter_count: usize,
	pub max_order_by_count: usize,
	pub max_nesting_depth: usize,
}

impl Default for Capabilities {
	fn default() -> Self {
		Self {
			supports_nested: true,
			supports_array_contains: true,
			supports_collection_group: true,
			supports_transactions: false,
			max_filter_count: MAX_FILTER_COUNT,
			max_order_by_count: MAX_ORDER_COUNT,
			max_nesting_depth: MAX_NESTING_DEPTH,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fp(s: &str) -> FieldPath {
		FieldPath::parse(s).unwrap()
	}

	#[test]
	fn array_contains_rejected_on_nested_path() {
		let err = Filter::leaf(fp("a.b"), Operator::ArrayContains, FieldValue::Int64(1));
		assert!(err.is_err());
	}

	#[test]
	fn in_requires_nonempty_sequence() {
		let err = Filter::leaf(fp("status"), Operator::In, FieldValue::Array(vec![]));
		assert!(err.is_err());
	}

	#[test]
	fn in_requires_matching_tags() {
		let seq = FieldValue::Array(vec![FieldValue::Int64(1), FieldValue::String("x".into())]);
		let err = Filter::leaf(fp("status"), Operator::In, seq);
		assert!(err.is_err());
	}

	#[test]
	fn query_over_filter_limit_is_rejected() {
		let filters: Vec<Filter> = (0..=MAX_FILTER_COUNT)
			.map(|i| Filter::leaf(fp("x"), Operator::Eq, FieldValue::Int64(i as i64)).unwrap())
			.collect();
		let q = Query { filters, ..Default::default() };
		assert!(q.validate().is_err());
	}

	#[test]
	fn limit_to_last_without_order_is_rejected() {
		let q = Query { limit_to_last: true, ..Default::default() };
		assert!(q.validate().is_err());
	}

	#[test]
	fn empty_query_validates() {
		let q = Query::default();
		assert!(q.validate().is_ok());
	}
}
