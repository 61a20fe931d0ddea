//! `Find`/`FindOneAndUpdate` option shapes (§6.2).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
	Asc,
	Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FindOptions {
	pub sort: Vec<(String, SortDirection)>,
	pub skip: Option<u64>,
	pub limit: Option<u64>,
	/// Field names to project; `None` returns the full document.
	pub projection: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FindOneAndUpdateOptions {
	pub upsert: bool,
	/// Return the post-update document rather than the pre-update one.
	pub return_new: bool,
	pub sort: Vec<(String, SortDirection)>,
}
