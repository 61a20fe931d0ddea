//! Document CRUD, canonical-path parsing, listing, batch writes, atomic
//! transforms and the `RunTransaction` facade (§4.4, §4.5).

pub mod atomic_transforms;
pub mod canonical_path;
pub mod clock;
pub mod document_operations;
pub mod prelude;

// vim: ts=4
