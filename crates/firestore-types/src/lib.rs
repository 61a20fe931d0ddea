//! Shared data model, identifiers and error taxonomy for the
//! Firestore-compatible document database core.
//!
//! This crate holds the path/model primitives every other crate in the
//! workspace builds on: `FieldValue`, `FieldPath`, `Document`, `Query`,
//! `SecurityRule`/`SecurityContext`, and `RealtimeEvent`. Extracting these
//! into their own crate lets the query, documents, rules and realtime crates
//! compile independently against a stable, dependency-light core.

pub mod document;
pub mod error;
pub mod event;
pub mod field_path;
pub mod field_value;
pub mod ids;
pub mod prelude;
pub mod query;
pub mod security;

// vim: ts=4
