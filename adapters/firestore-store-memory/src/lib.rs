//! In-memory reference implementation of the `BackingStore` port (§6.2).
//!
//! Exists so the core crates' own test suites can exercise `QueryEngine`,
//! `DocumentOperations`, `AtomicTransforms` and `SecurityRulesEngine`
//! end-to-end without a real document store (§1 places the backing store
//! out of scope only as a *production* dependency). Declares no transaction
//! support: `begin_transaction` always returns `None`, exercising the
//! sequential fallback path of §4.4/§9.

pub mod matcher;
pub mod mutate;
pub mod path;
pub mod prelude;
pub mod store;

// vim: ts=4
