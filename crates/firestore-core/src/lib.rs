//! The integrated Firestore-compatible core (§2 "Overview"): wires
//! `SecurityRulesEngine`, `QueryEngine`, `DocumentOperations`,
//! `AtomicTransforms` and `RealtimeEventStore` behind one request pipeline,
//! routed per organization by `TenantRouter`.

pub mod clock;
pub mod context;
pub mod engine;
pub mod prelude;

// vim: ts=4
