//! Per-organization engine routing (§4.10 TenantRouter): extracts
//! `organizationID`, memoizes a per-organization engine stack behind a
//! lock-free cache, and enforces tenant isolation structurally — every
//! organization gets its own `BackingStore` instance.

pub mod prelude;
pub mod router;

// vim: ts=4
