//! C10 `TenantRouter` (§4.10): extracts `organizationID`, memoizes a
//! per-organization engine stack, and delegates. Isolation is structural —
//! each organization gets its own `BackingStore` instance from the supplied
//! factory, so no two organizations' engines can share mutable state.

use std::sync::Arc;

use dashmap::DashMap;

use firestore_documents::document_operations::DocumentOperations;
use firestore_documents::atomic_transforms::AtomicTransforms;
use firestore_query::query_engine::{QueryEngine, QueryEngineConfig};
use firestore_realtime::event_store::{RealtimeEventStore, RealtimeEventStoreConfig};
use firestore_rules::rules_engine::{RulesEngineConfig, SecurityRulesEngine};
use firestore_store::backing_store::BackingStore;
use firestore_types::error::{Error, FsResult};
use firestore_types::ids::OrgId;
use firestore_types::prelude::debug;

/// The full per-organization engine stack (§4.10 "memoizes a per-organization
/// engine stack (QueryEngine, DocumentOperations, AtomicTransforms,
/// SecurityRulesEngine, RealtimeEventStore, etc.)").
pub struct TenantEngines {
	pub query_engine: Arc<QueryEngine>,
	pub document_operations: Arc<DocumentOperations>,
	pub atomic_transforms: Arc<AtomicTransforms>,
	pub rules_engine: Arc<SecurityRulesEngine>,
	pub realtime_event_store: Arc<RealtimeEventStore>,
}

/// Bounded-resource tunables threaded into every per-organization engine
/// stack the router constructs, following this workspace's `*Config` pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantRouterConfig {
	pub query_engine: QueryEngineConfig,
	pub rules_engine: RulesEngineConfig,
	pub realtime_event_store: RealtimeEventStoreConfig,
}

/// Constructs a tenant-scoped `BackingStore`. Called at most once per
/// organization; the router caches the result for the process lifetime (or
/// until `evict`).
pub type BackingStoreFactory = dyn Fn(OrgId) -> Arc<dyn BackingStore> + Send + Sync;

pub struct TenantRouter {
	factory: Box<BackingStoreFactory>,
	config: TenantRouterConfig,
	engines: DashMap<OrgId, Arc<TenantEngines>>,
}

impl std::fmt::Debug for TenantRouter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TenantRouter").field("tenant_count", &self.engines.len()).finish()
	}
}

impl TenantRouter {
	pub fn new(factory: impl Fn(OrgId) -> Arc<dyn BackingStore> + Send + Sync + 'static, config: TenantRouterConfig) -> Self {
		Self { factory: Box::new(factory), config, engines: DashMap::new() }
	}

	fn build_engines(&self, org_id: OrgId) -> Arc<TenantEngines> {
		let store = (self.factory)(org_id);
		Arc::new(TenantEngines {
			query_engine: Arc::new(QueryEngine::new(store.clone(), self.config.query_engine)),
			document_operations: Arc::new(DocumentOperations::new(store.clone())),
			atomic_transforms: Arc::new(AtomicTransforms::new(store.clone())),
			rules_engine: Arc::new(SecurityRulesEngine::new(store.clone(), self.config.rules_engine)),
			realtime_event_store: Arc::new(RealtimeEventStore::new(self.config.realtime_event_store)),
		})
	}

	/// Extracts `organizationID` from the caller-supplied context and
	/// returns the memoized engine stack for it, building one on first use
	/// (§4.10 "Contract"). `OrganizationRequired` when `org_id` is `None`.
	pub fn engines_for(&self, org_id: Option<OrgId>) -> FsResult<Arc<TenantEngines>> {
		let org_id = org_id.ok_or(Error::OrganizationRequired)?;
		if let Some(existing) = self.engines.get(&org_id) {
			return Ok(existing.clone());
		}
		let engines = self.engines.entry(org_id).or_insert_with(|| {
			debug!(%org_id, "building engine stack for organization");
			self.build_engines(org_id)
		});
		Ok(engines.clone())
	}

	/// Process-lifetime cache size (SUPPLEMENTED FEATURES).
	pub fn tenant_count(&self) -> usize {
		self.engines.len()
	}

	/// Drops a cached organization's engine stack. The organization's
	/// `BackingStore` is rebuilt from the factory on its next access
	/// (SUPPLEMENTED FEATURES).
	pub fn evict(&self, org_id: OrgId) -> bool {
		self.engines.remove(&org_id).is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use firestore_store_memory::store::MemoryBackingStore;

	fn router() -> TenantRouter {
		TenantRouter::new(|_org_id| Arc::new(MemoryBackingStore::default()), TenantRouterConfig::default())
	}

	#[test]
	fn missing_organization_is_rejected() {
		let router = router();
		assert!(matches!(router.engines_for(None), Err(Error::OrganizationRequired)));
	}

	#[test]
	fn engines_are_memoized_per_organization() {
		let router = router();
		let a1 = router.engines_for(Some(OrgId(1))).unwrap();
		let a2 = router.engines_for(Some(OrgId(1))).unwrap();
		assert!(Arc::ptr_eq(&a1, &a2));
		assert_eq!(router.tenant_count(), 1);
	}

	#[test]
	fn distinct_organizations_get_distinct_stacks() {
		let router = router();
		let a = router.engines_for(Some(OrgId(1))).unwrap();
		let b = router.engines_for(Some(OrgId(2))).unwrap();
		assert!(!Arc::ptr_eq(&a, &b));
		assert_eq!(router.tenant_count(), 2);
	}

	#[test]
	fn evict_drops_the_cached_stack() {
		let router = router();
		let a1 = router.engines_for(Some(OrgId(1))).unwrap();
		assert!(router.evict(OrgId(1)));
		assert_eq!(router.tenant_count(), 0);
		let a2 = router.engines_for(Some(OrgId(1))).unwrap();
		assert!(!Arc::ptr_eq(&a1, &a2));
	}

	#[test]
	fn evicting_unknown_organization_is_a_no_op() {
		let router = router();
		assert!(!router.evict(OrgId(99)));
	}
}
