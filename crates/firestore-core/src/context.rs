//! Request-scoped context: the principal and tenant coordinates every
//! `FirestoreCore` call is addressed against (§3 SecurityContext, §4.10
//! TenantRouter "every public operation accepts a context that MUST carry
//! organizationID").

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use firestore_types::ids::{DatabaseId, OrgId, ProjectId};

/// The authenticated principal a request carries, if any. `claims` feeds
/// `auth.token.*` access inside rule conditions (§4.7 "Identifiers").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
	pub uid: String,
	pub claims: BTreeMap<String, JsonValue>,
}

impl AuthContext {
	pub fn new(uid: impl Into<String>) -> Self {
		Self { uid: uid.into(), claims: BTreeMap::new() }
	}
}

/// Everything a `FirestoreCore` call needs to locate the right tenant and
/// authenticate the caller. `org_id` is `None` only for callers that have
/// not yet resolved one; routing such a context fails with
/// `OrganizationRequired` (§4.10).
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
	pub org_id: Option<OrgId>,
	pub auth: Option<AuthContext>,
}

impl RequestContext {
	pub fn new(org_id: OrgId) -> Self {
		Self { org_id: Some(org_id), auth: None }
	}

	#[must_use]
	pub fn with_auth(mut self, auth: AuthContext) -> Self {
		self.auth = Some(auth);
		self
	}
}

/// The `(projectID, databaseID)` pair every document/query/rule operation is
/// scoped to, within the organization `RequestContext.org_id` resolves
/// (§6.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabaseScope {
	pub project_id: ProjectId,
	pub database_id: DatabaseId,
}

impl DatabaseScope {
	pub fn new(project_id: ProjectId, database_id: DatabaseId) -> Self {
		Self { project_id, database_id }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn with_auth_sets_principal() {
		let ctx = RequestContext::new(OrgId(1)).with_auth(AuthContext::new("u1"));
		assert_eq!(ctx.auth.unwrap().uid, "u1");
	}
}
