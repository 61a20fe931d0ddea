//! C7 `SecurityRulesEngine` (§4.7): loads, validates, persists and
//! evaluates security rules.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use serde_json::{json, Value as JsonValue};
use tokio::sync::RwLock;

use firestore_store::backing_store::BackingStore;
use firestore_store::cursor::collect_documents;
use firestore_store::find::FindOptions;
use firestore_store::stored_document::{StoreFilter, StoredDocument};
use firestore_store::transaction::StoreTransaction;
use firestore_types::error::{Error, FsResult};
use firestore_types::prelude::{debug, info, warn};
use firestore_types::security::{Operation, SecurityContext, SecurityRule};

use crate::evaluator::Evaluator;
use crate::expr::{self, Expr};
use crate::pattern::{self, CompiledPattern};
use crate::resource_accessor::{DefaultResourceAccessor, ResourceAccessor};

/// The physical collection rule documents are stored under. Not a tenant
/// collection in the `fields.*`-tagged sense (§6.3) — rules persist their
/// own plain-JSON shape, decoded only by this module.
const RULES_COLLECTION: &str = "_firestore_security_rules";

/// Bounded-resource tunable, following this workspace's `*Config` pattern.
#[derive(Debug, Clone, Copy)]
pub struct RulesEngineConfig {
	pub cache_capacity: usize,
}

impl Default for RulesEngineConfig {
	fn default() -> Self {
		Self { cache_capacity: 256 }
	}
}

#[derive(Debug)]
struct CompiledRule {
	rule: SecurityRule,
	pattern: CompiledPattern,
	allow: BTreeMap<Operation, Expr>,
	deny: BTreeMap<Operation, Expr>,
}

#[derive(Debug)]
struct CompiledRuleSet {
	rules: Vec<CompiledRule>,
}

/// `EvaluateAccess`'s result (§4.7).
#[derive(Debug, Clone)]
pub struct AccessDecision {
	pub allowed: bool,
	pub allowed_by: Option<SecurityRule>,
	pub denied_by: Option<SecurityRule>,
	pub reason: String,
	pub rule_match: Option<String>,
	pub evaluation_time_ms: f64,
}

/// Per-process rule statistics (SUPPLEMENTED FEATURES: observability the
/// distilled spec leaves implicit).
#[derive(Default)]
pub struct RulesEngineStats {
	pub cache_hits: AtomicU64,
	pub cache_misses: AtomicU64,
}

impl RulesEngineStats {
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(AtomicOrdering::Relaxed)
	}

	pub fn cache_misses(&self) -> u64 {
		self.cache_misses.load(AtomicOrdering::Relaxed)
	}
}

#[derive(Debug)]
pub struct SecurityRulesEngine {
	store: Arc<dyn BackingStore>,
	cache: RwLock<LruCache<String, Arc<CompiledRuleSet>>>,
	accessor: RwLock<Arc<dyn ResourceAccessor>>,
	stats: RulesEngineStats,
}

impl std::fmt::Debug for RulesEngineStats {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RulesEngineStats")
			.field("cache_hits", &self.cache_hits())
			.field("cache_misses", &self.cache_misses())
			.finish()
	}
}

fn cache_key(project_id: &str, database_id: &str) -> String {
	format!("{project_id}:{database_id}")
}

fn rule_to_fields(rule: &SecurityRule) -> BTreeMap<String, JsonValue> {
	let mut fields = BTreeMap::new();
	fields.insert("pathMatch".to_string(), json!(rule.path_match));
	fields.insert("priority".to_string(), json!(rule.priority));
	fields.insert(
		"allow".to_string(),
		JsonValue::Object(rule.allow.iter().map(|(op, cond)| (op.as_str().to_string(), json!(cond))).collect()),
	);
	fields.insert(
		"deny".to_string(),
		JsonValue::Object(rule.deny.iter().map(|(op, cond)| (op.as_str().to_string(), json!(cond))).collect()),
	);
	fields.insert("description".to_string(), json!(rule.description));
	fields.insert("createdAt".to_string(), json!(rule.created_at));
	fields.insert("updatedAt".to_string(), json!(rule.updated_at));
	fields
}

fn fields_to_rule(stored: &StoredDocument) -> FsResult<SecurityRule> {
	let get_str = |key: &str| -> FsResult<String> {
		stored
			.fields
			.get(key)
			.and_then(JsonValue::as_str)
			.map(str::to_string)
			.ok_or_else(|| Error::Internal(format!("security rule document missing string field {key:?}")))
	};
	let get_i64 = |key: &str| -> FsResult<i64> {
		stored
			.fields
			.get(key)
			.and_then(JsonValue::as_i64)
			.ok_or_else(|| Error::Internal(format!("security rule document missing integer field {key:?}")))
	};
	let get_conditions = |key: &str| -> FsResult<BTreeMap<Operation, String>> {
		let obj = stored
			.fields
			.get(key)
			.and_then(JsonValue::as_object)
			.ok_or_else(|| Error::Internal(format!("security rule document missing object field {key:?}")))?;
		let mut out = BTreeMap::new();
		for (k, v) in obj {
			let op = Operation::parse(k)?;
			let cond = v.as_str().ok_or_else(|| Error::Internal(format!("condition {k:?} is not a string")))?;
			out.insert(op, cond.to_string());
		}
		Ok(out)
	};
	Ok(SecurityRule {
		project_id: stored.project_id.clone(),
		database_id: stored.database_id.clone(),
		path_match: get_str("pathMatch")?,
		priority: get_i64("priority")?,
		allow: get_conditions("allow")?,
		deny: get_conditions("deny")?,
		description: stored.fields.get("description").and_then(JsonValue::as_str).map(str::to_string),
		created_at: get_i64("createdAt")?,
		updated_at: get_i64("updatedAt")?,
	})
}

fn compile_rule(rule: SecurityRule) -> FsResult<CompiledRule> {
	rule.validate_shape()?;
	let pattern = pattern::compile(&rule.path_match)?;
	let allow = rule.allow.iter().map(|(op, src)| expr::parse(src).map(|e| (*op, e))).collect::<FsResult<BTreeMap<_, _>>>()?;
	let deny = rule.deny.iter().map(|(op, src)| expr::parse(src).map(|e| (*op, e))).collect::<FsResult<BTreeMap<_, _>>>()?;
	Ok(CompiledRule { rule, pattern, allow, deny })
}

impl SecurityRulesEngine {
	pub fn new(store: Arc<dyn BackingStore>, config: RulesEngineConfig) -> Self {
		let capacity = NonZeroUsize::new(config.cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
		let accessor: Arc<dyn ResourceAccessor> = Arc::new(DefaultResourceAccessor::new(store.clone()));
		Self { store, cache: RwLock::new(LruCache::new(capacity)), accessor: RwLock::new(accessor), stats: RulesEngineStats::default() }
	}

	pub fn stats(&self) -> &RulesEngineStats {
		&self.stats
	}

	/// Swaps the `get()`/`exists()` implementation (§4.7 `SetResourceAccessor`).
	pub async fn set_resource_accessor(&self, accessor: Arc<dyn ResourceAccessor>) {
		*self.accessor.write().await = accessor;
	}

	/// `ValidateRules`: structural and syntactic checks without touching
	/// storage or the cache (§4.7 "Validation").
	pub fn validate_rules(rules: &[SecurityRule]) -> FsResult<()> {
		let mut seen_priorities = std::collections::BTreeSet::new();
		for rule in rules {
			rule.validate_shape()?;
			if !seen_priorities.insert(rule.priority) {
				return Err(Error::InvalidArgument(format!("duplicate rule priority {}", rule.priority)));
			}
			pattern::compile(&rule.path_match)?;
			for cond in rule.allow.values().chain(rule.deny.values()) {
				expr::parse(cond)?;
			}
		}
		Ok(())
	}

	async fn load_ruleset(&self, project_id: &str, database_id: &str) -> FsResult<Arc<CompiledRuleSet>> {
		let key = cache_key(project_id, database_id);
		if let Some(hit) = self.cache.write().await.get(&key).cloned() {
			self.stats.cache_hits.fetch_add(1, AtomicOrdering::Relaxed);
			return Ok(hit);
		}
		self.stats.cache_misses.fetch_add(1, AtomicOrdering::Relaxed);
		let rules = self.load_rules_uncached(project_id, database_id).await?;
		let mut compiled = rules.into_iter().map(compile_rule).collect::<FsResult<Vec<_>>>()?;
		compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
		let ruleset = Arc::new(CompiledRuleSet { rules: compiled });
		self.cache.write().await.put(key, ruleset.clone());
		Ok(ruleset)
	}

	async fn load_rules_uncached(&self, project_id: &str, database_id: &str) -> FsResult<Vec<SecurityRule>> {
		let filter = StoreFilter(json!({
			"$and": [
				{ "projectID": { "$eq": project_id } },
				{ "databaseID": { "$eq": database_id } },
			]
		}));
		let cursor = self.store.find(RULES_COLLECTION, &filter, &FindOptions::default()).await?;
		let stored = collect_documents(cursor).await?;
		stored.iter().map(fields_to_rule).collect()
	}

	/// `LoadRules(p,d)`: returns the (uncompiled) rule documents currently
	/// in effect, bypassing the compiled-rule cache.
	pub async fn load_rules(&self, project_id: &str, database_id: &str) -> FsResult<Vec<SecurityRule>> {
		self.load_rules_uncached(project_id, database_id).await
	}

	/// `SaveRules`: replace-all within `(p,d)` (§4.7 "Persistence"). Prefers
	/// a transactional boundary; falls back to sequential delete-then-insert
	/// and surfaces any partial failure. The cache entry is invalidated
	/// either way.
	pub async fn save_rules(&self, project_id: &str, database_id: &str, rules: Vec<SecurityRule>) -> FsResult<()> {
		Self::validate_rules(&rules)?;

		let existing = self.load_rules_uncached(project_id, database_id).await?;
		let result = match self.store.begin_transaction().await? {
			Some(txn) => self.save_rules_transactional(txn, project_id, database_id, &existing, &rules).await,
			None => self.save_rules_sequential(project_id, database_id, &existing, &rules).await,
		};
		self.cache.write().await.pop(&cache_key(project_id, database_id));
		result
	}

	async fn save_rules_transactional(
		&self,
		mut txn: Box<dyn StoreTransaction>,
		project_id: &str,
		database_id: &str,
		existing: &[SecurityRule],
		rules: &[SecurityRule],
	) -> FsResult<()> {
		for (index, _) in existing.iter().enumerate() {
			let filter = identity_filter(project_id, database_id, &rule_document_id(index));
			txn.delete_one(RULES_COLLECTION, &filter).await?;
		}
		for (index, rule) in rules.iter().enumerate() {
			let stored = rule_document(project_id, database_id, &rule_document_id(index), rule);
			txn.insert_one(RULES_COLLECTION, stored).await?;
		}
		txn.commit().await?;
		info!(project_id, database_id, rule_count = rules.len(), "saved security rules (transactional)");
		Ok(())
	}

	async fn save_rules_sequential(
		&self,
		project_id: &str,
		database_id: &str,
		existing: &[SecurityRule],
		rules: &[SecurityRule],
	) -> FsResult<()> {
		for index in 0..existing.len() {
			let filter = identity_filter(project_id, database_id, &rule_document_id(index));
			if let Err(err) = self.store.delete_one(RULES_COLLECTION, &filter).await {
				warn!(project_id, database_id, %err, "partial failure deleting prior security rules");
				return Err(err);
			}
		}
		for (index, rule) in rules.iter().enumerate() {
			let stored = rule_document(project_id, database_id, &rule_document_id(index), rule);
			if let Err(err) = self.store.insert_one(RULES_COLLECTION, stored).await {
				warn!(project_id, database_id, %err, "partial failure inserting new security rules");
				return Err(err);
			}
		}
		info!(project_id, database_id, rule_count = rules.len(), "saved security rules (sequential fallback)");
		Ok(())
	}

	/// `ClearCache(p,d)`.
	pub async fn clear_cache(&self, project_id: &str, database_id: &str) {
		self.cache.write().await.pop(&cache_key(project_id, database_id));
	}

	/// `ClearAllCache()`.
	pub async fn clear_all_cache(&self) {
		self.cache.write().await.clear();
	}

	/// `EvaluateAccess(op, ctx)` (§4.7 "Evaluation algorithm").
	pub async fn evaluate_access(&self, op: Operation, ctx: &SecurityContext) -> FsResult<AccessDecision> {
		let start = Instant::now();
		let ruleset = self.load_ruleset(&ctx.project_id, &ctx.database_id).await?;
		let accessor = self.accessor.read().await.clone();

		if ruleset.rules.is_empty() {
			return Ok(AccessDecision {
				allowed: false,
				allowed_by: None,
				denied_by: None,
				reason: "default deny".to_string(),
				rule_match: None,
				evaluation_time_ms: elapsed_ms(start),
			});
		}

		for compiled in &ruleset.rules {
			let relative = ctx.path.trim_start_matches('/');
			let Some(bound) = compiled.pattern.matches(relative) else { continue };

			let mut augmented = ctx.clone();
			for (name, value) in bound {
				augmented.variables.insert(name, value);
			}

			if let Some(cond) = compiled.deny.get(&op) {
				match Evaluator::new(&augmented, accessor.as_ref()).eval_condition(cond).await {
					Ok(true) => {
						return Ok(AccessDecision {
							allowed: false,
							allowed_by: None,
							denied_by: Some(compiled.rule.clone()),
							reason: format!("denied by rule {:?}", compiled.rule.path_match),
							rule_match: Some(compiled.rule.path_match.clone()),
							evaluation_time_ms: elapsed_ms(start),
						});
					}
					Ok(false) => {}
					Err(err) => {
						warn!(rule = %compiled.rule.path_match, %err, "deny condition evaluation failed, skipping");
					}
				}
			}

			if let Some(cond) = compiled.allow.get(&op) {
				match Evaluator::new(&augmented, accessor.as_ref()).eval_condition(cond).await {
					Ok(true) => {
						return Ok(AccessDecision {
							allowed: true,
							allowed_by: Some(compiled.rule.clone()),
							denied_by: None,
							reason: format!("allowed by rule {:?}", compiled.rule.path_match),
							rule_match: Some(compiled.rule.path_match.clone()),
							evaluation_time_ms: elapsed_ms(start),
						});
					}
					Ok(false) => {}
					Err(err) => {
						warn!(rule = %compiled.rule.path_match, %err, "allow condition evaluation failed, skipping");
					}
				}
			}
			debug!(rule = %compiled.rule.path_match, op = op.as_str(), "rule matched path but was inconclusive for this operation");
		}

		Ok(AccessDecision {
			allowed: false,
			allowed_by: None,
			denied_by: None,
			reason: "default deny: no rule granted access".to_string(),
			rule_match: None,
			evaluation_time_ms: elapsed_ms(start),
		})
	}
}

fn elapsed_ms(start: Instant) -> f64 {
	start.elapsed().as_secs_f64() * 1000.0
}

fn rule_document_id(index: usize) -> String {
	format!("rule-{index}")
}

fn identity_filter(project_id: &str, database_id: &str, document_id: &str) -> StoreFilter {
	StoreFilter(json!({
		"$and": [
			{ "projectID": { "$eq": project_id } },
			{ "databaseID": { "$eq": database_id } },
			{ "documentID": { "$eq": document_id } },
		]
	}))
}

fn rule_document(project_id: &str, database_id: &str, document_id: &str, rule: &SecurityRule) -> StoredDocument {
	StoredDocument {
		project_id: project_id.to_string(),
		database_id: database_id.to_string(),
		collection_id: RULES_COLLECTION.to_string(),
		document_id: document_id.to_string(),
		path: format!("projects/{project_id}/databases/{database_id}/documents/{RULES_COLLECTION}/{document_id}"),
		parent_path: format!("projects/{project_id}/databases/{database_id}/documents"),
		fields: rule_to_fields(rule),
		create_time: rule.created_at,
		update_time: rule.updated_at,
		version: 1,
		exists: true,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use firestore_store_memory::store::MemoryBackingStore;

	fn rule(path_match: &str, priority: i64, allow: &[(Operation, &str)], deny: &[(Operation, &str)]) -> SecurityRule {
		SecurityRule {
			project_id: "p".into(),
			database_id: "(default)".into(),
			path_match: path_match.to_string(),
			priority,
			allow: allow.iter().map(|(op, cond)| (*op, cond.to_string())).collect(),
			deny: deny.iter().map(|(op, cond)| (*op, cond.to_string())).collect(),
			description: None,
			created_at: 1,
			updated_at: 1,
		}
	}

	fn ctx(path: &str, uid: Option<&str>) -> SecurityContext {
		let mut c = SecurityContext::new("p", "(default)", path, 1000);
		c.user = uid.map(str::to_string);
		c
	}

	fn engine() -> SecurityRulesEngine {
		SecurityRulesEngine::new(Arc::new(MemoryBackingStore::default()), RulesEngineConfig::default())
	}

	#[tokio::test]
	async fn empty_rule_set_defaults_to_deny() {
		let engine = engine();
		let decision = engine.evaluate_access(Operation::Read, &ctx("/users/u1", Some("u1"))).await.unwrap();
		assert!(!decision.allowed);
		assert_eq!(decision.reason, "default deny");
	}

	#[tokio::test]
	async fn matching_owner_rule_allows_read() {
		let engine = engine();
		let rules = vec![rule("/users/{userId}", 0, &[(Operation::Read, "auth.uid == userId")], &[])];
		engine.save_rules("p", "(default)", rules).await.unwrap();
		let decision = engine.evaluate_access(Operation::Read, &ctx("/users/u1", Some("u1"))).await.unwrap();
		assert!(decision.allowed);

		let decision = engine.evaluate_access(Operation::Read, &ctx("/users/u1", Some("u2"))).await.unwrap();
		assert!(!decision.allowed);
	}

	#[tokio::test]
	async fn deny_rule_takes_priority_over_allow_at_same_priority() {
		let engine = engine();
		let rules = vec![rule("/users/{userId}", 0, &[(Operation::Read, "true")], &[(Operation::Read, "true")])];
		engine.save_rules("p", "(default)", rules).await.unwrap();
		let decision = engine.evaluate_access(Operation::Read, &ctx("/users/u1", Some("u1"))).await.unwrap();
		assert!(!decision.allowed);
		assert!(decision.denied_by.is_some());
	}

	#[tokio::test]
	async fn higher_priority_rule_is_evaluated_first() {
		let engine = engine();
		let rules = vec![
			rule("/users/{userId}", 0, &[(Operation::Read, "true")], &[]),
			rule("/users/{userId}", 10, &[], &[(Operation::Read, "true")]),
		];
		engine.save_rules("p", "(default)", rules).await.unwrap();
		let decision = engine.evaluate_access(Operation::Read, &ctx("/users/u1", Some("u1"))).await.unwrap();
		assert!(!decision.allowed);
		assert_eq!(decision.denied_by.unwrap().priority, 10);
	}

	#[tokio::test]
	async fn save_rules_replaces_prior_set() {
		let engine = engine();
		engine.save_rules("p", "(default)", vec![rule("/a/{x}", 0, &[(Operation::Read, "true")], &[])]).await.unwrap();
		engine.save_rules("p", "(default)", vec![rule("/b/{x}", 0, &[(Operation::Read, "true")], &[])]).await.unwrap();
		let loaded = engine.load_rules("p", "(default)").await.unwrap();
		assert_eq!(loaded.len(), 1);
		assert_eq!(loaded[0].path_match, "/b/{x}");
	}

	#[tokio::test]
	async fn save_rules_invalidates_cache() {
		let engine = engine();
		engine.save_rules("p", "(default)", vec![rule("/users/{userId}", 0, &[(Operation::Read, "true")], &[])]).await.unwrap();
		let _ = engine.evaluate_access(Operation::Read, &ctx("/users/u1", Some("u1"))).await.unwrap();
		engine.save_rules("p", "(default)", vec![]).await.unwrap();
		let decision = engine.evaluate_access(Operation::Read, &ctx("/users/u1", Some("u1"))).await.unwrap();
		assert!(!decision.allowed);
		assert_eq!(decision.reason, "default deny");
	}

	#[test]
	fn validate_rules_rejects_duplicate_priorities() {
		let rules = vec![
			rule("/a/{x}", 0, &[(Operation::Read, "true")], &[]),
			rule("/b/{x}", 0, &[(Operation::Read, "true")], &[]),
		];
		assert!(SecurityRulesEngine::validate_rules(&rules).is_err());
	}

	#[test]
	fn validate_rules_rejects_unparseable_condition() {
		let rules = vec![rule("/a/{x}", 0, &[(Operation::Read, "auth.uid ===")], &[])];
		assert!(SecurityRulesEngine::validate_rules(&rules).is_err());
	}
}
