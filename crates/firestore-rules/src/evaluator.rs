//! Evaluates a parsed [`crate::expr::Expr`] against a `SecurityContext`
//! (§4.7 "Expression language", §4.8 `get`/`exists`).

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use firestore_types::error::{Error, FsResult};
use firestore_types::security::SecurityContext;

use crate::expr::Expr;
use crate::resource_accessor::ResourceAccessor;

/// The evaluator's intermediate value representation. Collapsed to
/// `JsonValue` only at the leaves (`get()`/`variables`/`request`/`resource`)
/// so numeric and string comparisons keep native Rust semantics.
#[derive(Debug, Clone)]
enum Value {
	Null,
	Bool(bool),
	Number(f64),
	Str(String),
	Json(JsonValue),
}

impl Value {
	fn as_bool(&self) -> FsResult<bool> {
		match self {
			Value::Bool(b) => Ok(*b),
			other => Err(Error::RuleSyntax(format!("expected boolean, got {other:?}"))),
		}
	}

	fn as_json(&self) -> JsonValue {
		match self {
			Value::Null => JsonValue::Null,
			Value::Bool(b) => JsonValue::Bool(*b),
			Value::Number(n) => serde_json::Number::from_f64(*n).map(JsonValue::Number).unwrap_or(JsonValue::Null),
			Value::Str(s) => JsonValue::String(s.clone()),
			Value::Json(j) => j.clone(),
		}
	}

	fn from_json(json: JsonValue) -> Value {
		match json {
			JsonValue::Null => Value::Null,
			JsonValue::Bool(b) => Value::Bool(b),
			JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
			JsonValue::String(s) => Value::Str(s),
			other => Value::Json(other),
		}
	}

	fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
			(Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
			_ => None,
		}
	}
}

/// Maximum recursion depth, a resource guard against pathological
/// expression trees.
const MAX_DEPTH: usize = 64;

pub struct Evaluator<'a> {
	ctx: &'a SecurityContext,
	accessor: &'a dyn ResourceAccessor,
}

impl<'a> Evaluator<'a> {
	pub fn new(ctx: &'a SecurityContext, accessor: &'a dyn ResourceAccessor) -> Self {
		Self { ctx, accessor }
	}

	/// Evaluates a condition expression to a boolean. Top-level entry point
	/// used by the rules engine's `EvaluateAccess`.
	pub async fn eval_condition(&self, expr: &Expr) -> FsResult<bool> {
		self.eval(expr, 0).await?.as_bool()
	}

	fn eval<'b>(&'b self, expr: &'b Expr, depth: usize) -> std::pin::Pin<Box<dyn std::future::Future<Output = FsResult<Value>> + Send + 'b>> {
		Box::pin(async move {
			if depth > MAX_DEPTH {
				return Err(Error::RuleSyntax(format!("expression nesting exceeds {MAX_DEPTH}")));
			}
			match expr {
				Expr::Null => Ok(Value::Null),
				Expr::Bool(b) => Ok(Value::Bool(*b)),
				Expr::Number(n) => Ok(Value::Number(*n)),
				Expr::Str(s) => Ok(Value::Str(s.clone())),
				Expr::Var(segments) => self.resolve_var(segments),
				Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner, depth + 1).await?.as_bool()?)),
				Expr::And(l, r) => {
					if !self.eval(l, depth + 1).await?.as_bool()? {
						return Ok(Value::Bool(false));
					}
					Ok(Value::Bool(self.eval(r, depth + 1).await?.as_bool()?))
				}
				Expr::Or(l, r) => {
					if self.eval(l, depth + 1).await?.as_bool()? {
						return Ok(Value::Bool(true));
					}
					Ok(Value::Bool(self.eval(r, depth + 1).await?.as_bool()?))
				}
				Expr::Eq(l, r) => {
					let (lv, rv) = (self.eval(l, depth + 1).await?, self.eval(r, depth + 1).await?);
					Ok(Value::Bool(lv.as_json() == rv.as_json()))
				}
				Expr::Ne(l, r) => {
					let (lv, rv) = (self.eval(l, depth + 1).await?, self.eval(r, depth + 1).await?);
					Ok(Value::Bool(lv.as_json() != rv.as_json()))
				}
				Expr::Lt(l, r) => self.compare(l, r, depth, |o| o == Ordering::Less).await,
				Expr::Le(l, r) => self.compare(l, r, depth, |o| o != Ordering::Greater).await,
				Expr::Gt(l, r) => self.compare(l, r, depth, |o| o == Ordering::Greater).await,
				Expr::Ge(l, r) => self.compare(l, r, depth, |o| o != Ordering::Less).await,
				Expr::Call(name, args) => self.eval_call(name, args, depth).await,
			}
		})
	}

	async fn compare(&self, l: &Expr, r: &Expr, depth: usize, accept: impl Fn(Ordering) -> bool) -> FsResult<Value> {
		let (lv, rv) = (self.eval(l, depth + 1).await?, self.eval(r, depth + 1).await?);
		let ord = lv
			.partial_cmp(&rv)
			.ok_or_else(|| Error::RuleSyntax(format!("cannot order {lv:?} and {rv:?}")))?;
		Ok(Value::Bool(accept(ord)))
	}

	async fn eval_call(&self, name: &str, args: &[Expr], depth: usize) -> FsResult<Value> {
		match name {
			"in" => {
				if args.len() != 2 {
					return Err(Error::RuleSyntax("in() takes exactly 2 arguments".into()));
				}
				let needle = self.eval(&args[0], depth + 1).await?.as_json();
				let haystack = self.eval(&args[1], depth + 1).await?.as_json();
				let found = match &haystack {
					JsonValue::Array(items) => items.contains(&needle),
					JsonValue::Object(map) => needle.as_str().is_some_and(|k| map.contains_key(k)),
					JsonValue::String(s) => needle.as_str().is_some_and(|k| s.contains(k)),
					_ => false,
				};
				Ok(Value::Bool(found))
			}
			"size" => {
				if args.len() != 1 {
					return Err(Error::RuleSyntax("size() takes exactly 1 argument".into()));
				}
				let v = self.eval(&args[0], depth + 1).await?.as_json();
				let n = match &v {
					JsonValue::Array(items) => items.len(),
					JsonValue::Object(map) => map.len(),
					JsonValue::String(s) => s.chars().count(),
					other => return Err(Error::RuleSyntax(format!("size() not defined for {other}"))),
				};
				Ok(Value::Number(n as f64))
			}
			"get" => {
				if args.len() != 1 {
					return Err(Error::RuleSyntax("get() takes exactly 1 argument".into()));
				}
				let path = self.eval_path_arg(&args[0], depth).await?;
				let doc = self.accessor.get(&self.ctx.project_id, &self.ctx.database_id, &path).await?;
				Ok(match doc {
					Some(json) => Value::Json(json),
					None => Value::Null,
				})
			}
			"exists" => {
				if args.len() != 1 {
					return Err(Error::RuleSyntax("exists() takes exactly 1 argument".into()));
				}
				let path = self.eval_path_arg(&args[0], depth).await?;
				let found = self.accessor.exists(&self.ctx.project_id, &self.ctx.database_id, &path).await?;
				Ok(Value::Bool(found))
			}
			other => Err(Error::RuleSyntax(format!("unknown function {other:?}"))),
		}
	}

	async fn eval_path_arg(&self, expr: &Expr, depth: usize) -> FsResult<String> {
		match self.eval(expr, depth + 1).await? {
			Value::Str(s) => Ok(s),
			other => Err(Error::RuleSyntax(format!("expected string path argument, got {other:?}"))),
		}
	}

	fn resolve_var(&self, segments: &[String]) -> FsResult<Value> {
		let root = segments[0].as_str();
		let rest = &segments[1..];
		let base: JsonValue = match root {
			"auth" => {
				let mut obj = match self.ctx.request.get("auth") {
					Some(JsonValue::Object(map)) => map.clone(),
					_ => serde_json::Map::new(),
				};
				if let Some(user) = &self.ctx.user {
					obj.insert("uid".to_string(), JsonValue::String(user.clone()));
				}
				JsonValue::Object(obj)
			}
			"request" => JsonValue::Object(self.ctx.request.clone().into_iter().collect()),
			"resource" => JsonValue::Object(self.ctx.resource.clone().into_iter().collect()),
			"path" => {
				if rest.is_empty() {
					return Ok(Value::Str(self.ctx.path.clone()));
				}
				return Err(Error::RuleSyntax("path is not a nested value".into()));
			}
			"timestamp" => {
				if rest.is_empty() {
					return Ok(Value::Number(self.ctx.timestamp as f64));
				}
				return Err(Error::RuleSyntax("timestamp is not a nested value".into()));
			}
			"variables" => JsonValue::Object(
				self.ctx.variables.iter().map(|(k, v)| (k.clone(), JsonValue::String(v.clone()))).collect(),
			),
			other => {
				if !rest.is_empty() {
					return Err(Error::RuleSyntax(format!("unknown variable root {other:?}")));
				}
				return match self.ctx.variables.get(other) {
					Some(v) => Ok(Value::Str(v.clone())),
					None => Err(Error::RuleSyntax(format!("undefined variable {other:?}"))),
				};
			}
		};
		let mut cur = &base;
		for segment in rest {
			cur = match cur.get(segment) {
				Some(v) => v,
				None => return Ok(Value::Null),
			};
		}
		Ok(Value::from_json(cur.clone()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::resource_accessor::DefaultResourceAccessor;
	use firestore_store_memory::store::MemoryBackingStore;
	use std::sync::Arc;

	fn ctx() -> SecurityContext {
		let mut c = SecurityContext::new("p", "(default)", "users/u1", 1_000);
		c.user = Some("u1".to_string());
		c.variables.insert("userId".to_string(), "u1".to_string());
		c
	}

	fn accessor() -> DefaultResourceAccessor {
		DefaultResourceAccessor::new(Arc::new(MemoryBackingStore::default()))
	}

	#[tokio::test]
	async fn auth_uid_equals_bound_path_variable() {
		let ctx = ctx();
		let acc = accessor();
		let eval = Evaluator::new(&ctx, &acc);
		let expr = crate::expr::parse("auth.uid == userId").unwrap();
		assert!(eval.eval_condition(&expr).await.unwrap());
	}

	#[tokio::test]
	async fn and_short_circuits_without_evaluating_right_side() {
		let ctx = ctx();
		let acc = accessor();
		let eval = Evaluator::new(&ctx, &acc);
		let expr = crate::expr::parse("false && undefinedVar == 1").unwrap();
		assert!(!eval.eval_condition(&expr).await.unwrap());
	}

	#[tokio::test]
	async fn size_and_in_functions() {
		let mut ctx = ctx();
		ctx.request.insert("tags".to_string(), serde_json::json!(["a", "b", "c"]));
		let acc = accessor();
		let eval = Evaluator::new(&ctx, &acc);
		let expr = crate::expr::parse(r#"size(request.tags) == 3 && in("a", request.tags)"#).unwrap();
		assert!(eval.eval_condition(&expr).await.unwrap());
	}

	#[tokio::test]
	async fn exists_is_false_against_empty_store() {
		let ctx = ctx();
		let acc = accessor();
		let eval = Evaluator::new(&ctx, &acc);
		let expr = crate::expr::parse(r#"!exists("users/nobody")"#).unwrap();
		assert!(eval.eval_condition(&expr).await.unwrap());
	}

	#[tokio::test]
	async fn undefined_variable_is_an_error() {
		let ctx = ctx();
		let acc = accessor();
		let eval = Evaluator::new(&ctx, &acc);
		let expr = crate::expr::parse("nope == 1").unwrap();
		assert!(eval.eval_condition(&expr).await.is_err());
	}

	#[tokio::test]
	async fn relational_comparison_on_numbers() {
		let mut ctx = ctx();
		ctx.resource.insert("amount".to_string(), serde_json::json!(42));
		let acc = accessor();
		let eval = Evaluator::new(&ctx, &acc);
		let expr = crate::expr::parse("resource.amount >= 42").unwrap();
		assert!(eval.eval_condition(&expr).await.unwrap());
	}
}
