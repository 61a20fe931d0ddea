//! Compiles Firestore-style match patterns (`/users/{userId}/posts/{postId}`,
//! `/users/{userId}/posts/{postId=**}`) into anchored regexes with named
//! captures, per §4.7 "Match pattern compilation".
//!
//! `{name}` captures a single path segment (`[^/]+`); `{name=**}` captures
//! the remainder of the path including slashes (`.*`) and must be the last
//! segment of the pattern.

use firestore_types::error::{Error, FsResult};
use regex::Regex;

/// A compiled match pattern plus the declared variable names in the order
/// they appear, so captures can be replayed positionally.
#[derive(Debug)]
pub struct CompiledPattern {
	pub source: String,
	regex: Regex,
	pub variables: Vec<String>,
}

impl CompiledPattern {
	/// Attempts to match `path` (a canonical slash-separated document path
	/// without the `projects/.../documents/` prefix). Returns the bound
	/// path variables on success.
	pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
		let caps = self.regex.captures(path)?;
		let mut bound = Vec::with_capacity(self.variables.len());
		for name in &self.variables {
			let value = caps.name(name)?.as_str().to_string();
			bound.push((name.clone(), value));
		}
		Some(bound)
	}
}

fn is_ident_start(c: char) -> bool {
	c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
	c.is_alphanumeric() || c == '_'
}

/// Compiles a single match pattern. `pattern` must start with `/`.
pub fn compile(pattern: &str) -> FsResult<CompiledPattern> {
	if !pattern.starts_with('/') {
		return Err(Error::RuleSyntax(format!("match pattern {pattern:?} must start with '/'")));
	}
	let body = &pattern[1..];
	let chars: Vec<char> = body.chars().collect();
	let mut regex_src = String::from("^");
	let mut variables = Vec::new();
	let mut i = 0;
	let mut recursive_seen = false;

	while i < chars.len() {
		if recursive_seen {
			return Err(Error::RuleSyntax(format!("{{name=**}} must be the last segment in {pattern:?}")));
		}
		let c = chars[i];
		if c == '{' {
			let close = chars[i..].iter().position(|c| *c == '}').map(|p| p + i);
			let Some(close) = close else {
				return Err(Error::RuleSyntax(format!("unterminated '{{' in {pattern:?}")));
			};
			let inner: String = chars[i + 1..close].iter().collect();
			let (name, recursive) = if let Some(stripped) = inner.strip_suffix("=**") {
				(stripped.to_string(), true)
			} else {
				(inner.clone(), false)
			};
			let Some(first) = name.chars().next() else {
				return Err(Error::RuleSyntax(format!("invalid path variable name {inner:?} in {pattern:?}")));
			};
			if !is_ident_start(first) || !name.chars().all(is_ident_continue) {
				return Err(Error::RuleSyntax(format!("invalid path variable name {inner:?} in {pattern:?}")));
			}
			if variables.contains(&name) {
				return Err(Error::RuleSyntax(format!("duplicate path variable {name:?} in {pattern:?}")));
			}
			if recursive {
				regex_src.push_str(&format!("(?P<{name}>.*)"));
				recursive_seen = true;
			} else {
				regex_src.push_str(&format!("(?P<{name}>[^/]+)"));
			}
			variables.push(name);
			i = close + 1;
		} else if c == '/' {
			regex_src.push('/');
			i += 1;
		} else {
			// Literal path segment; escape regex metacharacters.
			let start = i;
			while i < chars.len() && chars[i] != '/' && chars[i] != '{' {
				i += 1;
			}
			let literal: String = chars[start..i].iter().collect();
			regex_src.push_str(&regex::escape(&literal));
		}
	}
	regex_src.push('$');

	let regex = Regex::new(&regex_src).map_err(|e| Error::RuleSyntax(format!("failed to compile pattern {pattern:?}: {e}")))?;
	Ok(CompiledPattern { source: pattern.to_string(), regex, variables })
}
