//! The restricted CEL-subset expression language (§4.7 "Expression
//! language"): literals, dotted identifiers, boolean/comparison operators
//! and the `in`/`size`/`get`/`exists` functions. A hand-written
//! recursive-descent parser, per §9 "Expression engine choice" strategy
//! (b) — acceptable for a constrained environment, and the only strategy
//! that doesn't pull in a dependency absent from the rest of the stack.

use firestore_types::error::{Error, FsResult};

/// Parsed expression tree. `Var` holds a dotted identifier chain, e.g.
/// `auth.token.email` → `["auth", "token", "email"]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	Null,
	Bool(bool),
	Number(f64),
	Str(String),
	Var(Vec<String>),
	Not(Box<Expr>),
	And(Box<Expr>, Box<Expr>),
	Or(Box<Expr>, Box<Expr>),
	Eq(Box<Expr>, Box<Expr>),
	Ne(Box<Expr>, Box<Expr>),
	Lt(Box<Expr>, Box<Expr>),
	Le(Box<Expr>, Box<Expr>),
	Gt(Box<Expr>, Box<Expr>),
	Ge(Box<Expr>, Box<Expr>),
	/// `in`/`size`/`get`/`exists` — the only callable names (§4.7).
	Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Null,
	True,
	False,
	Number(f64),
	Str(String),
	Ident(String),
	Dot,
	Comma,
	LParen,
	RParen,
	Not,
	And,
	Or,
	EqEq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
}

/// Maximum expression node count, a resource guard against pathological
/// expression trees.
const MAX_NODES: usize = 200;

fn lex(src: &str) -> FsResult<Vec<Token>> {
	let mut tokens = Vec::new();
	let chars: Vec<char> = src.chars().collect();
	let mut i = 0;
	while i < chars.len() {
		let c = chars[i];
		match c {
			c if c.is_whitespace() => i += 1,
			'(' => {
				tokens.push(Token::LParen);
				i += 1;
			}
			')' => {
				tokens.push(Token::RParen);
				i += 1;
			}
			',' => {
				tokens.push(Token::Comma);
				i += 1;
			}
			'.' => {
				tokens.push(Token::Dot);
				i += 1;
			}
			'!' => {
				if chars.get(i + 1) == Some(&'=') {
					tokens.push(Token::Ne);
					i += 2;
				} else {
					tokens.push(Token::Not);
					i += 1;
				}
			}
			'=' => {
				if chars.get(i + 1) == Some(&'=') {
					tokens.push(Token::EqEq);
					i += 2;
				} else {
					return Err(Error::RuleSyntax(format!("unexpected '=' at offset {i}")));
				}
			}
			'<' => {
				if chars.get(i + 1) == Some(&'=') {
					tokens.push(Token::Le);
					i += 2;
				} else {
					tokens.push(Token::Lt);
					i += 1;
				}
			}
			'>' => {
				if chars.get(i + 1) == Some(&'=') {
					tokens.push(Token::Ge);
					i += 2;
				} else {
					tokens.push(Token::Gt);
					i += 1;
				}
			}
			'&' if chars.get(i + 1) == Some(&'&') => {
				tokens.push(Token::And);
				i += 2;
			}
			'|' if chars.get(i + 1) == Some(&'|') => {
				tokens.push(Token::Or);
				i += 2;
			}
			'"' | '\'' => {
				let quote = c;
				let mut s = String::new();
				i += 1;
				loop {
					match chars.get(i) {
						Some(&c) if c == quote => {
							i += 1;
							break;
						}
						Some(&c) => {
							s.push(c);
							i += 1;
						}
						None => return Err(Error::RuleSyntax("unterminated string literal".into())),
					}
				}
				tokens.push(Token::Str(s));
			}
			c if c.is_ascii_digit() => {
				let start = i;
				while chars.get(i).is_some_and(|c| c.is_ascii_digit() || *c == '.') {
					i += 1;
				}
				let raw: String = chars[start..i].iter().collect();
				let n = raw.parse::<f64>().map_err(|_| Error::RuleSyntax(format!("invalid number {raw:?}")))?;
				tokens.push(Token::Number(n));
			}
			c if c.is_alphabetic() || c == '_' => {
				let start = i;
				while chars.get(i).is_some_and(|c| c.is_alphanumeric() || *c == '_') {
					i += 1;
				}
				let word: String = chars[start..i].iter().collect();
				tokens.push(match word.as_str() {
					"true" => Token::True,
					"false" => Token::False,
					"null" => Token::Null,
					_ => Token::Ident(word),
				});
			}
			other => return Err(Error::RuleSyntax(format!("unexpected character {other:?}"))),
		}
	}
	Ok(tokens)
}

struct Parser {
	tokens: Vec<Token>,
	pos: usize,
	nodes: usize,
}

impl Parser {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.pos)
	}

	fn advance(&mut self) -> Option<Token> {
		let t = self.tokens.get(self.pos).cloned();
		self.pos += 1;
		t
	}

	fn expect(&mut self, want: &Token) -> FsResult<()> {
		match self.advance() {
			Some(ref t) if t == want => Ok(()),
			other => Err(Error::RuleSyntax(format!("expected {want:?}, got {other:?}"))),
		}
	}

	fn bump_node_count(&mut self) -> FsResult<()> {
		self.nodes += 1;
		if self.nodes > MAX_NODES {
			return Err(Error::RuleSyntax(format!("expression exceeds {MAX_NODES} nodes")));
		}
		Ok(())
	}

	fn parse_expr(&mut self) -> FsResult<Expr> {
		self.parse_or()
	}

	fn parse_or(&mut self) -> FsResult<Expr> {
		let mut left = self.parse_and()?;
		while matches!(self.peek(), Some(Token::Or)) {
			self.advance();
			self.bump_node_count()?;
			let right = self.parse_and()?;
			left = Expr::Or(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	fn parse_and(&mut self) -> FsResult<Expr> {
		let mut left = self.parse_equality()?;
		while matches!(self.peek(), Some(Token::And)) {
			self.advance();
			self.bump_node_count()?;
			let right = self.parse_equality()?;
			left = Expr::And(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	fn parse_equality(&mut self) -> FsResult<Expr> {
		let mut left = self.parse_relational()?;
		loop {
			let ctor: fn(Box<Expr>, Box<Expr>) -> Expr = match self.peek() {
				Some(Token::EqEq) => Expr::Eq,
				Some(Token::Ne) => Expr::Ne,
				_ => break,
			};
			self.advance();
			self.bump_node_count()?;
			let right = self.parse_relational()?;
			left = ctor(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	fn parse_relational(&mut self) -> FsResult<Expr> {
		let mut left = self.parse_unary()?;
		loop {
			let ctor: fn(Box<Expr>, Box<Expr>) -> Expr = match self.peek() {
				Some(Token::Lt) => Expr::Lt,
				Some(Token::Le) => Expr::Le,
				Some(Token::Gt) => Expr::Gt,
				Some(Token::Ge) => Expr::Ge,
				_ => break,
			};
			self.advance();
			self.bump_node_count()?;
			let right = self.parse_unary()?;
			left = ctor(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	fn parse_unary(&mut self) -> FsResult<Expr> {
		if matches!(self.peek(), Some(Token::Not)) {
			self.advance();
			self.bump_node_count()?;
			return Ok(Expr::Not(Box::new(self.parse_unary()?)));
		}
		self.parse_primary()
	}

	fn parse_primary(&mut self) -> FsResult<Expr> {
		self.bump_node_count()?;
		match self.advance() {
			Some(Token::Null) => Ok(Expr::Null),
			Some(Token::True) => Ok(Expr::Bool(true)),
			Some(Token::False) => Ok(Expr::Bool(false)),
			Some(Token::Number(n)) => Ok(Expr::Number(n)),
			Some(Token::Str(s)) => Ok(Expr::Str(s)),
			Some(Token::LParen) => {
				let inner = self.parse_expr()?;
				self.expect(&Token::RParen)?;
				Ok(inner)
			}
			Some(Token::Ident(name)) => {
				if matches!(self.peek(), Some(Token::LParen)) {
					self.advance();
					let mut args = Vec::new();
					if !matches!(self.peek(), Some(Token::RParen)) {
						args.push(self.parse_expr()?);
						while matches!(self.peek(), Some(Token::Comma)) {
							self.advance();
							args.push(self.parse_expr()?);
						}
					}
					self.expect(&Token::RParen)?;
					Ok(Expr::Call(name, args))
				} else {
					let mut segments = vec![name];
					while matches!(self.peek(), Some(Token::Dot)) {
						self.advance();
						match self.advance() {
							Some(Token::Ident(part)) => segments.push(part),
							other => return Err(Error::RuleSyntax(format!("expected identifier after '.', got {other:?}"))),
						}
					}
					Ok(Expr::Var(segments))
				}
			}
			other => Err(Error::RuleSyntax(format!("unexpected token {other:?}"))),
		}
	}
}

/// Parses a condition expression, e.g. `auth.uid == userId` or
/// `in(resource.category, ["a", "b"]) && size(request.tags) > 0`.
pub fn parse(src: &str) -> FsResult<Expr> {
	let tokens = lex(src)?;
	let mut parser = Parser { tokens, pos: 0, nodes: 0 };
	let expr = parser.parse_expr()?;
	if parser.pos != parser.tokens.len() {
		return Err(Error::RuleSyntax(format!("trailing tokens after expression {src:?}")));
	}
	Ok(expr)
}
