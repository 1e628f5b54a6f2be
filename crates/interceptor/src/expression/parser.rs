//! Parser for `${...}` property expressions.
//!
//! ```text
//! template := (text | '\$' | expr)*
//! expr     := '${' handler '::' payload '}'
//!           | '${' template-key (':' template-default)? '}'
//! ```
//!
//! Keys may nest expressions (`${db.${env}.url}`); defaults may too. Handler
//! payloads are taken verbatim up to the closing brace.

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
	Text(String),
	/// `${key}` or `${key:default}`.
	Ref {
		key: Vec<Part>,
		default: Option<Vec<Part>>,
	},
	/// `${handler::payload}`.
	Secret { handler: String, payload: String },
}

/// Parse failure position and reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
	pub position: usize,
	pub reason: &'static str,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stop {
	End,
	Key,
	Default,
}

/// Returns `true` if `value` may contain an expression.
pub fn has_expression(value: &str) -> bool {
	value.contains("${")
}

/// Parses `input` into template parts.
pub fn parse(input: &str) -> Result<Vec<Part>, ParseError> {
	let mut parser = Parser { input, pos: 0 };
	parser.template(Stop::End)
}

struct Parser<'a> {
	input: &'a str,
	pos: usize,
}

impl Parser<'_> {
	fn rest(&self) -> &str {
		&self.input[self.pos..]
	}

	fn peek(&self) -> Option<char> {
		self.rest().chars().next()
	}

	fn error(&self, reason: &'static str) -> ParseError {
		ParseError {
			position: self.pos,
			reason,
		}
	}

	fn template(&mut self, stop: Stop) -> Result<Vec<Part>, ParseError> {
		let mut parts = Vec::new();
		let mut text = String::new();
		loop {
			let Some(ch) = self.peek() else {
				if stop != Stop::End {
					return Err(self.error("unterminated expression"));
				}
				break;
			};
			match ch {
				'\\' if self.rest().starts_with("\\$") => {
					text.push('$');
					self.pos += 2;
				}
				'$' if self.rest().starts_with("${") => {
					if !text.is_empty() {
						parts.push(Part::Text(std::mem::take(&mut text)));
					}
					parts.push(self.expression()?);
				}
				'}' if stop != Stop::End => break,
				':' if stop == Stop::Key => break,
				_ => {
					text.push(ch);
					self.pos += ch.len_utf8();
				}
			}
		}
		if !text.is_empty() {
			parts.push(Part::Text(text));
		}
		Ok(parts)
	}

	fn expression(&mut self) -> Result<Part, ParseError> {
		let start = self.pos;
		self.pos += 2;
		let key = self.template(Stop::Key)?;

		if self.rest().starts_with("::") {
			let handler = match key.as_slice() {
				[Part::Text(name)] => name.clone(),
				_ => {
					self.pos = start;
					return Err(self.error("handler name must be plain text"));
				}
			};
			self.pos += 2;
			let Some(end) = self.rest().find('}') else {
				self.pos = start;
				return Err(self.error("unterminated expression"));
			};
			let payload = self.rest()[..end].to_string();
			self.pos += end + 1;
			return Ok(Part::Secret { handler, payload });
		}

		if key.is_empty() {
			self.pos = start;
			return Err(self.error("empty expression"));
		}

		let default = if self.peek() == Some(':') {
			self.pos += 1;
			Some(self.template(Stop::Default)?)
		} else {
			None
		};

		match self.peek() {
			Some('}') => {
				self.pos += 1;
				Ok(Part::Ref { key, default })
			}
			_ => {
				self.pos = start;
				Err(self.error("unterminated expression"))
			}
		}
	}
}
