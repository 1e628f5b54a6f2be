//! Property name segmentation.
//!
//! A property name is split into [`Segment`]s:
//!
//! ```text
//! name     = segment ("." segment | "[" index "]")*
//! segment  = quoted | plain
//! quoted   = '"' any* '"'          separators are literal inside quotes
//! plain    = (char | "\" char)*    "\." escapes a separator
//! index    = digit+ | key          digits give an Index, anything else a MapKey
//! ```
//!
//! Whether a literal segment names a group field or a map key is decided by the
//! schema while matching, not here. [`NameCursor`] lets one parsed name be
//! walked against several schema trees without re-parsing.

use std::fmt::{self, Write as _};

use smallvec::SmallVec;

use crate::error::SchemaError;


/// One atomic unit of a property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
	/// A dotted (optionally quoted) name part.
	Literal(Box<str>),
	/// A numeric bracketed part, `list[3]`.
	Index(usize),
	/// A non-numeric bracketed part, `map[key]`.
	MapKey(Box<str>),
}

impl Segment {
	/// Text of the segment as a map key would see it.
	pub fn key_text(&self) -> String {
		match self {
			Segment::Literal(s) | Segment::MapKey(s) => s.to_string(),
			Segment::Index(i) => i.to_string(),
		}
	}

	pub fn as_literal(&self) -> Option<&str> {
		match self {
			Segment::Literal(s) => Some(s),
			_ => None,
		}
	}

	pub fn is_indexed(&self) -> bool {
		matches!(self, Segment::Index(_))
	}
}

/// Inline storage covers the common `a.b.c[0].d` depth without allocating.
pub type Segments = SmallVec<[Segment; 8]>;

/// A property name parsed into segments, keeping the original text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyName {
	text: Box<str>,
	segments: Segments,
}

impl PropertyName {
	/// Parses `name`. An empty string yields no segments.
	pub fn parse(name: &str) -> Result<Self, SchemaError> {
		Ok(Self {
			text: name.into(),
			segments: segment(name)?,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.text
	}

	pub fn segments(&self) -> &[Segment] {
		&self.segments
	}

	pub fn len(&self) -> usize {
		self.segments.len()
	}

	pub fn is_empty(&self) -> bool {
		self.segments.is_empty()
	}

	pub fn cursor(&self) -> NameCursor<'_> {
		NameCursor::new(&self.segments)
	}

	/// Returns `true` if `prefix` is a whole-segment prefix of this name.
	pub fn starts_with(&self, prefix: &[Segment]) -> bool {
		self.segments.len() >= prefix.len() && self.segments[..prefix.len()] == *prefix
	}
}

impl fmt::Display for PropertyName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.text)
	}
}

/// Splits a property name into segments.
///
/// # Errors
///
/// Returns [`SchemaError::MalformedName`] for an unterminated or empty bracket,
/// or a stray closing bracket.
pub fn segment(name: &str) -> Result<Segments, SchemaError> {
	Splitter::new(name).run()
}

/// Formats segments back into the canonical property name.
///
/// Literals needing it are quoted, indices are bracketed, map keys are written
/// as literals so `map[k]` and `map.k` share one canonical spelling.
pub fn join(segments: &[Segment]) -> String {
	let mut out = String::new();
	for seg in segments {
		push_segment(&mut out, seg);
	}
	out
}

/// Appends one segment to a canonical name being built.
pub fn push_segment(out: &mut String, seg: &Segment) {
	match seg {
		Segment::Index(i) => {
			let _ = write!(out, "[{i}]");
		}
		Segment::Literal(s) | Segment::MapKey(s) => {
			if !out.is_empty() {
				out.push('.');
			}
			push_literal(out, s);
		}
	}
}

/// Appends a dotted child name, quoting when the text would not re-parse as one segment.
///
/// Quotes and backslashes inside a quoted name are escaped with `\`.
pub fn push_literal(out: &mut String, s: &str) {
	if needs_quotes(s) {
		out.push('"');
		for ch in s.chars() {
			if matches!(ch, '"' | '\\') {
				out.push('\\');
			}
			out.push(ch);
		}
		out.push('"');
	} else {
		out.push_str(s);
	}
}

fn needs_quotes(s: &str) -> bool {
	s.is_empty() || s.contains(['.', '[', ']', '"', '\\'])
}

struct Splitter<'a> {
	input: &'a str,
	position: usize,
	out: Segments,
}

impl<'a> Splitter<'a> {
	fn new(input: &'a str) -> Self {
		Self {
			input,
			position: 0,
			out: SmallVec::new(),
		}
	}

	fn peek(&self) -> Option<char> {
		self.input[self.position..].chars().next()
	}

	fn bump(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.position += ch.len_utf8();
		Some(ch)
	}

	fn error(&self, reason: &'static str) -> SchemaError {
		SchemaError::MalformedName {
			name: self.input.to_string(),
			position: self.position,
			reason,
		}
	}

	fn run(mut self) -> Result<Segments, SchemaError> {
		if self.input.is_empty() {
			return Ok(self.out);
		}
		loop {
			self.literal()?;
			while self.peek() == Some('[') {
				self.bracket()?;
			}
			match self.bump() {
				None => return Ok(self.out),
				// A trailing dot yields an empty literal.
				Some('.') => {}
				Some(']') => {
					self.position -= 1;
					return Err(self.error("closing bracket without opening bracket"));
				}
				Some(_) => {
					return Err(self.error("expected '.' or '[' after a closing bracket or quote"));
				}
			}
		}
	}

	/// Reads one dotted part. Leaves the cursor on `.`, `[`, or end of input.
	fn literal(&mut self) -> Result<(), SchemaError> {
		if self.position == 0 && self.peek() == Some('[') {
			return Err(self.error("name cannot start with a bracket"));
		}

		let mut text = String::new();
		if self.peek() == Some('"') {
			self.bump();
			loop {
				match self.bump() {
					Some('"') => break,
					Some('\\') => {
						if let Some(escaped) = self.bump() {
							text.push(escaped);
						}
					}
					Some(ch) => text.push(ch),
					// Unterminated quotes keep the remainder as the literal.
					None => break,
				}
			}
		} else {
			while let Some(ch) = self.peek() {
				match ch {
					'.' | '[' => break,
					']' => return Err(self.error("closing bracket without opening bracket")),
					'\\' => {
						self.bump();
						if let Some(escaped) = self.bump() {
							text.push(escaped);
						}
					}
					_ => {
						text.push(ch);
						self.bump();
					}
				}
			}
		}
		self.out.push(Segment::Literal(text.into()));
		Ok(())
	}

	fn bracket(&mut self) -> Result<(), SchemaError> {
		let open = self.position;
		self.bump();
		let body_start = self.position;
		let close = match self.input[body_start..].find(']') {
			Some(offset) => body_start + offset,
			None => {
				self.position = open;
				return Err(self.error("unterminated bracket"));
			}
		};
		let body = &self.input[body_start..close];
		if body.is_empty() {
			self.position = open;
			return Err(self.error("empty index"));
		}
		self.position = close + 1;

		let segment = if body.bytes().all(|b| b.is_ascii_digit()) {
			match body.parse::<usize>() {
				Ok(index) => Segment::Index(index),
				Err(_) => {
					self.position = open;
					return Err(self.error("index out of range"));
				}
			}
		} else {
			let key = body
				.strip_prefix('"')
				.and_then(|b| b.strip_suffix('"'))
				.unwrap_or(body);
			Segment::MapKey(key.into())
		};
		self.out.push(segment);
		Ok(())
	}
}

/// Forward/backward position over a parsed name.
///
/// Matching code advances through the segments it consumes and rewinds when a
/// candidate schema does not pan out, so the same name can be tried again.
#[derive(Debug, Clone, Copy)]
pub struct NameCursor<'a> {
	segments: &'a [Segment],
	position: usize,
}

impl<'a> NameCursor<'a> {
	pub fn new(segments: &'a [Segment]) -> Self {
		Self {
			segments,
			position: 0,
		}
	}

	/// Segment under the cursor.
	pub fn current(&self) -> Option<&'a Segment> {
		self.segments.get(self.position)
	}

	/// Moves past the current segment. Returns `false` at end.
	pub fn advance(&mut self) -> bool {
		if self.at_end() {
			return false;
		}
		self.position += 1;
		true
	}

	/// Moves back one segment. Returns `false` at the start.
	pub fn rewind(&mut self) -> bool {
		if self.position == 0 {
			return false;
		}
		self.position -= 1;
		true
	}

	pub fn at_end(&self) -> bool {
		self.position >= self.segments.len()
	}

	/// Returns `true` if the segment under the cursor is a numeric index.
	pub fn peek_is_indexed(&self) -> bool {
		self.current().is_some_and(Segment::is_indexed)
	}

	pub fn position(&self) -> usize {
		self.position
	}

	/// Jumps to `position`, clamped to the end of the name.
	pub fn set_position(&mut self, position: usize) {
		self.position = position.min(self.segments.len());
	}

	pub fn reset(&mut self) {
		self.position = 0;
	}

	/// Segments already passed over.
	pub fn consumed(&self) -> &'a [Segment] {
		&self.segments[..self.position]
	}

	/// Segments from the cursor to the end.
	pub fn remaining(&self) -> &'a [Segment] {
		&self.segments[self.position..]
	}

	/// Advances over `prefix` if it matches segment by segment; otherwise
	/// rewinds to where it started and returns `false`.
	pub fn skip_prefix(&mut self, prefix: &[Segment]) -> bool {
		let start = self.position;
		for expected in prefix {
			if self.current() != Some(expected) {
				while self.position > start {
					self.rewind();
				}
				return false;
			}
			self.advance();
		}
		true
	}
}
