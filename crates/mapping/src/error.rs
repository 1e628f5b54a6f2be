//! Error types for schema compilation, binding, validation and lookup.

use std::fmt;

use thiserror::Error;

use crate::schema::TypeName;

/// Fatal, build-time problems with a declared shape or a declared name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
	/// Bracket syntax in a property name is malformed.
	#[error("malformed property name {name:?} at byte {position}: {reason}")]
	MalformedName {
		name: String,
		position: usize,
		reason: &'static str,
	},

	/// A declared property name does not segment to exactly one literal.
	#[error("declared property name {name:?} in {owner} is not a single name segment")]
	InvalidPropertyName { owner: String, name: String },

	/// Two declared fields map to the same property name within one group.
	#[error("property {name:?} is declared more than once in {owner}")]
	DuplicateProperty { owner: String, name: String },

	/// A map's key type has no canonical string form.
	#[error("map at {path:?} in {owner} uses key type {key_type}, which has no canonical string form")]
	NonCanonicalMapKey {
		owner: String,
		path: String,
		key_type: String,
	},

	/// A shape combination that cannot be bound.
	#[error("invalid shape at {path:?} in {owner}: {reason}")]
	InvalidShape {
		owner: String,
		path: String,
		reason: &'static str,
	},

	/// A named type reference was not found in the catalog.
	#[error("type {target} referenced from {owner} is not declared")]
	UnknownType { owner: String, target: TypeName },

	/// A group contains itself without being declared lazy.
	#[error("type {target} contains itself through {chain}; declare the reference lazy")]
	Recursive { target: TypeName, chain: String },

	/// Two descriptors with different shapes share one type name.
	#[error("type {name} is declared twice with different shapes")]
	ConflictingType { name: TypeName },

	/// Two different types were registered at the same prefix.
	#[error("prefix {prefix:?} is claimed by both {first} and {second}")]
	AmbiguousPrefix {
		prefix: String,
		first: TypeName,
		second: TypeName,
	},
}

/// A raw string that could not be converted to its leaf's target type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {raw:?} at {path} to {target}: {reason}")]
pub struct ConversionError {
	pub path: String,
	pub raw: String,
	pub target: String,
	pub reason: String,
}

/// A single problem found during one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Defect {
	/// A required leaf had no input value and no default.
	#[error("required property {path} has no value")]
	MissingRequired { path: String },

	/// A leaf's raw value failed conversion.
	#[error(transparent)]
	Conversion(ConversionError),

	/// A map key that its declared key type rejects.
	#[error("map key {key:?} at {path} is not a valid {target}: {reason}")]
	InvalidMapKey {
		path: String,
		key: String,
		target: String,
		reason: String,
	},

	/// An input key under a validated prefix that no leaf consumed.
	#[error("unknown property {name}{}", Suggestion(.suggestion))]
	UnknownProperty {
		name: String,
		suggestion: Option<String>,
	},
}

struct Suggestion<'a>(&'a Option<String>);

impl fmt::Display for Suggestion<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.0 {
			Some(s) => write!(f, " (did you mean {s}?)"),
			None => Ok(()),
		}
	}
}

impl Defect {
	/// Returns the property name this defect is about.
	pub fn path(&self) -> &str {
		match self {
			Defect::MissingRequired { path } => path,
			Defect::Conversion(e) => &e.path,
			Defect::InvalidMapKey { path, .. } => path,
			Defect::UnknownProperty { name, .. } => name,
		}
	}
}

/// Every defect found in one validation pass, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateValidationError {
	defects: Vec<Defect>,
}

impl AggregateValidationError {
	pub fn new(mut defects: Vec<Defect>) -> Self {
		defects.sort_by(|a, b| a.path().cmp(b.path()));
		defects.dedup();
		Self { defects }
	}

	pub fn defects(&self) -> &[Defect] {
		&self.defects
	}

	pub fn into_defects(self) -> Vec<Defect> {
		self.defects
	}

	pub fn is_empty(&self) -> bool {
		self.defects.is_empty()
	}

	pub fn len(&self) -> usize {
		self.defects.len()
	}

	/// Returns `true` if any defect names `path`.
	pub fn mentions(&self, path: &str) -> bool {
		self.defects.iter().any(|d| d.path() == path)
	}

	/// Folds `other` into `self`, keeping defects ordered by path.
	pub fn merge(&mut self, other: AggregateValidationError) {
		let mut defects = std::mem::take(&mut self.defects);
		defects.extend(other.defects);
		*self = Self::new(defects);
	}

	/// `Ok(())` when no defects were collected.
	pub fn into_result(self) -> Result<(), Self> {
		if self.is_empty() { Ok(()) } else { Err(self) }
	}
}

impl fmt::Display for AggregateValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"configuration validation failed with {} problem(s):",
			self.defects.len()
		)?;
		for defect in &self.defects {
			write!(f, "\n  - {defect}")?;
		}
		Ok(())
	}
}

impl std::error::Error for AggregateValidationError {}

/// Retrieval of a mapping that was never (successfully) registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
	#[error("no mapping registered for type {type_name}")]
	MappingNotFound { type_name: TypeName },

	#[error("type {type_name} is registered, but not at prefix {prefix:?}")]
	MappingPrefixNotFound { type_name: TypeName, prefix: String },

	/// The registry's secondary validator rejected the mapping.
	#[error("mapping {type_name} at {prefix:?} violates: {}", .violations.join("; "))]
	ConstraintViolation {
		type_name: TypeName,
		prefix: String,
		violations: Vec<String>,
	},
}

/// Navigation or typed extraction failures on a bound mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
	#[error("{path} has no child {name:?}")]
	NoSuchChild { path: String, name: String },

	#[error("{path} has no element at index {index}")]
	IndexOutOfRange { path: String, index: usize },

	#[error("{path} has no entry {key:?}")]
	NoSuchEntry { path: String, key: String },

	#[error("{path} is a {actual}, not a {expected}")]
	WrongNode {
		path: String,
		expected: &'static str,
		actual: &'static str,
	},

	#[error("{path} has no value")]
	Absent { path: String },

	#[error("{path} holds a {actual}, not a {expected}")]
	TypeMismatch {
		path: String,
		expected: &'static str,
		actual: &'static str,
	},

	#[error("{path} holds {value}, which is out of range for {expected}")]
	OutOfRange {
		path: String,
		value: String,
		expected: &'static str,
	},

	#[error(transparent)]
	Conversion(#[from] ConversionError),

	#[error(transparent)]
	Name(#[from] SchemaError),
}

/// Umbrella error for the mapping layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
	#[error(transparent)]
	Schema(#[from] SchemaError),

	#[error(transparent)]
	Validation(#[from] AggregateValidationError),

	#[error(transparent)]
	Lookup(#[from] LookupError),

	#[error(transparent)]
	Access(#[from] AccessError),
}

pub type Result<T, E = MappingError> = std::result::Result<T, E>;
