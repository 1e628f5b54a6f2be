//! Declared shapes and the compiled schema tree.
//!
//! A [`TypeDescriptor`] is the already-parsed description of a mapping type:
//! a group of [`Field`]s whose [`Shape`]s may nest groups, optionals,
//! collections, maps, and named references to other descriptors in a
//! [`TypeCatalog`]. [`SchemaBuilder`] compiles a descriptor into a
//! [`SchemaTree`], an arena of [`SchemaNode`]s addressed by [`NodeId`].

mod builder;


use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use heck::{ToKebabCase, ToSnakeCase};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHasher};

pub use self::builder::SchemaBuilder;
use crate::convert::{Converter, ConverterRef, FromValue};

/// Registry key identifying a mapping type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(Arc<str>);

impl TypeName {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self(name.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TypeName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for TypeName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", &*self.0)
	}
}

impl From<&str> for TypeName {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

/// How declared field identifiers become property names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NamingStrategy {
	/// `serverPort` → `server-port`
	#[default]
	KebabCase,
	/// `serverPort` → `server_port`
	SnakeCase,
	/// Identifiers are used as written.
	Verbatim,
}

impl NamingStrategy {
	pub fn apply(self, ident: &str) -> String {
		match self {
			NamingStrategy::KebabCase => ident.to_kebab_case(),
			NamingStrategy::SnakeCase => ident.to_snake_case(),
			NamingStrategy::Verbatim => ident.to_string(),
		}
	}
}

/// Declared shape of a field.
#[derive(Debug, Clone)]
pub enum Shape {
	Leaf {
		converter: ConverterRef,
		default: Option<String>,
	},
	Group(GroupShape),
	Optional(Box<Shape>),
	Collection {
		element: Box<Shape>,
		default: Option<String>,
	},
	Map {
		key: ConverterRef,
		value: Box<Shape>,
	},
	/// A group declared by another [`TypeDescriptor`].
	Ref { target: TypeName, lazy: bool },
}

impl Shape {
	pub fn leaf(converter: impl Converter + 'static) -> Self {
		Shape::Leaf {
			converter: Arc::new(converter),
			default: None,
		}
	}

	pub fn leaf_with(converter: ConverterRef) -> Self {
		Shape::Leaf {
			converter,
			default: None,
		}
	}

	/// Leaf converting to `T`, range checks included.
	pub fn of<T: FromValue>() -> Self {
		Self::leaf_with(T::converter())
	}

	pub fn group(fields: impl IntoIterator<Item = Field>) -> Self {
		Shape::Group(GroupShape::new(fields))
	}

	pub fn optional(inner: Shape) -> Self {
		Shape::Optional(Box::new(inner))
	}

	pub fn list(element: Shape) -> Self {
		Shape::Collection {
			element: Box::new(element),
			default: None,
		}
	}

	pub fn map(key: impl Converter + 'static, value: Shape) -> Self {
		Shape::Map {
			key: Arc::new(key),
			value: Box::new(value),
		}
	}

	pub fn reference(target: impl Into<TypeName>) -> Self {
		Shape::Ref {
			target: target.into(),
			lazy: false,
		}
	}

	/// Reference that may close a cycle; realized only when input exists under it.
	pub fn lazy(target: impl Into<TypeName>) -> Self {
		Shape::Ref {
			target: target.into(),
			lazy: true,
		}
	}

	/// Attaches a default to a leaf or a collection of leaves.
	///
	/// Collections take a comma-separated list. Other shapes ignore it.
	pub fn with_default(mut self, value: impl Into<String>) -> Self {
		match &mut self {
			Shape::Leaf { default, .. } | Shape::Collection { default, .. } => {
				*default = Some(value.into());
			}
			Shape::Optional(inner) => {
				let taken = std::mem::replace(inner.as_mut(), Shape::group([]));
				**inner = taken.with_default(value);
			}
			_ => {}
		}
		self
	}
}

/// One named member of a group.
#[derive(Debug, Clone)]
pub struct Field {
	pub ident: String,
	pub rename: Option<String>,
	pub parent_name: bool,
	pub shape: Shape,
}

impl Field {
	pub fn new(ident: impl Into<String>, shape: Shape) -> Self {
		Self {
			ident: ident.into(),
			rename: None,
			parent_name: false,
			shape,
		}
	}

	/// Uses `name` as the property name instead of applying the naming strategy.
	pub fn named(mut self, name: impl Into<String>) -> Self {
		self.rename = Some(name.into());
		self
	}

	/// Hoists a group field's children into the enclosing group.
	pub fn parent_named(mut self) -> Self {
		self.parent_name = true;
		self
	}

	pub fn property_name(&self, naming: NamingStrategy) -> String {
		match &self.rename {
			Some(name) => name.clone(),
			None => naming.apply(&self.ident),
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct GroupShape {
	pub fields: Vec<Field>,
}

impl GroupShape {
	pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
		Self {
			fields: fields.into_iter().collect(),
		}
	}
}

/// Declared metadata and shape of a mapping type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
	pub name: TypeName,
	pub default_prefix: String,
	pub naming: NamingStrategy,
	pub group: GroupShape,
}

impl TypeDescriptor {
	pub fn new(name: impl Into<TypeName>) -> Self {
		Self {
			name: name.into(),
			default_prefix: String::new(),
			naming: NamingStrategy::default(),
			group: GroupShape::default(),
		}
	}

	pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
		self.default_prefix = prefix.into();
		self
	}

	pub fn naming(mut self, naming: NamingStrategy) -> Self {
		self.naming = naming;
		self
	}

	pub fn field(mut self, ident: impl Into<String>, shape: Shape) -> Self {
		self.group.fields.push(Field::new(ident, shape));
		self
	}

	pub fn with_field(mut self, field: Field) -> Self {
		self.group.fields.push(field);
		self
	}

	/// Hash of everything that shapes the compiled tree. The prefix is not part of it.
	pub(crate) fn fingerprint(&self) -> u64 {
		let mut hasher = FxHasher::default();
		self.naming.hash(&mut hasher);
		self.group.hash_shape(&mut hasher);
		hasher.finish()
	}
}

impl GroupShape {
	fn hash_shape(&self, state: &mut impl Hasher) {
		self.fields.len().hash(state);
		for field in &self.fields {
			field.ident.hash(state);
			field.rename.hash(state);
			field.parent_name.hash(state);
			field.shape.hash_shape(state);
		}
	}
}

impl Shape {
	fn hash_shape(&self, state: &mut impl Hasher) {
		match self {
			Shape::Leaf { converter, default } => {
				0u8.hash(state);
				converter.target().hash(state);
				default.hash(state);
			}
			Shape::Group(group) => {
				1u8.hash(state);
				group.hash_shape(state);
			}
			Shape::Optional(inner) => {
				2u8.hash(state);
				inner.hash_shape(state);
			}
			Shape::Collection { element, default } => {
				3u8.hash(state);
				element.hash_shape(state);
				default.hash(state);
			}
			Shape::Map { key, value } => {
				4u8.hash(state);
				key.target().hash(state);
				value.hash_shape(state);
			}
			Shape::Ref { target, lazy } => {
				5u8.hash(state);
				target.hash(state);
				lazy.hash(state);
			}
		}
	}
}

/// Descriptors available to named references.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
	types: FxHashMap<TypeName, Arc<TypeDescriptor>>,
}

impl TypeCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces a descriptor.
	pub fn insert(&mut self, descriptor: impl Into<Arc<TypeDescriptor>>) {
		let descriptor = descriptor.into();
		self.types.insert(descriptor.name.clone(), descriptor);
	}

	pub fn with(mut self, descriptor: impl Into<Arc<TypeDescriptor>>) -> Self {
		self.insert(descriptor);
		self
	}

	pub fn get(&self, name: &TypeName) -> Option<&Arc<TypeDescriptor>> {
		self.types.get(name)
	}

	pub fn len(&self) -> usize {
		self.types.len()
	}

	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}
}

/// Index of a node in a [`SchemaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
	pub(crate) fn from_index(index: usize) -> Self {
		Self(index as u32)
	}

	pub fn index(self) -> usize {
		self.0 as usize
	}
}

/// Compiled schema node.
#[derive(Debug, Clone)]
pub enum SchemaNode {
	Leaf {
		converter: ConverterRef,
		default: Option<Box<str>>,
	},
	/// Children keyed by their literal property segment, in declaration order.
	Group {
		type_name: Option<TypeName>,
		children: IndexMap<Box<str>, NodeId>,
	},
	Collection {
		element: NodeId,
		default: Option<Box<str>>,
	},
	Map {
		key: ConverterRef,
		value: NodeId,
	},
	Optional {
		inner: NodeId,
	},
	/// Lazy reference to a group elsewhere in the arena, possibly an ancestor.
	Deferred {
		target: NodeId,
	},
}

impl SchemaNode {
	pub fn kind(&self) -> &'static str {
		match self {
			SchemaNode::Leaf { .. } => "leaf",
			SchemaNode::Group { .. } => "group",
			SchemaNode::Collection { .. } => "collection",
			SchemaNode::Map { .. } => "map",
			SchemaNode::Optional { .. } => "optional",
			SchemaNode::Deferred { .. } => "deferred",
		}
	}
}

/// Compiled schema of one mapping type.
#[derive(Debug)]
pub struct SchemaTree {
	type_name: TypeName,
	nodes: Vec<SchemaNode>,
	root: NodeId,
}

impl SchemaTree {
	pub fn type_name(&self) -> &TypeName {
		&self.type_name
	}

	pub fn root(&self) -> NodeId {
		self.root
	}

	pub fn node(&self, id: NodeId) -> &SchemaNode {
		&self.nodes[id.index()]
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Follows `Optional` and `Deferred` wrappers to the node that consumes segments.
	pub fn peel(&self, mut id: NodeId) -> NodeId {
		loop {
			match self.node(id) {
				SchemaNode::Optional { inner } => id = *inner,
				SchemaNode::Deferred { target } => id = *target,
				_ => return id,
			}
		}
	}

	/// Returns `true` if `id` is a leaf, possibly behind wrappers.
	pub fn is_leaf(&self, id: NodeId) -> bool {
		matches!(self.node(self.peel(id)), SchemaNode::Leaf { .. })
	}
}
