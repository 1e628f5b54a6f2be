//! Realized mapping graphs.
//!
//! A [`MappingInstance`] is one arena per bound root: realized nodes plus a
//! slot per leaf. Leaf slots keep the raw string and convert it on first
//! access; the result (value or failure) is cached in a [`OnceLock`], so
//! racing readers observe a single conversion.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use crate::binding::MatchedProperty;
use crate::convert::{Converter, ConverterRef, FromValue, Value};
use crate::error::{AccessError, ConversionError, Defect};
use crate::name::{PropertyName, Segment, join};
use crate::schema::{NodeId, SchemaNode, SchemaTree, TypeName};

/// Where a leaf's raw string came from.
#[derive(Debug, Clone)]
pub(crate) enum LeafSource {
	Matched(MatchedProperty),
	Default(Box<str>),
	/// Required, unmatched, no default. Already reported as a defect.
	Missing,
}

pub(crate) struct LeafSlot {
	pub(crate) path: Box<str>,
	pub(crate) converter: ConverterRef,
	pub(crate) source: LeafSource,
	cell: OnceLock<Result<Value, ConversionError>>,
}

impl LeafSlot {
	pub(crate) fn new(path: String, converter: ConverterRef, source: LeafSource) -> Self {
		Self {
			path: path.into(),
			converter,
			source,
			cell: OnceLock::new(),
		}
	}

	pub(crate) fn raw(&self) -> Option<&str> {
		match &self.source {
			LeafSource::Matched(m) => Some(&*m.value),
			LeafSource::Default(d) => Some(&**d),
			LeafSource::Missing => None,
		}
	}

	/// Converts on first call and caches the outcome. `None` for missing leaves.
	pub(crate) fn value(&self) -> Option<Result<&Value, &ConversionError>> {
		let raw = self.raw()?;
		let outcome = self.cell.get_or_init(|| {
			self.converter
				.convert(raw)
				.map_err(|reason| ConversionError {
					path: self.path.to_string(),
					raw: raw.to_string(),
					target: self.converter.target().to_string(),
					reason,
				})
		});
		Some(outcome.as_ref())
	}

	pub(crate) fn is_converted(&self) -> bool {
		self.cell.get().is_some()
	}
}

#[derive(Debug)]
pub(crate) enum Realized {
	Leaf(usize),
	Group(IndexMap<Box<str>, usize>),
	/// Elements keyed by their declared index, ascending.
	List(IndexMap<usize, usize>),
	Map(IndexMap<Box<str>, usize>),
	Absent,
}

impl Realized {
	fn kind(&self) -> &'static str {
		match self {
			Realized::Leaf(_) => "leaf",
			Realized::Group(_) => "group",
			Realized::List(_) => "collection",
			Realized::Map(_) => "map",
			Realized::Absent => "absent value",
		}
	}
}

#[derive(Debug)]
pub(crate) struct RealizedNode {
	pub(crate) path: Box<str>,
	pub(crate) schema: NodeId,
	pub(crate) kind: Realized,
}

pub(crate) struct InstanceData {
	pub(crate) type_name: TypeName,
	pub(crate) prefix: Box<str>,
	pub(crate) tree: Arc<SchemaTree>,
	pub(crate) nodes: Vec<RealizedNode>,
	pub(crate) slots: Vec<LeafSlot>,
	/// Structural defects found while realizing: missing leaves, bad map keys.
	pub(crate) defects: Vec<Defect>,
}

/// Realized object graph for one (type, prefix).
///
/// Cheap to clone; clones share the leaf cache.
#[derive(Clone)]
pub struct MappingInstance {
	data: Arc<InstanceData>,
}

impl MappingInstance {
	pub(crate) fn new(data: InstanceData) -> Self {
		Self {
			data: Arc::new(data),
		}
	}

	pub(crate) fn data(&self) -> &InstanceData {
		&self.data
	}

	pub fn type_name(&self) -> &TypeName {
		&self.data.type_name
	}

	pub fn prefix(&self) -> &str {
		&self.data.prefix
	}

	pub fn schema(&self) -> &Arc<SchemaTree> {
		&self.data.tree
	}

	/// The root group.
	pub fn root(&self) -> NodeRef<'_> {
		NodeRef {
			data: &self.data,
			id: 0,
		}
	}

	/// Navigates to `path`, relative to the prefix. An empty path is the root.
	pub fn node(&self, path: &str) -> Result<NodeRef<'_>, AccessError> {
		let name = PropertyName::parse(path)?;
		self.root().navigate(name.segments())
	}

	/// Converted value of the leaf at `path`.
	pub fn value(&self, path: &str) -> Result<&Value, AccessError> {
		self.node(path)?.value()
	}

	pub fn get<T: FromValue>(&self, path: &str) -> Result<T, AccessError> {
		self.node(path)?.get()
	}

	/// Canonical names and raw strings of every realized leaf.
	pub fn raw_values(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
		self.data.slots.iter().map(|s| (&*s.path, s.raw()))
	}

	/// Number of leaves converted so far.
	pub fn converted_leaves(&self) -> usize {
		self.data.slots.iter().filter(|s| s.is_converted()).count()
	}

	/// Returns `true` if both handles share the same realized graph.
	pub fn ptr_eq(&self, other: &MappingInstance) -> bool {
		Arc::ptr_eq(&self.data, &other.data)
	}
}

impl fmt::Debug for MappingInstance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MappingInstance")
			.field("type_name", &self.data.type_name)
			.field("prefix", &self.data.prefix)
			.field("leaves", &self.data.slots.len())
			.finish()
	}
}

/// Borrowed view of one realized node.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
	data: &'a InstanceData,
	id: usize,
}

impl<'a> NodeRef<'a> {
	fn node(&self) -> &'a RealizedNode {
		&self.data.nodes[self.id]
	}

	fn at(&self, id: usize) -> NodeRef<'a> {
		NodeRef {
			data: self.data,
			id,
		}
	}

	fn wrong(&self, expected: &'static str) -> AccessError {
		AccessError::WrongNode {
			path: self.path().to_string(),
			expected,
			actual: self.node().kind.kind(),
		}
	}

	/// Canonical property name of this node.
	pub fn path(&self) -> &'a str {
		&self.node().path
	}

	pub fn kind(&self) -> &'static str {
		self.node().kind.kind()
	}

	/// `false` for an optional value with no input.
	pub fn is_present(&self) -> bool {
		!matches!(self.node().kind, Realized::Absent)
	}

	pub fn child(&self, name: &str) -> Result<NodeRef<'a>, AccessError> {
		match &self.node().kind {
			Realized::Group(children) => children
				.get(name)
				.map(|&id| self.at(id))
				.ok_or_else(|| AccessError::NoSuchChild {
					path: self.path().to_string(),
					name: name.to_string(),
				}),
			_ => Err(self.wrong("group")),
		}
	}

	/// The `index`-th element in ascending order.
	pub fn index(&self, index: usize) -> Result<NodeRef<'a>, AccessError> {
		match &self.node().kind {
			Realized::List(items) => items
				.get_index(index)
				.map(|(_, &id)| self.at(id))
				.ok_or_else(|| AccessError::IndexOutOfRange {
					path: self.path().to_string(),
					index,
				}),
			_ => Err(self.wrong("collection")),
		}
	}

	/// The element declared as `[index]` in its property name.
	///
	/// Differs from [`NodeRef::index`] only for sparse indexed input.
	pub fn element(&self, index: usize) -> Result<NodeRef<'a>, AccessError> {
		match &self.node().kind {
			Realized::List(items) => items
				.get(&index)
				.map(|&id| self.at(id))
				.ok_or_else(|| AccessError::IndexOutOfRange {
					path: self.path().to_string(),
					index,
				}),
			_ => Err(self.wrong("collection")),
		}
	}

	pub fn entry(&self, key: &str) -> Result<NodeRef<'a>, AccessError> {
		match &self.node().kind {
			Realized::Map(entries) => entries
				.get(key)
				.map(|&id| self.at(id))
				.ok_or_else(|| AccessError::NoSuchEntry {
					path: self.path().to_string(),
					key: key.to_string(),
				}),
			_ => Err(self.wrong("map")),
		}
	}

	/// Element or entry count; zero for absent values and leaves.
	pub fn len(&self) -> usize {
		match &self.node().kind {
			Realized::Group(c) | Realized::Map(c) => c.len(),
			Realized::List(items) => items.len(),
			Realized::Leaf(_) | Realized::Absent => 0,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Collection elements in ascending index order. Absent collections are empty.
	pub fn items(&self) -> Result<Vec<NodeRef<'a>>, AccessError> {
		match &self.node().kind {
			Realized::List(items) => Ok(items.values().map(|&id| self.at(id)).collect()),
			Realized::Absent => Ok(Vec::new()),
			_ => Err(self.wrong("collection")),
		}
	}

	/// Map entries sorted by key. Absent maps are empty.
	pub fn entries(&self) -> Result<Vec<(&'a str, NodeRef<'a>)>, AccessError> {
		match &self.node().kind {
			Realized::Map(entries) => Ok(entries
				.iter()
				.map(|(k, &id)| (&**k, self.at(id)))
				.collect()),
			Realized::Absent => Ok(Vec::new()),
			_ => Err(self.wrong("map")),
		}
	}

	/// Converted leaf value, converting on first access.
	pub fn value(&self) -> Result<&'a Value, AccessError> {
		self.optional_value()?.ok_or_else(|| AccessError::Absent {
			path: self.path().to_string(),
		})
	}

	/// Like [`NodeRef::value`], but an absent or missing leaf is `Ok(None)`.
	pub fn optional_value(&self) -> Result<Option<&'a Value>, AccessError> {
		match &self.node().kind {
			Realized::Leaf(slot) => match self.data.slots[*slot].value() {
				Some(Ok(value)) => Ok(Some(value)),
				Some(Err(err)) => Err(err.clone().into()),
				None => Ok(None),
			},
			Realized::Absent => Ok(None),
			_ => Err(self.wrong("leaf")),
		}
	}

	/// Raw string behind a leaf, before conversion.
	pub fn raw(&self) -> Option<&'a str> {
		match &self.node().kind {
			Realized::Leaf(slot) => self.data.slots[*slot].raw(),
			_ => None,
		}
	}

	pub fn get<T: FromValue>(&self) -> Result<T, AccessError> {
		let value = self.value()?;
		self.extract(value)
	}

	pub fn get_optional<T: FromValue>(&self) -> Result<Option<T>, AccessError> {
		self.optional_value()?
			.map(|value| self.extract(value))
			.transpose()
	}

	pub fn child_value<T: FromValue>(&self, name: &str) -> Result<T, AccessError> {
		self.child(name)?.get()
	}

	pub fn list<T: FromValue>(&self) -> Result<Vec<T>, AccessError> {
		self.items()?.into_iter().map(|item| item.get()).collect()
	}

	pub fn map<T: FromValue>(&self) -> Result<BTreeMap<String, T>, AccessError> {
		self.entries()?
			.into_iter()
			.map(|(k, v)| Ok((k.to_string(), v.get()?)))
			.collect()
	}

	/// Map entries with keys converted by the map's declared key type.
	pub fn map_keyed<K, T>(&self) -> Result<BTreeMap<K, T>, AccessError>
	where
		K: FromValue + Ord,
		T: FromValue,
	{
		let key_converter = match self.data.tree.node(self.node().schema) {
			SchemaNode::Map { key, .. } => key.clone(),
			_ if !self.is_present() => return Ok(BTreeMap::new()),
			_ => return Err(self.wrong("map")),
		};
		let mut out = BTreeMap::new();
		for (key, node) in self.entries()? {
			let converted = key_converter
				.convert(key)
				.map_err(|reason| ConversionError {
					path: node.path().to_string(),
					raw: key.to_string(),
					target: key_converter.target().to_string(),
					reason,
				})?;
			out.insert(node.extract::<K>(&converted)?, node.get()?);
		}
		Ok(out)
	}

	fn extract<T: FromValue>(&self, value: &Value) -> Result<T, AccessError> {
		T::from_value(value).ok_or_else(|| {
			let path = self.path().to_string();
			let expected = std::any::type_name::<T>();
			if value.type_name() == T::value_kind().target() {
				AccessError::OutOfRange {
					path,
					value: value.to_string(),
					expected,
				}
			} else {
				AccessError::TypeMismatch {
					path,
					expected,
					actual: value.type_name(),
				}
			}
		})
	}

	/// Walks `segments` from this node.
	///
	/// Literal segments select group children or map entries, indices select
	/// collection elements. A map of leaves takes every remaining segment as
	/// its key.
	pub fn navigate(&self, segments: &[Segment]) -> Result<NodeRef<'a>, AccessError> {
		let mut current = *self;
		let mut rest = segments;
		while let Some((seg, tail)) = rest.split_first() {
			current = match (&current.node().kind, seg) {
				(Realized::Group(_), Segment::Literal(name)) => current.child(name)?,
				(Realized::List(_), Segment::Index(i)) => current.element(*i)?,
				(Realized::Map(_), _) => {
					let leaf_values = matches!(
						current.data.tree.node(current.node().schema),
						SchemaNode::Map { value, .. } if current.data.tree.is_leaf(*value)
					);
					if leaf_values && !tail.is_empty() {
						let next = current.entry(&join(rest))?;
						rest = &[];
						current = next;
						continue;
					}
					current.entry(&seg.key_text())?
				}
				(Realized::Group(_), _) => {
					return Err(AccessError::NoSuchChild {
						path: current.path().to_string(),
						name: seg.key_text(),
					});
				}
				_ => return Err(current.wrong("group, collection or map")),
			};
			rest = tail;
		}
		Ok(current)
	}
}

impl fmt::Debug for NodeRef<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NodeRef")
			.field("path", &self.path())
			.field("kind", &self.kind())
			.finish()
	}
}

/// Types built from a bound mapping.
///
/// Implemented by application structs to pair a declared shape with typed
/// extraction from the realized graph.
pub trait ConfigMapping: Sized {
	fn descriptor() -> Arc<crate::schema::TypeDescriptor>;

	fn from_mapping(node: NodeRef<'_>) -> Result<Self, AccessError>;
}
