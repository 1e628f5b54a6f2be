//! Matching input keys against compiled roots and realizing the results.
//!
//! [`BindingContext::bind`] routes each key to the root with the longest
//! matching prefix, walks that root's [`SchemaTree`] with a [`NameCursor`],
//! and collects the winning raw string per leaf. Each root is then realized
//! into a [`MappingInstance`] and validated; the outcome is every instance or
//! one [`AggregateValidationError`] covering every root.

mod realize;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::{AggregateValidationError, SchemaError};
use crate::instance::MappingInstance;
use crate::name::{NameCursor, PropertyName, Segment, join};
use crate::schema::{NodeId, SchemaNode, SchemaTree, TypeDescriptor, TypeName};
use crate::validate::ValidationPolicy;

/// A type descriptor paired with the prefix its properties live under.
#[derive(Debug, Clone)]
pub struct RootDeclaration {
	descriptor: Arc<TypeDescriptor>,
	prefix: String,
}

impl RootDeclaration {
	pub fn new(descriptor: impl Into<Arc<TypeDescriptor>>, prefix: impl Into<String>) -> Self {
		Self {
			descriptor: descriptor.into(),
			prefix: prefix.into(),
		}
	}

	/// Binds at the descriptor's declared default prefix.
	pub fn at_default_prefix(descriptor: impl Into<Arc<TypeDescriptor>>) -> Self {
		let descriptor = descriptor.into();
		let prefix = descriptor.default_prefix.clone();
		Self { descriptor, prefix }
	}

	pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
		&self.descriptor
	}

	pub fn type_name(&self) -> &TypeName {
		&self.descriptor.name
	}

	pub fn prefix(&self) -> &str {
		&self.prefix
	}

	pub fn key(&self) -> MappingKey {
		MappingKey::new(self.type_name().clone(), &*self.prefix)
	}
}

/// Identity of a bound root: (type, prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MappingKey {
	pub type_name: TypeName,
	pub prefix: Box<str>,
}

impl MappingKey {
	pub fn new(type_name: TypeName, prefix: impl Into<Box<str>>) -> Self {
		Self {
			type_name,
			prefix: prefix.into(),
		}
	}
}

impl fmt::Display for MappingKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{:?}", self.type_name, self.prefix)
	}
}

/// One input key with its resolved value and source ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
	pub name: String,
	pub value: String,
	pub ordinal: i32,
}

impl RawProperty {
	pub fn new(name: impl Into<String>, value: impl Into<String>, ordinal: i32) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			ordinal,
		}
	}
}

/// The input that won a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedProperty {
	/// Schema node the key landed on.
	pub node: NodeId,
	/// Originating input key.
	pub key: Box<str>,
	pub value: Box<str>,
	pub ordinal: i32,
}

impl MatchedProperty {
	/// Whether `self` overrides `other` at the same leaf: higher ordinal, then
	/// the lexicographically smaller key.
	fn overrides(&self, other: &MatchedProperty) -> bool {
		self.ordinal > other.ordinal || (self.ordinal == other.ordinal && self.key < other.key)
	}
}

/// A root ready to bind: declaration, parsed prefix and compiled tree.
#[derive(Debug, Clone)]
pub struct CompiledRoot {
	declaration: RootDeclaration,
	prefix: PropertyName,
	tree: Arc<SchemaTree>,
	validate_unknown: bool,
}

impl CompiledRoot {
	/// # Errors
	///
	/// Returns [`SchemaError::MalformedName`] if the prefix does not segment.
	pub fn new(
		declaration: RootDeclaration,
		tree: Arc<SchemaTree>,
		validate_unknown: bool,
	) -> Result<Self, SchemaError> {
		let prefix = PropertyName::parse(declaration.prefix())?;
		Ok(Self {
			declaration,
			prefix,
			tree,
			validate_unknown,
		})
	}

	pub fn declaration(&self) -> &RootDeclaration {
		&self.declaration
	}

	pub fn prefix(&self) -> &PropertyName {
		&self.prefix
	}

	pub fn tree(&self) -> &Arc<SchemaTree> {
		&self.tree
	}

	pub fn validate_unknown(&self) -> bool {
		self.validate_unknown
	}

	/// Canonical spelling of the prefix, used as the base of leaf paths.
	pub(crate) fn canonical_prefix(&self) -> String {
		join(self.prefix.segments())
	}

	fn claims_text(&self, name: &str) -> bool {
		let prefix = self.declaration.prefix();
		prefix.is_empty()
			|| name
				.strip_prefix(prefix)
				.is_some_and(|rest| rest.is_empty() || rest.starts_with(['.', '[']))
	}
}

/// Step taken through the schema while matching; keys the match trie.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Step {
	Index(usize),
	Name(Box<str>),
}

/// Matches recorded under one schema position, keyed by the steps below it.
#[derive(Debug, Default)]
pub(crate) struct MatchNode {
	pub(crate) children: BTreeMap<Step, MatchNode>,
	pub(crate) leaf: Option<MatchedProperty>,
	/// Comma-separated value given at a collection's own path.
	pub(crate) inline: Option<MatchedProperty>,
}

impl MatchNode {
	fn descend(&mut self, steps: &[Step]) -> &mut MatchNode {
		steps
			.iter()
			.fold(self, |node, step| node.children.entry(step.clone()).or_default())
	}

	/// Returns `true` if any value was recorded at or below this node.
	pub(crate) fn has_values(&self) -> bool {
		self.leaf.is_some()
			|| self.inline.is_some()
			|| self.children.values().any(MatchNode::has_values)
	}

	pub(crate) fn child(&self, step: &Step) -> Option<&MatchNode> {
		self.children.get(step)
	}
}

fn offer(slot: &mut Option<MatchedProperty>, candidate: MatchedProperty) {
	match slot {
		Some(current) if !candidate.overrides(current) => {}
		_ => *slot = Some(candidate),
	}
}

/// Where a key landed inside one tree.
#[derive(Debug)]
pub(crate) struct Located {
	pub(crate) steps: Vec<Step>,
	pub(crate) node: NodeId,
	pub(crate) inline: bool,
}

/// Walks the remaining segments under `cursor` through `tree`.
///
/// Returns `None` when the name runs out of matching structure or ends on a
/// composite. Leaves the cursor wherever matching stopped.
pub(crate) fn locate(tree: &SchemaTree, cursor: &mut NameCursor<'_>) -> Option<Located> {
	let mut steps = Vec::new();
	let mut id = tree.root();
	loop {
		let current = tree.peel(id);
		match tree.node(current) {
			SchemaNode::Leaf { .. } => {
				return cursor.at_end().then_some(Located {
					steps,
					node: current,
					inline: false,
				});
			}
			SchemaNode::Group { children, .. } => {
				let Some(Segment::Literal(name)) = cursor.current() else {
					return None;
				};
				let &child = children.get(&**name)?;
				steps.push(Step::Name(name.clone()));
				cursor.advance();
				id = child;
			}
			SchemaNode::Collection { element, .. } => match cursor.current() {
				Some(Segment::Index(index)) => {
					steps.push(Step::Index(*index));
					cursor.advance();
					id = *element;
				}
				None if tree.is_leaf(*element) => {
					return Some(Located {
						steps,
						node: current,
						inline: true,
					});
				}
				_ => return None,
			},
			SchemaNode::Map { value, .. } => {
				let segment = cursor.current()?;
				let rest = cursor.remaining();
				let key = if tree.is_leaf(*value) && rest.len() > 1 {
					cursor.set_position(usize::MAX);
					join(rest)
				} else {
					cursor.advance();
					segment.key_text()
				};
				steps.push(Step::Name(key.into()));
				id = *value;
			}
			SchemaNode::Optional { .. } | SchemaNode::Deferred { .. } => return None,
		}
	}
}

#[derive(Debug, Default)]
struct RootState {
	matches: MatchNode,
	unmatched: Vec<String>,
}

/// Bound instances keyed by (type, prefix), in registration order.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
	instances: IndexMap<MappingKey, MappingInstance>,
}

impl Bindings {
	pub fn get(&self, type_name: &TypeName, prefix: &str) -> Option<&MappingInstance> {
		self.instances
			.get(&MappingKey::new(type_name.clone(), prefix))
	}

	pub fn len(&self) -> usize {
		self.instances.len()
	}

	pub fn is_empty(&self) -> bool {
		self.instances.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&MappingKey, &MappingInstance)> {
		self.instances.iter()
	}
}

impl IntoIterator for Bindings {
	type Item = (MappingKey, MappingInstance);
	type IntoIter = indexmap::map::IntoIter<MappingKey, MappingInstance>;

	fn into_iter(self) -> Self::IntoIter {
		self.instances.into_iter()
	}
}

/// One binding pass over a fixed set of compiled roots.
#[derive(Debug)]
pub struct BindingContext<'a> {
	roots: &'a [CompiledRoot],
	/// Indices into `roots`, longest prefix first.
	order: Vec<usize>,
}

impl<'a> BindingContext<'a> {
	pub fn new(roots: &'a [CompiledRoot]) -> Self {
		let mut order: Vec<usize> = (0..roots.len()).collect();
		order.sort_by_key(|&i| std::cmp::Reverse(roots[i].prefix.len()));
		Self { roots, order }
	}

	/// Index of the root with the longest prefix matching `cursor`, leaving
	/// the cursor just past that prefix.
	pub fn select(&self, cursor: &mut NameCursor<'_>) -> Option<usize> {
		self.order
			.iter()
			.copied()
			.find(|&i| cursor.skip_prefix(self.roots[i].prefix.segments()))
	}

	/// Returns `true` if some root's prefix covers `name`.
	pub fn claims(&self, name: &str) -> bool {
		match PropertyName::parse(name) {
			Ok(parsed) => self.select(&mut parsed.cursor()).is_some(),
			Err(_) => self.claim_text(name).is_some(),
		}
	}

	fn claim_text(&self, name: &str) -> Option<usize> {
		self.order
			.iter()
			.copied()
			.find(|&i| self.roots[i].claims_text(name))
	}

	/// Matches, realizes and validates every root against `keys`.
	///
	/// # Errors
	///
	/// Returns one [`AggregateValidationError`] with every missing leaf,
	/// conversion failure and (where enabled) unknown key across all roots.
	pub fn bind<I>(&self, keys: I) -> Result<Bindings, AggregateValidationError>
	where
		I: IntoIterator<Item = RawProperty>,
	{
		let mut states: Vec<RootState> = self.roots.iter().map(|_| RootState::default()).collect();
		let mut seen = 0usize;

		for property in keys {
			seen += 1;
			let name = match PropertyName::parse(&property.name) {
				Ok(name) => name,
				Err(err) => {
					trace!(key = %property.name, error = %err, "unsegmentable key");
					if let Some(i) = self.claim_text(&property.name) {
						states[i].unmatched.push(property.name);
					}
					continue;
				}
			};
			let mut cursor = name.cursor();
			let Some(i) = self.select(&mut cursor) else {
				trace!(key = %property.name, "no root claims key");
				continue;
			};
			let Some(located) = locate(&self.roots[i].tree, &mut cursor) else {
				trace!(key = %property.name, prefix = %self.roots[i].prefix, "key unmatched");
				states[i].unmatched.push(property.name);
				continue;
			};
			if property.value.is_empty() {
				continue;
			}

			let target = states[i].matches.descend(&located.steps);
			let matched = MatchedProperty {
				node: located.node,
				key: property.name.into(),
				value: property.value.into(),
				ordinal: property.ordinal,
			};
			if located.inline {
				offer(&mut target.inline, matched);
			} else {
				offer(&mut target.leaf, matched);
			}
		}

		let mut instances = IndexMap::with_capacity(self.roots.len());
		let mut failure = AggregateValidationError::default();
		let mut unmatched_total = 0;
		for (root, state) in self.roots.iter().zip(states) {
			unmatched_total += state.unmatched.len();
			let instance = realize::realize(root, &state.matches);
			let policy = ValidationPolicy::new(root.validate_unknown);
			if let Err(err) = policy.validate(&instance, &state.unmatched) {
				failure.merge(err);
			}
			instances.insert(root.declaration.key(), instance);
		}
		debug!(
			roots = self.roots.len(),
			keys = seen,
			unmatched = unmatched_total,
			"bound configuration"
		);

		failure.into_result()?;
		Ok(Bindings { instances })
	}
}
