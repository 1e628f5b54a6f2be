use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{
	Field, GroupShape, NamingStrategy, NodeId, SchemaNode, SchemaTree, Shape, TypeCatalog,
	TypeDescriptor, TypeName,
};
use crate::error::SchemaError;
use crate::name::{Segment, segment};

/// Compiles [`TypeDescriptor`]s into [`SchemaTree`]s, once per type.
///
/// Named references resolve against the builder's [`TypeCatalog`]. Compiled
/// trees are cached by [`TypeName`]; the cache is shared by every build that
/// goes through the same builder. A name must always describe the same shape.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
	catalog: TypeCatalog,
	/// Compiled trees with the fingerprint of the descriptor they came from.
	cache: Mutex<FxHashMap<TypeName, (u64, Arc<SchemaTree>)>>,
}

impl SchemaBuilder {
	pub fn new(catalog: TypeCatalog) -> Self {
		Self {
			catalog,
			cache: Mutex::default(),
		}
	}

	pub fn catalog(&self) -> &TypeCatalog {
		&self.catalog
	}

	/// Number of compiled trees held in the cache.
	pub fn cached(&self) -> usize {
		self.cache.lock().len()
	}

	/// Returns the compiled tree for `descriptor`, compiling it on first use.
	///
	/// # Errors
	///
	/// Returns a [`SchemaError`] for structurally invalid shapes: malformed or
	/// duplicate property names, map keys without a canonical string form,
	/// unknown or non-lazy recursive type references. Returns
	/// [`SchemaError::ConflictingType`] if another shape was already compiled
	/// under the same name.
	pub fn build(&self, descriptor: &TypeDescriptor) -> Result<Arc<SchemaTree>, SchemaError> {
		let fingerprint = descriptor.fingerprint();
		if let Some(tree) = self.cached_tree(descriptor, fingerprint)? {
			return Ok(tree);
		}

		let mut compiler = Compiler {
			catalog: &self.catalog,
			naming: descriptor.naming,
			owner: &descriptor.name,
			nodes: Vec::new(),
			stack: Vec::new(),
			memo: FxHashMap::default(),
			path: Vec::new(),
		};
		let root = compiler.compile_group(&descriptor.group, Some(&descriptor.name))?;
		let tree = Arc::new(SchemaTree {
			type_name: descriptor.name.clone(),
			nodes: compiler.nodes,
			root,
		});
		debug!(type_name = %descriptor.name, nodes = tree.len(), "compiled schema");

		// A concurrent build of the same type may have won; keep the first.
		let mut cache = self.cache.lock();
		let (cached, tree) = cache
			.entry(descriptor.name.clone())
			.or_insert((fingerprint, tree));
		if *cached != fingerprint {
			return Err(conflict(descriptor));
		}
		Ok(tree.clone())
	}

	fn cached_tree(
		&self,
		descriptor: &TypeDescriptor,
		fingerprint: u64,
	) -> Result<Option<Arc<SchemaTree>>, SchemaError> {
		match self.cache.lock().get(&descriptor.name) {
			Some((cached, _)) if *cached != fingerprint => Err(conflict(descriptor)),
			Some((_, tree)) => Ok(Some(tree.clone())),
			None => Ok(None),
		}
	}
}

fn conflict(descriptor: &TypeDescriptor) -> SchemaError {
	SchemaError::ConflictingType {
		name: descriptor.name.clone(),
	}
}

struct Compiler<'a> {
	catalog: &'a TypeCatalog,
	naming: NamingStrategy,
	owner: &'a TypeName,
	nodes: Vec<SchemaNode>,
	/// Named groups being compiled, outermost first. Parent-named types have no node.
	stack: Vec<(TypeName, Option<NodeId>)>,
	/// Named groups already compiled outside the current stack.
	memo: FxHashMap<TypeName, NodeId>,
	path: Vec<String>,
}

impl Compiler<'_> {
	fn push(&mut self, node: SchemaNode) -> NodeId {
		let id = NodeId::from_index(self.nodes.len());
		self.nodes.push(node);
		id
	}

	fn path_str(&self) -> String {
		let mut out = String::new();
		for part in &self.path {
			if !out.is_empty() && !part.starts_with('[') {
				out.push('.');
			}
			out.push_str(part);
		}
		out
	}

	fn invalid(&self, reason: &'static str) -> SchemaError {
		SchemaError::InvalidShape {
			owner: self.owner.to_string(),
			path: self.path_str(),
			reason,
		}
	}

	fn compile_group(
		&mut self,
		group: &GroupShape,
		type_name: Option<&TypeName>,
	) -> Result<NodeId, SchemaError> {
		let id = self.push(SchemaNode::Group {
			type_name: type_name.cloned(),
			children: IndexMap::new(),
		});
		if let Some(name) = type_name {
			self.stack.push((name.clone(), Some(id)));
		}
		let mut children = IndexMap::new();
		let result = self.compile_fields(group, &mut children);
		if type_name.is_some() {
			self.stack.pop();
		}
		result?;

		if let SchemaNode::Group { children: slot, .. } = &mut self.nodes[id.index()] {
			*slot = children;
		}
		Ok(id)
	}

	fn compile_fields(
		&mut self,
		group: &GroupShape,
		children: &mut IndexMap<Box<str>, NodeId>,
	) -> Result<(), SchemaError> {
		for field in &group.fields {
			if field.parent_name {
				self.hoist(field, children)?;
				continue;
			}

			let name = field.property_name(self.naming);
			self.check_property_name(&name)?;
			self.path.push(name.clone());
			let compiled = self.compile_shape(&field.shape);
			self.path.pop();
			let id = compiled?;

			if children.insert(name.clone().into_boxed_str(), id).is_some() {
				return Err(SchemaError::DuplicateProperty {
					owner: self.owner.to_string(),
					name,
				});
			}
		}
		Ok(())
	}

	/// Compiles a parent-named field's children straight into `children`.
	fn hoist(
		&mut self,
		field: &Field,
		children: &mut IndexMap<Box<str>, NodeId>,
	) -> Result<(), SchemaError> {
		match &field.shape {
			Shape::Group(group) => self.compile_fields(group, children),
			Shape::Ref {
				target,
				lazy: false,
			} => {
				if self.stack.iter().any(|(name, _)| name == target) {
					return Err(self.recursive(target));
				}
				let descriptor = self.lookup(target)?;
				self.stack.push((target.clone(), None));
				let result = self.compile_fields(&descriptor.group, children);
				self.stack.pop();
				result
			}
			_ => {
				self.path.push(field.property_name(self.naming));
				let err = self.invalid("only non-lazy groups can be parent-named");
				self.path.pop();
				Err(err)
			}
		}
	}

	fn compile_shape(&mut self, shape: &Shape) -> Result<NodeId, SchemaError> {
		match shape {
			Shape::Leaf { converter, default } => Ok(self.push(SchemaNode::Leaf {
				converter: converter.clone(),
				default: default.as_deref().map(Into::into),
			})),
			Shape::Group(group) => self.compile_group(group, None),
			Shape::Optional(inner) => {
				if matches!(**inner, Shape::Optional(_)) {
					return Err(self.invalid("optional cannot wrap another optional"));
				}
				let inner = self.compile_shape(inner)?;
				Ok(self.push(SchemaNode::Optional { inner }))
			}
			Shape::Collection { element, default } => {
				if matches!(**element, Shape::Optional(_)) {
					return Err(self.invalid("collection elements cannot be optional"));
				}
				if default.is_some() && !matches!(**element, Shape::Leaf { .. }) {
					return Err(self.invalid("only collections of leaves take a default"));
				}
				self.path.push("[*]".to_string());
				let element = self.compile_shape(element);
				self.path.pop();
				let element = element?;
				Ok(self.push(SchemaNode::Collection {
					element,
					default: default.as_deref().map(Into::into),
				}))
			}
			Shape::Map { key, value } => {
				if !key.canonical_key() {
					return Err(SchemaError::NonCanonicalMapKey {
						owner: self.owner.to_string(),
						path: self.path_str(),
						key_type: key.target().to_string(),
					});
				}
				if matches!(**value, Shape::Optional(_)) {
					return Err(self.invalid("map values cannot be optional"));
				}
				self.path.push("*".to_string());
				let value = self.compile_shape(value);
				self.path.pop();
				let value = value?;
				Ok(self.push(SchemaNode::Map {
					key: key.clone(),
					value,
				}))
			}
			Shape::Ref { target, lazy } => self.compile_ref(target, *lazy),
		}
	}

	fn compile_ref(&mut self, target: &TypeName, lazy: bool) -> Result<NodeId, SchemaError> {
		if let Some((_, slot)) = self.stack.iter().find(|(name, _)| name == target) {
			if !lazy {
				return Err(self.recursive(target));
			}
			return match *slot {
				Some(ancestor) => Ok(self.push(SchemaNode::Deferred { target: ancestor })),
				None => Err(self.invalid("lazy reference to a parent-named type")),
			};
		}

		let group = match self.memo.get(target) {
			Some(&id) => id,
			None => {
				let descriptor = self.lookup(target)?;
				let id = self.compile_group(&descriptor.group, Some(target))?;
				self.memo.insert(target.clone(), id);
				id
			}
		};
		if lazy {
			Ok(self.push(SchemaNode::Deferred { target: group }))
		} else {
			Ok(group)
		}
	}

	fn lookup(&self, target: &TypeName) -> Result<Arc<TypeDescriptor>, SchemaError> {
		self.catalog
			.get(target)
			.cloned()
			.ok_or_else(|| SchemaError::UnknownType {
				owner: self.owner.to_string(),
				target: target.clone(),
			})
	}

	fn recursive(&self, target: &TypeName) -> SchemaError {
		let mut chain: Vec<&str> = self.stack.iter().map(|(name, _)| name.as_str()).collect();
		chain.push(target.as_str());
		SchemaError::Recursive {
			target: target.clone(),
			chain: chain.join(" -> "),
		}
	}

	fn check_property_name(&self, name: &str) -> Result<(), SchemaError> {
		let invalid = || SchemaError::InvalidPropertyName {
			owner: self.owner.to_string(),
			name: name.to_string(),
		};
		let segments = segment(name).map_err(|_| invalid())?;
		match segments.as_slice() {
			[Segment::Literal(s)] if &**s == name && !s.is_empty() => Ok(()),
			_ => Err(invalid()),
		}
	}
}
