use indexmap::IndexMap;

use super::{CompiledRoot, MatchNode, MatchedProperty, Step};
use crate::error::Defect;
use crate::instance::{InstanceData, LeafSlot, LeafSource, MappingInstance, Realized, RealizedNode};
use crate::name::push_literal;
use crate::schema::{NodeId, SchemaNode, SchemaTree};

/// Builds the instance arena for `root` from its recorded matches.
///
/// Structural defects (missing leaves, rejected map keys) are stored on the
/// instance for the validation pass; conversion is left to first access.
pub(super) fn realize(root: &CompiledRoot, matches: &MatchNode) -> MappingInstance {
	let tree = root.tree();
	let mut realizer = Realizer {
		tree,
		nodes: Vec::new(),
		slots: Vec::new(),
		defects: Vec::new(),
	};
	realizer.node(tree.root(), Some(matches), root.canonical_prefix());

	MappingInstance::new(InstanceData {
		type_name: root.declaration().type_name().clone(),
		prefix: root.declaration().prefix().into(),
		tree: tree.clone(),
		nodes: realizer.nodes,
		slots: realizer.slots,
		defects: realizer.defects,
	})
}

struct Realizer<'t> {
	tree: &'t SchemaTree,
	nodes: Vec<RealizedNode>,
	slots: Vec<LeafSlot>,
	defects: Vec<Defect>,
}

fn child_path(parent: &str, name: &str) -> String {
	let mut out = String::with_capacity(parent.len() + name.len() + 1);
	out.push_str(parent);
	if !out.is_empty() {
		out.push('.');
	}
	push_literal(&mut out, name);
	out
}

/// Splits an inline list on unescaped commas, dropping empty elements.
pub(crate) fn split_inline(raw: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut current = String::new();
	let mut chars = raw.chars();
	while let Some(ch) = chars.next() {
		match ch {
			'\\' => match chars.next() {
				Some(',') => current.push(','),
				Some(other) => {
					current.push('\\');
					current.push(other);
				}
				None => current.push('\\'),
			},
			',' => {
				if !current.is_empty() {
					out.push(std::mem::take(&mut current));
				}
			}
			_ => current.push(ch),
		}
	}
	if !current.is_empty() {
		out.push(current);
	}
	out
}

impl Realizer<'_> {
	fn reserve(&mut self, path: &str, schema: NodeId) -> usize {
		let index = self.nodes.len();
		self.nodes.push(RealizedNode {
			path: path.into(),
			schema,
			kind: Realized::Absent,
		});
		index
	}

	fn absent(&mut self, path: String, schema: NodeId) -> usize {
		self.reserve(&path, schema)
	}

	/// Realizes schema node `id` at `path`. Returns the realized node index.
	fn node(&mut self, id: NodeId, matches: Option<&MatchNode>, path: String) -> usize {
		let tree = self.tree;
		let present = matches.is_some_and(MatchNode::has_values);
		match tree.node(id) {
			SchemaNode::Optional { inner } => {
				if present || self.has_default(*inner) {
					self.node(*inner, matches, path)
				} else {
					self.absent(path, id)
				}
			}
			SchemaNode::Deferred { target } => {
				if present {
					self.node(*target, matches, path)
				} else {
					self.absent(path, id)
				}
			}
			SchemaNode::Leaf { default, .. } => {
				let source = match matches.and_then(|m| m.leaf.clone()) {
					Some(matched) => LeafSource::Matched(matched),
					None => match default {
						Some(value) => LeafSource::Default(value.clone()),
						None => {
							self.defects.push(Defect::MissingRequired { path: path.clone() });
							LeafSource::Missing
						}
					},
				};
				self.leaf(id, path, source)
			}
			SchemaNode::Group { children, .. } => {
				let index = self.reserve(&path, id);
				let mut realized = IndexMap::with_capacity(children.len());
				for (name, &child) in children {
					let step = Step::Name(name.clone());
					let child_matches = matches.and_then(|m| m.child(&step));
					let child_index = self.node(child, child_matches, child_path(&path, name));
					realized.insert(name.clone(), child_index);
				}
				self.nodes[index].kind = Realized::Group(realized);
				index
			}
			SchemaNode::Collection { element, default } => {
				self.collection(id, *element, default.as_deref(), matches, path)
			}
			SchemaNode::Map { key, value } => {
				let index = self.reserve(&path, id);
				let mut entries = IndexMap::new();
				if let Some(m) = matches {
					for (step, sub) in &m.children {
						let Step::Name(name) = step else {
							continue;
						};
						let entry_path = child_path(&path, name);
						if let Err(reason) = key.convert(name) {
							self.defects.push(Defect::InvalidMapKey {
								path: entry_path,
								key: name.to_string(),
								target: key.target().to_string(),
								reason,
							});
							continue;
						}
						let entry_index = self.node(*value, Some(sub), entry_path);
						entries.insert(name.clone(), entry_index);
					}
				}
				self.nodes[index].kind = Realized::Map(entries);
				index
			}
		}
	}

	fn collection(
		&mut self,
		id: NodeId,
		element: NodeId,
		default: Option<&str>,
		matches: Option<&MatchNode>,
		path: String,
	) -> usize {
		let index = self.reserve(&path, id);
		let mut items = IndexMap::new();

		if let Some(m) = matches {
			for (step, sub) in &m.children {
				if let Step::Index(i) = step {
					let item = self.node(element, Some(sub), format!("{path}[{i}]"));
					items.insert(*i, item);
				}
			}
		}

		if items.is_empty() && self.tree.is_leaf(element) {
			let inline = matches.and_then(|m| m.inline.as_ref());
			let pieces = match (inline, default) {
				(Some(matched), _) => Some((split_inline(&matched.value), Some(matched))),
				(None, Some(default)) => Some((split_inline(default), None)),
				(None, None) => None,
			};
			match pieces {
				Some((pieces, matched)) => {
					for (i, piece) in pieces.into_iter().enumerate() {
						let source = match matched {
							Some(m) => LeafSource::Matched(MatchedProperty {
								value: piece.into(),
								..m.clone()
							}),
							None => LeafSource::Default(piece.into()),
						};
						let item = self.leaf(element, format!("{path}[{i}]"), source);
						items.insert(i, item);
					}
				}
				None => self.defects.push(Defect::MissingRequired { path: path.clone() }),
			}
		}

		self.nodes[index].kind = Realized::List(items);
		index
	}

	fn leaf(&mut self, id: NodeId, path: String, source: LeafSource) -> usize {
		let tree = self.tree;
		let SchemaNode::Leaf { converter, .. } = tree.node(tree.peel(id)) else {
			return self.absent(path, id);
		};
		let slot = self.slots.len();
		self.slots.push(LeafSlot::new(path.clone(), converter.clone(), source));
		let index = self.reserve(&path, id);
		self.nodes[index].kind = Realized::Leaf(slot);
		index
	}

	/// Optional wrappers realize defaults even without input.
	fn has_default(&self, id: NodeId) -> bool {
		matches!(
			self.tree.node(id),
			SchemaNode::Leaf { default: Some(_), .. } | SchemaNode::Collection { default: Some(_), .. }
		)
	}
}
