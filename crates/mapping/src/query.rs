//! Read-only schema queries for tooling: flattened leaves and name classification.

use indexmap::IndexMap;

use crate::binding::{CompiledRoot, locate};
use crate::name::{PropertyName, join, push_literal};
use crate::schema::{NodeId, SchemaNode, SchemaTree};

/// Wildcard segment standing for any collection index.
pub const ANY_INDEX: &str = "[*]";
/// Wildcard segment standing for any map key.
pub const ANY_KEY: &str = "*";

/// One leaf of a flattened schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafDescriptor {
	/// Canonical path with `[*]` for indices and `*` for map keys.
	pub path: String,
	/// Converter target name.
	pub target: String,
	pub default: Option<String>,
	/// `true` if the leaf sits under an optional wrapper or lazy reference.
	pub optional: bool,
}

/// Flattens `root`'s schema into its leaves, keyed by canonical path.
///
/// Lazy references are not expanded.
pub fn properties(root: &CompiledRoot) -> IndexMap<String, LeafDescriptor> {
	flatten(root.tree(), &root.canonical_prefix())
}

/// Flattens `tree` as if bound at `prefix`.
pub fn flatten(tree: &SchemaTree, prefix: &str) -> IndexMap<String, LeafDescriptor> {
	let mut out = IndexMap::new();
	let canonical = match PropertyName::parse(prefix) {
		Ok(name) => join(name.segments()),
		Err(_) => prefix.to_string(),
	};
	walk(tree, tree.root(), canonical, false, None, &mut out);
	out
}

pub(crate) fn leaf_paths(tree: &SchemaTree, prefix: &str) -> Vec<String> {
	flatten(tree, prefix).into_keys().collect()
}

fn child(parent: &str, name: &str) -> String {
	let mut out = parent.to_string();
	if !out.is_empty() {
		out.push('.');
	}
	if name == ANY_KEY {
		out.push_str(name);
	} else {
		push_literal(&mut out, name);
	}
	out
}

fn walk(
	tree: &SchemaTree,
	id: NodeId,
	path: String,
	optional: bool,
	inherited_default: Option<&str>,
	out: &mut IndexMap<String, LeafDescriptor>,
) {
	match tree.node(id) {
		SchemaNode::Leaf { converter, default } => {
			let default = default.as_deref().or(inherited_default).map(str::to_string);
			out.insert(
				path.clone(),
				LeafDescriptor {
					path,
					target: converter.target().to_string(),
					default,
					optional,
				},
			);
		}
		SchemaNode::Group { children, .. } => {
			for (name, &child_id) in children {
				walk(tree, child_id, child(&path, name), optional, None, out);
			}
		}
		SchemaNode::Collection { element, default } => {
			let element_path = format!("{path}{ANY_INDEX}");
			walk(tree, *element, element_path, optional, default.as_deref(), out);
		}
		SchemaNode::Map { value, .. } => {
			walk(tree, *value, child(&path, ANY_KEY), optional, None, out);
		}
		SchemaNode::Optional { inner } => walk(tree, *inner, path, true, inherited_default, out),
		SchemaNode::Deferred { .. } => {}
	}
}

/// Filters `candidates` down to the names `root`'s schema recognizes as leaves.
///
/// No input values are needed; a name is recognized if it falls under the
/// root's prefix and walks to a leaf (or an inline collection of leaves).
pub fn mapped_properties<I, S>(root: &CompiledRoot, candidates: I) -> Vec<String>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	candidates
		.into_iter()
		.filter(|name| recognizes(root, name.as_ref()))
		.map(|name| name.as_ref().to_string())
		.collect()
}

/// Returns `true` if `name` walks to a leaf of `root`.
pub fn recognizes(root: &CompiledRoot, name: &str) -> bool {
	let Ok(parsed) = PropertyName::parse(name) else {
		return false;
	};
	let mut cursor = parsed.cursor();
	cursor.skip_prefix(root.prefix().segments()) && locate(root.tree(), &mut cursor).is_some()
}
