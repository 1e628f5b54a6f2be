//! Assembling a validated set of roots for one configuration build.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::binding::{BindingContext, Bindings, CompiledRoot, MappingKey, RawProperty, RootDeclaration};
use crate::error::{AggregateValidationError, SchemaError};
use crate::name::join;
use crate::query::{self, LeafDescriptor};
use crate::schema::{SchemaBuilder, TypeCatalog, TypeName};

/// Compiled roots ready to bind.
#[derive(Debug, Clone, Default)]
pub struct MappingProvider {
	roots: Vec<CompiledRoot>,
}

impl MappingProvider {
	pub fn builder() -> MappingProviderBuilder {
		MappingProviderBuilder::default()
	}

	pub fn roots(&self) -> &[CompiledRoot] {
		&self.roots
	}

	pub fn root(&self, type_name: &TypeName, prefix: &str) -> Option<&CompiledRoot> {
		self.roots
			.iter()
			.find(|r| r.declaration().type_name() == type_name && r.declaration().prefix() == prefix)
	}

	pub fn is_empty(&self) -> bool {
		self.roots.is_empty()
	}

	pub fn context(&self) -> BindingContext<'_> {
		BindingContext::new(&self.roots)
	}

	/// Returns `true` if some root's prefix covers `name`.
	pub fn claims(&self, name: &str) -> bool {
		self.context().claims(name)
	}

	/// Binds `keys` against every root.
	///
	/// # Errors
	///
	/// See [`BindingContext::bind`].
	pub fn map<I>(&self, keys: I) -> Result<Bindings, AggregateValidationError>
	where
		I: IntoIterator<Item = RawProperty>,
	{
		self.context().bind(keys)
	}

	/// Flattened leaves of every root, in root order.
	pub fn properties(&self) -> IndexMap<String, LeafDescriptor> {
		let mut out = IndexMap::new();
		for root in &self.roots {
			out.extend(query::properties(root));
		}
		out
	}
}

/// Collects root declarations and compiles them.
#[derive(Debug)]
pub struct MappingProviderBuilder {
	schemas: Arc<SchemaBuilder>,
	roots: Vec<(RootDeclaration, Option<bool>)>,
	validate_unknown: bool,
}

impl Default for MappingProviderBuilder {
	fn default() -> Self {
		Self {
			schemas: Arc::default(),
			roots: Vec::new(),
			validate_unknown: true,
		}
	}
}

impl MappingProviderBuilder {
	/// Shares a schema cache with other builds.
	pub fn schemas(mut self, schemas: Arc<SchemaBuilder>) -> Self {
		self.schemas = schemas;
		self
	}

	/// Resolves named references against `catalog`, with a fresh schema cache.
	pub fn catalog(mut self, catalog: TypeCatalog) -> Self {
		self.schemas = Arc::new(SchemaBuilder::new(catalog));
		self
	}

	/// Default unknown-key validation for roots added with [`Self::root`].
	pub fn validate_unknown(mut self, validate: bool) -> Self {
		self.validate_unknown = validate;
		self
	}

	pub fn root(mut self, declaration: RootDeclaration) -> Self {
		self.roots.push((declaration, None));
		self
	}

	/// Adds a root with its own unknown-key switch.
	pub fn root_with(mut self, declaration: RootDeclaration, validate_unknown: bool) -> Self {
		self.roots.push((declaration, Some(validate_unknown)));
		self
	}

	pub fn roots(mut self, declarations: impl IntoIterator<Item = RootDeclaration>) -> Self {
		self.roots
			.extend(declarations.into_iter().map(|d| (d, None)));
		self
	}

	/// Compiles every root's schema and checks prefixes.
	///
	/// The same (type, prefix) declared twice is kept once, with the first
	/// declaration's settings.
	///
	/// # Errors
	///
	/// Returns the first [`SchemaError`]: an invalid shape, a malformed
	/// prefix, or two different types at one prefix.
	pub fn build(self) -> Result<MappingProvider, SchemaError> {
		let mut seen: FxHashSet<MappingKey> = FxHashSet::default();
		let mut by_prefix: FxHashMap<String, TypeName> = FxHashMap::default();
		let mut roots = Vec::with_capacity(self.roots.len());

		for (declaration, validate) in self.roots {
			if !seen.insert(declaration.key()) {
				continue;
			}
			let tree = self.schemas.build(declaration.descriptor())?;
			let root = CompiledRoot::new(
				declaration,
				tree,
				validate.unwrap_or(self.validate_unknown),
			)?;

			let prefix = join(root.prefix().segments());
			let type_name = root.declaration().type_name();
			if let Some(first) = by_prefix.get(&prefix) {
				return Err(SchemaError::AmbiguousPrefix {
					prefix,
					first: first.clone(),
					second: type_name.clone(),
				});
			}
			by_prefix.insert(prefix, type_name.clone());

			debug!(
				type_name = %type_name,
				prefix = root.declaration().prefix(),
				validate_unknown = root.validate_unknown(),
				"registered root"
			);
			roots.push(root);
		}

		Ok(MappingProvider { roots })
	}
}
