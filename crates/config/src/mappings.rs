//! Binding declared roots against a built [`Config`].
//!
//! Only properties some root claims are resolved, so interceptors never see
//! unrelated keys. Names under the reserved `strata.config.` namespace are
//! engine switches: a root with an empty prefix does not receive them.

use indexmap::IndexMap;
use strata_mapping::{
	CompiledRoot, LeafDescriptor, MappingProvider, PropertyName, RawProperty, RootDeclaration,
	SchemaBuilder, SchemaError, query,
};
use tracing::{debug, trace};

use crate::Config;
use crate::error::Result;

/// Namespace of the engine's own switches.
pub const RESERVED_PREFIX: &str = "strata.config.";

/// Unknown-key validation for [`register_mappings`]; defaults to `true`.
pub const VALIDATE_UNKNOWN_KEY: &str = "strata.config.mapping.validate-unknown";

/// Binds `roots` against `config` and publishes them in its registry.
///
/// Unknown keys under each root's prefix are rejected unless the
/// configuration turned that off.
///
/// # Errors
///
/// A [`SchemaError`](crate::ConfigError::Schema) for bad roots, the first
/// interceptor failure, or one aggregate of every validation defect.
pub fn register_mappings<I>(config: &Config, roots: I) -> Result<()>
where
	I: IntoIterator<Item = RootDeclaration>,
{
	let validate = config.validate_unknown();
	bind_roots(config, roots.into_iter().map(|r| (r, validate)).collect())?;
	Ok(())
}

/// Like [`register_mappings`], but unknown keys are never reported.
///
/// # Errors
///
/// See [`register_mappings`].
pub fn register_properties<I>(config: &Config, roots: I) -> Result<()>
where
	I: IntoIterator<Item = RootDeclaration>,
{
	bind_roots(config, roots.into_iter().map(|r| (r, false)).collect())?;
	Ok(())
}

/// Flattened leaves of `root`, keyed by canonical path. Needs no input.
///
/// # Errors
///
/// The root's [`SchemaError`], if it does not compile.
pub fn get_properties(
	schemas: &SchemaBuilder,
	root: &RootDeclaration,
) -> Result<IndexMap<String, LeafDescriptor>, SchemaError> {
	Ok(query::properties(&compile(schemas, root)?))
}

/// The subset of `candidates` that `root`'s schema recognizes.
///
/// # Errors
///
/// The root's [`SchemaError`], if it does not compile.
pub fn mapped_properties<I, S>(
	schemas: &SchemaBuilder,
	root: &RootDeclaration,
	candidates: I,
) -> Result<Vec<String>, SchemaError>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	Ok(query::mapped_properties(&compile(schemas, root)?, candidates))
}

fn compile(schemas: &SchemaBuilder, root: &RootDeclaration) -> Result<CompiledRoot, SchemaError> {
	let tree = schemas.build(root.descriptor())?;
	CompiledRoot::new(root.clone(), tree, false)
}

/// Compiles `roots` together, binds them in one pass and registers the result.
pub(crate) fn bind_roots(config: &Config, roots: Vec<(RootDeclaration, bool)>) -> Result<MappingProvider> {
	let mut builder = MappingProvider::builder().schemas(config.schemas().clone());
	for (root, validate) in roots {
		builder = builder.root_with(root, validate);
	}
	let provider = builder.build()?;
	if provider.is_empty() {
		return Ok(provider);
	}

	let keys = claimed_properties(config, &provider)?;
	let bindings = provider.map(keys)?;
	debug!(mappings = bindings.len(), "registering mappings");
	config.mappings().register_all(bindings);
	Ok(provider)
}

/// Resolves every property a root of `provider` claims, in name order.
fn claimed_properties(config: &Config, provider: &MappingProvider) -> Result<Vec<RawProperty>> {
	let context = provider.context();
	let mut keys = Vec::new();
	for name in config.sources().property_names() {
		if !context.claims(&name) {
			continue;
		}
		if name.starts_with(RESERVED_PREFIX) && !claimed_by_prefixed_root(provider, &name) {
			trace!(key = %name, "reserved key not bound");
			continue;
		}
		let Some(value) = config.get_config_value(&name)? else {
			continue;
		};
		keys.push(RawProperty::new(name, value.value, value.ordinal));
	}
	Ok(keys)
}

fn claimed_by_prefixed_root(provider: &MappingProvider, name: &str) -> bool {
	let Ok(parsed) = PropertyName::parse(name) else {
		return false;
	};
	provider
		.roots()
		.iter()
		.any(|root| !root.prefix().is_empty() && parsed.starts_with(root.prefix().segments()))
}
