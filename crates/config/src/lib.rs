//! Configuration facade for strata.
//!
//! A [`Config`] combines ordered [`ConfigSource`]s, an interceptor chain that
//! expands expressions and dispatches secrets, and a registry of typed
//! mappings bound from declared roots.
//!
//! # Engine switches
//!
//! The engine reads its own settings from the configuration it binds:
//!
//! - `strata.config.mapping.validate-unknown` - reject unknown keys under a
//!   mapping's prefix (default `true`)
//! - `strata.config.secret-handlers` - `all`, `none`, or a comma list of
//!   handler ids allowed in `${handler::payload}`
//! - `strata.config.secret-handler.<id>.<setting>` - settings handed to the
//!   factory for handler `<id>`
//!
//! # Example
//!
//! ```
//! use strata_config::{Config, MapSource};
//! use strata_mapping::{RootDeclaration, Shape, TypeDescriptor};
//!
//! let server = TypeDescriptor::new("Server")
//! 	.prefix("server")
//! 	.field("host", Shape::of::<String>())
//! 	.field("port", Shape::of::<u16>().with_default("8080"));
//!
//! let config = Config::builder()
//! 	.with_source(
//! 		MapSource::new("inline")
//! 			.with("server.host", "${host:localhost}")
//! 			.with("log.level", "debug"),
//! 	)
//! 	.add_default_interceptors()
//! 	.with_mapping_root(RootDeclaration::at_default_prefix(server.clone()))
//! 	.build()
//! 	.unwrap();
//!
//! let mapping = config.get_mapping(&server).unwrap();
//! assert_eq!(mapping.get::<String>("host").unwrap(), "localhost");
//! assert_eq!(mapping.get::<u16>("port").unwrap(), 8080);
//! assert_eq!(config.get_raw_value("log.level").unwrap(), "debug");
//! ```

mod builder;
pub mod error;
pub mod mappings;
pub mod source;

use std::sync::Arc;

use indexmap::IndexMap;
pub use strata_interceptor::ConfigValue;
use strata_interceptor::InterceptorChain;
use strata_mapping::{
	ConfigMapping, ConversionError, Converter, FromValue, LeafDescriptor, MappingInstance,
	MappingProvider, MappingRegistry, RootDeclaration, SchemaBuilder, TypeDescriptor, TypeName,
};

pub use builder::ConfigBuilder;
pub use error::{ConfigError, Result};
pub use mappings::{RESERVED_PREFIX, VALIDATE_UNKNOWN_KEY, register_mappings, register_properties};
pub use source::{ConfigSource, DEFAULT_ORDINAL, MapSource, Sources};

/// A built configuration: resolved values and bound mappings.
#[derive(Debug)]
pub struct Config {
	sources: Sources,
	chain: InterceptorChain,
	schemas: Arc<SchemaBuilder>,
	registry: MappingRegistry,
	/// Roots declared on the builder.
	roots: MappingProvider,
	validate_unknown: bool,
}

impl Config {
	pub fn builder() -> ConfigBuilder {
		ConfigBuilder::new()
	}

	pub fn sources(&self) -> &Sources {
		&self.sources
	}

	/// Every property name known to some source, sorted.
	pub fn property_names(&self) -> Vec<String> {
		self.sources.property_names().into_iter().collect()
	}

	/// Resolves `name` through the interceptor chain.
	///
	/// # Errors
	///
	/// The first interceptor failure.
	pub fn get_config_value(&self, name: &str) -> Result<Option<ConfigValue>> {
		Ok(self.chain.resolve(&self.sources, name)?)
	}

	/// The resolved string value of `name`.
	///
	/// # Errors
	///
	/// [`ConfigError::NoSuchProperty`] if the value is missing or empty, or
	/// the first interceptor failure.
	pub fn get_raw_value(&self, name: &str) -> Result<String> {
		self.get_optional_raw_value(name)?
			.ok_or_else(|| ConfigError::NoSuchProperty {
				name: name.to_string(),
			})
	}

	/// Like [`Config::get_raw_value`], with `None` for missing or empty values.
	///
	/// # Errors
	///
	/// The first interceptor failure.
	pub fn get_optional_raw_value(&self, name: &str) -> Result<Option<String>> {
		Ok(self
			.get_config_value(name)?
			.map(|v| v.value)
			.filter(|v| !v.is_empty()))
	}

	/// Resolves and converts `name`.
	///
	/// # Errors
	///
	/// [`ConfigError::NoSuchProperty`], a [`ConversionError`], or the first
	/// interceptor failure.
	pub fn get_value<T: FromValue>(&self, name: &str) -> Result<T> {
		let raw = self.get_raw_value(name)?;
		convert(name, raw)
	}

	/// # Errors
	///
	/// A [`ConversionError`] or the first interceptor failure.
	pub fn get_optional_value<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
		self.get_optional_raw_value(name)?
			.map(|raw| convert(name, raw))
			.transpose()
	}

	/// Whether unknown keys fail [`register_mappings`].
	pub fn validate_unknown(&self) -> bool {
		self.validate_unknown
	}

	pub fn mappings(&self) -> &MappingRegistry {
		&self.registry
	}

	pub(crate) fn schemas(&self) -> &Arc<SchemaBuilder> {
		&self.schemas
	}

	/// The mapping of `descriptor` at its declared default prefix.
	///
	/// # Errors
	///
	/// [`ConfigError::Lookup`] if it was never registered or fails a validator.
	pub fn get_mapping(&self, descriptor: &TypeDescriptor) -> Result<MappingInstance> {
		Ok(self.registry.get(descriptor)?)
	}

	/// # Errors
	///
	/// See [`Config::get_mapping`].
	pub fn get_mapping_prefixed(&self, type_name: &TypeName, prefix: &str) -> Result<MappingInstance> {
		Ok(self.registry.get_prefixed(type_name, prefix)?)
	}

	/// Extracts `T` from its mapping at the declared default prefix.
	///
	/// # Errors
	///
	/// A lookup failure or the extraction's [`ConfigError::Access`].
	pub fn mapping<T: ConfigMapping>(&self) -> Result<T> {
		Ok(self.registry.mapping::<T>()?)
	}

	/// # Errors
	///
	/// See [`Config::mapping`].
	pub fn mapping_prefixed<T: ConfigMapping>(&self, prefix: &str) -> Result<T> {
		Ok(self.registry.mapping_prefixed::<T>(prefix)?)
	}

	/// Flattened leaves of every root declared on the builder.
	pub fn properties(&self) -> IndexMap<String, LeafDescriptor> {
		self.roots.properties()
	}

	/// Flattened leaves of `root`.
	///
	/// # Errors
	///
	/// [`ConfigError::Schema`] if `root` does not compile.
	pub fn get_properties(&self, root: &RootDeclaration) -> Result<IndexMap<String, LeafDescriptor>> {
		Ok(mappings::get_properties(&self.schemas, root)?)
	}

	/// The property names in this configuration that `root` recognizes.
	///
	/// # Errors
	///
	/// [`ConfigError::Schema`] if `root` does not compile.
	pub fn mapped_properties(&self, root: &RootDeclaration) -> Result<Vec<String>> {
		Ok(mappings::mapped_properties(&self.schemas, root, self.property_names())?)
	}
}

fn convert<T: FromValue>(name: &str, raw: String) -> Result<T> {
	let converter = T::converter();
	let fail = |reason: String| ConversionError {
		path: name.to_string(),
		raw: raw.clone(),
		target: converter.target().to_string(),
		reason,
	};
	let value = converter.convert(&raw).map_err(&fail)?;
	match T::from_value(&value) {
		Some(v) => Ok(v),
		None => Err(fail(format!("{value} does not fit {}", std::any::type_name::<T>())).into()),
	}
}
