//! Assembling a [`Config`] from sources, interceptors and declared roots.

use std::sync::Arc;

use strata_interceptor::{
	ExpressionInterceptor, HANDLER_SETTINGS_PREFIX, HANDLERS_KEY, HandlerMode, HandlerSettings,
	Interceptor, InterceptorChain, SecretKeysHandler, SecretKeysHandlerFactory, SecretKeysHandlers,
};
use strata_mapping::{
	ConfigMapping, MappingProvider, MappingRegistry, MappingValidator, RootDeclaration,
	SchemaBuilder, TypeCatalog, TypeDescriptor,
};
use tracing::debug;

use crate::Config;
use crate::error::Result;
use crate::mappings::{self, VALIDATE_UNKNOWN_KEY};
use crate::source::{ConfigSource, Sources};

/// Builder for [`Config`].
///
/// Nothing is resolved until [`ConfigBuilder::build`], which reads the
/// engine switches from the sources, sets up secret handlers, and binds
/// every declared root in one pass.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
	sources: Vec<Arc<dyn ConfigSource>>,
	interceptors: Vec<Arc<dyn Interceptor>>,
	default_interceptors: bool,
	handlers: Vec<Arc<dyn SecretKeysHandler>>,
	factories: Vec<Arc<dyn SecretKeysHandlerFactory>>,
	catalog: TypeCatalog,
	mapping_roots: Vec<RootDeclaration>,
	properties_roots: Vec<RootDeclaration>,
	registry: MappingRegistry,
	validate_unknown: Option<bool>,
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_source(mut self, source: impl ConfigSource + 'static) -> Self {
		self.sources.push(Arc::new(source));
		self
	}

	pub fn with_sources(mut self, sources: impl IntoIterator<Item = Arc<dyn ConfigSource>>) -> Self {
		self.sources.extend(sources);
		self
	}

	pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
		self.interceptors.push(Arc::new(interceptor));
		self
	}

	/// Adds expression expansion, with dispatch to the registered secret handlers.
	pub fn add_default_interceptors(mut self) -> Self {
		self.default_interceptors = true;
		self
	}

	pub fn with_secret_handler(mut self, handler: impl SecretKeysHandler + 'static) -> Self {
		self.handlers.push(Arc::new(handler));
		self
	}

	/// Registers a factory, instantiated at build time unless handlers are disabled.
	pub fn with_secret_handler_factory(mut self, factory: impl SecretKeysHandlerFactory + 'static) -> Self {
		self.factories.push(Arc::new(factory));
		self
	}

	/// Makes `descriptor` available to named references.
	pub fn with_type(mut self, descriptor: impl Into<Arc<TypeDescriptor>>) -> Self {
		self.catalog.insert(descriptor);
		self
	}

	/// Binds `T` at its declared default prefix.
	pub fn with_mapping<T: ConfigMapping>(self) -> Self {
		self.with_mapping_root(RootDeclaration::at_default_prefix(T::descriptor()))
	}

	pub fn with_mapping_root(mut self, root: RootDeclaration) -> Self {
		self.mapping_roots.push(root);
		self
	}

	/// Binds `root` without unknown-key validation.
	pub fn with_properties_root(mut self, root: RootDeclaration) -> Self {
		self.properties_roots.push(root);
		self
	}

	/// Adds a check run on every mapping lookup.
	pub fn with_validator(mut self, validator: impl MappingValidator + 'static) -> Self {
		self.registry = self.registry.with_validator(validator);
		self
	}

	/// Overrides `strata.config.mapping.validate-unknown`.
	pub fn validate_unknown(mut self, validate: bool) -> Self {
		self.validate_unknown = Some(validate);
		self
	}

	/// Builds the configuration and binds every declared root.
	///
	/// # Errors
	///
	/// A secret handler factory missing its settings, an invalid root, the
	/// first interceptor failure while resolving a bound property, or one
	/// aggregate of every validation defect.
	pub fn build(self) -> Result<Config> {
		let mut sources = Sources::new();
		for source in self.sources {
			sources.push(source);
		}

		let mode = sources
			.winning(HANDLERS_KEY)
			.map(|v| HandlerMode::parse(&v.value))
			.unwrap_or_default();
		let settings: Vec<(String, String)> = sources
			.property_names()
			.into_iter()
			.filter(|name| name.starts_with(HANDLER_SETTINGS_PREFIX))
			.filter_map(|name| sources.winning(&name).map(|v| (name, v.value)))
			.collect();
		let handlers = SecretKeysHandlers::build(mode, self.handlers, &self.factories, |id: &str| {
			HandlerSettings::from_properties(id, settings.iter().map(|(k, v)| (k.as_str(), v.as_str())))
		})?;

		let mut chain = InterceptorChain::new();
		for interceptor in self.interceptors {
			chain.push(interceptor);
		}
		if self.default_interceptors {
			chain.push(Arc::new(ExpressionInterceptor::with_handlers(Arc::new(handlers))));
		}

		let mut config = Config {
			sources,
			chain,
			schemas: Arc::new(SchemaBuilder::new(self.catalog)),
			registry: self.registry,
			roots: MappingProvider::default(),
			validate_unknown: true,
		};
		config.validate_unknown = match self.validate_unknown {
			Some(validate) => validate,
			None => config
				.get_optional_value::<bool>(VALIDATE_UNKNOWN_KEY)?
				.unwrap_or(true),
		};

		let validate = config.validate_unknown;
		let roots = self
			.mapping_roots
			.into_iter()
			.map(|root| (root, validate))
			.chain(self.properties_roots.into_iter().map(|root| (root, false)))
			.collect();
		config.roots = mappings::bind_roots(&config, roots)?;

		debug!(
			sources = config.sources.len(),
			interceptors = config.chain.len(),
			mappings = config.registry.len(),
			validate_unknown = config.validate_unknown,
			"configuration built"
		);
		Ok(config)
	}
}
