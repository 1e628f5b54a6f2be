//! Secret handler dispatch for `${handler::payload}` expressions.
//!
//! Handlers decode payloads; this crate only routes to them. Factories build
//! handlers at configuration build time from settings read under
//! [`HANDLER_SETTINGS_PREFIX`]`<id>.`. Dispatch can be limited or turned off
//! for a whole configuration with [`HANDLERS_KEY`].

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::HandlerError;

/// Selects which handlers may be dispatched to: `all`, `none`, or a comma list of ids.
pub const HANDLERS_KEY: &str = "strata.config.secret-handlers";

/// Settings for handler `<id>` live under `strata.config.secret-handler.<id>.`.
pub const HANDLER_SETTINGS_PREFIX: &str = "strata.config.secret-handler.";

/// Decodes secret payloads for one handler id.
pub trait SecretKeysHandler: Send + Sync + fmt::Debug {
	fn id(&self) -> &str;

	/// Returns the plaintext for `payload`.
	fn decode(&self, payload: &str) -> Result<String, HandlerError>;
}

/// Builds a handler from its settings.
pub trait SecretKeysHandlerFactory: Send + Sync + fmt::Debug {
	fn id(&self) -> &str;

	/// # Errors
	///
	/// Typically [`HandlerError::MissingSetting`] when key material is absent.
	fn create(&self, settings: &HandlerSettings) -> Result<Arc<dyn SecretKeysHandler>, HandlerError>;
}

/// Settings for one handler, keyed by the name after its id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSettings {
	handler: String,
	values: FxHashMap<String, String>,
}

impl HandlerSettings {
	pub fn new(handler: impl Into<String>) -> Self {
		Self {
			handler: handler.into(),
			values: FxHashMap::default(),
		}
	}

	/// Picks out `strata.config.secret-handler.<handler>.*` from `properties`.
	pub fn from_properties<'a, I>(handler: &str, properties: I) -> Self
	where
		I: IntoIterator<Item = (&'a str, &'a str)>,
	{
		let prefix = format!("{HANDLER_SETTINGS_PREFIX}{handler}.");
		let values = properties
			.into_iter()
			.filter_map(|(name, value)| {
				let setting = name.strip_prefix(&prefix)?;
				(!setting.is_empty()).then(|| (setting.to_string(), value.to_string()))
			})
			.collect();
		Self {
			handler: handler.to_string(),
			values,
		}
	}

	pub fn with(mut self, setting: impl Into<String>, value: impl Into<String>) -> Self {
		self.values.insert(setting.into(), value.into());
		self
	}

	pub fn handler(&self) -> &str {
		&self.handler
	}

	pub fn get(&self, setting: &str) -> Option<&str> {
		self.values
			.get(setting)
			.map(String::as_str)
			.filter(|v| !v.is_empty())
	}

	/// # Errors
	///
	/// [`HandlerError::MissingSetting`] if the setting is absent or empty.
	pub fn require(&self, setting: &str) -> Result<&str, HandlerError> {
		self.get(setting).ok_or_else(|| HandlerError::MissingSetting {
			handler: self.handler.clone(),
			setting: format!("{HANDLER_SETTINGS_PREFIX}{}.{setting}", self.handler),
		})
	}
}

/// Which handlers may be dispatched to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HandlerMode {
	#[default]
	All,
	/// The explicit opt-out: no dispatch, no factory runs.
	Disabled,
	Only(Vec<String>),
}

impl HandlerMode {
	/// Parses the value of [`HANDLERS_KEY`]. Blank means `all`.
	pub fn parse(value: &str) -> Self {
		let value = value.trim();
		if value.is_empty() || value.eq_ignore_ascii_case("all") {
			return HandlerMode::All;
		}
		if value.eq_ignore_ascii_case("none") {
			return HandlerMode::Disabled;
		}
		HandlerMode::Only(
			value
				.split(',')
				.map(str::trim)
				.filter(|id| !id.is_empty())
				.map(str::to_string)
				.collect(),
		)
	}

	pub fn allows(&self, id: &str) -> bool {
		match self {
			HandlerMode::All => true,
			HandlerMode::Disabled => false,
			HandlerMode::Only(ids) => ids.iter().any(|i| i == id),
		}
	}
}

/// Handlers available to one configuration, with its dispatch mode.
#[derive(Clone, Default)]
pub struct SecretKeysHandlers {
	mode: HandlerMode,
	handlers: FxHashMap<String, Arc<dyn SecretKeysHandler>>,
}

impl SecretKeysHandlers {
	pub fn new(mode: HandlerMode) -> Self {
		Self {
			mode,
			handlers: FxHashMap::default(),
		}
	}

	/// Collects ready-made handlers and instantiates factories allowed by `mode`.
	///
	/// With [`HandlerMode::Disabled`] no factory runs, so missing key material
	/// does not fail the build.
	///
	/// # Errors
	///
	/// The first factory failure.
	pub fn build(
		mode: HandlerMode,
		handlers: impl IntoIterator<Item = Arc<dyn SecretKeysHandler>>,
		factories: &[Arc<dyn SecretKeysHandlerFactory>],
		settings: impl Fn(&str) -> HandlerSettings,
	) -> Result<Self, HandlerError> {
		let mut built = Self::new(mode);
		if built.mode == HandlerMode::Disabled {
			debug!("secret handlers disabled");
			return Ok(built);
		}
		for handler in handlers {
			built.insert(handler);
		}
		for factory in factories {
			if !built.mode.allows(factory.id()) {
				continue;
			}
			let handler = factory.create(&settings(factory.id()))?;
			built.insert(handler);
		}
		debug!(handlers = built.handlers.len(), "secret handlers ready");
		Ok(built)
	}

	pub fn insert(&mut self, handler: Arc<dyn SecretKeysHandler>) {
		self.handlers.insert(handler.id().to_string(), handler);
	}

	pub fn mode(&self) -> &HandlerMode {
		&self.mode
	}

	pub fn contains(&self, id: &str) -> bool {
		self.handlers.contains_key(id)
	}

	/// Routes `payload` to handler `id`.
	///
	/// # Errors
	///
	/// [`HandlerError::Disabled`] if the mode excludes `id`,
	/// [`HandlerError::Unknown`] if no such handler was registered, or the
	/// handler's own decode failure.
	pub fn decode(&self, id: &str, payload: &str) -> Result<String, HandlerError> {
		if !self.mode.allows(id) {
			return Err(HandlerError::Disabled {
				handler: id.to_string(),
			});
		}
		let handler = self.handlers.get(id).ok_or_else(|| HandlerError::Unknown {
			handler: id.to_string(),
		})?;
		trace!(handler = id, "dispatching secret");
		handler.decode(payload)
	}
}

impl fmt::Debug for SecretKeysHandlers {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
		ids.sort_unstable();
		f.debug_struct("SecretKeysHandlers")
			.field("mode", &self.mode)
			.field("handlers", &ids)
			.finish()
	}
}
