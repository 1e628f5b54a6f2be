//! Error types for building and reading a configuration.

use strata_interceptor::{HandlerError, InterceptError};
use strata_mapping::{
	AccessError, AggregateValidationError, ConversionError, LookupError, MappingError, SchemaError,
};
use thiserror::Error;

/// Errors raised by [`crate::Config`] and [`crate::ConfigBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
	/// A declared root has an invalid shape or prefix.
	#[error(transparent)]
	Schema(#[from] SchemaError),

	/// Every defect found while binding the declared roots.
	#[error(transparent)]
	Validation(#[from] AggregateValidationError),

	/// A mapping was requested that was never registered.
	#[error(transparent)]
	Lookup(#[from] LookupError),

	/// Navigation or extraction failed on a bound mapping.
	#[error(transparent)]
	Access(#[from] AccessError),

	/// Expression expansion or secret dispatch failed.
	#[error(transparent)]
	Intercept(#[from] InterceptError),

	/// A raw value did not convert to the requested type.
	#[error(transparent)]
	Conversion(#[from] ConversionError),

	/// No source has a non-empty value for the property.
	#[error("no value for property {name}")]
	NoSuchProperty {
		/// The requested property name.
		name: String,
	},
}

impl From<MappingError> for ConfigError {
	fn from(err: MappingError) -> Self {
		match err {
			MappingError::Schema(e) => Self::Schema(e),
			MappingError::Validation(e) => Self::Validation(e),
			MappingError::Lookup(e) => Self::Lookup(e),
			MappingError::Access(e) => Self::Access(e),
		}
	}
}

impl From<HandlerError> for ConfigError {
	fn from(err: HandlerError) -> Self {
		Self::Intercept(err.into())
	}
}

/// Result type for configuration operations.
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
