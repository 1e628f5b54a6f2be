//! Errors raised while resolving a value through the interceptor chain.

use thiserror::Error;

/// Expression expansion failures. Any of these aborts the configuration build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
	/// `${name}` has no value and no inline default.
	#[error("property {name} referenced from {owner} has no value and no default")]
	Unresolved { name: String, owner: String },

	/// Expansion came back to a property already being expanded.
	#[error("cyclic property reference: {chain}")]
	Cyclic { chain: String },

	#[error("malformed expression in {owner} at byte {position}: {reason}")]
	Syntax {
		owner: String,
		position: usize,
		reason: &'static str,
	},
}

/// Secret handler dispatch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
	#[error("secret handler {handler:?} is not registered")]
	Unknown { handler: String },

	/// Dispatch was turned off for this configuration, or the handler is not allowed.
	#[error("secret handler {handler:?} is referenced, but secret handlers are disabled")]
	Disabled { handler: String },

	#[error("secret handler {handler:?} requires setting {setting}")]
	MissingSetting { handler: String, setting: String },

	#[error("secret handler {handler:?} failed to decode: {reason}")]
	Decode { handler: String, reason: String },
}

/// Umbrella error for the interceptor layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterceptError {
	#[error(transparent)]
	Expression(#[from] ExpressionError),

	#[error(transparent)]
	Handler(#[from] HandlerError),
}

pub type Result<T, E = InterceptError> = std::result::Result<T, E>;
