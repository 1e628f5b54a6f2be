//! `${...}` expansion inside resolved values.

mod parser;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use self::parser::{ParseError, Part, has_expression, parse};
use crate::chain::{ConfigValue, Interceptor, InterceptorContext};
use crate::error::{ExpressionError, HandlerError, Result};
use crate::secret::SecretKeysHandlers;

/// Runs ahead of plain interceptors so they see expanded values.
pub const EXPRESSION_PRIORITY: i32 = 600;

/// Expands `${ref}`, `${ref:default}` and `${handler::payload}` in values.
///
/// References resolve from the top of the chain, so they are themselves
/// expanded. An empty referenced value falls back to the default.
#[derive(Debug, Clone, Default)]
pub struct ExpressionInterceptor {
	handlers: Option<Arc<SecretKeysHandlers>>,
}

impl ExpressionInterceptor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Enables `${handler::payload}` dispatch.
	pub fn with_handlers(handlers: Arc<SecretKeysHandlers>) -> Self {
		Self {
			handlers: Some(handlers),
		}
	}

	fn expand(&self, context: &InterceptorContext<'_>, parts: &[Part], owner: &str) -> Result<String> {
		let mut out = String::new();
		for part in parts {
			match part {
				Part::Text(text) => out.push_str(text),
				Part::Ref { key, default } => {
					let name = self.expand(context, key, owner)?;
					match context.restart(&name)? {
						Some(found) if !found.value.is_empty() => out.push_str(&found.value),
						_ => match default {
							Some(default) => out.push_str(&self.expand(context, default, owner)?),
							None => {
								return Err(ExpressionError::Unresolved {
									name,
									owner: owner.to_string(),
								}
								.into());
							}
						},
					}
				}
				Part::Secret { handler, payload } => {
					let handlers = self.handlers.as_ref().ok_or_else(|| HandlerError::Unknown {
						handler: handler.clone(),
					})?;
					out.push_str(&handlers.decode(handler, payload)?);
				}
			}
		}
		Ok(out)
	}
}

impl Interceptor for ExpressionInterceptor {
	fn name(&self) -> &str {
		"expression"
	}

	fn priority(&self) -> i32 {
		EXPRESSION_PRIORITY
	}

	fn intercept(&self, context: &InterceptorContext<'_>, name: &str) -> Result<Option<ConfigValue>> {
		let Some(value) = context.proceed(name)? else {
			return Ok(None);
		};
		if !has_expression(&value.value) && !value.value.contains("\\$") {
			return Ok(Some(value));
		}

		let parts = parse(&value.value).map_err(|err| ExpressionError::Syntax {
			owner: name.to_string(),
			position: err.position,
			reason: err.reason,
		})?;
		let expanded = self.expand(context, &parts, name)?;
		Ok(Some(value.with_value(expanded)))
	}
}
