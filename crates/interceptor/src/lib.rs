//! Value resolution for strata.
//!
//! Every lookup runs through an [`InterceptorChain`] sorted by descending
//! priority and ending at the raw sources. The built-in
//! [`ExpressionInterceptor`] expands `${ref}`, `${ref:default}` and
//! `${handler::payload}`; the last form is routed to a registered
//! [`SecretKeysHandler`] through [`SecretKeysHandlers`].
//!
//! ```
//! use strata_interceptor::{ConfigValue, ExpressionInterceptor, InterceptorChain};
//!
//! let chain = InterceptorChain::new().with(ExpressionInterceptor::new());
//! let source = |name: &str| match name {
//! 	"greeting" => Some(ConfigValue::new(name, "hello ${who:world}", "inline", 100)),
//! 	_ => None,
//! };
//! let value = chain.resolve(&source, "greeting").unwrap().unwrap();
//! assert_eq!(value.value, "hello world");
//! ```

pub mod chain;
pub mod error;
pub mod expression;
pub mod secret;

pub use chain::{ConfigValue, DEFAULT_PRIORITY, Interceptor, InterceptorChain, InterceptorContext, ValueSource};
pub use error::{ExpressionError, HandlerError, InterceptError, Result};
pub use expression::{EXPRESSION_PRIORITY, ExpressionInterceptor};
pub use secret::{
	HANDLER_SETTINGS_PREFIX, HANDLERS_KEY, HandlerMode, HandlerSettings, SecretKeysHandler,
	SecretKeysHandlerFactory, SecretKeysHandlers,
};
