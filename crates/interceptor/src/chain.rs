//! Ordered interceptor chain ending at the raw value sources.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::error::{ExpressionError, Result};

/// Priority given to interceptors that do not declare one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// A resolved value with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
	pub name: String,
	pub value: String,
	/// Name of the source that supplied the raw value.
	pub source: String,
	/// Ordinal of that source; higher overrides lower.
	pub ordinal: i32,
}

impl ConfigValue {
	pub fn new(
		name: impl Into<String>,
		value: impl Into<String>,
		source: impl Into<String>,
		ordinal: i32,
	) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			source: source.into(),
			ordinal,
		}
	}

	/// Same provenance, new value.
	pub fn with_value(mut self, value: impl Into<String>) -> Self {
		self.value = value.into();
		self
	}
}

/// Raw lookup at the end of the chain.
pub trait ValueSource {
	fn lookup(&self, name: &str) -> Option<ConfigValue>;
}

impl<F> ValueSource for F
where
	F: Fn(&str) -> Option<ConfigValue>,
{
	fn lookup(&self, name: &str) -> Option<ConfigValue> {
		self(name)
	}
}

/// One step in value resolution.
///
/// Implementations usually call [`InterceptorContext::proceed`] and adjust
/// what comes back.
pub trait Interceptor: Send + Sync + fmt::Debug {
	fn name(&self) -> &str;

	/// Higher priorities run first.
	fn priority(&self) -> i32 {
		DEFAULT_PRIORITY
	}

	fn intercept(&self, context: &InterceptorContext<'_>, name: &str) -> Result<Option<ConfigValue>>;
}

/// Interceptors sorted by descending priority; equal priorities keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
	interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
		let priority = interceptor.priority();
		let at = self
			.interceptors
			.iter()
			.position(|i| i.priority() < priority)
			.unwrap_or(self.interceptors.len());
		self.interceptors.insert(at, interceptor);
	}

	pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
		self.push(Arc::new(interceptor));
		self
	}

	pub fn len(&self) -> usize {
		self.interceptors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.interceptors.is_empty()
	}

	/// Interceptor names in execution order.
	pub fn names(&self) -> Vec<&str> {
		self.interceptors.iter().map(|i| i.name()).collect()
	}

	/// Resolves `name` through every interceptor, ending at `source`.
	///
	/// # Errors
	///
	/// Propagates the first interceptor failure; resolution stops there.
	pub fn resolve(&self, source: &dyn ValueSource, name: &str) -> Result<Option<ConfigValue>> {
		let resolving = RefCell::new(vec![name.to_string()]);
		let context = InterceptorContext {
			chain: self,
			source,
			position: 0,
			resolving: &resolving,
		};
		context.proceed(name)
	}
}

/// Position of one resolution within the chain.
#[derive(Clone, Copy)]
pub struct InterceptorContext<'a> {
	chain: &'a InterceptorChain,
	source: &'a dyn ValueSource,
	position: usize,
	/// Names being expanded, outermost first.
	resolving: &'a RefCell<Vec<String>>,
}

impl InterceptorContext<'_> {
	/// Hands `name` to the next interceptor, or to the sources at the end.
	pub fn proceed(&self, name: &str) -> Result<Option<ConfigValue>> {
		match self.chain.interceptors.get(self.position) {
			Some(next) => {
				let context = InterceptorContext {
					position: self.position + 1,
					..*self
				};
				next.intercept(&context, name)
			}
			None => Ok(self.source.lookup(name)),
		}
	}

	/// Resolves `name` from the top of the chain, as a nested lookup.
	///
	/// # Errors
	///
	/// [`ExpressionError::Cyclic`] if `name` is already being resolved further
	/// up this lookup.
	pub fn restart(&self, name: &str) -> Result<Option<ConfigValue>> {
		{
			let resolving = self.resolving.borrow();
			if resolving.iter().any(|n| n == name) {
				let mut chain = resolving.join(" -> ");
				chain.push_str(" -> ");
				chain.push_str(name);
				return Err(ExpressionError::Cyclic { chain }.into());
			}
		}

		self.resolving.borrow_mut().push(name.to_string());
		let context = InterceptorContext {
			position: 0,
			..*self
		};
		let result = context.proceed(name);
		self.resolving.borrow_mut().pop();
		result
	}

	/// Names being resolved, outermost first.
	pub fn resolving(&self) -> Vec<String> {
		self.resolving.borrow().clone()
	}
}

impl fmt::Debug for InterceptorContext<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InterceptorContext")
			.field("position", &self.position)
			.field("resolving", &self.resolving.borrow())
			.finish()
	}
}
