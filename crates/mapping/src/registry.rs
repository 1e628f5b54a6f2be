//! Process-scoped cache of bound mappings with atomic publication.
//!
//! # Role
//!
//! Readers load the current snapshot without locking; writers copy the
//! affected type's prefix table, insert, and publish with a CAS loop.
//!
//! # Invariants
//!
//! - Concurrent registrations are linearizable: no update is lost.
//! - Re-registering a (type, prefix) replaces the instance; readers see
//!   either the old or the new one, never a mix.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::binding::Bindings;
use crate::error::{LookupError, MappingError};
use crate::instance::{ConfigMapping, MappingInstance};
use crate::schema::{TypeDescriptor, TypeName};

/// Cross-cutting check run on every successful lookup.
///
/// Returns the violated constraints, if any.
pub trait MappingValidator: Send + Sync {
	fn validate(&self, instance: &MappingInstance) -> Result<(), Vec<String>>;
}

impl<F> MappingValidator for F
where
	F: Fn(&MappingInstance) -> Result<(), Vec<String>> + Send + Sync,
{
	fn validate(&self, instance: &MappingInstance) -> Result<(), Vec<String>> {
		self(instance)
	}
}

type PrefixTable = FxHashMap<Box<str>, MappingInstance>;

#[derive(Default)]
struct Snapshot {
	by_type: FxHashMap<TypeName, Arc<PrefixTable>>,
}

/// Concurrent (type, prefix) → [`MappingInstance`] map.
#[derive(Default)]
pub struct MappingRegistry {
	snap: ArcSwap<Snapshot>,
	validators: Vec<Arc<dyn MappingValidator>>,
}

impl MappingRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a validator consulted by every lookup.
	pub fn with_validator(mut self, validator: impl MappingValidator + 'static) -> Self {
		self.validators.push(Arc::new(validator));
		self
	}

	/// Publishes `instance` under its (type, prefix), replacing any earlier one.
	pub fn register(&self, instance: MappingInstance) {
		loop {
			let old = self.snap.load_full();
			let type_name = instance.type_name().clone();

			let mut table: PrefixTable = old
				.by_type
				.get(&type_name)
				.map(|t| (**t).clone())
				.unwrap_or_default();
			let replaced = table
				.insert(instance.prefix().into(), instance.clone())
				.is_some();

			let mut by_type = old.by_type.clone();
			by_type.insert(type_name.clone(), Arc::new(table));
			let new_snap = Arc::new(Snapshot { by_type });

			let prev = self.snap.compare_and_swap(&old, new_snap);
			if Arc::ptr_eq(&prev, &old) {
				debug!(
					type_name = %type_name,
					prefix = instance.prefix(),
					replaced,
					"registered mapping"
				);
				return;
			}
		}
	}

	pub fn register_all(&self, bindings: Bindings) {
		for (_, instance) in bindings {
			self.register(instance);
		}
	}

	/// Looks up `descriptor` at its declared default prefix.
	///
	/// # Errors
	///
	/// See [`MappingRegistry::get_prefixed`].
	pub fn get(&self, descriptor: &TypeDescriptor) -> Result<MappingInstance, LookupError> {
		self.get_prefixed(&descriptor.name, &descriptor.default_prefix)
	}

	/// Looks up `type_name` at `prefix` and runs the registry's validators.
	///
	/// # Errors
	///
	/// [`LookupError::MappingNotFound`] if the type was never registered,
	/// [`LookupError::MappingPrefixNotFound`] if it was, but not at `prefix`,
	/// [`LookupError::ConstraintViolation`] if a validator rejects the instance.
	pub fn get_prefixed(
		&self,
		type_name: &TypeName,
		prefix: &str,
	) -> Result<MappingInstance, LookupError> {
		let snap = self.snap.load();
		let table = snap
			.by_type
			.get(type_name)
			.ok_or_else(|| LookupError::MappingNotFound {
				type_name: type_name.clone(),
			})?;
		let instance = table
			.get(prefix)
			.cloned()
			.ok_or_else(|| LookupError::MappingPrefixNotFound {
				type_name: type_name.clone(),
				prefix: prefix.to_string(),
			})?;

		let violations: Vec<String> = self
			.validators
			.iter()
			.filter_map(|v| v.validate(&instance).err())
			.flatten()
			.collect();
		if !violations.is_empty() {
			return Err(LookupError::ConstraintViolation {
				type_name: type_name.clone(),
				prefix: prefix.to_string(),
				violations,
			});
		}
		Ok(instance)
	}

	/// Extracts `T` from its mapping at the declared default prefix.
	pub fn mapping<T: ConfigMapping>(&self) -> Result<T, MappingError> {
		let descriptor = T::descriptor();
		self.mapping_prefixed(&descriptor.default_prefix)
	}

	pub fn mapping_prefixed<T: ConfigMapping>(&self, prefix: &str) -> Result<T, MappingError> {
		let descriptor = T::descriptor();
		let instance = self.get_prefixed(&descriptor.name, prefix)?;
		Ok(T::from_mapping(instance.root())?)
	}

	/// Registered prefixes for `type_name`, sorted.
	pub fn prefixes(&self, type_name: &TypeName) -> Vec<String> {
		let snap = self.snap.load();
		let mut prefixes: Vec<String> = snap
			.by_type
			.get(type_name)
			.map(|t| t.keys().map(|p| p.to_string()).collect())
			.unwrap_or_default();
		prefixes.sort();
		prefixes
	}

	/// Number of registered (type, prefix) pairs.
	pub fn len(&self) -> usize {
		self.snap.load().by_type.values().map(|t| t.len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl fmt::Debug for MappingRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MappingRegistry")
			.field("mappings", &self.len())
			.field("validators", &self.validators.len())
			.finish()
	}
}
