//! Raw property sources and their precedence.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use strata_interceptor::{ConfigValue, ValueSource};

/// Ordinal given to sources that do not declare one.
pub const DEFAULT_ORDINAL: i32 = 100;

/// A flat set of string properties.
pub trait ConfigSource: Send + Sync + fmt::Debug {
	fn name(&self) -> &str;

	/// Higher ordinals override lower ones for the same property.
	fn ordinal(&self) -> i32 {
		DEFAULT_ORDINAL
	}

	fn property_names(&self) -> Vec<String>;

	fn value(&self, name: &str) -> Option<String>;
}

/// In-memory source.
#[derive(Debug, Clone)]
pub struct MapSource {
	name: String,
	ordinal: i32,
	values: IndexMap<String, String>,
}

impl MapSource {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			ordinal: DEFAULT_ORDINAL,
			values: IndexMap::new(),
		}
	}

	pub fn with_ordinal(mut self, ordinal: i32) -> Self {
		self.ordinal = ordinal;
		self
	}

	pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.insert(name, value);
		self
	}

	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.values.insert(name.into(), value.into());
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

impl<K, V> Extend<(K, V)> for MapSource
where
	K: Into<String>,
	V: Into<String>,
{
	fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
		for (name, value) in iter {
			self.insert(name, value);
		}
	}
}

impl ConfigSource for MapSource {
	fn name(&self) -> &str {
		&self.name
	}

	fn ordinal(&self) -> i32 {
		self.ordinal
	}

	fn property_names(&self) -> Vec<String> {
		self.values.keys().cloned().collect()
	}

	fn value(&self, name: &str) -> Option<String> {
		self.values.get(name).cloned()
	}
}

/// Sources sorted by descending ordinal; equal ordinals keep insertion order.
///
/// The first source holding a name supplies its value, even when that value
/// is empty. Consumers treat empty values as absent.
#[derive(Debug, Clone, Default)]
pub struct Sources {
	sources: Vec<Arc<dyn ConfigSource>>,
}

impl Sources {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, source: Arc<dyn ConfigSource>) {
		let ordinal = source.ordinal();
		let at = self
			.sources
			.iter()
			.position(|s| s.ordinal() < ordinal)
			.unwrap_or(self.sources.len());
		self.sources.insert(at, source);
	}

	pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ConfigSource>> {
		self.sources.iter()
	}

	pub fn len(&self) -> usize {
		self.sources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	/// Every property name any source knows, sorted.
	pub fn property_names(&self) -> BTreeSet<String> {
		self.sources
			.iter()
			.flat_map(|s| s.property_names())
			.collect()
	}

	/// The winning raw value for `name`, with its provenance.
	pub fn winning(&self, name: &str) -> Option<ConfigValue> {
		self.sources.iter().find_map(|source| {
			source
				.value(name)
				.map(|value| ConfigValue::new(name, value, source.name(), source.ordinal()))
		})
	}
}

impl ValueSource for Sources {
	fn lookup(&self, name: &str) -> Option<ConfigValue> {
		self.winning(name)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn sources() -> Sources {
		let mut sources = Sources::new();
		sources.push(Arc::new(MapSource::new("defaults").with_ordinal(10).with("a", "low").with("b", "only")));
		sources.push(Arc::new(MapSource::new("env").with_ordinal(300).with("a", "high")));
		sources.push(Arc::new(MapSource::new("file").with_ordinal(300).with("a", "tied")));
		sources
	}

	#[test]
	fn test_higher_ordinal_wins() {
		let value = sources().winning("a").unwrap();
		assert_eq!(value, ConfigValue::new("a", "high", "env", 300));
	}

	#[test]
	fn test_lower_sources_fill_gaps() {
		let value = sources().winning("b").unwrap();
		assert_eq!(value.source, "defaults");
		assert_eq!(sources().winning("c"), None);
	}

	#[test]
	fn test_property_names_are_merged_and_sorted() {
		let names: Vec<String> = sources().property_names().into_iter().collect();
		assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
	}

	#[test]
	fn test_order_is_stable_for_equal_ordinals() {
		let sources = sources();
		let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
		assert_eq!(names, vec!["env", "file", "defaults"]);
	}
}
