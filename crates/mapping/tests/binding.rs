//! End-to-end binding behavior across roots, collections and validation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use strata_mapping::{
	AccessError, Converter, Defect, MappingProvider, RawProperty, RootDeclaration, Shape,
	TypeDescriptor, TypeName, Value,
};

fn raw(pairs: &[(&str, &str)]) -> Vec<RawProperty> {
	pairs
		.iter()
		.map(|(k, v)| RawProperty::new(*k, *v, 100))
		.collect()
}

fn server() -> TypeDescriptor {
	TypeDescriptor::new("Server")
		.prefix("server")
		.field("host", Shape::of::<String>())
		.field("port", Shape::of::<u16>())
		.field("aliases", Shape::list(Shape::of::<String>()).with_default(""))
}

#[test]
fn test_leaf_value_matches_raw_conversion() {
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(server()))
		.build()
		.unwrap();
	let bindings = provider
		.map(raw(&[("server.host", "example.org"), ("server.port", " 8443 ")]))
		.unwrap();
	let instance = bindings.get(&TypeName::from("Server"), "server").unwrap();

	assert_eq!(instance.get::<String>("host").unwrap(), "example.org");
	assert_eq!(instance.get::<u16>("port").unwrap(), 8443);
}

#[test]
fn test_narrow_leaf_out_of_range_is_a_defect() {
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(server()))
		.build()
		.unwrap();
	let err = provider
		.map(raw(&[("server.host", "h"), ("server.port", "70000")]))
		.unwrap_err();

	let [Defect::Conversion(conversion)] = err.defects() else {
		panic!("expected one conversion defect, got {err}");
	};
	assert_eq!(conversion.path, "server.port");
	assert_eq!(conversion.raw, "70000");
	assert_eq!(conversion.target, "u16");
}

#[test]
fn test_reading_a_narrower_type_reports_range() {
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(server()))
		.build()
		.unwrap();
	let bindings = provider
		.map(raw(&[("server.host", "h"), ("server.port", "300")]))
		.unwrap();
	let instance = bindings.get(&"Server".into(), "server").unwrap();

	assert_eq!(
		instance.get::<u8>("port").unwrap_err(),
		AccessError::OutOfRange {
			path: "server.port".into(),
			value: "300".into(),
			expected: "u8",
		}
	);
	assert!(matches!(
		instance.get::<bool>("host"),
		Err(AccessError::TypeMismatch { actual: "string", .. })
	));
}

#[test]
fn test_longest_prefix_wins() {
	let outer = TypeDescriptor::new("Outer").field("b", Shape::optional(Shape::of::<String>()));
	let inner = TypeDescriptor::new("Inner").field("c", Shape::of::<String>());
	let provider = MappingProvider::builder()
		.root(RootDeclaration::new(outer, "a"))
		.root(RootDeclaration::new(inner, "a.b"))
		.build()
		.unwrap();

	let bindings = provider.map(raw(&[("a.b.c", "deep")])).unwrap();
	let inner = bindings.get(&"Inner".into(), "a.b").unwrap();
	let outer = bindings.get(&"Outer".into(), "a").unwrap();

	assert_eq!(inner.get::<String>("c").unwrap(), "deep");
	assert!(!outer.node("b").unwrap().is_present());
}

#[test]
fn test_different_types_at_same_prefix_rejected() {
	let err = MappingProvider::builder()
		.root(RootDeclaration::new(TypeDescriptor::new("A"), "x"))
		.root(RootDeclaration::new(TypeDescriptor::new("B"), "x"))
		.build()
		.unwrap_err();
	assert!(err.to_string().contains("claimed by both A and B"), "{err}");
}

#[test]
fn test_same_root_declared_twice_is_kept_once() {
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(server()))
		.root(RootDeclaration::at_default_prefix(server()))
		.build()
		.unwrap();
	assert_eq!(provider.roots().len(), 1);
}

#[test]
fn test_sparse_indices_are_ascending() {
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(server()))
		.build()
		.unwrap();
	let bindings = provider
		.map(raw(&[
			("server.host", "h"),
			("server.port", "1"),
			("server.aliases[7]", "z"),
			("server.aliases[2]", "y"),
		]))
		.unwrap();
	let instance = bindings.get(&"Server".into(), "server").unwrap();
	let aliases = instance.node("aliases").unwrap();

	assert_eq!(aliases.list::<String>().unwrap(), ["y", "z"]);
	assert_eq!(aliases.index(1).unwrap().path(), "server.aliases[7]");
	assert_eq!(instance.get::<String>("aliases[7]").unwrap(), "z");
	assert!(matches!(
		instance.get::<String>("aliases[0]"),
		Err(AccessError::IndexOutOfRange { index: 0, .. })
	));
}

#[test]
fn test_every_leaf_path_navigates_back_to_its_leaf() {
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(server()))
		.build()
		.unwrap();
	let bindings = provider
		.map(raw(&[
			("server.host", "h"),
			("server.port", "1"),
			("server.aliases[5]", "x"),
			("server.aliases[7]", "y"),
		]))
		.unwrap();
	let instance = bindings.get(&"Server".into(), "server").unwrap();

	let leaves: Vec<(&str, Option<&str>)> = instance.raw_values().collect();
	assert_eq!(leaves.len(), 4);
	for (path, raw) in leaves {
		let relative = path.strip_prefix("server.").unwrap();
		let node = instance.node(relative).unwrap();
		assert_eq!(node.path(), path);
		assert_eq!(node.raw(), raw);
	}
}

#[test]
fn test_unknown_key_reported_with_suggestion() {
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(server()))
		.build()
		.unwrap();
	let err = provider
		.map(raw(&[
			("server.host", "h"),
			("server.port", "1"),
			("server.hots", "typo"),
			("client.timeout", "ignored"),
		]))
		.unwrap_err();

	assert_eq!(
		err.defects(),
		[Defect::UnknownProperty {
			name: "server.hots".into(),
			suggestion: Some("server.host".into()),
		}]
	);
}

#[test]
fn test_unknown_key_allowed_when_validation_off() {
	let provider = MappingProvider::builder()
		.validate_unknown(false)
		.root(RootDeclaration::at_default_prefix(server()))
		.build()
		.unwrap();
	let bindings = provider
		.map(raw(&[
			("server.host", "h"),
			("server.port", "1"),
			("server.typo", "x"),
		]))
		.unwrap();
	assert_eq!(bindings.len(), 1);
}

#[test]
fn test_every_missing_leaf_in_one_error() {
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(server()))
		.root(RootDeclaration::new(server(), "backup"))
		.build()
		.unwrap();
	let err = provider.map(raw(&[("backup.port", "x")])).unwrap_err();

	let paths: Vec<&str> = err.defects().iter().map(Defect::path).collect();
	assert_eq!(paths, ["backup.host", "backup.port", "server.host", "server.port"]);
	assert!(matches!(err.defects()[1], Defect::Conversion(_)));
	assert!(err.to_string().starts_with("configuration validation failed with 4 problem(s):"));
}

#[derive(Debug)]
struct Counting(Arc<AtomicUsize>);

impl Converter for Counting {
	fn target(&self) -> &str {
		"counted"
	}

	fn convert(&self, raw: &str) -> Result<Value, String> {
		self.0.fetch_add(1, Ordering::SeqCst);
		Ok(Value::Text(raw.to_uppercase()))
	}
}

#[test]
fn test_leaf_converts_once() {
	let calls = Arc::new(AtomicUsize::new(0));
	let descriptor = TypeDescriptor::new("Counted")
		.prefix("c")
		.field("value", Shape::leaf(Counting(calls.clone())));
	let provider = MappingProvider::builder()
		.validate_unknown(false)
		.root(RootDeclaration::at_default_prefix(descriptor))
		.build()
		.unwrap();

	let bindings = provider.map(raw(&[("c.value", "abc")])).unwrap();
	let instance = bindings.get(&"Counted".into(), "c").unwrap();
	// The validation pass already forced the conversion.
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let first = instance.value("value").unwrap().clone();
	let second = instance.value("value").unwrap().clone();
	assert_eq!(first, second);
	assert_eq!(first, Value::Text("ABC".into()));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(instance.converted_leaves(), 1);
}

#[test]
fn test_concurrent_first_access_converts_once() {
	let calls = Arc::new(AtomicUsize::new(0));
	let descriptor = TypeDescriptor::new("Counted")
		.prefix("c")
		.field("value", Shape::leaf(Counting(calls.clone())));
	let provider = MappingProvider::builder()
		.root(RootDeclaration::at_default_prefix(descriptor))
		.build()
		.unwrap();
	let instance = provider
		.map(raw(&[("c.value", "abc")]))
		.unwrap()
		.into_iter()
		.next()
		.unwrap()
		.1;

	std::thread::scope(|scope| {
		for _ in 0..8 {
			let instance = instance.clone();
			scope.spawn(move || {
				assert_eq!(instance.get::<String>("value").unwrap(), "ABC");
			});
		}
	});
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

proptest! {
	#[test]
	fn prop_collection_order_is_input_independent(
		indices in proptest::collection::btree_set(0usize..64, 1..12),
		seed in any::<u64>(),
	) {
		let mut keys: Vec<(String, String)> = indices
			.iter()
			.map(|i| (format!("server.aliases[{i}]"), format!("v{i}")))
			.collect();
		// Deterministic shuffle driven by the seed.
		let len = keys.len();
		for i in 0..len {
			let j = (seed.rotate_left(i as u32) as usize) % len;
			keys.swap(i, j);
		}

		let provider = MappingProvider::builder()
			.root(RootDeclaration::at_default_prefix(server()))
			.build()
			.unwrap();
		let mut input = raw(&[("server.host", "h"), ("server.port", "1")]);
		input.extend(keys.into_iter().map(|(k, v)| RawProperty::new(k, v, 100)));
		let bindings = provider.map(input).unwrap();
		let instance = bindings.get(&"Server".into(), "server").unwrap();

		let expected: Vec<String> = indices.iter().map(|i| format!("v{i}")).collect();
		prop_assert_eq!(instance.node("aliases").unwrap().list::<String>().unwrap(), expected);
	}
}
