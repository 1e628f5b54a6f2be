use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pretty_assertions::assert_eq;
use rstest::rstest;
use rustc_hash::FxHashMap;

use super::*;
use crate::chain::InterceptorChain;
use crate::error::InterceptError;
use crate::secret::{HandlerMode, SecretKeysHandler};

/// Stands in for a real cipher: payloads are base64 plaintext.
#[derive(Debug)]
struct StubCipher;

impl SecretKeysHandler for StubCipher {
	fn id(&self) -> &str {
		"aes-gcm-nopadding"
	}

	fn decode(&self, payload: &str) -> std::result::Result<String, HandlerError> {
		STANDARD
			.decode(payload)
			.ok()
			.and_then(|bytes| String::from_utf8(bytes).ok())
			.ok_or_else(|| HandlerError::Decode {
				handler: self.id().to_string(),
				reason: "not valid base64 text".into(),
			})
	}
}

fn chain(mode: HandlerMode) -> InterceptorChain {
	let mut handlers = SecretKeysHandlers::new(mode);
	handlers.insert(Arc::new(StubCipher));
	InterceptorChain::new().with(ExpressionInterceptor::with_handlers(Arc::new(handlers)))
}

fn resolve(chain: &InterceptorChain, pairs: &[(&str, &str)], name: &str) -> Result<Option<String>> {
	let values: FxHashMap<&str, &str> = pairs.iter().copied().collect();
	let source = |key: &str| values.get(key).map(|v| ConfigValue::new(key, *v, "test", 100));
	Ok(chain.resolve(&source, name)?.map(|v| v.value))
}

const SCENARIO: &[(&str, &str)] = &[
	("my.secret", "${aes-gcm-nopadding::ZGVjb2RlZA==}"),
	("my.expression", "${not.found:default}"),
	("another.expression", "${my.expression}"),
];

#[rstest]
#[case("my.secret", "decoded")]
#[case("my.expression", "default")]
#[case("another.expression", "default")]
fn test_scenario(#[case] name: &str, #[case] expected: &str) {
	let chain = chain(HandlerMode::All);
	assert_eq!(resolve(&chain, SCENARIO, name).unwrap().as_deref(), Some(expected));
}

#[test]
fn test_missing_name_is_none() {
	let chain = chain(HandlerMode::All);
	assert_eq!(resolve(&chain, SCENARIO, "nothing.here").unwrap(), None);
}

#[test]
fn test_unresolved_reference_fails() {
	let chain = chain(HandlerMode::All);
	let err = resolve(&chain, &[("a", "x-${missing}")], "a").unwrap_err();
	assert_eq!(
		err,
		InterceptError::Expression(ExpressionError::Unresolved {
			name: "missing".into(),
			owner: "a".into(),
		})
	);
}

#[test]
fn test_cycle_is_reported_not_looped() {
	let chain = chain(HandlerMode::All);
	let err = resolve(&chain, &[("a", "${b}"), ("b", "${c}"), ("c", "${a}")], "a").unwrap_err();
	assert_eq!(
		err,
		InterceptError::Expression(ExpressionError::Cyclic {
			chain: "a -> b -> c -> a".into()
		})
	);
}

#[test]
fn test_nested_key_and_text_around() {
	let chain = chain(HandlerMode::All);
	let pairs = [
		("env", "prod"),
		("db.prod.url", "pg://prod"),
		("app.url", "url=${db.${env}.url}!"),
	];
	assert_eq!(
		resolve(&chain, &pairs, "app.url").unwrap().as_deref(),
		Some("url=pg://prod!")
	);
}

#[test]
fn test_empty_reference_uses_default() {
	let chain = chain(HandlerMode::All);
	let pairs = [("blank", ""), ("a", "${blank:fallback}")];
	assert_eq!(resolve(&chain, &pairs, "a").unwrap().as_deref(), Some("fallback"));
}

#[test]
fn test_escaped_expression_is_literal() {
	let chain = chain(HandlerMode::All);
	let pairs = [("a", "\\${not.expanded}")];
	assert_eq!(resolve(&chain, &pairs, "a").unwrap().as_deref(), Some("${not.expanded}"));
}

#[test]
fn test_disabled_handlers_reject_secret() {
	let chain = chain(HandlerMode::Disabled);
	let err = resolve(&chain, SCENARIO, "my.secret").unwrap_err();
	assert!(matches!(err, InterceptError::Handler(HandlerError::Disabled { .. })));
	// Plain expressions are unaffected.
	assert_eq!(
		resolve(&chain, SCENARIO, "another.expression").unwrap().as_deref(),
		Some("default")
	);
}

#[test]
fn test_unknown_handler_fails() {
	let chain = chain(HandlerMode::All);
	let err = resolve(&chain, &[("s", "${rot13::abc}")], "s").unwrap_err();
	assert_eq!(
		err,
		InterceptError::Handler(HandlerError::Unknown {
			handler: "rot13".into()
		})
	);
}

#[test]
fn test_syntax_error_names_owner() {
	let chain = chain(HandlerMode::All);
	let err = resolve(&chain, &[("broken", "${open")], "broken").unwrap_err();
	assert!(matches!(
		err,
		InterceptError::Expression(ExpressionError::Syntax { ref owner, .. }) if owner == "broken"
	));
}
