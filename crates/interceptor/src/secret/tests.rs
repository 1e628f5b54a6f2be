use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;

#[derive(Debug)]
struct Base64Handler;

impl SecretKeysHandler for Base64Handler {
	fn id(&self) -> &str {
		"base64"
	}

	fn decode(&self, payload: &str) -> Result<String, HandlerError> {
		let bytes = STANDARD.decode(payload).map_err(|e| HandlerError::Decode {
			handler: "base64".into(),
			reason: e.to_string(),
		})?;
		String::from_utf8(bytes).map_err(|e| HandlerError::Decode {
			handler: "base64".into(),
			reason: e.to_string(),
		})
	}
}

#[derive(Debug)]
struct KeyedFactory;

impl SecretKeysHandlerFactory for KeyedFactory {
	fn id(&self) -> &str {
		"keyed"
	}

	fn create(&self, settings: &HandlerSettings) -> Result<Arc<dyn SecretKeysHandler>, HandlerError> {
		settings.require("encryption-key")?;
		Ok(Arc::new(Base64Handler))
	}
}

fn base64() -> Arc<dyn SecretKeysHandler> {
	Arc::new(Base64Handler)
}

fn no_settings(id: &str) -> HandlerSettings {
	HandlerSettings::new(id)
}

#[rstest]
#[case("", HandlerMode::All)]
#[case("ALL", HandlerMode::All)]
#[case("none", HandlerMode::Disabled)]
#[case(" a , b,", HandlerMode::Only(vec!["a".into(), "b".into()]))]
fn test_mode_parse(#[case] raw: &str, #[case] expected: HandlerMode) {
	assert_eq!(HandlerMode::parse(raw), expected);
}

#[test]
fn test_settings_from_properties() {
	let properties = [
		("strata.config.secret-handler.keyed.encryption-key", "secret"),
		("strata.config.secret-handler.keyed.", "ignored"),
		("strata.config.secret-handler.other.encryption-key", "other"),
		("app.name", "x"),
	];
	let settings = HandlerSettings::from_properties("keyed", properties);
	assert_eq!(settings.get("encryption-key"), Some("secret"));
	assert_eq!(settings, HandlerSettings::new("keyed").with("encryption-key", "secret"));
}

#[test]
fn test_decode_dispatches_by_id() {
	let handlers = SecretKeysHandlers::build(HandlerMode::All, [base64()], &[], no_settings).unwrap();
	assert_eq!(handlers.decode("base64", "aGVsbG8=").unwrap(), "hello");
	assert_eq!(
		handlers.decode("rot13", "x").unwrap_err(),
		HandlerError::Unknown {
			handler: "rot13".into()
		}
	);
}

#[test]
fn test_factory_requires_settings() {
	let factories: Vec<Arc<dyn SecretKeysHandlerFactory>> = vec![Arc::new(KeyedFactory)];
	let err = SecretKeysHandlers::build(HandlerMode::All, [], &factories, no_settings).unwrap_err();
	assert_eq!(
		err,
		HandlerError::MissingSetting {
			handler: "keyed".into(),
			setting: "strata.config.secret-handler.keyed.encryption-key".into(),
		}
	);
}

#[test]
fn test_disabled_mode_skips_factories_and_rejects_dispatch() {
	let factories: Vec<Arc<dyn SecretKeysHandlerFactory>> = vec![Arc::new(KeyedFactory)];
	let handlers =
		SecretKeysHandlers::build(HandlerMode::Disabled, [], &factories, no_settings).unwrap();
	assert!(!handlers.contains("keyed"));
	assert_eq!(
		handlers.decode("keyed", "x").unwrap_err(),
		HandlerError::Disabled {
			handler: "keyed".into()
		}
	);
}

#[test]
fn test_allow_list_limits_dispatch() {
	let handlers = SecretKeysHandlers::build(
		HandlerMode::parse("other"),
		[base64()],
		&[],
		no_settings,
	)
	.unwrap();
	assert!(matches!(
		handlers.decode("base64", "aGVsbG8="),
		Err(HandlerError::Disabled { .. })
	));
}
