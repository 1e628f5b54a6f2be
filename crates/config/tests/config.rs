use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use pretty_assertions::assert_eq;
use rstest::rstest;
use strata_config::{Config, ConfigError, ConfigSource, MapSource, register_mappings, register_properties};
use strata_interceptor::{
	ExpressionError, HandlerError, HandlerSettings, InterceptError, SecretKeysHandler,
	SecretKeysHandlerFactory,
};
use strata_mapping::{
	AccessError, ConfigMapping, LookupError, MappingInstance, NodeRef, RootDeclaration, Shape,
	TypeDescriptor,
};

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Stand-in for a real cipher: payloads are base64 plaintext, but the key
/// material is still required.
#[derive(Debug)]
struct StubCipher;

impl SecretKeysHandler for StubCipher {
	fn id(&self) -> &str {
		"aes-gcm-nopadding"
	}

	fn decode(&self, payload: &str) -> Result<String, HandlerError> {
		STANDARD
			.decode(payload)
			.ok()
			.and_then(|bytes| String::from_utf8(bytes).ok())
			.ok_or_else(|| HandlerError::Decode {
				handler: self.id().to_string(),
				reason: "payload is not base64 text".into(),
			})
	}
}

#[derive(Debug)]
struct StubCipherFactory;

impl SecretKeysHandlerFactory for StubCipherFactory {
	fn id(&self) -> &str {
		"aes-gcm-nopadding"
	}

	fn create(&self, settings: &HandlerSettings) -> Result<Arc<dyn SecretKeysHandler>, HandlerError> {
		settings.require("encryption-key")?;
		Ok(Arc::new(StubCipher))
	}
}

#[derive(Debug, PartialEq)]
struct Server {
	host: String,
	port: u16,
}

impl ConfigMapping for Server {
	fn descriptor() -> Arc<TypeDescriptor> {
		Arc::new(
			TypeDescriptor::new("Server")
				.prefix("server")
				.field("host", Shape::of::<String>())
				.field("port", Shape::of::<u16>().with_default("8080")),
		)
	}

	fn from_mapping(node: NodeRef<'_>) -> Result<Self, AccessError> {
		Ok(Self {
			host: node.child_value("host")?,
			port: node.child_value("port")?,
		})
	}
}

const KEY_SETTING: &str = "strata.config.secret-handler.aes-gcm-nopadding.encryption-key";

fn secrets() -> MapSource {
	MapSource::new("secrets")
		.with("my.secret", "${aes-gcm-nopadding::ZGVjb2RlZA==}")
		.with("my.expression", "${not.found:default}")
		.with("another.expression", "${my.expression}")
}

fn build_secrets(source: MapSource) -> Result<Config, ConfigError> {
	init_tracing();
	Config::builder()
		.with_source(source)
		.add_default_interceptors()
		.with_secret_handler_factory(StubCipherFactory)
		.build()
}

#[rstest]
#[case("my.secret", "decoded")]
#[case("my.expression", "default")]
#[case("another.expression", "default")]
fn test_expressions_and_secrets_resolve(#[case] name: &str, #[case] expected: &str) {
	let config = build_secrets(secrets().with(KEY_SETTING, "c29tZWFyYml0cmFyeWtleQ")).unwrap();
	assert_eq!(config.get_raw_value(name).unwrap(), expected);
}

#[test]
fn test_missing_key_material_fails_build() {
	let err = build_secrets(secrets()).unwrap_err();
	assert_eq!(
		err,
		ConfigError::Intercept(InterceptError::Handler(HandlerError::MissingSetting {
			handler: "aes-gcm-nopadding".into(),
			setting: KEY_SETTING.into(),
		}))
	);
}

#[test]
fn test_disabled_handlers_skip_factories() {
	let config = build_secrets(secrets().with("strata.config.secret-handlers", "none")).unwrap();
	assert_eq!(config.get_raw_value("another.expression").unwrap(), "default");
	assert!(matches!(
		config.get_raw_value("my.secret"),
		Err(ConfigError::Intercept(InterceptError::Handler(HandlerError::Disabled { .. })))
	));
}

#[test]
fn test_mapping_sees_resolved_values() {
	init_tracing();
	let config = Config::builder()
		.with_source(
			MapSource::new("app")
				.with("db.host", "db.internal")
				.with("server.host", "${db.host}")
				.with("server.port", "9090"),
		)
		.add_default_interceptors()
		.with_mapping::<Server>()
		.build()
		.unwrap();

	assert_eq!(
		config.mapping::<Server>().unwrap(),
		Server {
			host: "db.internal".into(),
			port: 9090,
		}
	);
}

#[test]
fn test_higher_ordinal_source_wins_in_mapping() {
	let config = Config::builder()
		.with_source(MapSource::new("defaults").with_ordinal(100).with("server.host", "low"))
		.with_source(MapSource::new("env").with_ordinal(300).with("server.host", "high"))
		.with_mapping::<Server>()
		.build()
		.unwrap();

	let server = config.mapping::<Server>().unwrap();
	assert_eq!(server.host, "high");
	assert_eq!(server.port, 8080);
	let value = config.get_config_value("server.host").unwrap().unwrap();
	assert_eq!(value.source, "env");
	assert_eq!(value.ordinal, 300);
}

#[test]
fn test_unknown_key_fails_unless_turned_off() {
	let source = || MapSource::new("app").with("server.host", "h").with("server.hots", "typo");

	let err = Config::builder()
		.with_source(source())
		.with_mapping::<Server>()
		.build()
		.unwrap_err();
	let ConfigError::Validation(err) = err else {
		panic!("expected a validation error, got {err:?}");
	};
	assert!(err.mentions("server.hots"));

	let by_property = Config::builder()
		.with_source(source().with("strata.config.mapping.validate-unknown", "false"))
		.with_mapping::<Server>()
		.build();
	assert!(by_property.is_ok());

	let by_builder = Config::builder()
		.with_source(source())
		.validate_unknown(false)
		.with_mapping::<Server>()
		.build();
	assert!(by_builder.is_ok());

	let as_properties = Config::builder()
		.with_source(source())
		.with_properties_root(RootDeclaration::at_default_prefix(Server::descriptor()))
		.build()
		.unwrap();
	assert_eq!(as_properties.mapping::<Server>().unwrap().host, "h");
}

#[test]
fn test_interceptor_failure_aborts_build() {
	let err = Config::builder()
		.with_source(MapSource::new("app").with("server.host", "${nowhere}"))
		.add_default_interceptors()
		.with_mapping::<Server>()
		.build()
		.unwrap_err();
	assert_eq!(
		err,
		ConfigError::Intercept(InterceptError::Expression(ExpressionError::Unresolved {
			name: "nowhere".into(),
			owner: "server.host".into(),
		}))
	);
}

#[test]
fn test_unclaimed_keys_are_not_resolved() {
	// A broken expression outside every prefix never reaches the chain.
	let config = Config::builder()
		.with_source(
			MapSource::new("app")
				.with("server.host", "h")
				.with("other.tool", "${nowhere}"),
		)
		.add_default_interceptors()
		.with_mapping::<Server>()
		.build()
		.unwrap();
	assert!(config.get_raw_value("other.tool").is_err());
	assert_eq!(config.mapping::<Server>().unwrap().host, "h");
}

#[test]
fn test_empty_prefix_root_ignores_engine_switches() {
	let app = TypeDescriptor::new("App").field("name", Shape::of::<String>());
	let config = Config::builder()
		.with_source(
			MapSource::new("app")
				.with("name", "demo")
				.with("strata.config.mapping.validate-unknown", "true")
				.with("strata.config.secret-handlers", "all"),
		)
		.with_mapping_root(RootDeclaration::at_default_prefix(app.clone()))
		.build()
		.unwrap();
	assert_eq!(config.get_mapping(&app).unwrap().get::<String>("name").unwrap(), "demo");
}

#[test]
fn test_register_after_build() {
	let config = Config::builder()
		.with_source(MapSource::new("app").with("primary.host", "a").with("replica.host", "b"))
		.build()
		.unwrap();
	assert!(matches!(
		config.mapping::<Server>(),
		Err(ConfigError::Lookup(LookupError::MappingNotFound { .. }))
	));

	register_mappings(&config, [RootDeclaration::new(Server::descriptor(), "primary")]).unwrap();
	register_properties(&config, [RootDeclaration::new(Server::descriptor(), "replica")]).unwrap();

	assert_eq!(config.mapping_prefixed::<Server>("primary").unwrap().host, "a");
	assert_eq!(config.mapping_prefixed::<Server>("replica").unwrap().host, "b");
	assert!(matches!(
		config.mapping::<Server>(),
		Err(ConfigError::Lookup(LookupError::MappingPrefixNotFound { .. }))
	));
}

#[test]
fn test_validator_runs_on_lookup() {
	let config = Config::builder()
		.with_source(MapSource::new("app").with("server.host", "h").with("server.port", "80"))
		.with_mapping::<Server>()
		.with_validator(|instance: &MappingInstance| match instance.get::<u16>("port") {
			Ok(port) if port < 1024 => Err(vec![format!("port {port} is privileged")]),
			_ => Ok(()),
		})
		.build()
		.unwrap();

	let err = config.get_mapping(&Server::descriptor()).unwrap_err();
	assert_eq!(
		err,
		ConfigError::Lookup(LookupError::ConstraintViolation {
			type_name: "Server".into(),
			prefix: "server".into(),
			violations: vec!["port 80 is privileged".into()],
		})
	);
}

#[test]
fn test_tooling_queries() {
	let config = Config::builder()
		.with_source(
			MapSource::new("app")
				.with("server.host", "h")
				.with("server.extra", "x")
				.with("client.host", "c"),
		)
		.validate_unknown(false)
		.with_mapping::<Server>()
		.build()
		.unwrap();

	let properties = config.properties();
	let paths: Vec<&String> = properties.keys().collect();
	assert_eq!(paths, vec!["server.host", "server.port"]);

	let root = RootDeclaration::at_default_prefix(Server::descriptor());
	assert_eq!(config.mapped_properties(&root).unwrap(), vec!["server.host".to_string()]);
	let leaves = config.get_properties(&root).unwrap();
	assert_eq!(leaves["server.port"].default.as_deref(), Some("8080"));
}

#[rstest]
#[case("port", "70000")]
#[case("port", "eighty")]
fn test_get_value_conversion_errors(#[case] name: &str, #[case] raw: &str) {
	let config = Config::builder()
		.with_source(MapSource::new("app").with(name, raw))
		.build()
		.unwrap();
	let err = config.get_value::<u16>(name).unwrap_err();
	let ConfigError::Conversion(err) = err else {
		panic!("expected a conversion error, got {err:?}");
	};
	assert_eq!(err.path, name);
	assert_eq!(err.raw, raw);
}

#[test]
fn test_get_value_missing_and_empty() {
	let config = Config::builder()
		.with_source(MapSource::new("app").with("blank", "").with("flag", "yes"))
		.build()
		.unwrap();
	assert!(config.get_value::<bool>("flag").unwrap());
	assert_eq!(config.get_optional_value::<bool>("blank").unwrap(), None);
	assert_eq!(
		config.get_value::<bool>("missing").unwrap_err(),
		ConfigError::NoSuchProperty {
			name: "missing".into()
		}
	);
	assert_eq!(config.property_names(), vec!["blank".to_string(), "flag".to_string()]);
	assert_eq!(config.sources().iter().map(|s| s.name()).collect::<Vec<_>>(), vec!["app"]);
}
