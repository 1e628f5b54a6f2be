//! Hierarchical configuration binding.
//!
//! Binds a flat set of string properties onto declared, strongly typed
//! schema roots. Each root pairs a [`TypeDescriptor`] with a prefix; the
//! result is one validated [`MappingInstance`] per (type, prefix).
//!
//! # Pipeline
//!
//! - [`name`] - segments `a.b[0].c` style names and walks them with a cursor
//! - [`schema`] - compiles descriptors into [`SchemaTree`] arenas
//! - [`binding`] - routes keys by longest prefix and realizes instances
//! - [`validate`] - forces conversions, reports every defect at once
//! - [`registry`] - concurrent (type, prefix) cache with lookup validators
//! - [`query`] - flattened leaves and name classification for tooling
//!
//! # Example
//!
//! ```
//! use strata_mapping::{MappingProvider, RawProperty, RootDeclaration, Shape, TypeDescriptor};
//!
//! let server = TypeDescriptor::new("Server")
//! 	.prefix("server")
//! 	.field("host", Shape::of::<String>())
//! 	.field("port", Shape::of::<u16>().with_default("8080"));
//!
//! let provider = MappingProvider::builder()
//! 	.root(RootDeclaration::at_default_prefix(server))
//! 	.build()
//! 	.unwrap();
//! let bindings = provider
//! 	.map([RawProperty::new("server.host", "localhost", 100)])
//! 	.unwrap();
//!
//! let (_, instance) = bindings.iter().next().unwrap();
//! assert_eq!(instance.get::<u16>("port").unwrap(), 8080);
//! assert_eq!(instance.get::<String>("host").unwrap(), "localhost");
//! ```

pub mod binding;
pub mod convert;
pub mod error;
pub mod instance;
pub mod name;
pub mod provider;
pub mod query;
pub mod registry;
pub mod schema;
pub mod validate;

pub use binding::{BindingContext, Bindings, CompiledRoot, MappingKey, MatchedProperty, RawProperty, RootDeclaration};
pub use convert::{
	Converter, ConverterRef, EnumConverter, FromValue, RangedConverter, Value, ValueKind,
};
pub use error::{
	AccessError, AggregateValidationError, ConversionError, Defect, LookupError, MappingError,
	Result, SchemaError,
};
pub use instance::{ConfigMapping, MappingInstance, NodeRef};
pub use name::{NameCursor, PropertyName, Segment};
pub use provider::{MappingProvider, MappingProviderBuilder};
pub use query::{LeafDescriptor, mapped_properties, properties};
pub use registry::{MappingRegistry, MappingValidator};
pub use schema::{
	Field, NamingStrategy, NodeId, SchemaBuilder, SchemaNode, SchemaTree, Shape, TypeCatalog,
	TypeDescriptor, TypeName,
};
pub use validate::ValidationPolicy;
