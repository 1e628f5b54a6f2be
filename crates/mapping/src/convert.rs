//! Leaf value conversion.
//!
//! Leaves hold raw strings until first access; a [`Converter`] turns the raw
//! string into a [`Value`]. Built-in conversions are provided by [`ValueKind`],
//! enumerated string sets by [`EnumConverter`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A converted leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Bool(bool),
	Int(i64),
	UInt(u64),
	Float(f64),
	Char(char),
	Text(String),
	Duration(Duration),
}

impl Value {
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Bool(_) => "bool",
			Value::Int(_) => "int",
			Value::UInt(_) => "uint",
			Value::Float(_) => "float",
			Value::Char(_) => "char",
			Value::Text(_) => "string",
			Value::Duration(_) => "duration",
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Int(i) => Some(*i),
			Value::UInt(u) => i64::try_from(*u).ok(),
			_ => None,
		}
	}

	pub fn as_u64(&self) -> Option<u64> {
		match self {
			Value::UInt(u) => Some(*u),
			Value::Int(i) => u64::try_from(*i).ok(),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Float(f) => Some(*f),
			Value::Int(i) => Some(*i as f64),
			Value::UInt(u) => Some(*u as f64),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Text(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_char(&self) -> Option<char> {
		match self {
			Value::Char(c) => Some(*c),
			_ => None,
		}
	}

	pub fn as_duration(&self) -> Option<Duration> {
		match self {
			Value::Duration(d) => Some(*d),
			_ => None,
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Bool(b) => write!(f, "{b}"),
			Value::Int(i) => write!(f, "{i}"),
			Value::UInt(u) => write!(f, "{u}"),
			Value::Float(x) => write!(f, "{x}"),
			Value::Char(c) => write!(f, "{c}"),
			Value::Text(s) => f.write_str(s),
			Value::Duration(d) => write!(f, "{d:?}"),
		}
	}
}

/// Turns a leaf's raw string into a [`Value`].
///
/// Implementations must be deterministic: the engine converts each leaf once
/// and caches the result.
pub trait Converter: Send + Sync + fmt::Debug {
	/// Name of the target type, used in diagnostics.
	fn target(&self) -> &str;

	/// Converts `raw`, returning a human-readable reason on failure.
	fn convert(&self, raw: &str) -> Result<Value, String>;

	/// Whether values have a canonical string form, making them usable as map keys.
	fn canonical_key(&self) -> bool {
		false
	}
}

/// Built-in leaf types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
	Bool,
	Int,
	UInt,
	Float,
	Char,
	String,
	Duration,
}

impl Converter for ValueKind {
	fn target(&self) -> &str {
		match self {
			ValueKind::Bool => "bool",
			ValueKind::Int => "int",
			ValueKind::UInt => "uint",
			ValueKind::Float => "float",
			ValueKind::Char => "char",
			ValueKind::String => "string",
			ValueKind::Duration => "duration",
		}
	}

	fn convert(&self, raw: &str) -> Result<Value, String> {
		match self {
			ValueKind::String => Ok(Value::Text(raw.to_string())),
			ValueKind::Bool => parse_bool(raw.trim()).map(Value::Bool),
			ValueKind::Int => raw
				.trim()
				.parse::<i64>()
				.map(Value::Int)
				.map_err(|e| format!("invalid integer: {e}")),
			ValueKind::UInt => raw
				.trim()
				.parse::<u64>()
				.map(Value::UInt)
				.map_err(|e| format!("invalid unsigned integer: {e}")),
			ValueKind::Float => raw
				.trim()
				.parse::<f64>()
				.map(Value::Float)
				.map_err(|e| format!("invalid float: {e}")),
			ValueKind::Char => {
				let mut chars = raw.chars();
				match (chars.next(), chars.next()) {
					(Some(c), None) => Ok(Value::Char(c)),
					_ => Err("expected exactly one character".to_string()),
				}
			}
			ValueKind::Duration => parse_duration(raw.trim()).map(Value::Duration),
		}
	}

	fn canonical_key(&self) -> bool {
		!matches!(self, ValueKind::Float | ValueKind::Duration)
	}
}

/// Case-insensitive conversion onto a fixed set of names.
///
/// Converted values carry the declared spelling, not the input's.
#[derive(Debug, Clone)]
pub struct EnumConverter {
	name: Box<str>,
	variants: Box<[Box<str>]>,
}

impl EnumConverter {
	pub fn new<I, S>(name: &str, variants: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<Box<str>>,
	{
		Self {
			name: name.into(),
			variants: variants.into_iter().map(Into::into).collect(),
		}
	}
}

impl Converter for EnumConverter {
	fn target(&self) -> &str {
		&self.name
	}

	fn convert(&self, raw: &str) -> Result<Value, String> {
		let raw = raw.trim();
		self.variants
			.iter()
			.find(|v| v.eq_ignore_ascii_case(raw) || normalize(v) == normalize(raw))
			.map(|v| Value::Text(v.to_string()))
			.ok_or_else(|| {
				format!(
					"expected one of [{}]",
					self.variants
						.iter()
						.map(|v| v.as_ref())
						.collect::<Vec<_>>()
						.join(", ")
				)
			})
	}

	fn canonical_key(&self) -> bool {
		true
	}
}

/// A built-in kind narrowed to the range of one Rust type.
///
/// Out-of-range input fails conversion, so it is reported with every other
/// defect instead of on first read.
#[derive(Debug, Clone, Copy)]
pub struct RangedConverter {
	target: &'static str,
	kind: ValueKind,
	fits: fn(&Value) -> bool,
}

impl RangedConverter {
	pub fn new(target: &'static str, kind: ValueKind, fits: fn(&Value) -> bool) -> Self {
		Self { target, kind, fits }
	}

	/// Converts with `T`'s kind and accepts only values `T` can hold.
	pub fn of<T: FromValue>() -> Self {
		Self::new(std::any::type_name::<T>(), T::value_kind(), |value| {
			T::from_value(value).is_some()
		})
	}
}

impl Converter for RangedConverter {
	fn target(&self) -> &str {
		self.target
	}

	fn convert(&self, raw: &str) -> Result<Value, String> {
		let value = self.kind.convert(raw)?;
		if (self.fits)(&value) {
			Ok(value)
		} else {
			Err(format!("{value} is out of range for {}", self.target))
		}
	}

	fn canonical_key(&self) -> bool {
		self.kind.canonical_key()
	}
}

/// `ON_FAILURE`, `on-failure` and `onFailure` all normalize to `onfailure`.
fn normalize(s: &str) -> String {
	s.chars()
		.filter(|c| *c != '-' && *c != '_')
		.flat_map(char::to_lowercase)
		.collect()
}

/// Parses a boolean from common string representations.
pub fn parse_bool(value: &str) -> Result<bool, String> {
	match value.to_lowercase().as_str() {
		"true" | "1" | "yes" | "y" | "on" => Ok(true),
		"false" | "0" | "no" | "n" | "off" => Ok(false),
		_ => Err(format!(
			"invalid boolean: '{value}' (expected true/false, yes/no, on/off, 1/0)"
		)),
	}
}

/// Parses `500ms`, `10s`, `5m`, `2h`, `1d`, or a bare number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
	let split = value
		.find(|c: char| !c.is_ascii_digit())
		.unwrap_or(value.len());
	let (digits, unit) = value.split_at(split);
	if digits.is_empty() {
		return Err(format!("invalid duration: '{value}'"));
	}
	let amount: u64 = digits
		.parse()
		.map_err(|_| format!("invalid duration: '{value}'"))?;
	let secs = |mul: u64| {
		amount
			.checked_mul(mul)
			.map(Duration::from_secs)
			.ok_or_else(|| format!("duration out of range: '{value}'"))
	};
	match unit {
		"ms" => Ok(Duration::from_millis(amount)),
		"" | "s" => secs(1),
		"m" => secs(60),
		"h" => secs(60 * 60),
		"d" => secs(24 * 60 * 60),
		other => Err(format!("unknown duration unit '{other}' in '{value}'")),
	}
}

/// Rust types that can be read out of a [`Value`].
pub trait FromValue: Sized {
	/// Extracts the value, returning `None` if the type or range doesn't fit.
	fn from_value(value: &Value) -> Option<Self>;

	/// The built-in conversion producing values this type accepts.
	fn value_kind() -> ValueKind;

	/// Leaf converter for this type; rejects values [`FromValue::from_value`] would.
	fn converter() -> ConverterRef {
		Arc::new(Self::value_kind())
	}
}

impl FromValue for bool {
	fn from_value(value: &Value) -> Option<Self> {
		value.as_bool()
	}

	fn value_kind() -> ValueKind {
		ValueKind::Bool
	}
}

impl FromValue for String {
	fn from_value(value: &Value) -> Option<Self> {
		value.as_str().map(str::to_string)
	}

	fn value_kind() -> ValueKind {
		ValueKind::String
	}
}

impl FromValue for char {
	fn from_value(value: &Value) -> Option<Self> {
		value.as_char()
	}

	fn value_kind() -> ValueKind {
		ValueKind::Char
	}
}

impl FromValue for Duration {
	fn from_value(value: &Value) -> Option<Self> {
		value.as_duration()
	}

	fn value_kind() -> ValueKind {
		ValueKind::Duration
	}
}

impl FromValue for f64 {
	fn from_value(value: &Value) -> Option<Self> {
		value.as_f64()
	}

	fn value_kind() -> ValueKind {
		ValueKind::Float
	}
}

impl FromValue for f32 {
	fn from_value(value: &Value) -> Option<Self> {
		let wide = value.as_f64()?;
		let narrow = wide as f32;
		(narrow.is_finite() == wide.is_finite()).then_some(narrow)
	}

	fn value_kind() -> ValueKind {
		ValueKind::Float
	}

	fn converter() -> ConverterRef {
		Arc::new(RangedConverter::of::<Self>())
	}
}

macro_rules! from_value_int {
	($kind:ident, $getter:ident => $($ty:ty),+) => {
		$(
			impl FromValue for $ty {
				fn from_value(value: &Value) -> Option<Self> {
					value.$getter().and_then(|v| <$ty>::try_from(v).ok())
				}

				fn value_kind() -> ValueKind {
					ValueKind::$kind
				}
			}
		)+
	};
	($kind:ident, $getter:ident, narrow => $($ty:ty),+) => {
		$(
			impl FromValue for $ty {
				fn from_value(value: &Value) -> Option<Self> {
					value.$getter().and_then(|v| <$ty>::try_from(v).ok())
				}

				fn value_kind() -> ValueKind {
					ValueKind::$kind
				}

				fn converter() -> ConverterRef {
					Arc::new(RangedConverter::of::<Self>())
				}
			}
		)+
	};
}

from_value_int!(Int, as_i64 => i64);
from_value_int!(UInt, as_u64 => u64);
from_value_int!(Int, as_i64, narrow => i8, i16, i32, isize);
from_value_int!(UInt, as_u64, narrow => u8, u16, u32, usize);

/// Shared handle to a converter.
pub type ConverterRef = Arc<dyn Converter>;

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case("500ms", Duration::from_millis(500))]
	#[case("10s", Duration::from_secs(10))]
	#[case("10", Duration::from_secs(10))]
	#[case("5m", Duration::from_secs(300))]
	#[case("2h", Duration::from_secs(7200))]
	#[case("1d", Duration::from_secs(86400))]
	fn test_parse_duration(#[case] input: &str, #[case] expected: Duration) {
		assert_eq!(parse_duration(input), Ok(expected));
	}

	#[rstest]
	#[case("")]
	#[case("ms")]
	#[case("3 weeks")]
	#[case("1y")]
	fn test_parse_duration_rejects(#[case] input: &str) {
		assert!(parse_duration(input).is_err());
	}

	#[rstest]
	#[case(RangedConverter::of::<u16>(), "65535", true)]
	#[case(RangedConverter::of::<u16>(), "70000", false)]
	#[case(RangedConverter::of::<i8>(), "-128", true)]
	#[case(RangedConverter::of::<i8>(), "200", false)]
	#[case(RangedConverter::of::<f32>(), "1.5", true)]
	#[case(RangedConverter::of::<f32>(), "1e300", false)]
	fn test_ranged_conversion(
		#[case] converter: RangedConverter,
		#[case] raw: &str,
		#[case] ok: bool,
	) {
		assert_eq!(converter.convert(raw).is_ok(), ok, "{raw} as {}", converter.target());
	}

	#[test]
	fn test_kind_conversion() {
		assert_eq!(ValueKind::Bool.convert(" YES "), Ok(Value::Bool(true)));
		assert_eq!(ValueKind::Int.convert("-42"), Ok(Value::Int(-42)));
		assert!(ValueKind::UInt.convert("-1").is_err());
		assert_eq!(ValueKind::String.convert(" kept "), Ok(Value::Text(" kept ".into())));
		assert!(ValueKind::Char.convert("ab").is_err());
	}

	#[test]
	fn test_enum_converter_canonicalizes() {
		let levels = EnumConverter::new("level", ["DEBUG", "INFO", "ON_FAILURE"]);
		assert_eq!(levels.convert("info"), Ok(Value::Text("INFO".into())));
		assert_eq!(levels.convert("on-failure"), Ok(Value::Text("ON_FAILURE".into())));
		let err = levels.convert("loud").unwrap_err();
		assert!(err.contains("DEBUG, INFO, ON_FAILURE"), "{err}");
	}

	#[test]
	fn test_from_value_range_checks() {
		assert_eq!(u8::from_value(&Value::Int(255)), Some(255));
		assert_eq!(u8::from_value(&Value::Int(256)), None);
		assert_eq!(i32::from_value(&Value::UInt(7)), Some(7));
		assert_eq!(u16::from_value(&Value::Int(-1)), None);
		assert_eq!(String::from_value(&Value::Int(1)), None);
	}

	#[test]
	fn test_map_key_capability() {
		assert!(ValueKind::String.canonical_key());
		assert!(ValueKind::Int.canonical_key());
		assert!(!ValueKind::Float.canonical_key());
		assert!(!ValueKind::Duration.canonical_key());
	}
}
