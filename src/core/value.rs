//! Runtime value model
//!
//! This module defines the closed set of runtime value kinds that can be bound
//! as query parameters and decoded from result columns.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single database value
///
/// The set of variants is closed: parameter binding and type conversion
/// dispatch on [`ValueKind`] rather than on open-ended runtime type
/// inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// Text value
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Calendar date without time of day
    Date(NaiveDate),
    /// Time of day without date
    Time(NaiveTime),
    /// Date and time without timezone
    DateTime(NaiveDateTime),
    /// Absolute instant (UTC)
    Instant(DateTime<Utc>),
    /// Arbitrary-precision decimal
    Decimal(Decimal),
}

/// Discriminant of a [`Value`], used as the dispatch key for parameter
/// binding and for the source side of conversion-rule lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Long,
    Float,
    Double,
    Text,
    Bytes,
    Date,
    Time,
    DateTime,
    Instant,
    Decimal,
}

impl ValueKind {
    /// Human-readable kind name, used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Date => "date",
            ValueKind::Time => "time",
            ValueKind::DateTime => "datetime",
            ValueKind::Instant => "instant",
            ValueKind::Decimal => "decimal",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Get the kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Instant(_) => ValueKind::Instant,
            Value::Decimal(_) => ValueKind::Decimal,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::Instant(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
        }
    }
}

// Hashing is structural like equality; floats hash by bit pattern since
// they cannot carry a full `Eq`.
impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Time(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::Instant(v) => v.hash(state),
            Value::Decimal(v) => v.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Instant(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Structural cast from a [`Value`] into a concrete Rust type.
///
/// `from_value` only accepts an exact kind match; cross-kind coercions
/// (e.g. reading an `i32` from a `Long` column) are the job of the
/// conversion registry and are consulted before this trait.
pub trait FromValue: Sized + Send + 'static {
    /// Attempt the cast; `None` means the stored kind does not match.
    fn from_value(value: &Value) -> Option<Self>;

    /// Name of the requested type, used in error messages
    fn type_label() -> &'static str {
        std::any::type_name::<Self>()
    }
}

macro_rules! impl_from_value {
    ($ty:ty, $variant:ident, $label:literal) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn type_label() -> &'static str {
                $label
            }
        }
    };
}

impl_from_value!(bool, Bool, "bool");
impl_from_value!(i32, Int, "i32");
impl_from_value!(i64, Long, "i64");
impl_from_value!(f32, Float, "f32");
impl_from_value!(f64, Double, "f64");
impl_from_value!(String, Text, "String");
impl_from_value!(Vec<u8>, Bytes, "Vec<u8>");
impl_from_value!(NaiveDate, Date, "NaiveDate");
impl_from_value!(NaiveTime, Time, "NaiveTime");
impl_from_value!(NaiveDateTime, DateTime, "NaiveDateTime");
impl_from_value!(DateTime<Utc>, Instant, "DateTime<Utc>");
impl_from_value!(Decimal, Decimal, "Decimal");

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }

    fn type_label() -> &'static str {
        "Value"
    }
}
