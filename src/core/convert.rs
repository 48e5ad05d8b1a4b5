//! Type conversion registry
//!
//! Conversions are single-hop rules keyed by `(source kind, target type)`.
//! Registries are built once, immutable afterwards, and merge with
//! right-hand-side precedence; there is no transitive composition.

use crate::core::value::{Value, ValueKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

type ConversionFn = Arc<dyn Fn(&Value) -> Option<Box<dyn Any + Send>> + Send + Sync>;

/// Immutable set of single-hop value conversions.
///
/// Safe to share across threads without synchronization: once built, a
/// registry is never mutated.
#[derive(Clone, Default)]
pub struct TypeConversions {
    rules: HashMap<(ValueKind, TypeId), ConversionFn>,
}

impl TypeConversions {
    /// Registry with no rules
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up and apply the rule for `(value.kind(), T)`.
    ///
    /// Returns `None` both when no rule exists and when the rule declines
    /// the value (e.g. a narrowing overflow); callers fall back to a
    /// structural cast in either case.
    pub fn convert<T: 'static>(&self, value: &Value) -> Option<T> {
        let rule = self.rules.get(&(value.kind(), TypeId::of::<T>()))?;
        rule(value)?.downcast::<T>().ok().map(|b| *b)
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check whether the registry has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Merge two registries; on key collision `other`'s rule wins.
    ///
    /// Both inputs remain valid independent registries.
    pub fn merge(&self, other: &TypeConversions) -> TypeConversions {
        let mut rules = self.rules.clone();
        for (key, rule) in &other.rules {
            rules.insert(*key, Arc::clone(rule));
        }
        TypeConversions { rules }
    }

    /// Start building a registry
    pub fn builder() -> Builder {
        Builder::default()
    }
}

impl std::fmt::Debug for TypeConversions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeConversions")
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Builder for [`TypeConversions`]
#[derive(Default)]
pub struct Builder {
    rules: HashMap<(ValueKind, TypeId), ConversionFn>,
}

impl Builder {
    /// Register a conversion from values of `kind` into `T`.
    ///
    /// The function may return `None` to decline a particular value
    /// (e.g. out-of-range narrowing); a later registration for the same
    /// key replaces the earlier one.
    pub fn register<T, F>(mut self, kind: ValueKind, convert: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&Value) -> Option<T> + Send + Sync + 'static,
    {
        self.rules.insert(
            (kind, TypeId::of::<T>()),
            Arc::new(move |value| convert(value).map(|t| Box::new(t) as Box<dyn Any + Send>)),
        );
        self
    }

    /// Finish the registry
    pub fn build(self) -> TypeConversions {
        TypeConversions { rules: self.rules }
    }
}

/// Default conversion set: checked numeric widenings and narrowings plus
/// the timestamp bridges the decoding layer relies on.
pub fn default_conversions() -> &'static TypeConversions {
    static DEFAULTS: OnceLock<TypeConversions> = OnceLock::new();
    DEFAULTS.get_or_init(|| {
        TypeConversions::builder()
            // int widening / narrowing
            .register(ValueKind::Int, |v| match v {
                Value::Int(n) => Some(*n as i64),
                _ => None,
            })
            .register(ValueKind::Int, |v| match v {
                Value::Int(n) => i16::try_from(*n).ok(),
                _ => None,
            })
            .register(ValueKind::Int, |v| match v {
                Value::Int(n) => i8::try_from(*n).ok(),
                _ => None,
            })
            .register(ValueKind::Int, |v| match v {
                Value::Int(n) => u32::try_from(*n).ok(),
                _ => None,
            })
            .register(ValueKind::Int, |v| match v {
                Value::Int(n) => u16::try_from(*n).ok(),
                _ => None,
            })
            .register(ValueKind::Int, |v| match v {
                Value::Int(n) => u8::try_from(*n).ok(),
                _ => None,
            })
            // long narrowing
            .register(ValueKind::Long, |v| match v {
                Value::Long(n) => i32::try_from(*n).ok(),
                _ => None,
            })
            .register(ValueKind::Long, |v| match v {
                Value::Long(n) => u64::try_from(*n).ok(),
                _ => None,
            })
            .register(ValueKind::Long, |v| match v {
                Value::Long(n) => Some(Decimal::from(*n)),
                _ => None,
            })
            // float bridges
            .register(ValueKind::Float, |v| match v {
                Value::Float(n) => Some(*n as f64),
                _ => None,
            })
            .register(ValueKind::Double, |v| match v {
                Value::Double(n) => Some(*n as f32),
                _ => None,
            })
            // timestamp bridges
            .register(ValueKind::DateTime, |v| match v {
                Value::DateTime(dt) => Some(dt.and_utc()),
                _ => None,
            })
            .register(ValueKind::Instant, |v| match v {
                Value::Instant(dt) => Some(dt.naive_utc()),
                _ => None,
            })
            // sqlite stores booleans as integers and temporals as text
            .register(ValueKind::Long, |v| match v {
                Value::Long(n) => Some(*n != 0),
                _ => None,
            })
            .register(ValueKind::Int, |v| match v {
                Value::Int(n) => Some(*n != 0),
                _ => None,
            })
            .register(ValueKind::Text, |v| match v {
                Value::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
                _ => None,
            })
            .register(ValueKind::Text, |v| match v {
                Value::Text(s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok(),
                _ => None,
            })
            .register(ValueKind::Text, |v| match v {
                Value::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok(),
                _ => None,
            })
            .register(ValueKind::Text, |v| match v {
                Value::Text(s) => DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z")
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc)),
                _ => None,
            })
            .register(ValueKind::Text, |v| match v {
                Value::Text(s) => s.parse::<Decimal>().ok(),
                _ => None,
            })
            .build()
    })
}
