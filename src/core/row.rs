//! Row and column model
//!
//! A [`Row`] is an immutable, ordered, name-unique collection of columns.
//! Typed reads go through the active conversion registry first and fall
//! back to a structural cast.

use crate::core::convert::{default_conversions, TypeConversions};
use crate::core::error::{Error, Result};
use crate::core::value::{FromValue, Value, ValueKind};

/// A named value plus optional type metadata reported by the store.
///
/// The metadata is advisory: it is used for diagnostics and type-directed
/// decoding, never for equality.
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Column {
    /// The stored value; `Value::Null` models SQL NULL
    pub value: Value,
    /// Normalized kind tag the decoding layer derived from the store's
    /// reported column type
    pub declared: Option<ValueKind>,
    /// The store's own name for the column type (e.g. "INTEGER", "varchar")
    pub source_type_name: Option<String>,
}

impl Column {
    /// Column carrying only a value, no metadata
    pub fn of(value: impl Into<Value>) -> Self {
        Column {
            value: value.into(),
            declared: None,
            source_type_name: None,
        }
    }
}

/// One query-result record: an immutable ordered mapping from unique column
/// names to [`Column`]s. Equality and hashing are structural.
#[derive(Debug, Clone, PartialEq, Hash, Default)]
pub struct Row {
    columns: Vec<(String, Column)>,
}

impl Row {
    /// Build a row from literal `(name, value)` pairs.
    ///
    /// Intended for tests and hand-built in-memory stores; production rows
    /// are built column-by-column by the decoding layer via [`RowBuilder`].
    /// A repeated name replaces the earlier column, keeping names unique.
    pub fn of<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<Value>,
    {
        let mut builder = RowBuilder::new();
        for (name, value) in pairs {
            builder.column(name.into(), Column::of(value));
        }
        builder.finish()
    }

    /// Column names, in decode order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The value of the row's only column.
    ///
    /// Fails with `ArityMismatch` unless the row has exactly one column.
    pub fn single_value(&self) -> Result<&Value> {
        if self.columns.len() != 1 {
            return Err(Error::ArityMismatch {
                found: self.columns.len(),
                columns: self.column_names().map(String::from).collect(),
            });
        }
        Ok(&self.columns[0].1.value)
    }

    /// Look up a column with its metadata
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    fn resolve_column(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| {
            Error::column_not_found(name, self.column_names().map(String::from).collect())
        })
    }

    /// Read a non-null column as `T` using the given conversion registry.
    ///
    /// Fails with `ColumnNotFound` if the column is absent, `TypeMismatch`
    /// if it is null or cannot be converted nor cast to `T`.
    pub fn get_with<T: FromValue>(&self, name: &str, conversions: &TypeConversions) -> Result<T> {
        let column = self.resolve_column(name)?;
        if column.value.is_null() {
            return Err(Error::null_value(name, T::type_label()));
        }
        self.coerce(name, column, conversions)
    }

    /// Read a column as `T`, mapping SQL NULL to `None`.
    ///
    /// A missing column is still `ColumnNotFound`: nullability is a property
    /// of the value, not of column presence.
    pub fn get_opt_with<T: FromValue>(
        &self,
        name: &str,
        conversions: &TypeConversions,
    ) -> Result<Option<T>> {
        let column = self.resolve_column(name)?;
        if column.value.is_null() {
            return Ok(None);
        }
        self.coerce(name, column, conversions).map(Some)
    }

    /// [`Row::get_with`] against the process default conversion set
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T> {
        self.get_with(name, default_conversions())
    }

    /// [`Row::get_opt_with`] against the process default conversion set
    pub fn get_opt<T: FromValue>(&self, name: &str) -> Result<Option<T>> {
        self.get_opt_with(name, default_conversions())
    }

    // Conversion rule first, structural cast second, TypeMismatch last.
    fn coerce<T: FromValue>(
        &self,
        name: &str,
        column: &Column,
        conversions: &TypeConversions,
    ) -> Result<T> {
        if let Some(converted) = conversions.convert::<T>(&column.value) {
            return Ok(converted);
        }
        T::from_value(&column.value).ok_or_else(|| {
            Error::type_mismatch(
                name,
                column.source_type_name.as_deref(),
                column.value.kind().name(),
                T::type_label(),
            )
        })
    }
}

/// Incremental row construction used by the decoding layer
#[derive(Debug, Default)]
pub struct RowBuilder {
    columns: Vec<(String, Column)>,
}

impl RowBuilder {
    /// Start an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column; a repeated name replaces the earlier column
    pub fn column(&mut self, name: impl Into<String>, column: Column) -> &mut Self {
        let name = name.into();
        if let Some(existing) = self.columns.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = column;
        } else {
            self.columns.push((name, column));
        }
        self
    }

    /// Add a column with full metadata
    pub fn column_with(
        &mut self,
        name: impl Into<String>,
        value: Value,
        declared: Option<ValueKind>,
        source_type_name: Option<String>,
    ) -> &mut Self {
        self.column(
            name,
            Column {
                value,
                declared,
                source_type_name,
            },
        )
    }

    /// Finish the row
    pub fn finish(self) -> Row {
        Row {
            columns: self.columns,
        }
    }
}
