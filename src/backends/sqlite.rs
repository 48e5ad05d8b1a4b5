//! SQLite backend (blocking)
//!
//! Implements the blocking session protocol over a single `rusqlite`
//! connection, and hosts the parameter/row codec shared with the pooled
//! async backend.
//!
//! SQLite has no native temporal or decimal storage classes: dates and
//! times bind as text in the formats the default conversion rules parse,
//! booleans bind as integers. Decimals are rejected at bind time.

use crate::core::error::{Error, Result};
use crate::core::query::{Outcome, Query};
use crate::core::row::{Row, RowBuilder};
use crate::core::session::{DataSource, Session};
use crate::core::value::{Value, ValueKind};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;

/// Blocking SQLite data source over one exclusive connection
pub struct SqliteDataSource {
    conn: Mutex<Connection>,
}

impl SqliteDataSource {
    /// Open a database file, creating it if absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::debug!("opened sqlite database");
        Ok(SqliteDataSource {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(SqliteDataSource {
            conn: Mutex::new(conn),
        })
    }
}

impl DataSource for SqliteDataSource {
    fn transaction<T, F>(&self, work: F) -> Result<Outcome<T>>
    where
        F: FnOnce(&mut dyn Session) -> Result<Outcome<T>>,
    {
        // one transaction at a time per connection
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN")?;

        let mut session = SqliteSession { conn: &conn };
        match work(&mut session) {
            Ok(outcome) => {
                if outcome.is_rollback() {
                    tracing::debug!("rolling back transaction on request");
                    conn.execute_batch("ROLLBACK")?;
                } else {
                    tracing::trace!("committing transaction");
                    if let Err(commit_err) = conn.execute_batch("COMMIT") {
                        let _ = conn.execute_batch("ROLLBACK");
                        return Err(commit_err.into());
                    }
                }
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(error = %err, "rolling back transaction after error");
                match conn.execute_batch("ROLLBACK") {
                    Ok(()) => Err(err),
                    Err(rollback_err) => Err(Error::rollback_failed(err, rollback_err.into())),
                }
            }
        }
    }
}

/// Session scoped to one open SQLite transaction
pub struct SqliteSession<'c> {
    conn: &'c Connection,
}

impl Session for SqliteSession<'_> {
    fn execute(&mut self, query: &Query, params: &[Value]) -> Result<u64> {
        execute_on(self.conn, query, params)
    }

    fn execute_batch(&mut self, query: &Query, param_lists: &[Vec<Value>]) -> Result<u64> {
        execute_batch_on(self.conn, query, param_lists)
    }

    fn query(&mut self, query: &Query, params: &[Value]) -> Result<Vec<Row>> {
        query_on(self.conn, query, params)
    }
}

pub(crate) fn execute_on(conn: &Connection, query: &Query, params: &[Value]) -> Result<u64> {
    let mut stmt = conn.prepare(query.text())?;
    check_param_count(stmt.parameter_count(), params.len())?;
    let bound = bind_values(params)?;
    let affected = stmt.execute(rusqlite::params_from_iter(bound.iter()))?;
    Ok(affected as u64)
}

pub(crate) fn execute_batch_on(
    conn: &Connection,
    query: &Query,
    param_lists: &[Vec<Value>],
) -> Result<u64> {
    let mut stmt = conn.prepare(query.text())?;
    let expected = stmt.parameter_count();
    let mut affected = 0u64;
    for params in param_lists {
        check_param_count(expected, params.len())?;
        let bound = bind_values(params)?;
        affected += stmt.execute(rusqlite::params_from_iter(bound.iter()))? as u64;
    }
    Ok(affected)
}

pub(crate) fn query_on(conn: &Connection, query: &Query, params: &[Value]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(query.text())?;
    check_param_count(stmt.parameter_count(), params.len())?;

    let columns: Vec<(String, Option<String>)> = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(String::from)))
        .collect();

    let bound = bind_values(params)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter()))?;
    let mut decoded = Vec::new();
    while let Some(raw) = rows.next()? {
        decoded.push(decode_row(raw, &columns)?);
    }
    Ok(decoded)
}

fn check_param_count(expected: usize, supplied: usize) -> Result<()> {
    if expected != supplied {
        return Err(Error::ParameterCountMismatch { expected, supplied });
    }
    Ok(())
}

// Binding by kind; every variant is either mapped to one of SQLite's four
// storage classes or rejected.
pub(crate) fn bind_values(params: &[Value]) -> Result<Vec<rusqlite::types::Value>> {
    use rusqlite::types::Value as Sql;

    params
        .iter()
        .enumerate()
        .map(|(index, value)| {
            Ok(match value {
                Value::Null => Sql::Null,
                Value::Bool(v) => Sql::Integer(i64::from(*v)),
                Value::Int(v) => Sql::Integer(i64::from(*v)),
                Value::Long(v) => Sql::Integer(*v),
                Value::Float(v) => Sql::Real(f64::from(*v)),
                Value::Double(v) => Sql::Real(*v),
                Value::Text(v) => Sql::Text(v.clone()),
                Value::Bytes(v) => Sql::Blob(v.clone()),
                Value::Date(v) => Sql::Text(v.format("%Y-%m-%d").to_string()),
                Value::Time(v) => Sql::Text(v.format("%H:%M:%S%.f").to_string()),
                Value::DateTime(v) => Sql::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
                Value::Instant(v) => Sql::Text(v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()),
                Value::Decimal(_) => {
                    return Err(Error::UnsupportedParameterType {
                        index,
                        kind: ValueKind::Decimal,
                    })
                }
            })
        })
        .collect()
}

// SQLite type affinity rules, applied to the declared column type so a NULL
// column still carries its kind metadata
fn declared_kind(decl_type: &str) -> Option<ValueKind> {
    let decl = decl_type.to_ascii_uppercase();
    if decl.contains("INT") {
        Some(ValueKind::Long)
    } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
        Some(ValueKind::Text)
    } else if decl.contains("BLOB") {
        Some(ValueKind::Bytes)
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        Some(ValueKind::Double)
    } else {
        None
    }
}

fn decode_row(raw: &rusqlite::Row<'_>, columns: &[(String, Option<String>)]) -> Result<Row> {
    let mut builder = RowBuilder::new();
    for (index, (name, decl_type)) in columns.iter().enumerate() {
        let (value, declared) = match raw.get_ref(index)? {
            ValueRef::Null => (Value::Null, decl_type.as_deref().and_then(declared_kind)),
            ValueRef::Integer(v) => (Value::Long(v), Some(ValueKind::Long)),
            ValueRef::Real(v) => (Value::Double(v), Some(ValueKind::Double)),
            ValueRef::Text(bytes) => (
                Value::Text(String::from_utf8_lossy(bytes).into_owned()),
                Some(ValueKind::Text),
            ),
            ValueRef::Blob(bytes) => (Value::Bytes(bytes.to_vec()), Some(ValueKind::Bytes)),
        };
        builder.column_with(name.clone(), value, declared, decl_type.clone());
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::MapperRegistry;
    use crate::mapped_record;
    use rust_decimal::Decimal;

    fn data_source() -> SqliteDataSource {
        let ds = SqliteDataSource::open_in_memory().unwrap();
        ds.transaction(|session| {
            session.execute(
                &Query::new(
                    "CREATE TABLE books (
                         title TEXT NOT NULL,
                         author TEXT NOT NULL,
                         pages INTEGER
                     )",
                ),
                &[],
            )?;
            Ok(Outcome::commit(()))
        })
        .unwrap();
        ds
    }

    mapped_record! {
        #[derive(Debug, PartialEq)]
        struct Book {
            title: String,
            author: String,
            pages: Option<i64>,
        }
    }

    #[test]
    fn test_committed_writes_are_visible() {
        let ds = data_source();
        ds.transaction(|session| {
            session.execute(
                &Query::new("INSERT INTO books (title, author, pages) VALUES (?, ?, ?)"),
                &["Dune".into(), "Herbert".into(), Value::Long(412)],
            )?;
            Ok(Outcome::commit(()))
        })
        .unwrap();

        let registry = MapperRegistry::new();
        let books = ds
            .transaction(|session| {
                let books: Vec<Book> = registry.fetch(
                    session,
                    &Query::new("SELECT title, author, pages FROM books"),
                    &[],
                )?;
                Ok(Outcome::commit(books))
            })
            .unwrap()
            .into_committed()
            .unwrap();

        assert_eq!(
            books,
            vec![Book {
                title: "Dune".into(),
                author: "Herbert".into(),
                pages: Some(412),
            }]
        );
    }

    #[test]
    fn test_rollback_outcome_discards_writes() {
        let ds = data_source();
        let outcome = ds
            .transaction(|session| {
                session.execute(
                    &Query::new("INSERT INTO books (title, author) VALUES (?, ?)"),
                    &["Ghost".into(), "Nobody".into()],
                )?;
                Ok(Outcome::<()>::Rollback)
            })
            .unwrap();
        assert!(outcome.is_rollback());

        let registry = MapperRegistry::new();
        let counts = ds
            .transaction(|session| {
                let counts: Vec<i64> =
                    registry.fetch_scalar(session, &Query::new("SELECT COUNT(*) FROM books"), &[])?;
                Ok(Outcome::commit(counts))
            })
            .unwrap()
            .into_committed()
            .unwrap();
        assert_eq!(counts, vec![0]);
    }

    #[test]
    fn test_error_rolls_back_and_reraises() {
        let ds = data_source();
        let err = ds
            .transaction::<(), _>(|session| {
                session.execute(
                    &Query::new("INSERT INTO books (title, author) VALUES (?, ?)"),
                    &["Ghost".into(), "Nobody".into()],
                )?;
                Err(Error::other("unit of work failed"))
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "unit of work failed");

        let registry = MapperRegistry::new();
        let counts = ds
            .transaction(|session| {
                let counts: Vec<i64> =
                    registry.fetch_scalar(session, &Query::new("SELECT COUNT(*) FROM books"), &[])?;
                Ok(Outcome::commit(counts))
            })
            .unwrap()
            .into_committed()
            .unwrap();
        assert_eq!(counts, vec![0]);
    }

    #[test]
    fn test_param_count_checked_before_execution() {
        let ds = data_source();
        let err = ds
            .transaction::<(), _>(|session| {
                session.execute(
                    &Query::new("INSERT INTO books (title, author, pages) VALUES (?, ?, ?)"),
                    &["Dune".into(), "Herbert".into()],
                )?;
                Ok(Outcome::commit(()))
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ParameterCountMismatch {
                expected: 3,
                supplied: 2,
            }
        ));
    }

    #[test]
    fn test_decimal_parameter_is_unsupported() {
        let ds = data_source();
        let err = ds
            .transaction::<(), _>(|session| {
                session.execute(
                    &Query::new("INSERT INTO books (title, author, pages) VALUES (?, ?, ?)"),
                    &[
                        "Dune".into(),
                        "Herbert".into(),
                        Value::Decimal(Decimal::new(1250, 2)),
                    ],
                )?;
                Ok(Outcome::commit(()))
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedParameterType {
                index: 2,
                kind: ValueKind::Decimal,
            }
        ));
    }

    #[test]
    fn test_execute_batch_binds_each_list() {
        let ds = data_source();
        let affected = ds
            .transaction(|session| {
                let affected = session.execute_batch(
                    &Query::new("INSERT INTO books (title, author) VALUES (?, ?)"),
                    &[
                        vec!["Dune".into(), "Herbert".into()],
                        vec!["Emma".into(), "Austen".into()],
                    ],
                )?;
                Ok(Outcome::commit(affected))
            })
            .unwrap()
            .into_committed()
            .unwrap();
        assert_eq!(affected, 2);
    }

    #[test]
    fn test_decode_carries_declared_type_into_errors() {
        let ds = data_source();
        ds.transaction(|session| {
            session.execute(
                &Query::new("INSERT INTO books (title, author, pages) VALUES (?, ?, ?)"),
                &["Dune".into(), "Herbert".into(), Value::Long(412)],
            )?;
            Ok(Outcome::commit(()))
        })
        .unwrap();

        let err = ds
            .transaction::<(), _>(|session| {
                let rows = session.query(&Query::new("SELECT pages FROM books"), &[])?;
                rows[0].get::<Vec<u8>>("pages")?;
                Ok(Outcome::commit(()))
            })
            .unwrap_err();
        assert!(err.to_string().contains("INTEGER"));
    }

    #[test]
    fn test_null_column_keeps_declared_kind() {
        let ds = data_source();
        let rows = ds
            .transaction(|session| {
                session.execute(
                    &Query::new("INSERT INTO books (title, author, pages) VALUES (?, ?, ?)"),
                    &["Dune".into(), "Herbert".into(), Value::Null],
                )?;
                let rows = session.query(&Query::new("SELECT pages FROM books"), &[])?;
                Ok(Outcome::commit(rows))
            })
            .unwrap()
            .into_committed()
            .unwrap();

        let pages = rows[0].column("pages").unwrap();
        assert!(pages.value.is_null());
        assert_eq!(pages.declared, Some(ValueKind::Long));
        assert_eq!(pages.source_type_name.as_deref(), Some("INTEGER"));
    }

    #[test]
    fn test_temporal_and_bool_round_trip() {
        let ds = SqliteDataSource::open_in_memory().unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let moment = date.and_hms_opt(12, 30, 0).unwrap();

        let row = ds
            .transaction(|session| {
                session.execute(
                    &Query::new("CREATE TABLE events (day TEXT, at TEXT, done INTEGER)"),
                    &[],
                )?;
                session.execute(
                    &Query::new("INSERT INTO events VALUES (?, ?, ?)"),
                    &[date.into(), moment.into(), true.into()],
                )?;
                let rows = session.query(&Query::new("SELECT * FROM events"), &[])?;
                Ok(Outcome::commit(rows))
            })
            .unwrap()
            .into_committed()
            .unwrap();

        let row = &row[0];
        assert_eq!(row.get::<chrono::NaiveDate>("day").unwrap(), date);
        assert_eq!(row.get::<chrono::NaiveDateTime>("at").unwrap(), moment);
        assert!(row.get::<bool>("done").unwrap());
    }
}
