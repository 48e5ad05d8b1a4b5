//! Typed query helpers
//!
//! These helpers connect the mapping layer to the session protocol: run a
//! query through a session and map every result row with the resolved
//! mapper, or read single-column rows as scalars.

use crate::core::error::{Error, Result};
use crate::core::mapper::Mapped;
use crate::core::query::Query;
use crate::core::registry::MapperRegistry;
use crate::core::row::Row;
use crate::core::session::{Session, SuspendingSession};
use crate::core::value::{FromValue, Value};
use futures::stream::BoxStream;
use futures::StreamExt;

impl MapperRegistry {
    /// Run a query and map every row into `T`
    pub fn fetch<T, S>(&self, session: &mut S, query: &Query, params: &[Value]) -> Result<Vec<T>>
    where
        T: Mapped,
        S: Session + ?Sized,
    {
        let mapper = self.resolve_row_mapper::<T>()?;
        let rows = session.query(query, params)?;
        rows.iter().map(|row| mapper.map_row(row, self)).collect()
    }

    /// Run a query whose rows have exactly one column and read that column
    /// as `T`
    pub fn fetch_scalar<T, S>(
        &self,
        session: &mut S,
        query: &Query,
        params: &[Value],
    ) -> Result<Vec<T>>
    where
        T: FromValue,
        S: Session + ?Sized,
    {
        let rows = session.query(query, params)?;
        rows.iter().map(|row| self.scalar_from(row)).collect()
    }

    /// Async counterpart of [`MapperRegistry::fetch`]
    pub async fn fetch_async<T: Mapped>(
        &self,
        session: &dyn SuspendingSession,
        query: &Query,
        params: &[Value],
    ) -> Result<Vec<T>> {
        let mapper = self.resolve_row_mapper::<T>()?;
        let mut rows = session.query(query, params).await?;
        let mut mapped = Vec::new();
        while let Some(row) = rows.next().await {
            mapped.push(mapper.map_row(&row?, self)?);
        }
        Ok(mapped)
    }

    /// Async counterpart of [`MapperRegistry::fetch_scalar`]
    pub async fn fetch_scalar_async<T: FromValue>(
        &self,
        session: &dyn SuspendingSession,
        query: &Query,
        params: &[Value],
    ) -> Result<Vec<T>> {
        let mut rows = session.query(query, params).await?;
        let mut scalars = Vec::new();
        while let Some(row) = rows.next().await {
            scalars.push(self.scalar_from(&row?)?);
        }
        Ok(scalars)
    }

    /// Run a query and map rows lazily as the stream yields them
    pub async fn fetch_stream<'a, T: Mapped>(
        &'a self,
        session: &dyn SuspendingSession,
        query: &Query,
        params: &[Value],
    ) -> Result<BoxStream<'a, Result<T>>> {
        let mapper = self.resolve_row_mapper::<T>()?;
        let rows = session.query(query, params).await?;
        Ok(rows
            .map(move |row| mapper.map_row(&row?, self))
            .boxed())
    }

    fn scalar_from<T: FromValue>(&self, row: &Row) -> Result<T> {
        row.single_value()?;
        let name = row.column_names().next().ok_or(Error::ArityMismatch {
            found: 0,
            columns: Vec::new(),
        })?;
        row.get_with(name, self.conversions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapped_record;

    struct CannedSession {
        rows: Vec<Row>,
        seen: Vec<(Query, Vec<Value>)>,
    }

    impl CannedSession {
        fn new(rows: Vec<Row>) -> Self {
            CannedSession {
                rows,
                seen: Vec::new(),
            }
        }
    }

    impl Session for CannedSession {
        fn execute(&mut self, query: &Query, params: &[Value]) -> Result<u64> {
            self.seen.push((query.clone(), params.to_vec()));
            Ok(1)
        }

        fn execute_batch(&mut self, query: &Query, param_lists: &[Vec<Value>]) -> Result<u64> {
            for params in param_lists {
                self.execute(query, params)?;
            }
            Ok(param_lists.len() as u64)
        }

        fn query(&mut self, query: &Query, params: &[Value]) -> Result<Vec<Row>> {
            self.seen.push((query.clone(), params.to_vec()));
            Ok(self.rows.clone())
        }
    }

    mapped_record! {
        #[derive(Debug, PartialEq)]
        struct Book {
            title: String,
            pages: Option<i64>,
        }
    }

    #[test]
    fn test_fetch_maps_every_row() {
        let registry = MapperRegistry::new();
        let mut session = CannedSession::new(vec![
            Row::of([("title", Value::Text("Dune".into())), ("pages", Value::Long(412))]),
            Row::of([("title", Value::Text("Emma".into())), ("pages", Value::Null)]),
        ]);

        let books: Vec<Book> = registry
            .fetch(&mut session, &Query::new("SELECT title, pages FROM books"), &[])
            .unwrap();
        assert_eq!(
            books,
            vec![
                Book {
                    title: "Dune".into(),
                    pages: Some(412),
                },
                Book {
                    title: "Emma".into(),
                    pages: None,
                },
            ]
        );
    }

    #[test]
    fn test_fetch_fails_fast_on_bad_row() {
        let registry = MapperRegistry::new();
        let mut session = CannedSession::new(vec![
            Row::of([("title", Value::Long(1)), ("pages", Value::Null)]),
        ]);

        let result: Result<Vec<Book>> =
            registry.fetch(&mut session, &Query::new("SELECT 1"), &[]);
        assert!(matches!(result.unwrap_err(), Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_fetch_scalar() {
        let registry = MapperRegistry::new();
        let mut session = CannedSession::new(vec![
            Row::of([("count", Value::Long(3))]),
        ]);

        let counts: Vec<i64> = registry
            .fetch_scalar(&mut session, &Query::new("SELECT COUNT(*) FROM books"), &[])
            .unwrap();
        assert_eq!(counts, vec![3]);

        // scalar reads go through conversions too
        let counts: Vec<i32> = registry
            .fetch_scalar(&mut session, &Query::new("SELECT COUNT(*) FROM books"), &[])
            .unwrap();
        assert_eq!(counts, vec![3]);
    }

    #[test]
    fn test_fetch_scalar_rejects_wide_rows() {
        let registry = MapperRegistry::new();
        let mut session = CannedSession::new(vec![
            Row::of([("a", Value::Long(1)), ("b", Value::Long(2))]),
        ]);

        let result: Result<Vec<i64>> =
            registry.fetch_scalar(&mut session, &Query::new("SELECT a, b"), &[]);
        assert!(matches!(
            result.unwrap_err(),
            Error::ArityMismatch { found: 2, .. }
        ));
    }
}
