//! # rowmap
//!
//! A typed data-mapping and transactional-access layer for SQL stores.
//! `rowmap` decodes query results into a store-independent row model, maps
//! rows into plain Rust types through a pluggable resolution pipeline, and
//! scopes all statement execution to explicit transactions with blocking and
//! async flavors.
//!
//! ## Features
//!
//! - **Typed rows**: a closed value model with per-column type metadata
//! - **Conversions**: single-hop, override-by-merge conversion rules
//! - **Mapper resolution**: explicit registration, discovery sources, and a
//!   structural fallback driven by record shape
//! - **Transactions**: one transaction per unit of work, commit/rollback
//!   decided by the closure's [`Outcome`]
//! - **Streaming**: async parameter streaming for writes and row streaming
//!   for reads
//!
//! ## Quick Start
//!
//! ```rust
//! use rowmap::prelude::*;
//!
//! mapped_record! {
//!     #[derive(Debug, PartialEq)]
//!     pub struct Book {
//!         pub title: String,
//!         pub author: String,
//!         pub pages: Option<i64>,
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let ds = SqliteDataSource::open_in_memory()?;
//!     let registry = MapperRegistry::new();
//!
//!     let books = ds
//!         .transaction(|session| {
//!             session.execute(
//!                 &Query::new(
//!                     "CREATE TABLE books (title TEXT NOT NULL, author TEXT NOT NULL, pages INTEGER)",
//!                 ),
//!                 &[],
//!             )?;
//!             session.execute(
//!                 &Query::new("INSERT INTO books VALUES (?, ?, ?)"),
//!                 &["Dune".into(), "Frank Herbert".into(), Value::Long(412)],
//!             )?;
//!             let books: Vec<Book> =
//!                 registry.fetch(session, &Query::new("SELECT * FROM books"), &[])?;
//!             Ok(Outcome::commit(books))
//!         })?
//!         .into_committed()
//!         .unwrap();
//!
//!     assert_eq!(books[0].title, "Dune");
//!     Ok(())
//! }
//! ```

/// Core mapping and session abstractions
pub mod core;

/// Store backend implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rowmap::prelude::*;
///
/// fn main() -> Result<()> {
///     let ds = SqliteDataSource::open_in_memory()?;
///     ds.transaction(|session| {
///         session.execute(&Query::new("CREATE TABLE t (x INTEGER)"), &[])?;
///         Ok(Outcome::commit(()))
///     })?;
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::core::{
        DataSource, Error, Mapped, MapperRegistry, Outcome, Query, Result, Row, RowMapper,
        Session, SuspendingDataSource, SuspendingSession, Value, ValueKind,
    };
    pub use crate::mapped_record;

    #[cfg(feature = "sqlite")]
    pub use crate::backends::{PooledSqliteDataSource, SqliteDataSource};

    #[cfg(feature = "postgres")]
    pub use crate::backends::PostgresDataSource;
}

// Re-export at root level for convenience
pub use crate::core::{
    default_conversions, Column, DataSource, ErasedRowMapper, Error, FieldSpec, FromValue,
    JobTracker, Mapped, MapperRegistry, MapperRegistryBuilder, MapperSource, Outcome, ParamStream,
    Parts, Query, RecordDescriptor, Result, Row, RowBuilder, RowMapper, RowStream, Session,
    StreamingJob, StructuralMapper, SuspendingDataSource, SuspendingSession, TypeConversions,
    TypeDescriptor, Value, ValueKind,
};

#[cfg(feature = "sqlite")]
pub use crate::backends::{PooledSqliteDataSource, SqliteDataSource};

#[cfg(feature = "postgres")]
pub use crate::backends::PostgresDataSource;
