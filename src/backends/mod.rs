//! Store backends implementing the session protocol

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod pooled_sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDataSource, SqliteSession};

#[cfg(feature = "sqlite")]
pub use pooled_sqlite::{PooledSqliteDataSource, PooledSqliteSession};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresDataSource, PostgresSession};
