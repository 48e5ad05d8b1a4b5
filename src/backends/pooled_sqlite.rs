//! SQLite backend (async, pooled)
//!
//! Implements the async session protocol on top of `deadpool-sqlite`. Each
//! transaction checks one connection out of the pool and keeps it for the
//! whole unit of work; statements run on the pool's worker thread via
//! `interact`. The parameter and row codec is shared with the blocking
//! backend.

use crate::backends::sqlite::{execute_batch_on, execute_on, query_on};
use crate::core::error::{Error, Result};
use crate::core::query::{Outcome, Query};
use crate::core::session::{
    JobTracker, ParamStream, RowStream, StreamingJob, SuspendingDataSource, SuspendingSession,
};
use crate::core::value::Value;
use async_trait::async_trait;
use deadpool_sqlite::{Config, Object, Pool, Runtime};
use futures::future::BoxFuture;
use futures::StreamExt;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;

/// Async SQLite data source backed by a connection pool
pub struct PooledSqliteDataSource {
    pool: Pool,
}

impl PooledSqliteDataSource {
    /// Create a pool for a database path or URI
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let pool = Config::new(path.into())
            .create_pool(Runtime::Tokio1)
            .map_err(|e| Error::connection(format!("Failed to create pool: {}", e)))?;
        Ok(PooledSqliteDataSource { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool) -> Self {
        PooledSqliteDataSource { pool }
    }
}

async fn interact<R, F>(conn: &Object, op: F) -> Result<R>
where
    F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    conn.interact(op)
        .await
        .map_err(|e| Error::connection(format!("Connection worker failed: {}", e)))?
}

// Rolls back if the unit of work is dropped mid-flight: the connection must
// not return to the pool with its transaction still open.
struct RollbackOnDrop {
    conn: Arc<Object>,
    armed: bool,
}

impl RollbackOnDrop {
    fn new(conn: Arc<Object>) -> Self {
        RollbackOnDrop { conn, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RollbackOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let conn = Arc::clone(&self.conn);
        // the spawned task holds the last Arc, so the connection re-enters
        // the pool only after the rollback has run
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                tracing::warn!("rolling back transaction abandoned by cancellation");
                let _ = interact(&conn, |c| c.execute_batch("ROLLBACK").map_err(Error::from)).await;
            });
        }
    }
}

#[async_trait]
impl SuspendingDataSource for PooledSqliteDataSource {
    async fn transaction<T, F>(&self, work: F) -> Result<Outcome<T>>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a dyn SuspendingSession) -> BoxFuture<'a, Result<Outcome<T>>> + Send,
    {
        let conn = Arc::new(
            self.pool
                .get()
                .await
                .map_err(|e| Error::connection(format!("Failed to get connection: {}", e)))?,
        );
        interact(&conn, |c| c.execute_batch("BEGIN").map_err(Error::from)).await?;
        let mut open = RollbackOnDrop::new(Arc::clone(&conn));

        let session = PooledSqliteSession {
            conn: Arc::clone(&conn),
            jobs: JobTracker::new(),
        };
        let result = work(&session).await;

        // streaming jobs must settle before the commit decision
        let result = match result {
            Ok(outcome) => session.jobs.finish().await.map(|()| outcome),
            Err(err) => {
                let _ = session.jobs.finish().await;
                Err(err)
            }
        };

        let settled = match result {
            Ok(outcome) => {
                if outcome.is_rollback() {
                    tracing::debug!("rolling back transaction on request");
                    interact(&conn, |c| c.execute_batch("ROLLBACK").map_err(Error::from))
                        .await
                        .map(|()| outcome)
                } else {
                    tracing::trace!("committing transaction");
                    match interact(&conn, |c| c.execute_batch("COMMIT").map_err(Error::from)).await
                    {
                        Ok(()) => Ok(outcome),
                        Err(commit_err) => {
                            let _ = interact(&conn, |c| {
                                c.execute_batch("ROLLBACK").map_err(Error::from)
                            })
                            .await;
                            Err(commit_err)
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "rolling back transaction after error");
                match interact(&conn, |c| c.execute_batch("ROLLBACK").map_err(Error::from)).await {
                    Ok(()) => Err(err),
                    Err(rollback_err) => Err(Error::rollback_failed(err, rollback_err)),
                }
            }
        };
        open.disarm();
        settled
    }
}

/// Session scoped to one open transaction on a pooled connection
pub struct PooledSqliteSession {
    conn: Arc<Object>,
    jobs: JobTracker,
}

#[async_trait]
impl SuspendingSession for PooledSqliteSession {
    async fn execute(&self, query: &Query, params: &[Value]) -> Result<u64> {
        let query = query.clone();
        let params = params.to_vec();
        interact(&self.conn, move |c| execute_on(c, &query, &params)).await
    }

    async fn execute_batch(&self, query: &Query, param_lists: &[Vec<Value>]) -> Result<u64> {
        let query = query.clone();
        let param_lists = param_lists.to_vec();
        interact(&self.conn, move |c| {
            execute_batch_on(c, &query, &param_lists)
        })
        .await
    }

    async fn execute_stream(&self, query: &Query, mut params: ParamStream) -> Result<StreamingJob> {
        let conn = Arc::clone(&self.conn);
        let query = query.clone();
        self.jobs.spawn(async move {
            let mut affected = 0u64;
            while let Some(list) = params.next().await {
                let list = list?;
                let query = query.clone();
                affected += interact(&conn, move |c| execute_on(c, &query, &list)).await?;
            }
            Ok(affected)
        })
    }

    async fn query(&self, query: &Query, params: &[Value]) -> Result<RowStream> {
        let query = query.clone();
        let params = params.to_vec();
        // rows are materialized on the worker thread, then streamed
        let rows = interact(&self.conn, move |c| query_on(c, &query, &params)).await?;
        Ok(futures::stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}
