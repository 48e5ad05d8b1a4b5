//! Transactional session protocol
//!
//! A data source opens exactly one transaction per unit of work and hands the
//! closure a session scoped to it. The closure's [`Outcome`] decides commit
//! versus rollback; a closure error always rolls back and the original error
//! is re-raised.

use crate::core::error::{Error, Result};
use crate::core::query::Query;
use crate::core::row::Row;
use crate::core::value::Value;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use crate::core::query::Outcome;

/// Stream of parameter lists consumed by a streaming write
pub type ParamStream = BoxStream<'static, Result<Vec<Value>>>;

/// Stream of decoded result rows
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Blocking session scoped to one open transaction
pub trait Session {
    /// Run a statement with positional parameters, returning the affected
    /// row count
    fn execute(&mut self, query: &Query, params: &[Value]) -> Result<u64>;

    /// Run one prepared statement once per parameter list
    fn execute_batch(&mut self, query: &Query, param_lists: &[Vec<Value>]) -> Result<u64>;

    /// Run a query and decode every result row
    fn query(&mut self, query: &Query, params: &[Value]) -> Result<Vec<Row>>;
}

/// Blocking transactional data source
pub trait DataSource {
    /// Run `work` inside a transaction.
    ///
    /// Commits on `Outcome::Commit`, rolls back on `Outcome::Rollback` or on
    /// error. If the rollback after an error itself fails, both errors are
    /// reported via [`Error::RollbackFailed`].
    fn transaction<T, F>(&self, work: F) -> Result<Outcome<T>>
    where
        F: FnOnce(&mut dyn Session) -> Result<Outcome<T>>;
}

/// Async session scoped to one open transaction
#[async_trait]
pub trait SuspendingSession: Send + Sync {
    /// Run a statement with positional parameters, returning the affected
    /// row count
    async fn execute(&self, query: &Query, params: &[Value]) -> Result<u64>;

    /// Run one prepared statement once per parameter list
    async fn execute_batch(&self, query: &Query, param_lists: &[Vec<Value>]) -> Result<u64>;

    /// Start a background write that binds parameter lists as the stream
    /// yields them. The transaction waits for all streaming jobs before it
    /// decides commit or rollback.
    async fn execute_stream(&self, query: &Query, params: ParamStream) -> Result<StreamingJob>;

    /// Run a query, yielding decoded rows as a stream
    async fn query(&self, query: &Query, params: &[Value]) -> Result<RowStream>;
}

/// Async transactional data source
#[async_trait]
pub trait SuspendingDataSource: Send + Sync {
    /// Async counterpart of [`DataSource::transaction`], same commit and
    /// rollback rules. Streaming jobs started by the closure are drained
    /// before the outcome is applied; a failed or cancelled job rolls the
    /// transaction back.
    async fn transaction<T, F>(&self, work: F) -> Result<Outcome<T>>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a dyn SuspendingSession) -> BoxFuture<'a, Result<Outcome<T>>> + Send;
}

/// Handle to a background streaming write.
///
/// Dropping the handle detaches the job; the owning transaction still waits
/// for it. [`StreamingJob::join`] reports the job's own result early,
/// [`StreamingJob::abort`] cancels it, which the transaction treats as a
/// failure.
pub struct StreamingJob {
    handle: JoinHandle<()>,
    outcome: oneshot::Receiver<std::result::Result<u64, String>>,
}

impl StreamingJob {
    /// Wait for the job and return the number of affected rows.
    ///
    /// A cancelled job reports a transaction error, never success.
    pub async fn join(self) -> Result<u64> {
        match self.outcome.await {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(message)) => Err(Error::transaction(message)),
            Err(_) => Err(Error::transaction(
                "streaming execution cancelled before completion",
            )),
        }
    }

    /// Cancel the job
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for StreamingJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamingJob")
    }
}

/// Tracks the streaming jobs a session has spawned so the owning transaction
/// can drain them before deciding commit or rollback.
///
/// Each job reports its result twice: to the tracker for the commit decision
/// and to the job handle for the caller. A job that vanishes without
/// reporting (cancelled or panicked) counts as a failure.
pub struct JobTracker {
    sender: parking_lot::Mutex<Option<mpsc::UnboundedSender<Result<u64>>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<u64>>>,
    spawned: AtomicUsize,
}

impl JobTracker {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        JobTracker {
            sender: parking_lot::Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            spawned: AtomicUsize::new(0),
        }
    }

    /// Spawn a streaming job and register it for the final drain
    pub fn spawn<Fut>(&self, job: Fut) -> Result<StreamingJob>
    where
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| Error::transaction("session is already completing"))?;
        self.spawned.fetch_add(1, Ordering::SeqCst);

        let (done_tx, done_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let result = job.await;
            let summary = result.as_ref().map(|n| *n).map_err(|e| e.to_string());
            let _ = sender.send(result);
            let _ = done_tx.send(summary);
        });

        Ok(StreamingJob {
            handle,
            outcome: done_rx,
        })
    }

    /// Wait for every spawned job; no new jobs can start afterwards.
    ///
    /// Returns the first job failure, or a transaction error if a job was
    /// cancelled without reporting a result.
    pub async fn finish(&self) -> Result<()> {
        drop(self.sender.lock().take());

        let mut receiver = self.receiver.lock().await;
        let expected = self.spawned.load(Ordering::SeqCst);
        let mut received = 0usize;
        let mut first_error = None;
        while let Some(result) = receiver.recv().await {
            received += 1;
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        if received != expected {
            return Err(Error::transaction(
                "streaming execution cancelled before completion",
            ));
        }
        Ok(())
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}
