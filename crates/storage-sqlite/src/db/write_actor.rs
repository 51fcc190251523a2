//! All writes go through one dedicated thread, each job inside an
//! immediate transaction.

use std::sync::Arc;

use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use pocketledger_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send>;

#[derive(Clone, Debug)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

pub fn spawn_writer(pool: Arc<DbPool>) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    std::thread::Builder::new()
        .name("pocketledger-writer".to_string())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut *conn),
                    // Dropping the job drops its reply channel; the caller sees the failure.
                    Err(err) => error!("[Store] Writer could not get a connection: {}", err),
                }
            }
        })
        .map(|_| ())
        .unwrap_or_else(|err| error!("[Store] Failed to start writer thread: {}", err));
    WriteHandle { tx }
}

impl WriteHandle {
    /// Runs `job` on the writer thread inside one immediate transaction.
    /// An `Err` from `job` rolls the transaction back and is returned as is.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped: Job = Box::new(move |conn| {
            let _ = reply_tx.send(run_in_transaction(conn, job));
        });
        self.tx.send(wrapped).map_err(|_| writer_gone())?;
        reply_rx.await.map_err(|_| writer_gone())?
    }
}

fn run_in_transaction<F, T>(conn: &mut SqliteConnection, job: F) -> Result<T>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T>,
{
    let mut job_error: Option<Error> = None;
    let outcome = conn.immediate_transaction::<T, diesel::result::Error, _>(|conn| {
        job(conn).map_err(|err| {
            job_error = Some(err);
            diesel::result::Error::RollbackTransaction
        })
    });
    match outcome {
        Ok(value) => Ok(value),
        Err(err) => Err(job_error
            .take()
            .unwrap_or_else(|| StorageError::from(err).into())),
    }
}

fn writer_gone() -> Error {
    Error::Database(DatabaseError::Internal(
        "database writer is not running".to_string(),
    ))
}
