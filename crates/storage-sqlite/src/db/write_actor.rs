use super::DbPool;
use crate::errors::StorageError;
use diesel::SqliteConnection;
use ledgersync_core::errors::{Error, Result};
use log::error;
use std::any::Any;
use tokio::sync::{mpsc, oneshot};

// Jobs return core results; the actor wraps each one in a transaction.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;

type ErasedJob = Job<Box<dyn Any + Send + 'static>>;
type ErasedReply = oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>;

const WRITER_QUEUE_CAPACITY: usize = 1024;

/// Handle for sending jobs to the writer actor.
///
/// SQLite allows one writer at a time. Funnelling every write through one
/// connection avoids `SQLITE_BUSY` between pooled connections and makes each
/// job a single immediate transaction.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<(ErasedJob, ErasedReply)>,
}

impl WriteHandle {
    /// Executes a database job on the writer actor's dedicated connection.
    ///
    /// The job runs inside `BEGIN IMMEDIATE`; an `Err` rolls back everything it
    /// wrote.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                ret_tx,
            ))
            .await
            .map_err(|_| writer_gone("the writer actor has stopped"))?;

        let boxed = ret_rx
            .await
            .map_err(|_| writer_gone("the writer actor dropped the reply"))??;

        boxed
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| writer_gone("unexpected result type from the writer actor"))
    }
}

fn writer_gone(reason: &str) -> Error {
    StorageError::WriterUnavailable(reason.to_string()).into()
}

/// Spawns a background Tokio task that acts as the single writer to the
/// database. It holds one pooled connection for its lifetime and processes
/// jobs serially.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(ErasedJob, ErasedReply)>(WRITER_QUEUE_CAPACITY);

    tokio::spawn(async move {
        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                error!("Writer actor could not acquire a connection: {}", e);
                // Dropping the receiver fails every pending and future job.
                return;
            }
        };

        while let Some((job, reply_tx)) = rx.recv().await {
            let result: Result<Box<dyn Any + Send + 'static>> = conn
                .immediate_transaction::<_, StorageError, _>(|c| job(c).map_err(StorageError::from))
                .map_err(Error::from);

            // The requester may have gone away; nothing to do then.
            let _ = reply_tx.send(result);
        }
    });

    WriteHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_db;
    use diesel::connection::SimpleConnection;
    use diesel::RunQueryDsl;
    use ledgersync_core::errors::DatabaseError;

    #[tokio::test]
    async fn test_failed_job_rolls_back() {
        let (pool, writer, _dir) = setup_db();

        let result: Result<()> = writer
            .exec(|conn| {
                conn.batch_execute(
                    "INSERT INTO sync_runs (id, family_id, syncable_type, syncable_id, status, \
                     sync_stats, created_at, updated_at) VALUES ('r1', 'f', 'FAMILY', 'f', \
                     'PENDING', '{}', '2024-01-01T00:00:00+00:00', '2024-01-01T00:00:00+00:00')",
                )
                .map_err(StorageError::from)?;
                Err(Error::Database(DatabaseError::Internal("boom".to_string())))
            })
            .await;
        assert!(result.is_err());

        let mut conn = pool.get().unwrap();
        #[derive(diesel::QueryableByName)]
        struct Count {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            n: i64,
        }
        let count: Count = diesel::sql_query("SELECT COUNT(*) AS n FROM sync_runs")
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(count.n, 0);
    }

    #[tokio::test]
    async fn test_job_result_is_returned() {
        let (_pool, writer, _dir) = setup_db();
        let value = writer.exec(|_conn| Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
    }
}
