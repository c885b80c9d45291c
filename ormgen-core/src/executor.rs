use crate::clock::{Clock, SystemClock};
use crate::dialect::{Backend, Dialect};
use crate::error::{OrmError, OrmResult};
use crate::value::{BindValue, format_args_for_log};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use futures_util::lock::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
fn record_query_metrics(operation: &str, table: &str, elapsed: Duration) {
    crate::metrics::record_query_metrics(operation, table, elapsed);
}

#[cfg(not(feature = "metrics"))]
fn record_query_metrics(_operation: &str, _table: &str, _elapsed: Duration) {}

/// Outcome of a statement run for its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// The driver's last auto-generated id, when it reports one.
    pub last_insert_id: Option<i64>,
}

/// A database handle: a connection pool plus the dialect and clock every
/// query built from it uses.
pub struct Db<DB: Backend> {
    pool: sqlx::Pool<DB>,
    dialect: &'static dyn Dialect,
    clock: Arc<dyn Clock>,
}

impl<DB: Backend> Clone for Db<DB> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            dialect: self.dialect,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<DB: Backend> std::fmt::Debug for Db<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.dialect)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<DB: Backend> Db<DB> {
    /// Wraps `pool`, rendering SQL with `dialect`.
    ///
    /// ```no_run
    /// # async fn demo() -> Result<(), sqlx::Error> {
    /// use ormgen_core::{Db, POSTGRES};
    ///
    /// let pool = sqlx::SqlitePool::connect("sqlite::memory:").await?;
    /// let db = Db::new(pool, &POSTGRES);
    /// # let _ = db;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(pool: sqlx::Pool<DB>, dialect: &'static dyn Dialect) -> Self {
        Self {
            pool,
            dialect,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source for automatic timestamps. Transactions begun
    /// from the returned handle inherit it.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn pool(&self) -> &sqlx::Pool<DB> {
        &self.pool
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn executor(&self) -> Executor<'_, DB> {
        Executor::Db(self)
    }

    /// Opens a transaction with this handle's dialect and clock.
    pub async fn begin(&self) -> OrmResult<Tx<DB>> {
        let inner = self.pool.begin().await?;
        tracing::debug!(dialect = ?self.dialect, "ormgen begin");
        Ok(Tx {
            conn: Mutex::new(inner),
            dialect: self.dialect,
            clock: Arc::clone(&self.clock),
        })
    }

    /// Runs `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`. Rolls back and returns the error when it
    /// returns `Err`. Rolls back and resumes the panic when it panics.
    ///
    /// ```no_run
    /// # use ormgen_core::{Db, OrmError};
    /// # async fn demo(db: Db<sqlx::Sqlite>) -> Result<(), OrmError> {
    /// let moved = db
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             let res = tx
    ///                 .executor()
    ///                 .execute("transfer", "accounts", "UPDATE accounts SET balance = 0", vec![])
    ///                 .await?;
    ///             Ok::<_, OrmError>(res.rows_affected)
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = moved;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: for<'t> FnOnce(&'t Tx<DB>) -> BoxFuture<'t, Result<R, E>>,
        E: From<OrmError>,
    {
        let tx = self.begin().await.map_err(E::from)?;
        let outcome = AssertUnwindSafe(async { f(&tx).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await.map_err(E::from)?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "ormgen rollback failed");
                }
                Err(err)
            }
            Err(panic) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "ormgen rollback after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Publishes pool gauges labelled with `db`.
    #[cfg(feature = "metrics")]
    pub fn record_pool_stats(&self, db: &'static str) {
        crate::metrics::record_pool_stats(&self.pool, db);
    }
}

/// An open transaction.
///
/// Statements issued through it are serialised on the single underlying
/// connection. Dropping a `Tx` without committing rolls it back.
pub struct Tx<DB: Backend> {
    conn: Mutex<sqlx::Transaction<'static, DB>>,
    dialect: &'static dyn Dialect,
    clock: Arc<dyn Clock>,
}

impl<DB: Backend> std::fmt::Debug for Tx<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl<DB: Backend> Tx<DB> {
    pub fn executor(&self) -> Executor<'_, DB> {
        Executor::Tx(self)
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub async fn commit(self) -> OrmResult<()> {
        self.conn.into_inner().commit().await?;
        tracing::debug!("ormgen commit");
        Ok(())
    }

    pub async fn rollback(self) -> OrmResult<()> {
        self.conn.into_inner().rollback().await?;
        tracing::debug!("ormgen rollback");
        Ok(())
    }
}

/// The connection abstraction every query runs through: either the pool
/// behind a [`Db`] or the connection held by a [`Tx`].
pub enum Executor<'a, DB: Backend> {
    Db(&'a Db<DB>),
    Tx(&'a Tx<DB>),
}

impl<DB: Backend> Clone for Executor<'_, DB> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<DB: Backend> Copy for Executor<'_, DB> {}

impl<DB: Backend> std::fmt::Debug for Executor<'_, DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(_) => f.write_str("Executor::Db"),
            Self::Tx(_) => f.write_str("Executor::Tx"),
        }
    }
}

impl<'a, DB: Backend> Executor<'a, DB> {
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Self::Db(db) => db.dialect,
            Self::Tx(tx) => tx.dialect,
        }
    }

    pub fn clock(&self) -> &'a dyn Clock {
        match *self {
            Self::Db(db) => db.clock.as_ref(),
            Self::Tx(tx) => tx.clock.as_ref(),
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Tx(_))
    }

    /// Runs `sql` and returns every row. `sql` must already use the
    /// dialect's placeholders.
    pub async fn fetch_all(
        &self,
        operation: &'static str,
        table: &str,
        sql: &str,
        args: Vec<BindValue>,
    ) -> OrmResult<Vec<DB::Row>> {
        log_statement(operation, table, sql, &args);
        let start = Instant::now();
        let rows = match self {
            Self::Db(db) => {
                let mut conn = db.pool.acquire().await?;
                DB::fetch_all(&mut *conn, sql, args).await?
            }
            Self::Tx(tx) => {
                let mut guard = tx.conn.lock().await;
                DB::fetch_all(&mut **guard, sql, args).await?
            }
        };
        record_query_metrics(operation, table, start.elapsed());
        Ok(rows)
    }

    /// Runs `sql` for its side effects.
    pub async fn execute(
        &self,
        operation: &'static str,
        table: &str,
        sql: &str,
        args: Vec<BindValue>,
    ) -> OrmResult<ExecResult> {
        log_statement(operation, table, sql, &args);
        let start = Instant::now();
        let res = match self {
            Self::Db(db) => {
                let mut conn = db.pool.acquire().await?;
                DB::execute(&mut *conn, sql, args).await?
            }
            Self::Tx(tx) => {
                let mut guard = tx.conn.lock().await;
                DB::execute(&mut **guard, sql, args).await?
            }
        };
        record_query_metrics(operation, table, start.elapsed());
        Ok(ExecResult {
            rows_affected: DB::rows_affected(&res),
            last_insert_id: DB::last_insert_id(&res),
        })
    }
}

fn log_statement(operation: &'static str, table: &str, sql: &str, args: &[BindValue]) {
    tracing::debug!(
        operation,
        table,
        sql = %sql,
        args = args.len(),
        "ormgen query"
    );
    tracing::trace!(operation, table, args = %format_args_for_log(args), "ormgen query args");
}

/// Types that can be turned into an [`Executor`].
pub trait IntoExecutor<'a> {
    type DB: Backend;
    fn into_executor(self) -> Executor<'a, Self::DB>;
}

impl<'a, DB: Backend> IntoExecutor<'a> for &'a Db<DB> {
    type DB = DB;
    fn into_executor(self) -> Executor<'a, DB> {
        Executor::Db(self)
    }
}

impl<'a, DB: Backend> IntoExecutor<'a> for &'a Tx<DB> {
    type DB = DB;
    fn into_executor(self) -> Executor<'a, DB> {
        Executor::Tx(self)
    }
}

impl<'a, DB: Backend> IntoExecutor<'a> for Executor<'a, DB> {
    type DB = DB;
    fn into_executor(self) -> Executor<'a, DB> {
        self
    }
}
