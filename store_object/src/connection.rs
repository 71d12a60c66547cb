//! Connection handles with savepoint-based transaction nesting
//!
//! A [`Connection`] is a value object. The root handle wraps the pool;
//! [`Connection::begin`] on it opens a real transaction, and `begin` on a
//! transaction handle issues a uniquely named `SAVEPOINT`. Every handle keeps
//! its own closed flag, so committing an inner scope never affects the handle
//! that represents the outer one.
//!
//! A transaction handle is single-owner: statements on the shared transaction
//! are serialised, but interleaving them from concurrent tasks is not
//! supported.
//!
//! A scope opened by [`Connection::run_in_transaction`] whose future is
//! dropped before it finished (a timeout, an aborted task) is abandoned: its
//! savepoint is rolled back before the next statement or commit runs on the
//! enclosing transaction.

use crate::errors::{BackendError, StoreError};
use futures::FutureExt;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::{Postgres, Transaction};
use std::any::Any;
use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const CONNECTION_LABEL: &str = "connection";

type SharedTransaction = Arc<TransactionState>;

type TransactionGuard<'a> = MutexGuard<'a, Option<Transaction<'static, Postgres>>>;

/// Transaction shared by a scope and every handle nested in it
struct TransactionState {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
    /// Savepoints of abandoned scopes with their depth, not yet rolled back
    abandoned: std::sync::Mutex<Vec<(usize, String)>>,
}

impl TransactionState {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            abandoned: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn abandon(&self, depth: usize, savepoint: String) {
        let mut abandoned = self.abandoned.lock().unwrap_or_else(|e| e.into_inner());
        abandoned.push((depth, savepoint));
    }

    /// Outermost abandoned savepoint; rolling back to it undoes the others too
    fn take_abandoned(&self) -> Option<String> {
        let mut abandoned = self.abandoned.lock().unwrap_or_else(|e| e.into_inner());
        let outermost = abandoned
            .drain(..)
            .min_by_key(|(depth, _)| *depth)
            .map(|(_, name)| name);
        outermost
    }
}

/// Abandons a scope whose future is dropped before it closed
struct AbandonOnDrop(Connection);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

/// One SQL statement plus the context used to classify its errors
pub struct Statement<'a> {
    pub table: &'a str,
    pub operation: &'a str,
    pub sql: &'a str,
    pub args: PgArguments,
}

impl<'a> Statement<'a> {
    pub fn new(table: &'a str, operation: &'a str, sql: &'a str) -> Self {
        Self {
            table,
            operation,
            sql,
            args: PgArguments::default(),
        }
    }

    pub fn with_args(mut self, args: PgArguments) -> Self {
        self.args = args;
        self
    }
}

/// Panic payload used when a rollback after a panic failed as well
///
/// The original payload still propagates; the rollback failure rides along.
#[derive(Debug)]
pub struct RollbackAfterPanic {
    pub payload: Box<dyn Any + Send>,
    pub rollback: StoreError,
}

/// Handle on the pool, a transaction, or a savepoint within a transaction
#[derive(Clone)]
pub struct Connection {
    pool: PgPool,
    tx: Option<SharedTransaction>,
    savepoint: Option<String>,
    nested: bool,
    depth: usize,
    closed: Arc<AtomicBool>,
    statement_timeout: Option<Duration>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("depth", &self.depth)
            .field("savepoint", &self.savepoint)
            .field("nested", &self.nested)
            .field("closed", &self.is_closed())
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}

impl Connection {
    /// Root handle over a connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            savepoint: None,
            nested: false,
            depth: 0,
            closed: Arc::new(AtomicBool::new(false)),
            statement_timeout: None,
        }
    }

    /// Abort any statement running longer than `timeout`
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// True if this handle runs inside a transaction
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// 0 for the root handle, 1 for a transaction, 2+ for savepoints
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn savepoint(&self) -> Option<&str> {
        self.savepoint.as_deref()
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Open a new scope
    ///
    /// Starts a real transaction on the root handle; inside a transaction it
    /// creates a savepoint instead. The receiver keeps representing the outer
    /// scope.
    pub async fn begin(&self) -> Result<Connection, StoreError> {
        self.ensure_open()?;
        match &self.tx {
            None => {
                let tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| StoreError::database_operation(CONNECTION_LABEL, "begin", e))?;
                Ok(self.child(Arc::new(TransactionState::new(tx)), None, false))
            }
            Some(shared) => {
                let name = savepoint_name(Uuid::new_v4());
                self.run_raw(shared, &format!("SAVEPOINT {}", name), "savepoint")
                    .await?;
                Ok(self.child(shared.clone(), Some(name), true))
            }
        }
    }

    /// Handle that joins the current transaction without a savepoint of its own
    ///
    /// Commit and rollback on it are no-ops; only the outermost handle ends
    /// the transaction. On the root handle this is a plain copy.
    pub fn nested(&self) -> Connection {
        match &self.tx {
            Some(shared) => self.child(shared.clone(), None, true),
            None => self.clone(),
        }
    }

    /// Commit this scope
    ///
    /// Releases the savepoint, does nothing for a joined handle, or commits
    /// the real transaction for the outermost one. The handle is closed
    /// afterwards.
    pub async fn commit(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let shared = self.tx.as_ref().ok_or(StoreError::NoActiveTransaction)?;

        if let Some(name) = &self.savepoint {
            self.run_raw(shared, &format!("RELEASE SAVEPOINT {}", name), "commit")
                .await?;
        } else if self.nested {
            if self.lock_tx(shared).await?.is_none() {
                return Err(StoreError::NoActiveTransaction);
            }
        } else {
            let tx = self
                .lock_tx(shared)
                .await?
                .take()
                .ok_or(StoreError::NoActiveTransaction)?;
            tx.commit()
                .await
                .map_err(|e| StoreError::database_operation(CONNECTION_LABEL, "commit", e))?;
        }

        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Roll back this scope; a no-op when nothing is open
    pub async fn rollback(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Ok(());
        }
        let Some(shared) = &self.tx else {
            return Ok(());
        };

        if let Some(name) = &self.savepoint {
            let mut guard = self.lock_tx(shared).await?;
            if let Some(tx) = guard.as_mut() {
                let sql = format!("ROLLBACK TO SAVEPOINT {}", name);
                self.timed(
                    CONNECTION_LABEL,
                    "rollback",
                    sqlx::Executor::execute(&mut **tx, sqlx::raw_sql(&sql)),
                )
                .await?;
            }
        } else if !self.nested {
            let tx = shared.tx.lock().await.take();
            shared.take_abandoned();
            if let Some(tx) = tx {
                tx.rollback()
                    .await
                    .map_err(|e| StoreError::database_operation(CONNECTION_LABEL, "rollback", e))?;
            }
        }

        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Run `f` inside a new scope
    ///
    /// Commits when `f` succeeds and rolls back when it fails. A panic inside
    /// `f` rolls back first and is then resumed. Dropping the returned future
    /// before it completes abandons the scope.
    pub async fn run_in_transaction<F, Fut, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<R, StoreError>>,
    {
        let scope = self.begin().await?;
        let _abandon = AbandonOnDrop(scope.clone());
        let outcome = AssertUnwindSafe(f(scope.clone())).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => match scope.commit().await {
                Ok(()) => Ok(value),
                Err(err) => Err(with_rollback(err, scope.rollback().await)),
            },
            Ok(Err(err)) => Err(with_rollback(err, scope.rollback().await)),
            Err(payload) => {
                if let Err(rollback) = scope.rollback().await {
                    resume_unwind(Box::new(RollbackAfterPanic { payload, rollback }));
                }
                resume_unwind(payload)
            }
        }
    }

    /// Round-trip to the database through this handle
    pub async fn ping(&self) -> Result<(), StoreError> {
        let statement = Statement::new(CONNECTION_LABEL, "ping", "SELECT 1");
        self.fetch_scalar::<i32>(statement).await.map(|_| ())
    }

    pub async fn fetch_all_as<T>(&self, statement: Statement<'_>) -> Result<Vec<T>, StoreError>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        let Statement {
            table,
            operation,
            sql,
            args,
        } = statement;
        let query = sqlx::query_as_with::<Postgres, T, _>(sql, args);

        match self.scope()? {
            None => self.timed(table, operation, query.fetch_all(&self.pool)).await,
            Some(shared) => {
                let mut guard = self.lock_tx(shared).await?;
                let tx = guard.as_mut().ok_or(StoreError::NoActiveTransaction)?;
                self.timed(table, operation, query.fetch_all(&mut **tx)).await
            }
        }
    }

    /// Fetch exactly one row; zero rows is [`StoreError::NotFound`]
    pub async fn fetch_one_as<T>(&self, statement: Statement<'_>) -> Result<T, StoreError>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        let Statement {
            table,
            operation,
            sql,
            args,
        } = statement;
        let query = sqlx::query_as_with::<Postgres, T, _>(sql, args);

        match self.scope()? {
            None => self.timed(table, operation, query.fetch_one(&self.pool)).await,
            Some(shared) => {
                let mut guard = self.lock_tx(shared).await?;
                let tx = guard.as_mut().ok_or(StoreError::NoActiveTransaction)?;
                self.timed(table, operation, query.fetch_one(&mut **tx)).await
            }
        }
    }

    /// Fetch the first column of exactly one row
    pub async fn fetch_scalar<O>(&self, statement: Statement<'_>) -> Result<O, StoreError>
    where
        O: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres> + Send + Unpin,
    {
        let Statement {
            table,
            operation,
            sql,
            args,
        } = statement;
        let query = sqlx::query_scalar_with::<Postgres, O, _>(sql, args);

        match self.scope()? {
            None => self.timed(table, operation, query.fetch_one(&self.pool)).await,
            Some(shared) => {
                let mut guard = self.lock_tx(shared).await?;
                let tx = guard.as_mut().ok_or(StoreError::NoActiveTransaction)?;
                self.timed(table, operation, query.fetch_one(&mut **tx)).await
            }
        }
    }

    /// Execute a statement and return the number of affected rows
    pub async fn execute(&self, statement: Statement<'_>) -> Result<u64, StoreError> {
        let Statement {
            table,
            operation,
            sql,
            args,
        } = statement;
        let query = sqlx::query_with::<Postgres, _>(sql, args);

        let result = match self.scope()? {
            None => self.timed(table, operation, query.execute(&self.pool)).await?,
            Some(shared) => {
                let mut guard = self.lock_tx(shared).await?;
                let tx = guard.as_mut().ok_or(StoreError::NoActiveTransaction)?;
                self.timed(table, operation, query.execute(&mut **tx)).await?
            }
        };
        Ok(result.rows_affected())
    }

    fn child(&self, tx: SharedTransaction, savepoint: Option<String>, nested: bool) -> Connection {
        Connection {
            pool: self.pool.clone(),
            tx: Some(tx),
            savepoint,
            nested,
            depth: self.depth + 1,
            closed: Arc::new(AtomicBool::new(false)),
            statement_timeout: self.statement_timeout,
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::NoActiveTransaction);
        }
        Ok(())
    }

    /// Where statements go: `None` for the pool, the transaction otherwise
    fn scope(&self) -> Result<Option<&SharedTransaction>, StoreError> {
        self.ensure_open()?;
        Ok(self.tx.as_ref())
    }

    async fn run_raw(
        &self,
        shared: &SharedTransaction,
        sql: &str,
        operation: &str,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock_tx(shared).await?;
        let tx = guard.as_mut().ok_or(StoreError::NoActiveTransaction)?;
        self.timed(CONNECTION_LABEL, operation, sqlx::Executor::execute(&mut **tx, sqlx::raw_sql(sql)))
            .await
            .map(|_| ())
    }

    /// Lock the shared transaction, first rolling back abandoned scopes
    ///
    /// If that rollback fails the whole transaction is dropped (and so rolled
    /// back); later statements and the final commit see no transaction.
    async fn lock_tx<'a>(&self, shared: &'a SharedTransaction) -> Result<TransactionGuard<'a>, StoreError> {
        let mut guard = shared.tx.lock().await;
        let Some(name) = shared.take_abandoned() else {
            return Ok(guard);
        };

        if let Some(tx) = guard.as_mut() {
            crate::debug_log!("rolling back abandoned savepoint {}", name);
            let sql = format!("ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}", name);
            let undone = self
                .timed(CONNECTION_LABEL, "rollback", sqlx::Executor::execute(&mut **tx, sqlx::raw_sql(&sql)))
                .await;
            if let Err(err) = undone {
                tracing::warn!(savepoint = %name, error = %err, "abandoned savepoint rollback failed");
                guard.take();
                return Err(err);
            }
        }
        Ok(guard)
    }

    /// Close a scope that will never finish
    ///
    /// A savepoint is queued for rollback on the shared transaction; an
    /// outermost transaction is dropped, which rolls it back.
    fn abandon(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(shared) = &self.tx else {
            return;
        };

        if let Some(name) = &self.savepoint {
            shared.abandon(self.depth, name.clone());
        } else if !self.nested {
            // If locked, the transaction rolls back once its last handle drops
            if let Ok(mut tx) = shared.tx.try_lock() {
                tx.take();
            }
        }
    }

    async fn timed<F, R>(&self, table: &str, operation: &str, fut: F) -> Result<R, StoreError>
    where
        F: Future<Output = Result<R, sqlx::Error>>,
    {
        let result = match self.statement_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| StoreError::backend(table, operation, BackendError::Timeout(limit)))?,
            None => fut.await,
        };
        result.map_err(|e| StoreError::database_operation(table, operation, e))
    }
}

/// Savepoint identifier derived from a random id
pub fn savepoint_name(id: Uuid) -> String {
    format!("s_{}", id.simple())
}

fn with_rollback(err: StoreError, rollback: Result<(), StoreError>) -> StoreError {
    match rollback {
        Ok(()) => err,
        Err(rollback) => StoreError::Rollback {
            source: Box::new(err),
            rollback: Box::new(rollback),
        },
    }
}
