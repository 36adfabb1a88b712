// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Units of work over the single database connection
//!
//! Every datastore method issues its statements through
//! [`TransactionCoordinator::run`].  Whether those statements land in a
//! transaction is decided by the caller: if the [`OpContext`] it passes was
//! produced by [`TransactionCoordinator::begin`] (or one of the
//! `transaction*` wrappers), the statements join that unit of work;
//! otherwise they run in autocommit mode.
//!
//! Transactions start lazily.  No `BEGIN` is sent, and the connection is not
//! claimed, until the first statement of the unit of work executes.  Opening
//! a unit of work while one is already open in the context reuses the outer
//! one, and only the outermost handle commits or rolls back.

use crate::context::OpContext;
use diesel::connection::SimpleConnection;
use diesel::result::Error as DieselError;
use diesel::SqliteConnection;
use opcenter_common::api::external::Error;
use slog::Logger;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Errors from a unit of work run by [`TransactionCoordinator::transaction`]
/// or [`TransactionCoordinator::transaction_forced`]
#[derive(Debug, thiserror::Error)]
pub enum TransactionError<E> {
    /// The unit of work itself failed and was rolled back.
    #[error(transparent)]
    CustomError(E),

    #[error("failed to begin transaction")]
    Begin(#[source] DieselError),

    #[error("failed to commit transaction")]
    Commit(#[source] DieselError),

    /// The unit of work failed, and rolling it back failed too.
    #[error("failed to roll back transaction after error: {error}")]
    Rollback {
        error: E,
        #[source]
        rollback: DieselError,
    },
}

impl From<TransactionError<Error>> for Error {
    fn from(e: TransactionError<Error>) -> Self {
        match e {
            TransactionError::CustomError(e) => e,
            TransactionError::Begin(err) => Error::internal_error(&format!(
                "failed to begin transaction: {err}"
            )),
            TransactionError::Commit(err) => Error::internal_error(&format!(
                "failed to commit transaction: {err}"
            )),
            TransactionError::Rollback { error, rollback } => {
                Error::internal_error(&format!(
                    "failed to roll back transaction ({rollback}) \
                     after error: {error}"
                ))
            }
        }
    }
}

/// Marker carried by an [`OpContext`] while a unit of work is open
pub(crate) struct PendingTransaction {
    state: Mutex<TransactionState>,
}

impl PendingTransaction {
    fn new() -> Self {
        PendingTransaction { state: Mutex::new(TransactionState::default()) }
    }
}

#[derive(Default)]
struct TransactionState {
    /// Claimed by the first statement, released when the transaction ends.
    conn: Option<OwnedMutexGuard<SqliteConnection>>,
    begun: bool,
    finished: bool,
}

/// Owns the database connection and serializes every statement issued
/// against it
pub struct TransactionCoordinator {
    log: Logger,
    conn: Arc<Mutex<SqliteConnection>>,
}

impl TransactionCoordinator {
    pub fn new(log: &Logger, conn: SqliteConnection) -> Self {
        TransactionCoordinator {
            log: log.new(o!("component" => "TransactionCoordinator")),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` against the connection.
    ///
    /// If `opctx` belongs to a unit of work, `f` runs inside that unit's
    /// transaction, starting it first if needed.  Otherwise `f` runs in
    /// autocommit mode.
    ///
    /// A context whose unit of work has already finished is refused with
    /// [`DieselError::BrokenTransactionManager`].
    ///
    /// Note that while a unit of work holds the connection, statements
    /// issued with a context outside of it wait until it finishes.
    pub async fn run<T, F>(
        &self,
        opctx: &OpContext,
        f: F,
    ) -> Result<T, DieselError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, DieselError> + Send,
        T: Send,
    {
        let Some(pending) = opctx.transaction() else {
            let mut conn = self.conn.lock().await;
            return f(&mut conn);
        };

        let mut state = pending.state.lock().await;
        let conn = self.materialize(&mut state).await?;
        f(conn)
    }

    /// Opens a unit of work.
    ///
    /// Returns the context to issue the unit's statements with and the handle
    /// that ends it.  If `opctx` already belongs to a unit of work, the
    /// returned context shares it and the handle's `commit` and `rollback`
    /// do nothing.
    pub fn begin(&self, opctx: &OpContext) -> (OpContext, Transaction) {
        if let Some(pending) = opctx.transaction() {
            let txn = Transaction {
                log: self.log.clone(),
                pending: Arc::clone(pending),
                outermost: false,
            };
            return (opctx.clone(), txn);
        }

        let pending = Arc::new(PendingTransaction::new());
        let txn = Transaction {
            log: self.log.clone(),
            pending: Arc::clone(&pending),
            outermost: true,
        };
        (opctx.child_in_transaction(pending), txn)
    }

    /// Runs `f` as a unit of work.
    ///
    /// The transaction commits if `f` succeeds and rolls back if it fails.
    /// When `opctx` already belongs to a unit of work, `f` joins it and the
    /// outer caller decides the outcome.
    pub async fn transaction<T, E, F, Fut>(
        &self,
        opctx: &OpContext,
        f: F,
    ) -> Result<T, TransactionError<E>>
    where
        F: FnOnce(OpContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (txn_opctx, txn) = self.begin(opctx);
        let result = f(txn_opctx).await;
        Self::finish(txn, result).await
    }

    /// Like [`TransactionCoordinator::transaction`], but the transaction is
    /// open before `f` is called.
    pub async fn transaction_forced<T, E, F, Fut>(
        &self,
        opctx: &OpContext,
        f: F,
    ) -> Result<T, TransactionError<E>>
    where
        F: FnOnce(OpContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (txn_opctx, txn) = self.begin(opctx);
        self.run(&txn_opctx, |_| Ok(()))
            .await
            .map_err(TransactionError::Begin)?;
        let result = f(txn_opctx).await;
        Self::finish(txn, result).await
    }

    async fn finish<T, E>(
        txn: Transaction,
        result: Result<T, E>,
    ) -> Result<T, TransactionError<E>> {
        match result {
            Ok(value) => {
                txn.commit().await.map_err(TransactionError::Commit)?;
                Ok(value)
            }
            Err(error) => match txn.rollback().await {
                Ok(()) => Err(TransactionError::CustomError(error)),
                Err(rollback) => {
                    Err(TransactionError::Rollback { error, rollback })
                }
            },
        }
    }

    /// Claims the connection for the transaction and issues `BEGIN`, unless
    /// either already happened.
    async fn materialize<'s>(
        &self,
        state: &'s mut TransactionState,
    ) -> Result<&'s mut SqliteConnection, DieselError> {
        if state.finished {
            return Err(DieselError::BrokenTransactionManager);
        }
        if state.conn.is_none() {
            state.conn = Some(Arc::clone(&self.conn).lock_owned().await);
        }
        if !state.begun {
            let conn = state
                .conn
                .as_deref_mut()
                .ok_or(DieselError::BrokenTransactionManager)?;
            if let Err(error) = self.begin_top_level(conn) {
                state.conn = None;
                return Err(error);
            }
            state.begun = true;
        }
        state.conn.as_deref_mut().ok_or(DieselError::BrokenTransactionManager)
    }

    fn begin_top_level(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<(), DieselError> {
        debug!(self.log, "beginning transaction");
        match conn.batch_execute("BEGIN") {
            Ok(()) => Ok(()),
            Err(DieselError::DatabaseError(kind, info))
                if info.message().contains("within a transaction") =>
            {
                // Some earlier unit of work never finished.  With a single
                // connection nothing else can make progress until it is
                // gone.
                warn!(
                    self.log,
                    "connection already in a transaction; rolling it back";
                    "error" => info.message(),
                );
                if let Err(rollback) = conn.batch_execute("ROLLBACK") {
                    error!(
                        self.log,
                        "failed to roll back leaked transaction";
                        "error" => %rollback,
                    );
                }
                Err(DieselError::DatabaseError(kind, info))
            }
            Err(error) => Err(error),
        }
    }
}

/// Handle that ends a unit of work opened by [`TransactionCoordinator::begin`]
///
/// Dropping the outermost handle without committing rolls the transaction
/// back.
pub struct Transaction {
    log: Logger,
    pending: Arc<PendingTransaction>,
    outermost: bool,
}

impl Transaction {
    /// Returns false for handles of units of work nested in another.
    pub fn is_outermost(&self) -> bool {
        self.outermost
    }

    pub async fn commit(self) -> Result<(), DieselError> {
        if !self.outermost {
            return Ok(());
        }
        let mut state = self.pending.state.lock().await;
        state.finished = true;
        let Some(mut conn) = state.conn.take() else {
            // No statement ran, so there is nothing to commit.
            return Ok(());
        };
        debug!(self.log, "committing transaction");
        if let Err(error) = conn.batch_execute("COMMIT") {
            // The transaction stays open after a failed COMMIT.
            if let Err(rollback) = conn.batch_execute("ROLLBACK") {
                error!(
                    self.log,
                    "failed to roll back after failed commit";
                    "error" => %rollback,
                );
            }
            return Err(error);
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DieselError> {
        if !self.outermost {
            return Ok(());
        }
        let mut state = self.pending.state.lock().await;
        state.finished = true;
        let Some(mut conn) = state.conn.take() else {
            return Ok(());
        };
        debug!(self.log, "rolling back transaction");
        conn.batch_execute("ROLLBACK")
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.outermost {
            return;
        }
        let Ok(mut state) = self.pending.state.try_lock() else {
            error!(self.log, "abandoned transaction is busy; not rolled back");
            return;
        };
        if state.finished {
            return;
        }
        state.finished = true;
        if let Some(mut conn) = state.conn.take() {
            warn!(self.log, "rolling back abandoned transaction");
            if let Err(error) = conn.batch_execute("ROLLBACK") {
                error!(
                    self.log,
                    "failed to roll back abandoned transaction";
                    "error" => %error,
                );
            }
        }
    }
}
