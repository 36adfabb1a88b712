// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared state used by API request handlers
use crate::db::PendingTransaction;
use opcenter_common::api::external::Error;
use slog::Logger;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Provides general facilities scoped to whatever operation is being
/// performed
///
/// All datastore operations take an `OpContext`.  Besides the logger, it
/// carries the operation's cancellation signal and, while a unit of work is
/// open, the marker that routes statements into that unit's transaction (see
/// [`crate::db::TransactionCoordinator`]).
#[derive(Clone)]
pub struct OpContext {
    pub log: Logger,
    cancel: CancellationToken,
    transaction: Option<Arc<PendingTransaction>>,
}

impl OpContext {
    /// Returns a context suitable for use in background operations
    pub fn for_background(log: Logger) -> OpContext {
        OpContext::with_cancellation(log, CancellationToken::new())
    }

    /// Returns a context suitable for automated tests
    pub fn for_tests(log: Logger) -> OpContext {
        OpContext::for_background(log)
    }

    /// Returns a context that is cancelled when `cancel` is
    pub fn with_cancellation(
        log: Logger,
        cancel: CancellationToken,
    ) -> OpContext {
        OpContext { log, cancel, transaction: None }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with `ServiceUnavailable` if the operation has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled());
        }
        Ok(())
    }

    /// Returns whether statements issued with this context belong to a unit
    /// of work.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub(crate) fn transaction(&self) -> Option<&Arc<PendingTransaction>> {
        self.transaction.as_ref()
    }

    pub(crate) fn child_in_transaction(
        &self,
        transaction: Arc<PendingTransaction>,
    ) -> OpContext {
        OpContext {
            log: self.log.new(o!("transaction" => true)),
            cancel: self.cancel.clone(),
            transaction: Some(transaction),
        }
    }
}
