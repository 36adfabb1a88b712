// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities for working with the operations center database

// This is marked public for use by the application crate's tests
pub mod datastore;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod pub_test_utils;
mod transaction;

pub use opcenter_db_model as model;

pub use datastore::DataStore;
pub use transaction::Transaction;
pub use transaction::TransactionCoordinator;
pub use transaction::TransactionError;

pub(crate) use transaction::PendingTransaction;
