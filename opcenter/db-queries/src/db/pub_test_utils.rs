// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test support code that can be enabled by dependencies via this crate's
//! `testing` feature.
//!
//! This feature should only be enabled under `dev-dependencies` to avoid this
//! test support code leaking into release binaries.

use crate::context::OpContext;
use crate::db::DataStore;
use dropshot::test_util::LogContext;
use std::sync::Arc;

/// Constructs a DataStore backed by a private in-memory database, along with
/// an OpContext for issuing requests against it
pub fn datastore_test(logctx: &LogContext) -> (OpContext, Arc<DataStore>) {
    let datastore = Arc::new(
        DataStore::open(&logctx.log, ":memory:")
            .expect("failed to open in-memory database"),
    );
    let opctx = OpContext::for_tests(logctx.log.new(o!()));
    (opctx, datastore)
}
