// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primary control plane interface for database read and write operations

use super::TransactionCoordinator;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::result::ConnectionError;
use diesel::SqliteConnection;
use slog::Logger;

mod cluster;
mod server;

pub use server::ServerFilter;

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("failed to open database {path}")]
    Connect {
        path: String,
        #[source]
        err: ConnectionError,
    },

    #[error("failed to initialize database {path}")]
    Initialize {
        path: String,
        #[source]
        err: diesel::result::Error,
    },
}

/// The Cluster Store and Server Directory
///
/// Every method takes an [`crate::context::OpContext`]; statements run in the
/// context's unit of work if it has one (see [`TransactionCoordinator`]).
pub struct DataStore {
    log: Logger,
    coordinator: TransactionCoordinator,
}

impl DataStore {
    /// Opens (creating if necessary) the database at `path`.
    ///
    /// `:memory:` gives a private database that lives as long as the
    /// returned `DataStore`.
    pub fn open(log: &Logger, path: &str) -> Result<DataStore, OpenError> {
        let log = log.new(o!("component" => "DataStore"));
        info!(log, "opening database"; "path" => path);

        let mut conn = SqliteConnection::establish(path)
            .map_err(|err| OpenError::Connect { path: path.into(), err })?;
        Self::initialize(&mut conn)
            .map_err(|err| OpenError::Initialize { path: path.into(), err })?;

        let coordinator = TransactionCoordinator::new(&log, conn);
        Ok(DataStore { log, coordinator })
    }

    fn initialize(conn: &mut SqliteConnection) -> QueryResult<()> {
        // Foreign keys are off by default.  Membership relies on them.
        diesel::sql_query("PRAGMA foreign_keys = 'ON'").execute(conn)?;

        diesel::sql_query("PRAGMA journal_mode = 'WAL'").execute(conn)?;
        diesel::sql_query("PRAGMA synchronous = 'FULL'").execute(conn)?;

        conn.batch_execute(include_str!("../dbinit.sql"))
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }
}
