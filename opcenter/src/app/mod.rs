// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operations center, the service that forms and tracks clusters

use crate::db;
use fleet_client::FleetClient;
use opcenter_config::ClusterConfig;
use opcenter_config::Config;
use slog::Logger;
use std::sync::Arc;

// The implementation of Opcenter is large, and split into a number of files
// by topic.
pub mod cluster;
pub mod inventory;
pub mod primary_nic;

#[cfg(test)]
pub(crate) mod fakes;

pub use cluster::ClusterCreateError;
pub use inventory::InventorySyncer;

/// Manages the clusters of a fleet
pub struct Opcenter {
    /// persistent storage for clusters and servers
    db_datastore: Arc<db::DataStore>,

    /// how we talk to servers and clusters
    fleet_client: Arc<dyn FleetClient>,

    /// told about every cluster whose topology may have changed
    inventory_syncers: Vec<Arc<dyn InventorySyncer>>,

    /// knobs for cluster formation
    settings: ClusterConfig,
}

impl Opcenter {
    pub fn new(
        log: &Logger,
        db_datastore: Arc<db::DataStore>,
        fleet_client: Arc<dyn FleetClient>,
        inventory_syncers: Vec<Arc<dyn InventorySyncer>>,
        settings: ClusterConfig,
    ) -> Arc<Opcenter> {
        let log = log.new(o!("component" => "Opcenter"));
        info!(log, "operations center ready";
            "inventory_syncers" => inventory_syncers.len());
        Arc::new(Opcenter {
            db_datastore,
            fleet_client,
            inventory_syncers,
            settings,
        })
    }

    /// Opens the database named by `config` and builds an `Opcenter` on it.
    pub fn from_config(
        config: &Config,
        log: &Logger,
        fleet_client: Arc<dyn FleetClient>,
        inventory_syncers: Vec<Arc<dyn InventorySyncer>>,
    ) -> Result<Arc<Opcenter>, String> {
        let datastore = db::DataStore::open(log, config.database.path.as_str())
            .map_err(|e| format!("{:#}", e))?;
        Ok(Opcenter::new(
            log,
            Arc::new(datastore),
            fleet_client,
            inventory_syncers,
            config.cluster.clone(),
        ))
    }

    pub fn datastore(&self) -> &Arc<db::DataStore> {
        &self.db_datastore
    }

    pub fn settings(&self) -> &ClusterConfig {
        &self.settings
    }
}
