// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keeping cached inventory in step with cluster topology

use crate::context::OpContext;
use async_trait::async_trait;
use opcenter_common::api::external::Error;

/// Something that mirrors the resources of a cluster locally and has to be
/// told when the cluster may have changed.
#[async_trait]
pub trait InventorySyncer: Send + Sync {
    async fn sync_cluster(
        &self,
        opctx: &OpContext,
        cluster_name: &str,
    ) -> Result<(), Error>;
}

impl super::Opcenter {
    /// Runs every registered syncer for `cluster_name`, stopping at the first
    /// failure.
    pub async fn cluster_resync_inventory(
        &self,
        opctx: &OpContext,
        cluster_name: &str,
    ) -> Result<(), Error> {
        debug!(opctx.log, "resyncing inventory"; "cluster" => cluster_name);
        for syncer in &self.inventory_syncers {
            syncer.sync_cluster(opctx, cluster_name).await?;
        }
        Ok(())
    }

    /// Resyncs the inventory of every cluster, one at a time.
    ///
    /// Cancelling `opctx` stops the sweep before the next cluster.
    pub async fn clusters_resync_inventory(
        &self,
        opctx: &OpContext,
    ) -> Result<(), Error> {
        let names = self.db_datastore.cluster_list_names(opctx).await?;
        info!(opctx.log, "resyncing inventory"; "clusters" => names.len());
        for name in &names {
            opctx.check_cancelled()?;
            self.cluster_resync_inventory(opctx, name).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::InventorySyncer;
    use crate::app::fakes::FakeInventorySyncer;
    use crate::app::test_helpers::setup_with;
    use crate::db::model::Cluster;
    use assert_matches::assert_matches;
    use opcenter_common::api::external::Error;
    use opcenter_config::ClusterConfig;
    use std::sync::Arc;

    fn cluster(name: &str) -> Cluster {
        Cluster::new_pending(
            name.to_string(),
            format!("https://{name}.example.com:8443"),
            None,
            String::from("00"),
            String::from("stable"),
        )
    }

    #[tokio::test]
    async fn test_resync_stops_at_first_failure() {
        let first = Arc::new(FakeInventorySyncer::new());
        let second = Arc::new(FakeInventorySyncer::new());
        first.fail_on("one");
        let cptestctx = setup_with(
            "test_resync_stops_at_first_failure",
            ClusterConfig::default(),
            vec![
                first.clone() as Arc<dyn InventorySyncer>,
                second.clone() as Arc<dyn InventorySyncer>,
            ],
        )
        .await;
        let opctx = &cptestctx.opctx;
        let opcenter = &cptestctx.opcenter;

        assert_matches!(
            opcenter.cluster_resync_inventory(opctx, "one").await,
            Err(Error::InternalError { .. })
        );
        assert_eq!(first.synced(), vec!["one"]);
        assert!(second.synced().is_empty());

        opcenter.cluster_resync_inventory(opctx, "two").await.unwrap();
        assert_eq!(first.synced(), vec!["one", "two"]);
        assert_eq!(second.synced(), vec!["two"]);
        cptestctx.logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_resync_sweep_honors_cancellation() {
        let syncer = Arc::new(FakeInventorySyncer::new());
        let cptestctx = setup_with(
            "test_resync_sweep_honors_cancellation",
            ClusterConfig::default(),
            vec![syncer.clone() as Arc<dyn InventorySyncer>],
        )
        .await;
        let opctx = &cptestctx.opctx;
        let datastore = &cptestctx.datastore;
        for name in ["one", "three", "two"] {
            datastore.cluster_create(opctx, cluster(name)).await.unwrap();
        }

        cptestctx.opcenter.clusters_resync_inventory(opctx).await.unwrap();
        assert_eq!(syncer.synced(), vec!["one", "three", "two"]);

        // Cancelling while the second cluster syncs stops the sweep before
        // the third.
        syncer.clear();
        syncer.cancel_on("three");
        assert_matches!(
            cptestctx.opcenter.clusters_resync_inventory(opctx).await,
            Err(Error::ServiceUnavailable { internal_message })
                if internal_message == "operation cancelled"
        );
        assert_eq!(syncer.synced(), vec!["one", "three"]);
        cptestctx.logctx.cleanup_successful();
    }
}
