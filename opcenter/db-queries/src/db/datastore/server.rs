// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on [`Server`]s.

use super::DataStore;
use crate::context::OpContext;
use crate::db::error::public_error_from_diesel;
use crate::db::error::ErrorHandler;
use crate::db::model::Server;
use crate::db::model::ServerStatus;
use chrono::Utc;
use diesel::prelude::*;
use opcenter_common::api::external::CreateResult;
use opcenter_common::api::external::DeleteResult;
use opcenter_common::api::external::Error;
use opcenter_common::api::external::ListResultVec;
use opcenter_common::api::external::LookupResult;
use opcenter_common::api::external::LookupType;
use opcenter_common::api::external::ResourceType;
use opcenter_common::api::external::UpdateResult;
use opcenter_db_model::schema::server::dsl;

/// Restricts which servers a listing returns
#[derive(Clone, Debug, Default)]
pub struct ServerFilter {
    /// Only servers that belong to this cluster
    pub cluster: Option<String>,
    pub status: Option<ServerStatus>,
}

impl ServerFilter {
    pub fn in_cluster(cluster: &str) -> Self {
        ServerFilter { cluster: Some(cluster.to_string()), status: None }
    }
}

impl DataStore {
    pub async fn server_create(
        &self,
        opctx: &OpContext,
        server: Server,
    ) -> CreateResult<Server> {
        self.coordinator
            .run(opctx, |conn| {
                diesel::insert_into(dsl::server).values(&server).execute(conn)
            })
            .await
            .map_err(|e| {
                public_error_from_diesel(
                    e,
                    ErrorHandler::Conflict(ResourceType::Server, &server.name),
                )
            })?;
        Ok(server)
    }

    pub async fn server_get_by_name(
        &self,
        opctx: &OpContext,
        name: &str,
    ) -> LookupResult<Server> {
        self.coordinator
            .run(opctx, |conn| {
                dsl::server
                    .filter(dsl::name.eq(name))
                    .select(Server::as_select())
                    .first(conn)
            })
            .await
            .map_err(|e| {
                public_error_from_diesel(
                    e,
                    ErrorHandler::NotFoundByLookup(
                        ResourceType::Server,
                        LookupType::from(name),
                    ),
                )
            })
    }

    /// Overwrite the stored server of the same name, including its cluster
    /// membership.
    pub async fn server_update(
        &self,
        opctx: &OpContext,
        server: &Server,
    ) -> UpdateResult<Server> {
        let mut updated = server.clone();
        updated.time_modified = Utc::now();

        let rows = self
            .coordinator
            .run(opctx, |conn| {
                diesel::update(dsl::server.filter(dsl::name.eq(&updated.name)))
                    .set(&updated)
                    .execute(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))?;
        if rows == 0 {
            return Err(Error::not_found_by_name(
                ResourceType::Server,
                &server.name,
            ));
        }
        Ok(updated)
    }

    pub async fn server_list_names(
        &self,
        opctx: &OpContext,
        filter: &ServerFilter,
    ) -> ListResultVec<String> {
        self.coordinator
            .run(opctx, |conn| {
                let mut query = dsl::server.into_boxed();
                if let Some(cluster) = &filter.cluster {
                    query = query.filter(dsl::cluster_name.eq(cluster));
                }
                if let Some(status) = filter.status {
                    query = query.filter(dsl::status.eq(status));
                }
                query.order_by(dsl::name.asc()).select(dsl::name).load(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))
    }

    pub async fn server_list(
        &self,
        opctx: &OpContext,
        filter: &ServerFilter,
    ) -> ListResultVec<Server> {
        self.coordinator
            .run(opctx, |conn| {
                let mut query = dsl::server.into_boxed();
                if let Some(cluster) = &filter.cluster {
                    query = query.filter(dsl::cluster_name.eq(cluster));
                }
                if let Some(status) = filter.status {
                    query = query.filter(dsl::status.eq(status));
                }
                query
                    .order_by(dsl::name.asc())
                    .select(Server::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))
    }

    /// Record that `server_name` has joined `cluster_name`.
    ///
    /// Only a server that belongs to no cluster can be assigned; a server
    /// already in a cluster (including this one) is a conflict.
    pub async fn server_cluster_assign(
        &self,
        opctx: &OpContext,
        server_name: &str,
        cluster_name: &str,
    ) -> UpdateResult<()> {
        let rows = self
            .coordinator
            .run(opctx, |conn| {
                diesel::update(
                    dsl::server
                        .filter(dsl::name.eq(server_name))
                        .filter(dsl::cluster_name.is_null()),
                )
                .set((
                    dsl::cluster_name.eq(cluster_name),
                    dsl::time_modified.eq(Utc::now()),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))?;
        if rows == 1 {
            return Ok(());
        }

        // Work out why nothing matched.
        let server = self.server_get_by_name(opctx, server_name).await?;
        Err(Error::conflict(&format!(
            "server {:?} is already part of cluster {:?}",
            server_name,
            server.cluster_name.unwrap_or_default(),
        )))
    }

    pub async fn server_delete_by_name(
        &self,
        opctx: &OpContext,
        name: &str,
    ) -> DeleteResult {
        let rows = self
            .coordinator
            .run(opctx, |conn| {
                diesel::delete(dsl::server.filter(dsl::name.eq(name)))
                    .execute(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))?;
        if rows == 0 {
            return Err(Error::not_found_by_name(ResourceType::Server, name));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::model::{Cluster, ServerType, VersionData};
    use crate::db::pub_test_utils::datastore_test;
    use assert_matches::assert_matches;
    use opcenter_test_utils::dev::test_setup_log;

    fn server(name: &str, server_type: ServerType) -> Server {
        Server::new(
            name.to_string(),
            format!("https://{name}.example.com:8443"),
            String::from("-----BEGIN CERTIFICATE-----"),
            server_type,
        )
    }

    fn cluster(name: &str) -> Cluster {
        Cluster::new_pending(
            name.to_string(),
            format!("https://{name}.example.com:8443"),
            None,
            String::from("abcd"),
            String::from("stable"),
        )
    }

    #[tokio::test]
    async fn test_server_crud() {
        let logctx = test_setup_log("test_server_crud");
        let (opctx, datastore) = datastore_test(&logctx);

        datastore
            .server_create(&opctx, server("server1", ServerType::Incus))
            .await
            .unwrap();
        datastore
            .server_create(
                &opctx,
                server("server2", ServerType::MigrationManager),
            )
            .await
            .unwrap();
        assert_matches!(
            datastore
                .server_create(&opctx, server("server1", ServerType::Incus))
                .await,
            Err(Error::ObjectAlreadyExists { object_name, .. })
                if object_name == "server1"
        );

        let mut fetched =
            datastore.server_get_by_name(&opctx, "server2").await.unwrap();
        assert_eq!(fetched.server_type, ServerType::MigrationManager);
        assert_eq!(fetched.cluster_name, None);

        fetched.status = ServerStatus::Ready;
        fetched.version_data =
            VersionData(serde_json::json!({ "os": { "version": "202501" } }));
        datastore.server_update(&opctx, &fetched).await.unwrap();
        let refetched =
            datastore.server_get_by_name(&opctx, "server2").await.unwrap();
        assert_eq!(refetched.status, ServerStatus::Ready);
        assert_eq!(refetched.version_data, fetched.version_data);

        let ready = ServerFilter {
            cluster: None,
            status: Some(ServerStatus::Ready),
        };
        assert_eq!(
            datastore.server_list_names(&opctx, &ready).await.unwrap(),
            vec!["server2"]
        );
        assert_eq!(
            datastore
                .server_list(&opctx, &ServerFilter::default())
                .await
                .unwrap()
                .len(),
            2
        );

        datastore.server_delete_by_name(&opctx, "server2").await.unwrap();
        assert_matches!(
            datastore.server_get_by_name(&opctx, "server2").await,
            Err(Error::ObjectNotFound { type_name: ResourceType::Server, .. })
        );
        assert_matches!(
            datastore.server_delete_by_name(&opctx, "server2").await,
            Err(Error::ObjectNotFound { .. })
        );
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_server_cluster_assign() {
        let logctx = test_setup_log("test_server_cluster_assign");
        let (opctx, datastore) = datastore_test(&logctx);

        datastore.cluster_create(&opctx, cluster("one")).await.unwrap();
        datastore.cluster_create(&opctx, cluster("two")).await.unwrap();
        datastore
            .server_create(&opctx, server("server1", ServerType::Incus))
            .await
            .unwrap();

        // Missing servers and missing clusters are both refused.
        assert_matches!(
            datastore.server_cluster_assign(&opctx, "server9", "one").await,
            Err(Error::ObjectNotFound { type_name: ResourceType::Server, .. })
        );
        assert_matches!(
            datastore.server_cluster_assign(&opctx, "server1", "nine").await,
            Err(Error::Conflict { .. })
        );

        datastore
            .server_cluster_assign(&opctx, "server1", "one")
            .await
            .unwrap();
        assert_matches!(
            datastore.server_cluster_assign(&opctx, "server1", "two").await,
            Err(Error::Conflict { message })
                if message.contains("\"server1\"")
                    && message.contains("\"one\"")
        );

        assert_eq!(
            datastore
                .server_list_names(&opctx, &ServerFilter::in_cluster("one"))
                .await
                .unwrap(),
            vec!["server1"]
        );
        assert!(datastore
            .server_list_names(&opctx, &ServerFilter::in_cluster("two"))
            .await
            .unwrap()
            .is_empty());

        // Clearing membership goes through a plain update.
        let mut server1 =
            datastore.server_get_by_name(&opctx, "server1").await.unwrap();
        server1.cluster_name = None;
        datastore.server_update(&opctx, &server1).await.unwrap();
        datastore.cluster_delete_by_name(&opctx, "one").await.unwrap();
        logctx.cleanup_successful();
    }
}
