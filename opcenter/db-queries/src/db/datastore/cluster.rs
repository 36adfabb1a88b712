// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on [`Cluster`]s.

use super::DataStore;
use crate::context::OpContext;
use crate::db::error::public_error_from_diesel;
use crate::db::error::ErrorHandler;
use crate::db::model::Cluster;
use crate::db::model::ClusterStatus;
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
use opcenter_db_model::schema::cluster::dsl;

fn not_found_handler(name: &str) -> ErrorHandler<'static> {
    ErrorHandler::NotFoundByLookup(ResourceType::Cluster, LookupType::from(name))
}

impl DataStore {
    pub async fn cluster_create(
        &self,
        opctx: &OpContext,
        cluster: Cluster,
    ) -> CreateResult<Cluster> {
        debug!(opctx.log, "creating cluster"; "cluster" => &cluster.name);
        self.coordinator
            .run(opctx, |conn| {
                diesel::insert_into(dsl::cluster).values(&cluster).execute(conn)
            })
            .await
            .map_err(|e| {
                public_error_from_diesel(
                    e,
                    ErrorHandler::Conflict(ResourceType::Cluster, &cluster.name),
                )
            })?;
        Ok(cluster)
    }

    pub async fn cluster_exists_by_name(
        &self,
        opctx: &OpContext,
        name: &str,
    ) -> LookupResult<bool> {
        self.coordinator
            .run(opctx, |conn| {
                diesel::select(diesel::dsl::exists(
                    dsl::cluster.filter(dsl::name.eq(name)),
                ))
                .get_result(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))
    }

    pub async fn cluster_get_by_name(
        &self,
        opctx: &OpContext,
        name: &str,
    ) -> LookupResult<Cluster> {
        self.coordinator
            .run(opctx, |conn| {
                dsl::cluster
                    .filter(dsl::name.eq(name))
                    .select(Cluster::as_select())
                    .first(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, not_found_handler(name)))
    }

    /// List clusters ordered by name, optionally only those in `status`.
    pub async fn cluster_list(
        &self,
        opctx: &OpContext,
        status: Option<ClusterStatus>,
    ) -> ListResultVec<Cluster> {
        self.coordinator
            .run(opctx, |conn| {
                let mut query = dsl::cluster.into_boxed();
                if let Some(status) = status {
                    query = query.filter(dsl::status.eq(status));
                }
                query
                    .order_by(dsl::name.asc())
                    .select(Cluster::as_select())
                    .load(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))
    }

    pub async fn cluster_list_names(
        &self,
        opctx: &OpContext,
    ) -> ListResultVec<String> {
        self.coordinator
            .run(opctx, |conn| {
                dsl::cluster
                    .order_by(dsl::name.asc())
                    .select(dsl::name)
                    .load(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))
    }

    /// Overwrite the stored cluster of the same name.
    pub async fn cluster_update(
        &self,
        opctx: &OpContext,
        cluster: &Cluster,
    ) -> UpdateResult<Cluster> {
        let mut updated = cluster.clone();
        updated.time_modified = Utc::now();

        let rows = self
            .coordinator
            .run(opctx, |conn| {
                diesel::update(dsl::cluster.filter(dsl::name.eq(&updated.name)))
                    .set(&updated)
                    .execute(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))?;
        if rows == 0 {
            return Err(Error::not_found_by_name(
                ResourceType::Cluster,
                &cluster.name,
            ));
        }
        Ok(updated)
    }

    /// Rename a cluster.
    ///
    /// This is a single statement, so no reader ever sees the cluster under
    /// both names or neither.  Member servers follow the rename.
    pub async fn cluster_rename(
        &self,
        opctx: &OpContext,
        old_name: &str,
        new_name: &str,
    ) -> UpdateResult<()> {
        debug!(
            self.log,
            "renaming cluster";
            "old_name" => old_name,
            "new_name" => new_name,
        );
        let rows = self
            .coordinator
            .run(opctx, |conn| {
                diesel::update(dsl::cluster.filter(dsl::name.eq(old_name)))
                    .set((
                        dsl::name.eq(new_name),
                        dsl::time_modified.eq(Utc::now()),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| {
                public_error_from_diesel(
                    e,
                    ErrorHandler::Conflict(ResourceType::Cluster, new_name),
                )
            })?;
        if rows == 0 {
            return Err(Error::not_found_by_name(
                ResourceType::Cluster,
                old_name,
            ));
        }
        Ok(())
    }

    /// Delete a cluster.  Fails with a conflict if any server still refers
    /// to it.
    pub async fn cluster_delete_by_name(
        &self,
        opctx: &OpContext,
        name: &str,
    ) -> DeleteResult {
        let rows = self
            .coordinator
            .run(opctx, |conn| {
                diesel::delete(dsl::cluster.filter(dsl::name.eq(name)))
                    .execute(conn)
            })
            .await
            .map_err(|e| public_error_from_diesel(e, ErrorHandler::Server))?;
        if rows == 0 {
            return Err(Error::not_found_by_name(ResourceType::Cluster, name));
        }
        Ok(())
    }
}
