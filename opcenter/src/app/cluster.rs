// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forming clusters and managing them afterwards
//!
//! Creating a cluster mutates the member servers long before anything is
//! written locally, and none of those remote steps can be undone.  The
//! sequence in [`super::Opcenter::cluster_create`] is therefore:
//!
//! 1. validate the request, with no I/O
//! 2. check that the name is free
//! 3. snapshot the members' cluster membership and refuse servers that are
//!    already clustered
//! 4. drive the remote bootstrap, one server at a time
//! 5. re-read the members and compare against the snapshot
//! 6. record the cluster and its members in one transaction
//! 7. initialize the cluster's default project, storage and networking
//!
//! Nothing locks the servers between steps 3 and 6; step 5 and the guarded
//! assignment in step 6 only detect a concurrent change.  A failure after
//! step 6 leaves the cluster recorded and is reported as
//! [`ClusterCreateError::BootstrapIncomplete`].

use super::primary_nic::select_primary_nic;
use crate::context::OpContext;
use crate::db::datastore::ServerFilter;
use crate::db::model::Cluster;
use crate::db::model::ClusterStatus;
use crate::db::model::Server;
use crate::db::model::ServerType;
use crate::params;
use crate::views;
use fleet_client::ClientError;
use fleet_client::Endpoint;
use opcenter_certificates::CertificateValidator;
use opcenter_common::api::external::DeleteResult;
use opcenter_common::api::external::Error;
use opcenter_common::api::external::ListResultVec;
use opcenter_common::api::external::LookupResult;
use opcenter_common::api::external::ResourceType;
use opcenter_common::api::external::UpdateResult;
use opcenter_common::backoff::fleet_endpoint_policy;
use opcenter_common::backoff::retry_notify;
use opcenter_common::backoff::BackoffError;
use slog::Logger;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Why a cluster creation failed, and whether the cluster was recorded
/// anyway
#[derive(Debug, thiserror::Error)]
pub enum ClusterCreateError {
    /// Nothing was recorded locally.  Members may still have been changed
    /// remotely.
    #[error(transparent)]
    NotCreated(Error),

    /// The cluster and its membership were recorded, but initializing the
    /// cluster afterwards failed.
    #[error(
        "cluster {} was created, but its bootstrap is incomplete",
        .cluster.name
    )]
    BootstrapIncomplete {
        cluster: Box<Cluster>,
        #[source]
        error: Error,
    },
}

impl ClusterCreateError {
    pub fn error(&self) -> &Error {
        match self {
            ClusterCreateError::NotCreated(error)
            | ClusterCreateError::BootstrapIncomplete { error, .. } => error,
        }
    }

    /// Returns the cluster if it was recorded before the failure.
    pub fn cluster(&self) -> Option<&Cluster> {
        match self {
            ClusterCreateError::NotCreated(_) => None,
            ClusterCreateError::BootstrapIncomplete { cluster, .. } => {
                Some(cluster)
            }
        }
    }
}

impl From<ClusterCreateError> for Error {
    fn from(e: ClusterCreateError) -> Self {
        match e {
            ClusterCreateError::NotCreated(error) => error,
            ClusterCreateError::BootstrapIncomplete { cluster, error } => {
                error.internal_context(format!(
                    "cluster {:?} created but not bootstrapped",
                    cluster.name
                ))
            }
        }
    }
}

/// Returns a function that turns a client failure into an [`Error`] naming
/// the step that failed.
fn remote_error(step: &'static str) -> impl FnOnce(ClientError) -> Error {
    move |error| Error::from(error).internal_context(step)
}

fn server_endpoint(server: &Server) -> Endpoint {
    Endpoint {
        name: server.name.clone(),
        connection_url: server.connection_url.clone(),
        certificate: Some(server.certificate.clone()),
    }
}

fn cluster_endpoint(cluster: &Cluster) -> Endpoint {
    Endpoint {
        name: cluster.name.clone(),
        connection_url: cluster.connection_url.clone(),
        certificate: cluster.certificate.clone(),
    }
}

fn already_clustered(server_name: &str, cluster_name: &str) -> Error {
    Error::conflict(&format!(
        "server {:?} is already part of cluster {:?}",
        server_name, cluster_name
    ))
}

/// What the remote bootstrap produced
struct Bootstrapped {
    certificate: String,
    fingerprint: String,
}

impl super::Opcenter {
    /// Bonds the named servers into a new cluster.
    ///
    /// Remote changes made before a failure are not undone: the caller
    /// retries, or cleans up by hand.
    pub async fn cluster_create(
        &self,
        opctx: &OpContext,
        params: params::ClusterCreate,
    ) -> Result<Cluster, ClusterCreateError> {
        let log = opctx.log.new(o!("cluster" => params.name.clone()));

        let (cluster, members) = self
            .cluster_form(opctx, &log, &params)
            .await
            .map_err(ClusterCreateError::NotCreated)?;

        let initialized =
            self.cluster_initialize(&log, &cluster, &members).await;
        if let Err(error) = initialized {
            warn!(log, "cluster recorded but not initialized";
                "error" => %error);
            return Err(ClusterCreateError::BootstrapIncomplete {
                cluster: Box::new(cluster),
                error,
            });
        }

        info!(log, "created cluster");
        Ok(cluster)
    }

    /// Runs [`Self::cluster_create`] until it succeeds, fails for a reason
    /// other than an unreachable server, or the configured retry timeout
    /// runs out.
    ///
    /// A creation that got as far as recording the cluster is never
    /// retried.  Cancelling `opctx` stops the loop before the next attempt.
    pub async fn cluster_create_with_retry(
        &self,
        opctx: &OpContext,
        params: params::ClusterCreate,
    ) -> Result<Cluster, ClusterCreateError> {
        let params = &params;
        let attempt = || async move {
            if let Err(error) = opctx.check_cancelled() {
                return Err(BackoffError::permanent(
                    ClusterCreateError::NotCreated(error),
                ));
            }
            self.cluster_create(opctx, params.clone()).await.map_err(|error| {
                let retryable = matches!(
                    &error,
                    ClusterCreateError::NotCreated(e) if e.retryable()
                );
                if retryable {
                    BackoffError::transient(error)
                } else {
                    BackoffError::permanent(error)
                }
            })
        };
        let log_failure = |error: ClusterCreateError, delay: Duration| {
            warn!(opctx.log, "cluster creation failed; retrying";
                "cluster" => &params.name,
                "error" => %error.error(),
                "delay" => ?delay
            );
        };
        retry_notify(
            fleet_endpoint_policy(self.settings.create_retry_timeout),
            attempt,
            log_failure,
        )
        .await
    }

    /// Steps 1 to 6: everything up to and including recording the cluster
    async fn cluster_form(
        &self,
        opctx: &OpContext,
        log: &Logger,
        params: &params::ClusterCreate,
    ) -> Result<(Cluster, Vec<Endpoint>), Error> {
        params.validate()?;

        if self.db_datastore.cluster_exists_by_name(opctx, &params.name).await?
        {
            return Err(Error::ObjectAlreadyExists {
                type_name: ResourceType::Cluster,
                object_name: params.name.clone(),
            });
        }

        let mut servers = Vec::with_capacity(params.server_names.len());
        for name in &params.server_names {
            let server =
                self.db_datastore.server_get_by_name(opctx, name).await?;
            if let Some(cluster_name) = &server.cluster_name {
                return Err(already_clustered(name, cluster_name));
            }
            servers.push(server);
        }

        info!(log, "bootstrapping cluster";
            "servers" => params.server_names.join(","));
        let bootstrapped = self.cluster_bootstrap(log, params, &servers).await?;

        // The remote steps can take a long time.  Make sure nobody else
        // claimed one of the servers meanwhile.
        for before in &servers {
            let after = self
                .db_datastore
                .server_get_by_name(opctx, &before.name)
                .await?;
            if after.cluster_name == before.cluster_name {
                continue;
            }
            return Err(match after.cluster_name {
                Some(other) => Error::conflict(&format!(
                    "server {:?} was added to cluster {:?} while cluster {:?} \
                     was being created",
                    before.name, other, params.name
                )),
                None => Error::conflict(&format!(
                    "server {:?} left its cluster while cluster {:?} was \
                     being created",
                    before.name, params.name
                )),
            });
        }

        let seed = &servers[0];
        let cluster = Cluster::new_pending(
            params.name.clone(),
            params
                .connection_url
                .clone()
                .unwrap_or_else(|| seed.connection_url.clone()),
            Some(bootstrapped.certificate),
            bootstrapped.fingerprint,
            params
                .channel
                .clone()
                .unwrap_or_else(|| self.settings.default_channel.clone()),
        );

        let datastore = &self.db_datastore;
        let servers = &servers;
        let cluster = datastore
            .coordinator()
            .transaction(opctx, |opctx| async move {
                let cluster = datastore.cluster_create(&opctx, cluster).await?;
                for server in servers {
                    datastore
                        .server_cluster_assign(
                            &opctx,
                            &server.name,
                            &cluster.name,
                        )
                        .await?;
                }
                Ok::<_, Error>(cluster)
            })
            .await?;
        info!(log, "recorded cluster");

        Ok((cluster, servers.iter().map(server_endpoint).collect()))
    }

    /// Step 4: turn the servers into a cluster
    async fn cluster_bootstrap(
        &self,
        log: &Logger,
        params: &params::ClusterCreate,
        servers: &[Server],
    ) -> Result<Bootstrapped, Error> {
        let client = &self.fleet_client;
        let endpoints: Vec<Endpoint> =
            servers.iter().map(server_endpoint).collect();

        for endpoint in &endpoints {
            debug!(log, "pinging server"; "server" => &endpoint.name);
            client.ping(endpoint).await.map_err(remote_error("ping"))?;
        }

        for (server, endpoint) in servers.iter().zip(&endpoints) {
            if server.server_type != ServerType::Incus {
                continue;
            }
            debug!(log, "enabling LVM"; "server" => &endpoint.name);
            client
                .enable_os_service_lvm(endpoint)
                .await
                .map_err(remote_error("enable LVM"))?;
        }

        for (server, endpoint) in servers.iter().zip(&endpoints) {
            let config = self.server_config(server)?;
            debug!(log, "configuring server"; "server" => &endpoint.name);
            client
                .set_server_config(endpoint, &config)
                .await
                .map_err(remote_error("configure server"))?;
        }

        let seed = &endpoints[0];
        info!(log, "enabling clustering"; "seed" => &seed.name);
        let certificate = client
            .enable_cluster(seed)
            .await
            .map_err(remote_error("enable clustering"))?;
        let fingerprint = opcenter_certificates::fingerprint(
            certificate.as_bytes(),
        )
        .map_err(|e| {
            Error::internal_error(&format!(
                "server {:?} returned an unusable cluster certificate: {:#}",
                seed.name, e
            ))
        })?;

        // Joining happens through the seed, which now presents the cluster
        // certificate.
        let target = Endpoint {
            name: params.name.clone(),
            connection_url: seed.connection_url.clone(),
            certificate: Some(certificate.clone()),
        };
        let node_names = client
            .get_cluster_node_names(&target)
            .await
            .map_err(remote_error("list cluster members"))?;

        for endpoint in endpoints.iter().skip(1) {
            if node_names.contains(&endpoint.name) {
                continue;
            }
            info!(log, "joining server to cluster"; "server" => &endpoint.name);
            let token = client
                .get_cluster_join_token(&target, &endpoint.name)
                .await
                .map_err(remote_error("issue join token"))?;
            client
                .join_cluster(endpoint, &token, &target)
                .await
                .map_err(remote_error("join cluster"))?;
        }

        Ok(Bootstrapped { certificate, fingerprint })
    }

    /// Configuration pushed to a server before it is clustered
    fn server_config(
        &self,
        server: &Server,
    ) -> Result<BTreeMap<String, String>, Error> {
        let host = Url::parse(&server.connection_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| {
                Error::internal_error(&format!(
                    "server {:?} has unusable connection URL {:?}",
                    server.name, server.connection_url
                ))
            })?;
        let port = self.settings.https_port;

        let mut config = BTreeMap::from([
            (String::from("core.https_address"), format!("[::]:{port}")),
            (String::from("cluster.https_address"), format!("{host}:{port}")),
        ]);
        config.extend(self.settings.server_config.clone());
        Ok(config)
    }

    /// Step 7: set up what every cluster is expected to have
    async fn cluster_initialize(
        &self,
        log: &Logger,
        cluster: &Cluster,
        members: &[Endpoint],
    ) -> Result<(), Error> {
        let client = &self.fleet_client;
        let project = &self.settings.default_project;

        info!(log, "initializing cluster");
        client
            .create_project(
                &cluster_endpoint(cluster),
                &project.name,
                &project.description,
            )
            .await
            .map_err(remote_error("create default project"))?;
        client
            .initialize_default_storage(members)
            .await
            .map_err(remote_error("initialize storage"))?;

        let os_data = client
            .get_os_data(&members[0])
            .await
            .map_err(remote_error("fetch OS data"))?;
        let primary_nic = select_primary_nic(&os_data);
        debug!(log, "selected primary NIC"; "nic" => &primary_nic);
        client
            .initialize_default_networking(members, &primary_nic)
            .await
            .map_err(remote_error("initialize networking"))
    }

    pub async fn cluster_view(
        &self,
        opctx: &OpContext,
        name: &str,
    ) -> LookupResult<views::Cluster> {
        let cluster = self.db_datastore.cluster_get_by_name(opctx, name).await?;
        let server_names = self
            .db_datastore
            .server_list_names(opctx, &ServerFilter::in_cluster(name))
            .await?;
        Ok(views::Cluster::new(cluster, server_names))
    }

    pub async fn cluster_list(
        &self,
        opctx: &OpContext,
        status: Option<ClusterStatus>,
    ) -> ListResultVec<Cluster> {
        self.db_datastore.cluster_list(opctx, status).await
    }

    pub async fn cluster_list_names(
        &self,
        opctx: &OpContext,
    ) -> ListResultVec<String> {
        self.db_datastore.cluster_list_names(opctx).await
    }

    /// Updates a cluster's properties.  The number of servers must not
    /// change.
    pub async fn cluster_update(
        &self,
        opctx: &OpContext,
        name: &str,
        params: params::ClusterUpdate,
    ) -> UpdateResult<Cluster> {
        params.validate()?;

        let datastore = &self.db_datastore;
        let cluster = datastore
            .coordinator()
            .transaction(opctx, |opctx| async move {
                let mut cluster =
                    datastore.cluster_get_by_name(&opctx, name).await?;
                let current = datastore
                    .server_list_names(&opctx, &ServerFilter::in_cluster(name))
                    .await?;
                if params.server_names.len() != current.len() {
                    return Err(Error::conflict(&format!(
                        "cluster {:?} has {} servers, but the update names {}; \
                         clusters cannot grow or shrink through an update",
                        name,
                        current.len(),
                        params.server_names.len()
                    )));
                }

                if let Some(connection_url) = params.connection_url {
                    cluster.connection_url = connection_url;
                }
                if let Some(channel) = params.channel {
                    cluster.channel = channel;
                }
                if let Some(status) = params.status {
                    cluster.status = status;
                }
                datastore.cluster_update(&opctx, &cluster).await
            })
            .await?;
        Ok(cluster)
    }

    pub async fn cluster_rename(
        &self,
        opctx: &OpContext,
        old_name: &str,
        new_name: &str,
    ) -> UpdateResult<()> {
        if old_name.is_empty() {
            return Err(Error::invalid_value("name", "must not be empty"));
        }
        if new_name.is_empty() {
            return Err(Error::invalid_value("new_name", "must not be empty"));
        }
        self.db_datastore.cluster_rename(opctx, old_name, new_name).await?;
        info!(opctx.log, "renamed cluster";
            "old_name" => old_name, "new_name" => new_name);
        Ok(())
    }

    /// Deletes the record of a cluster that never became ready and has no
    /// servers.
    pub async fn cluster_delete(
        &self,
        opctx: &OpContext,
        name: &str,
    ) -> DeleteResult {
        let datastore = &self.db_datastore;
        datastore
            .coordinator()
            .transaction(opctx, |opctx| async move {
                let cluster =
                    datastore.cluster_get_by_name(&opctx, name).await?;
                if cluster.status != ClusterStatus::Pending {
                    return Err(Error::conflict(&format!(
                        "delete for cluster in state {} is not allowed",
                        cluster.status
                    )));
                }
                let linked = datastore
                    .server_list_names(&opctx, &ServerFilter::in_cluster(name))
                    .await?;
                if !linked.is_empty() {
                    return Err(Error::conflict(&format!(
                        "cluster {:?} has {} linked servers",
                        name,
                        linked.len()
                    )));
                }
                datastore.cluster_delete_by_name(&opctx, name).await
            })
            .await?;
        info!(opctx.log, "deleted cluster"; "cluster" => name);
        Ok(())
    }

    /// Has the cluster present a new certificate and records it.
    pub async fn cluster_update_certificate(
        &self,
        opctx: &OpContext,
        name: &str,
        params: params::ClusterCertificateUpdate,
    ) -> UpdateResult<Cluster> {
        CertificateValidator::default()
            .validate(params.certificate.as_bytes(), params.key.as_bytes())?;
        let fingerprint =
            opcenter_certificates::fingerprint(params.certificate.as_bytes())?;

        let before = self.db_datastore.cluster_get_by_name(opctx, name).await?;
        self.fleet_client
            .update_cluster_certificate(
                &cluster_endpoint(&before),
                &params.certificate,
                &params.key,
            )
            .await
            .map_err(remote_error("update cluster certificate"))?;

        let datastore = &self.db_datastore;
        let before = &before;
        let certificate = params.certificate;
        let cluster = datastore
            .coordinator()
            .transaction_forced(opctx, |opctx| async move {
                let mut cluster =
                    datastore.cluster_get_by_name(&opctx, name).await?;
                if cluster != *before {
                    return Err(Error::conflict(&format!(
                        "cluster {:?} changed while its certificate was being \
                         updated",
                        name
                    )));
                }
                cluster.certificate = Some(certificate);
                cluster.fingerprint = fingerprint;
                datastore.cluster_update(&opctx, &cluster).await
            })
            .await?;
        info!(opctx.log, "updated cluster certificate";
            "cluster" => name, "fingerprint" => &cluster.fingerprint);
        Ok(cluster)
    }
}
