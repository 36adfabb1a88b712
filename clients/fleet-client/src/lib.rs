// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface for making requests to hypervisor servers and to the clusters
//! they form
//!
//! The operations center only depends on the [`FleetClient`] capability;
//! how requests travel over the wire is up to the implementation.

use async_trait::async_trait;
use opcenter_common::api::external::Error;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

pub mod types;

pub use types::OsData;

/// Something the client can address: a single server, or a cluster reached
/// through one of its members.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub connection_url: String,
    /// PEM certificate to trust when connecting, if the endpoint does not
    /// present a publicly verifiable one.
    pub certificate: Option<String>,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{endpoint} is unreachable: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("{endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },

    #[error("unexpected response from {endpoint}: {message}")]
    Unexpected { endpoint: String, message: String },
}

impl From<ClientError> for Error {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Unreachable { .. } => {
                Error::unavail(&e.to_string())
            }
            ClientError::Rejected { .. } | ClientError::Unexpected { .. } => {
                Error::internal_error(&e.to_string())
            }
        }
    }
}

/// Operations the operations center performs against servers and clusters
#[async_trait]
pub trait FleetClient: Send + Sync {
    async fn ping(&self, target: &Endpoint) -> Result<(), ClientError>;

    async fn enable_os_service_lvm(
        &self,
        server: &Endpoint,
    ) -> Result<(), ClientError>;

    /// Replace the server's configuration keys with `config`.
    async fn set_server_config(
        &self,
        server: &Endpoint,
        config: &BTreeMap<String, String>,
    ) -> Result<(), ClientError>;

    /// Bootstrap clustering on `server`, returning the PEM certificate the
    /// new cluster presents.
    async fn enable_cluster(
        &self,
        server: &Endpoint,
    ) -> Result<String, ClientError>;

    async fn get_cluster_node_names(
        &self,
        cluster: &Endpoint,
    ) -> Result<Vec<String>, ClientError>;

    /// Issue a single-use token that lets `member_name` join `cluster`.
    async fn get_cluster_join_token(
        &self,
        cluster: &Endpoint,
        member_name: &str,
    ) -> Result<String, ClientError>;

    async fn join_cluster(
        &self,
        server: &Endpoint,
        join_token: &str,
        cluster: &Endpoint,
    ) -> Result<(), ClientError>;

    async fn create_project(
        &self,
        cluster: &Endpoint,
        name: &str,
        description: &str,
    ) -> Result<(), ClientError>;

    async fn initialize_default_storage(
        &self,
        servers: &[Endpoint],
    ) -> Result<(), ClientError>;

    async fn get_os_data(&self, server: &Endpoint)
        -> Result<OsData, ClientError>;

    async fn initialize_default_networking(
        &self,
        servers: &[Endpoint],
        primary_nic: &str,
    ) -> Result<(), ClientError>;

    async fn update_cluster_certificate(
        &self,
        cluster: &Endpoint,
        certificate_pem: &str,
        key_pem: &str,
    ) -> Result<(), ClientError>;
}
