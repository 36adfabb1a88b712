// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test-only implementations of interfaces used by the operations center.

use super::InventorySyncer;
use crate::context::OpContext;
use async_trait::async_trait;
use fleet_client::{ClientError, Endpoint, FleetClient, OsData};
use opcenter_common::api::external::Error;
use opcenter_test_utils::certificates::CertificateChain;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Operations of [`FleetClient`], for recording calls and injecting failures
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum FleetOp {
    Ping,
    EnableOsServiceLvm,
    SetServerConfig,
    EnableCluster,
    GetClusterNodeNames,
    GetClusterJoinToken,
    JoinCluster,
    CreateProject,
    InitializeDefaultStorage,
    GetOsData,
    InitializeDefaultNetworking,
    UpdateClusterCertificate,
}

type Hook = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

struct FakeFleetClientInner {
    /// (operation, target) for every call, in order.  Calls against several
    /// servers name them comma-separated.
    calls: Vec<(FleetOp, String)>,
    /// Injected failures with the number of calls left to fail
    failures: BTreeMap<FleetOp, (ClientError, usize)>,
    hooks: BTreeMap<FleetOp, Hook>,

    /// Members of each bootstrapped cluster, keyed by the seed's address
    members: BTreeMap<String, Vec<String>>,
    server_configs: BTreeMap<String, BTreeMap<String, String>>,
    os_data: OsData,
    primary_nic: Option<String>,
    certificate: String,
}

/// A fake implementation of the fleet client.
///
/// In lieu of any networked requests, records each call for later
/// inspection and keeps just enough state to answer the calls that follow.
pub struct FakeFleetClient {
    inner: Arc<Mutex<FakeFleetClientInner>>,
}

impl FakeFleetClient {
    pub fn new() -> Self {
        let certificate =
            CertificateChain::new("cluster.example.com").cert_chain_as_pem();
        Self {
            inner: Arc::new(Mutex::new(FakeFleetClientInner {
                calls: vec![],
                failures: BTreeMap::new(),
                hooks: BTreeMap::new(),
                members: BTreeMap::new(),
                server_configs: BTreeMap::new(),
                os_data: OsData::default(),
                primary_nic: None,
                certificate,
            })),
        }
    }

    pub fn calls(&self) -> Vec<(FleetOp, String)> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, op: FleetOp) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(call, _)| *call == op)
            .map(|(_, target)| target)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Makes every call of `op` fail with `error`.
    pub fn fail(&self, op: FleetOp, error: ClientError) {
        self.fail_times(op, error, usize::MAX);
    }

    /// Makes the next `times` calls of `op` fail with `error`.
    pub fn fail_times(&self, op: FleetOp, error: ClientError, times: usize) {
        self.inner.lock().unwrap().failures.insert(op, (error, times));
    }

    /// Runs `hook` with the call's target each time `op` is called, before
    /// the call does anything else.
    pub fn on_call<F, Fut>(&self, op: FleetOp, hook: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: Hook = Arc::new(move |target| Box::pin(hook(target)));
        self.inner.lock().unwrap().hooks.insert(op, hook);
    }

    pub fn set_os_data(&self, os_data: OsData) {
        self.inner.lock().unwrap().os_data = os_data;
    }

    /// The certificate `enable_cluster` hands out
    pub fn cluster_certificate(&self) -> String {
        self.inner.lock().unwrap().certificate.clone()
    }

    pub fn server_config(
        &self,
        server_name: &str,
    ) -> Option<BTreeMap<String, String>> {
        self.inner.lock().unwrap().server_configs.get(server_name).cloned()
    }

    pub fn primary_nic(&self) -> Option<String> {
        self.inner.lock().unwrap().primary_nic.clone()
    }

    /// Records the call, runs its hook and consumes any injected failure.
    async fn enter(
        &self,
        op: FleetOp,
        target: String,
    ) -> Result<(), ClientError> {
        let hook = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push((op, target.clone()));
            inner.hooks.get(&op).cloned()
        };
        if let Some(hook) = hook {
            hook(target).await;
        }

        let mut inner = self.inner.lock().unwrap();
        let Some((error, remaining)) = inner.failures.get_mut(&op) else {
            return Ok(());
        };
        let error = error.clone();
        *remaining -= 1;
        if *remaining == 0 {
            inner.failures.remove(&op);
        }
        Err(error)
    }
}

fn names(servers: &[Endpoint]) -> String {
    servers.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl FleetClient for FakeFleetClient {
    async fn ping(&self, target: &Endpoint) -> Result<(), ClientError> {
        self.enter(FleetOp::Ping, target.name.clone()).await
    }

    async fn enable_os_service_lvm(
        &self,
        server: &Endpoint,
    ) -> Result<(), ClientError> {
        self.enter(FleetOp::EnableOsServiceLvm, server.name.clone()).await
    }

    async fn set_server_config(
        &self,
        server: &Endpoint,
        config: &BTreeMap<String, String>,
    ) -> Result<(), ClientError> {
        self.enter(FleetOp::SetServerConfig, server.name.clone()).await?;
        self.inner
            .lock()
            .unwrap()
            .server_configs
            .insert(server.name.clone(), config.clone());
        Ok(())
    }

    async fn enable_cluster(
        &self,
        server: &Endpoint,
    ) -> Result<String, ClientError> {
        self.enter(FleetOp::EnableCluster, server.name.clone()).await?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .members
            .insert(server.connection_url.clone(), vec![server.name.clone()]);
        Ok(inner.certificate.clone())
    }

    async fn get_cluster_node_names(
        &self,
        cluster: &Endpoint,
    ) -> Result<Vec<String>, ClientError> {
        self.enter(FleetOp::GetClusterNodeNames, cluster.name.clone()).await?;
        let inner = self.inner.lock().unwrap();
        inner.members.get(&cluster.connection_url).cloned().ok_or_else(|| {
            ClientError::Rejected {
                endpoint: cluster.name.clone(),
                message: String::from("clustering is not enabled"),
            }
        })
    }

    async fn get_cluster_join_token(
        &self,
        cluster: &Endpoint,
        member_name: &str,
    ) -> Result<String, ClientError> {
        self.enter(FleetOp::GetClusterJoinToken, cluster.name.clone()).await?;
        Ok(format!("{}:{}", cluster.name, member_name))
    }

    async fn join_cluster(
        &self,
        server: &Endpoint,
        join_token: &str,
        cluster: &Endpoint,
    ) -> Result<(), ClientError> {
        self.enter(FleetOp::JoinCluster, server.name.clone()).await?;
        if join_token != format!("{}:{}", cluster.name, server.name) {
            return Err(ClientError::Rejected {
                endpoint: server.name.clone(),
                message: format!("bad join token {:?}", join_token),
            });
        }
        if cluster.certificate.is_none() {
            return Err(ClientError::Rejected {
                endpoint: server.name.clone(),
                message: String::from("no cluster certificate to trust"),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        let Some(members) = inner.members.get_mut(&cluster.connection_url)
        else {
            return Err(ClientError::Unreachable {
                endpoint: cluster.name.clone(),
                message: String::from("no such cluster"),
            });
        };
        members.push(server.name.clone());
        Ok(())
    }

    async fn create_project(
        &self,
        cluster: &Endpoint,
        _name: &str,
        _description: &str,
    ) -> Result<(), ClientError> {
        self.enter(FleetOp::CreateProject, cluster.name.clone()).await
    }

    async fn initialize_default_storage(
        &self,
        servers: &[Endpoint],
    ) -> Result<(), ClientError> {
        self.enter(FleetOp::InitializeDefaultStorage, names(servers)).await
    }

    async fn get_os_data(
        &self,
        server: &Endpoint,
    ) -> Result<OsData, ClientError> {
        self.enter(FleetOp::GetOsData, server.name.clone()).await?;
        Ok(self.inner.lock().unwrap().os_data.clone())
    }

    async fn initialize_default_networking(
        &self,
        servers: &[Endpoint],
        primary_nic: &str,
    ) -> Result<(), ClientError> {
        self.enter(FleetOp::InitializeDefaultNetworking, names(servers))
            .await?;
        self.inner.lock().unwrap().primary_nic = Some(primary_nic.to_string());
        Ok(())
    }

    async fn update_cluster_certificate(
        &self,
        cluster: &Endpoint,
        certificate_pem: &str,
        _key_pem: &str,
    ) -> Result<(), ClientError> {
        self.enter(FleetOp::UpdateClusterCertificate, cluster.name.clone())
            .await?;
        self.inner.lock().unwrap().certificate = certificate_pem.to_string();
        Ok(())
    }
}

/// A fake inventory syncer that remembers which clusters it was asked about
pub struct FakeInventorySyncer {
    inner: Mutex<FakeInventorySyncerInner>,
}

#[derive(Default)]
struct FakeInventorySyncerInner {
    synced: Vec<String>,
    fail_on: Option<String>,
    cancel_on: Option<String>,
}

impl FakeInventorySyncer {
    pub fn new() -> Self {
        Self { inner: Mutex::new(FakeInventorySyncerInner::default()) }
    }

    pub fn synced(&self) -> Vec<String> {
        self.inner.lock().unwrap().synced.clone()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().synced.clear();
    }

    /// Fail when asked to sync `cluster_name`.
    pub fn fail_on(&self, cluster_name: &str) {
        self.inner.lock().unwrap().fail_on = Some(cluster_name.to_string());
    }

    /// Cancel the caller's context while syncing `cluster_name`.
    pub fn cancel_on(&self, cluster_name: &str) {
        self.inner.lock().unwrap().cancel_on = Some(cluster_name.to_string());
    }
}

#[async_trait]
impl InventorySyncer for FakeInventorySyncer {
    async fn sync_cluster(
        &self,
        opctx: &OpContext,
        cluster_name: &str,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.synced.push(cluster_name.to_string());
        if inner.cancel_on.as_deref() == Some(cluster_name) {
            opctx.cancellation_token().cancel();
        }
        if inner.fail_on.as_deref() == Some(cluster_name) {
            return Err(Error::internal_error(&format!(
                "injected failure syncing {cluster_name}"
            )));
        }
        Ok(())
    }
}
