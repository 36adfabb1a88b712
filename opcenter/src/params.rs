// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Params define the request bodies of cluster operations.

use crate::db::model::ClusterStatus;
use opcenter_common::api::external::Error;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use url::Url;

/// Create-time parameters for a cluster
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterCreate {
    pub name: String,
    /// Servers to bond together.  The first one is the seed: clustering is
    /// bootstrapped on it and the others join through it.
    pub server_names: Vec<String>,
    /// Address clients should use to reach the cluster.  Defaults to the
    /// seed server's address.
    #[serde(default)]
    pub connection_url: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

impl ClusterCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::invalid_value("name", "must not be empty"));
        }
        validate_server_names(&self.server_names)?;
        if let Some(url) = &self.connection_url {
            validate_connection_url(url)?;
        }
        Ok(())
    }
}

/// Updateable properties of a cluster
///
/// `server_names` must list as many servers as the cluster has now: clusters
/// cannot grow or shrink through an update.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterUpdate {
    pub server_names: Vec<String>,
    #[serde(default)]
    pub connection_url: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub status: Option<ClusterStatus>,
}

impl ClusterUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(url) = &self.connection_url {
            validate_connection_url(url)?;
        }
        Ok(())
    }
}

/// A new certificate for a cluster to present, with its private key
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterCertificateUpdate {
    /// PEM chain, leaf first
    pub certificate: String,
    pub key: String,
}

fn validate_server_names(names: &[String]) -> Result<(), Error> {
    if names.is_empty() {
        return Err(Error::invalid_value(
            "server_names",
            "at least one server is required",
        ));
    }
    let mut seen = BTreeSet::new();
    for name in names {
        if name.is_empty() {
            return Err(Error::invalid_value(
                "server_names",
                "server names must not be empty",
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::invalid_value(
                "server_names",
                &format!("server {:?} is listed more than once", name),
            ));
        }
    }
    Ok(())
}

fn validate_connection_url(url: &str) -> Result<(), Error> {
    let parsed = Url::parse(url).map_err(|e| {
        Error::invalid_value("connection_url", &format!("{:?}: {}", url, e))
    })?;
    if parsed.scheme() != "https" || parsed.host_str().is_none() {
        return Err(Error::invalid_value(
            "connection_url",
            &format!("{:?} is not an https URL", url),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    fn create(name: &str, servers: &[&str]) -> ClusterCreate {
        ClusterCreate {
            name: name.to_string(),
            server_names: servers.iter().map(|s| s.to_string()).collect(),
            connection_url: None,
            channel: None,
        }
    }

    #[test]
    fn test_cluster_create_validation() {
        assert!(create("one", &["server1", "server2"]).validate().is_ok());

        assert_matches!(
            create("", &["server1"]).validate(),
            Err(Error::InvalidValue { label, .. }) if label == "name"
        );
        assert_matches!(
            create("one", &[]).validate(),
            Err(Error::InvalidValue { label, .. }) if label == "server_names"
        );
        assert_matches!(
            create("one", &["server1", ""]).validate(),
            Err(Error::InvalidValue { label, .. }) if label == "server_names"
        );
        assert_matches!(
            create("one", &["server1", "server2", "server1"]).validate(),
            Err(Error::InvalidValue { message, .. })
                if message.contains("\"server1\"")
        );

        for (url, ok) in [
            ("https://one.example.com:8443", true),
            ("https://[2001:db8::1]:8443", true),
            ("http://one.example.com:8443", false),
            ("one.example.com:8443", false),
            ("not a url", false),
        ] {
            let mut params = create("one", &["server1"]);
            params.connection_url = Some(url.to_string());
            assert_eq!(params.validate().is_ok(), ok, "{url}");
        }
    }
}
