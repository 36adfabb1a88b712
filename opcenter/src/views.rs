// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Views are response bodies, most of which are public lenses onto DB models.

use crate::db::model;
use crate::db::model::ClusterStatus;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// A cluster together with the servers that currently belong to it
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub connection_url: String,
    pub certificate: Option<String>,
    pub fingerprint: String,
    pub status: ClusterStatus,
    pub server_names: Vec<String>,
    pub channel: String,
    pub time_modified: DateTime<Utc>,
}

impl Cluster {
    pub fn new(cluster: model::Cluster, server_names: Vec<String>) -> Self {
        Self {
            name: cluster.name,
            connection_url: cluster.connection_url,
            certificate: cluster.certificate,
            fingerprint: cluster.fingerprint,
            status: cluster.status,
            server_names,
            channel: cluster.channel,
            time_modified: cluster.time_modified,
        }
    }
}
