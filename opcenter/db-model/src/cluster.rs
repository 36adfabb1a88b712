// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::impl_text_enum;
use crate::schema::cluster;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

impl_text_enum!(
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ClusterStatus;
    fallback = Unknown;

    Unknown => "unknown"
    Pending => "pending"
    Ready => "ready"
);

/// A group of servers bonded into one management domain.
///
/// Membership is not stored here: each [`crate::Server`] names the cluster it
/// belongs to.
#[derive(
    Queryable, Insertable, Selectable, AsChangeset, Clone, Debug, PartialEq,
)]
#[diesel(table_name = cluster, primary_key(name), treat_none_as_null = true)]
pub struct Cluster {
    pub name: String,
    pub connection_url: String,
    pub certificate: Option<String>,
    pub fingerprint: String,
    pub status: ClusterStatus,
    pub channel: String,
    pub time_modified: DateTime<Utc>,
}

impl Cluster {
    /// Returns a cluster that has just been formed and is awaiting
    /// confirmation that it is healthy.
    pub fn new_pending(
        name: String,
        connection_url: String,
        certificate: Option<String>,
        fingerprint: String,
        channel: String,
    ) -> Self {
        Self {
            name,
            connection_url,
            certificate,
            fingerprint,
            status: ClusterStatus::Pending,
            channel,
            time_modified: Utc::now(),
        }
    }
}
