// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::impl_text_enum;
use crate::schema::server;
use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};

impl_text_enum!(
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum ServerType;
    fallback = Unknown;

    Unknown => "unknown"
    Incus => "incus"
    MigrationManager => "migration-manager"
    OperationsCenter => "operations-center"
);

impl_text_enum!(
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ServerStatus;
    fallback = Unknown;

    Unknown => "unknown"
    Pending => "pending"
    Ready => "ready"
    Offline => "offline"
);

/// Version information reported by a server, kept as an opaque JSON document.
#[derive(
    Clone, Debug, Deserialize, PartialEq, Serialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
pub struct VersionData(pub serde_json::Value);

impl Default for VersionData {
    fn default() -> Self {
        VersionData(serde_json::Value::Object(Default::default()))
    }
}

impl ToSql<Text, Sqlite> for VersionData {
    fn to_sql<'a>(
        &'a self,
        out: &mut Output<'a, '_, Sqlite>,
    ) -> serialize::Result {
        out.set_value(serde_json::to_string(&self.0)?);
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for VersionData {
    fn from_sql(
        bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(VersionData(serde_json::from_str(&s)?))
    }
}

/// A hypervisor node enrolled with the operations center.
///
/// `cluster_name` is the only record of cluster membership.
#[derive(
    Queryable, Insertable, Selectable, AsChangeset, Clone, Debug, PartialEq,
)]
#[diesel(table_name = server, primary_key(name), treat_none_as_null = true)]
pub struct Server {
    pub name: String,
    pub cluster_name: Option<String>,
    pub connection_url: String,
    pub certificate: String,
    pub server_type: ServerType,
    pub status: ServerStatus,
    pub version_data: VersionData,
    pub time_modified: DateTime<Utc>,
    pub time_last_seen: DateTime<Utc>,
}

impl Server {
    /// Returns a freshly enrolled server that does not belong to any cluster.
    pub fn new(
        name: String,
        connection_url: String,
        certificate: String,
        server_type: ServerType,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            cluster_name: None,
            connection_url,
            certificate,
            server_type,
            status: ServerStatus::Pending,
            version_data: VersionData::default(),
            time_modified: now,
            time_last_seen: now,
        }
    }
}
