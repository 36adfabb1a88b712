// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Describes the Diesel database schema.
//!
//! NOTE: Should be kept up-to-date with dbinit.sql.

table! {
    cluster (name) {
        name -> Text,
        connection_url -> Text,
        certificate -> Nullable<Text>,
        fingerprint -> Text,
        status -> Text,
        channel -> Text,
        time_modified -> TimestamptzSqlite,
    }
}

table! {
    server (name) {
        name -> Text,
        cluster_name -> Nullable<Text>,
        connection_url -> Text,
        certificate -> Text,
        server_type -> Text,
        status -> Text,
        version_data -> Text,
        time_modified -> TimestamptzSqlite,
        time_last_seen -> TimestamptzSqlite,
    }
}

joinable!(server -> cluster (cluster_name));
allow_tables_to_appear_in_same_query!(cluster, server);
