// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files and working with an operations
//! center configuration

use camino::Utf8Path;
use camino::Utf8PathBuf;
use dropshot::ConfigLogging;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use serde_with::DurationSeconds;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Configuration for an operations center
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// Server-wide logging configuration.
    pub log: ConfigLogging,
    /// Where the local state lives.
    pub database: DatabaseConfig,
    /// Knobs for cluster formation.
    #[serde(default)]
    pub cluster: ClusterConfig,
}

impl Config {
    /// Load a `Config` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file, or `:memory:`.
    pub path: Utf8PathBuf,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// How long an outer retry loop keeps re-running a cluster creation that
    /// failed because a member could not be reached.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "create_retry_timeout_secs")]
    pub create_retry_timeout: Duration,
    /// Update channel assigned to clusters created without one.
    pub default_channel: String,
    /// Port members serve their API on once clustered.
    pub https_port: u16,
    /// Extra settings pushed to every member before clustering.  These take
    /// precedence over the generated base settings.
    pub server_config: BTreeMap<String, String>,
    pub default_project: DefaultProjectConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            create_retry_timeout: Duration::from_secs(300),
            default_channel: String::from("stable"),
            https_port: 8443,
            server_config: BTreeMap::new(),
            default_project: DefaultProjectConfig::default(),
        }
    }
}

/// Project created on every new cluster
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DefaultProjectConfig {
    pub name: String,
    pub description: String,
}

impl Default for DefaultProjectConfig {
    fn default() -> Self {
        DefaultProjectConfig {
            name: String::from("internal"),
            description: String::from(
                "Internal project to hold operations center resources",
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}
