// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data reported by servers about their operating system

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct OsData {
    #[serde(default)]
    pub network: NetworkData,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NetworkData {
    /// The network configuration the server was installed with, if any.
    #[serde(default)]
    pub config: Option<NetworkConfig>,
    /// What the kernel currently reports.
    #[serde(default)]
    pub state: NetworkState,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NetworkState {
    /// Live interfaces, keyed by name.
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceState>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct InterfaceState {
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_os_data_sparse_document() {
        let data: OsData = serde_json::from_str(
            r#"{
                "network": {
                    "config": {
                        "interfaces": [
                            { "name": "enp5s0", "roles": ["management"] },
                            { "name": "enp6s0" }
                        ]
                    },
                    "state": {
                        "interfaces": {
                            "enp6s0": { "addresses": ["10.0.0.2/24"] }
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let config = data.network.config.as_ref().unwrap();
        assert_eq!(config.interfaces.len(), 2);
        assert_eq!(config.interfaces[0].roles, vec!["management"]);
        assert!(config.interfaces[1].roles.is_empty());
        assert_eq!(
            data.network.state.interfaces["enp6s0"].addresses,
            vec!["10.0.0.2/24"]
        );

        let empty: OsData = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, OsData::default());
    }
}
