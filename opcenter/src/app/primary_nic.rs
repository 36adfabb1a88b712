// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Choosing the interface default networking is bound to

use fleet_client::OsData;

/// Used when a server reports no network configuration at all
pub const FALLBACK_PRIMARY_NIC: &str = "enp5s0";

/// Role operators tag the interface they want used with
const PRIMARY_ROLE: &str = "primary";

/// Picks the primary network interface of a server.
///
/// In order of preference: the first configured interface with the `primary`
/// role, the first configured interface that currently has an address, the
/// first configured interface.  Without any configuration the result is
/// [`FALLBACK_PRIMARY_NIC`].
pub fn select_primary_nic(os_data: &OsData) -> String {
    let Some(config) = &os_data.network.config else {
        return FALLBACK_PRIMARY_NIC.to_string();
    };

    if let Some(iface) = config
        .interfaces
        .iter()
        .find(|iface| iface.roles.iter().any(|role| role == PRIMARY_ROLE))
    {
        return iface.name.clone();
    }

    let live = &os_data.network.state.interfaces;
    if let Some(iface) = config.interfaces.iter().find(|iface| {
        live.get(&iface.name).is_some_and(|state| !state.addresses.is_empty())
    }) {
        return iface.name.clone();
    }

    config
        .interfaces
        .first()
        .map(|iface| iface.name.clone())
        .unwrap_or_else(|| FALLBACK_PRIMARY_NIC.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use fleet_client::types::{
        InterfaceConfig, InterfaceState, NetworkConfig, NetworkData,
        NetworkState,
    };

    fn iface(name: &str, roles: &[&str]) -> InterfaceConfig {
        InterfaceConfig {
            name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            addresses: vec![],
        }
    }

    fn live(name: &str, addresses: &[&str]) -> (String, InterfaceState) {
        let addresses = addresses.iter().map(|a| a.to_string()).collect();
        (name.to_string(), InterfaceState { addresses })
    }

    fn os_data(
        config: Option<Vec<InterfaceConfig>>,
        state: Vec<(String, InterfaceState)>,
    ) -> OsData {
        OsData {
            network: NetworkData {
                config: config.map(|interfaces| NetworkConfig { interfaces }),
                state: NetworkState { interfaces: state.into_iter().collect() },
            },
        }
    }

    #[test]
    fn test_select_primary_nic() {
        let cases = [
            ("no configuration", os_data(None, vec![]), FALLBACK_PRIMARY_NIC),
            (
                "no configured interfaces",
                os_data(Some(vec![]), vec![live("enp7s0", &["10.0.0.7/24"])]),
                FALLBACK_PRIMARY_NIC,
            ),
            (
                "primary role wins over addresses",
                os_data(
                    Some(vec![
                        iface("enp5s0", &["management"]),
                        iface("enp6s0", &["primary"]),
                        iface("enp7s0", &["primary"]),
                    ]),
                    vec![live("enp5s0", &["10.0.0.5/24"])],
                ),
                "enp6s0",
            ),
            (
                "first interface with an address",
                os_data(
                    Some(vec![
                        iface("enp5s0", &[]),
                        iface("enp6s0", &[]),
                        iface("enp7s0", &[]),
                    ]),
                    vec![
                        live("enp5s0", &[]),
                        live("enp7s0", &["10.0.0.7/24"]),
                        live("lo", &["127.0.0.1/8"]),
                    ],
                ),
                "enp7s0",
            ),
            (
                "first configured interface",
                os_data(
                    Some(vec![
                        iface("bond0", &["storage"]),
                        iface("enp6s0", &[]),
                    ]),
                    vec![live("lo", &["127.0.0.1/8"])],
                ),
                "bond0",
            ),
        ];

        for (description, input, expected) in &cases {
            assert_eq!(
                select_primary_nic(input),
                *expected,
                "case: {description}"
            );
        }
    }
}
