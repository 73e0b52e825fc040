//! Registry of well-known settlement networks.
//!
//! Requirements name their network with a short v1 name such as
//! `"base-sepolia"`. The registry maps those names to CAIP-2 identifiers
//! (`namespace:reference`) and lets configuration code warn about typos.
//! Networks outside the registry are still accepted everywhere: the list is
//! a convenience, not an allow-list.

/// A known network with its CAIP-2 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// v1 network name, e.g. `"base-sepolia"`.
    pub name: &'static str,
    /// CAIP-2 namespace, e.g. `"eip155"`.
    pub namespace: &'static str,
    /// CAIP-2 reference, e.g. `"84532"`.
    pub reference: &'static str,
}

impl NetworkInfo {
    const fn new(name: &'static str, namespace: &'static str, reference: &'static str) -> Self {
        Self {
            name,
            namespace,
            reference,
        }
    }

    /// The CAIP-2 identifier, e.g. `"eip155:84532"`.
    pub fn caip2(&self) -> String {
        format!("{}:{}", self.namespace, self.reference)
    }

    fn has_caip2(&self, id: &str) -> bool {
        id.split_once(':')
            .is_some_and(|(ns, r)| ns == self.namespace && r == self.reference)
    }
}

pub static KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo::new("base", "eip155", "8453"),
    NetworkInfo::new("base-sepolia", "eip155", "84532"),
    NetworkInfo::new("polygon", "eip155", "137"),
    NetworkInfo::new("polygon-amoy", "eip155", "80002"),
    NetworkInfo::new("avalanche", "eip155", "43114"),
    NetworkInfo::new("avalanche-fuji", "eip155", "43113"),
    NetworkInfo::new("sei", "eip155", "1329"),
    NetworkInfo::new("sei-testnet", "eip155", "1328"),
    NetworkInfo::new("xdc", "eip155", "50"),
    NetworkInfo::new("xrpl-evm", "eip155", "1440000"),
    NetworkInfo::new("peaq", "eip155", "3338"),
    NetworkInfo::new("iotex", "eip155", "4689"),
    NetworkInfo::new("celo", "eip155", "42220"),
    NetworkInfo::new("celo-sepolia", "eip155", "11142220"),
    NetworkInfo::new("solana", "solana", "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"),
    NetworkInfo::new("solana-devnet", "solana", "EtWTRABZaYq6iMfeYKouRu166VU2xqa1"),
];

/// Looks a network up by v1 name or by CAIP-2 identifier.
pub fn find_network(network: &str) -> Option<&'static NetworkInfo> {
    KNOWN_NETWORKS
        .iter()
        .find(|n| n.name == network || n.has_caip2(network))
}

pub fn is_known_network(network: &str) -> bool {
    find_network(network).is_some()
}
