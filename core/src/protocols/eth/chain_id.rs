// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{fmt, str::FromStr};

use derive_more::{From, Into};
use ethers::core::types::U256;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// An EIP-155 chain id. Chain id 0 is used for networks that aren't bound to a chain.
/// Any chain id may be collected, the well known constants only carry default RPC endpoints and
/// asset directory names.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    pub const UNBOUND: Self = Self(0);
    pub const ETH_MAINNET: Self = Self(1);
    pub const OPTIMISM: Self = Self(10);
    pub const BSC: Self = Self(56);
    pub const GNOSIS: Self = Self(100);
    pub const POLYGON: Self = Self(137);
    pub const PULSECHAIN: Self = Self(369);
    pub const PULSECHAIN_TESTNET_V4: Self = Self(943);
    pub const BASE: Self = Self(8453);
    pub const ARBITRUM: Self = Self(42161);
    pub const AVALANCHE: Self = Self(43114);

    const KNOWN: [Self; 10] = [
        Self::ETH_MAINNET,
        Self::OPTIMISM,
        Self::BSC,
        Self::GNOSIS,
        Self::POLYGON,
        Self::PULSECHAIN,
        Self::PULSECHAIN_TESTNET_V4,
        Self::BASE,
        Self::ARBITRUM,
        Self::AVALANCHE,
    ];

    pub const fn new(chain_id: u64) -> Self {
        Self(chain_id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Public RPC endpoints in order of preference. Overridden by `RPC_<chainId>`.
    pub fn default_rpc_endpoints(&self) -> Vec<Url> {
        let raw_urls: &[&str] = match self.0 {
            1 => &["https://rpc.ankr.com/eth", "https://eth.llamarpc.com"],
            10 => &["https://mainnet.optimism.io", "https://rpc.ankr.com/optimism"],
            56 => &[
                "https://bsc-dataseed.bnbchain.org",
                "https://rpc.ankr.com/bsc",
            ],
            100 => &["https://rpc.gnosischain.com", "https://rpc.ankr.com/gnosis"],
            137 => &["https://polygon-rpc.com", "https://rpc.ankr.com/polygon"],
            369 => &[
                "https://rpc.pulsechain.com",
                "https://pulsechain-rpc.publicnode.com",
            ],
            943 => &["https://rpc.v4.testnet.pulsechain.com"],
            8453 => &["https://mainnet.base.org"],
            42161 => &["https://arb1.arbitrum.io/rpc", "https://rpc.ankr.com/arbitrum"],
            43114 => &["https://api.avax.network/ext/bc/C/rpc"],
            _ => &[],
        };
        raw_urls
            .iter()
            .map(|raw_url| Url::parse(raw_url).expect("unit test catches panics"))
            .collect()
    }

    /// Directory name of the chain in Trust Wallet style asset repositories.
    pub fn trust_wallet_asset_name(&self) -> Option<&'static str> {
        match self.0 {
            1 => Some("ethereum"),
            10 => Some("optimism"),
            56 => Some("smartchain"),
            100 => Some("xdai"),
            137 => Some("polygon"),
            369 => Some("pulsechain"),
            8453 => Some("base"),
            42161 => Some("arbitrum"),
            43114 => Some("avalanchec"),
            _ => None,
        }
    }

    /// Reverse of `trust_wallet_asset_name`.
    pub fn from_trust_wallet_asset_name(name: &str) -> Option<Self> {
        Self::KNOWN
            .into_iter()
            .find(|chain_id| chain_id.trust_wallet_asset_name() == Some(name))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = Error;

    /// Accepts decimal and `0x` prefixed hex chain ids.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let value = match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        }
        .map_err(|_| Error::Malformed {
            error: format!("Invalid chain id: '{s}'"),
        })?;
        Ok(Self(value))
    }
}

impl From<ChainId> for U256 {
    fn from(chain_id: ChainId) -> Self {
        chain_id.0.into()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn to_json() -> Result<()> {
        let s = serde_json::to_string(&ChainId::PULSECHAIN)?;
        assert_eq!(s, "369");
        Ok(())
    }

    #[test]
    fn to_string() {
        assert_eq!(ChainId::ETH_MAINNET.to_string(), "1");
    }

    #[test]
    fn from_string() -> Result<()> {
        assert_eq!("0x89".parse::<ChainId>()?, ChainId::POLYGON);
        assert_eq!("369".parse::<ChainId>()?, ChainId::PULSECHAIN);
        assert!("pulse".parse::<ChainId>().is_err());
        Ok(())
    }

    #[test]
    fn chain_rpc_endpoints_dont_panic() {
        for chain_id in ChainId::KNOWN {
            let endpoints = chain_id.default_rpc_endpoints();
            assert!(!endpoints.is_empty());
            assert!(endpoints.iter().all(|url| url.host().is_some()));
        }
    }

    #[test]
    fn unknown_chain_has_no_endpoints() {
        assert!(ChainId::new(123456789).default_rpc_endpoints().is_empty());
    }

    #[test]
    fn asset_names_round_trip() {
        for chain_id in ChainId::KNOWN {
            if let Some(name) = chain_id.trust_wallet_asset_name() {
                assert_eq!(ChainId::from_trust_wallet_asset_name(name), Some(chain_id));
            }
        }
    }
}
