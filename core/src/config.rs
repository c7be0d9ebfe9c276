// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{collections::HashMap, env, str::FromStr, time::Duration};

use url::Url;

use crate::{image_store::ImageModeSetting, protocols::eth::ChainId, Error};

// Thread pools
pub const DB_CONNECTION_POOL_SIZE: u32 = 8;
pub const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(30);
pub const TOKIO_MAX_BLOCKING_THREADS: usize = 16;

// Fetch layer
pub const MAX_REQUESTS_PER_HOST: usize = 16;
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(3);
pub const FETCH_MAX_ATTEMPTS: u32 = 2;
pub const FETCH_RETRY_DELAY: Duration = Duration::from_millis(250);
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_IPFS_GATEWAYS: [&str; 2] = ["https://ipfs.io", "https://cloudflare-ipfs.com"];

// On-chain reader
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";
pub const RPC_MAX_RETRIES: u32 = 3;
pub const RPC_BACKOFF_BASE: Duration = Duration::from_millis(2000);
pub const RPC_BACKOFF_MAX: Duration = Duration::from_millis(10000);
pub const RPC_ENV_PREFIX: &str = "RPC_";
/// Fallback decimals when a token can't be read.
pub const DEFAULT_DECIMALS: u8 = 18;

// Collectors
pub const COLLECTOR_CONCURRENCY: usize = 8;
pub const BRIDGE_BLOCK_RANGE: u64 = 10_000;
pub const PAGINATED_MAX_PAGES: usize = 1_000;
/// Trust Wallet asset repository checkout, relative to the working directory.
pub const TRUST_WALLET_ASSETS_DIR: &str = "./submodules/trustwallet";

// Images
pub const IMAGE_PATH_PREFIX: &str = "image";
/// Providers of unverified origin whose images are linked rather than saved in `mixed` mode.
pub const LINK_BY_DEFAULT_PROVIDERS: [&str; 2] = ["pumptires", "coingecko"];

// Defaults of the environment settings
pub const DEFAULT_DATABASE_URL: &str = "./tokens.sqlite3";
pub const DEFAULT_ROOT_URI: &str = "http://localhost:3000";

/// Settings recognized from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub root_uri: Url,
    pub rpc_overrides: HashMap<ChainId, Vec<Url>>,
    pub ipfs_gateways: Vec<Url>,
    pub image_mode: ImageModeSetting,
    pub http_cache_dir: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(env::vars())
    }

    /// Build settings from key-value pairs. Unknown keys are ignored.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self, Error> {
        let mut settings = Self::default();
        for (key, value) in vars {
            match key.as_str() {
                "DATABASE_URL" => settings.database_url = value,
                "ROOT_URI" => settings.root_uri = parse_url(&value)?,
                "IPFS_GATEWAYS" => settings.ipfs_gateways = parse_url_list(&value)?,
                "IMAGE_MODE" => settings.image_mode = ImageModeSetting::from_str(&value)?,
                "HTTP_CACHE_DIR" if !value.is_empty() => {
                    settings.http_cache_dir = Some(value)
                }
                _ => {
                    if let Some(chain_id) = key.strip_prefix(RPC_ENV_PREFIX) {
                        // Not every `RPC_*` var is ours, only the numeric ones.
                        if let Ok(chain_id) = chain_id.parse::<u64>() {
                            settings
                                .rpc_overrides
                                .insert(ChainId::new(chain_id), parse_url_list(&value)?);
                        }
                    }
                }
            }
        }
        Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.into(),
            root_uri: Url::parse(DEFAULT_ROOT_URI).expect("static url is valid"),
            rpc_overrides: Default::default(),
            ipfs_gateways: DEFAULT_IPFS_GATEWAYS
                .iter()
                .map(|gw| Url::parse(gw).expect("static url is valid"))
                .collect(),
            image_mode: Default::default(),
            http_cache_dir: None,
        }
    }
}

pub fn parse_url_list(value: &str) -> Result<Vec<Url>, Error> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_url)
        .collect()
}

fn parse_url(value: &str) -> Result<Url, Error> {
    Url::parse(value).map_err(|err| Error::Config {
        explanation: format!("Invalid url '{value}': {err}"),
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_env() -> Result<()> {
        let settings = Settings::from_vars(vec![])?;
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.ipfs_gateways.len(), 2);
        Ok(())
    }

    #[test]
    fn rpc_overrides_by_chain_id() -> Result<()> {
        let settings = Settings::from_vars(vars(&[
            ("RPC_369", "https://rpc.pulsechain.com, https://pulse.example.com"),
            ("RPC_1", "https://eth.example.com"),
            ("RPC_TOKEN", "not-a-chain"),
        ]))?;
        assert_eq!(settings.rpc_overrides.len(), 2);
        assert_eq!(settings.rpc_overrides[&ChainId::new(369)].len(), 2);
        Ok(())
    }

    #[test]
    fn invalid_gateway_is_config_error() {
        let result = Settings::from_vars(vars(&[("IPFS_GATEWAYS", "not a url")]));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn serving_layer_vars_are_ignored() -> Result<()> {
        let settings = Settings::from_vars(vars(&[("CACHE_SECONDS", "soon"), ("PORT", "3000")]))?;
        assert_eq!(settings, Settings::default());
        Ok(())
    }

    #[test]
    fn parses_image_mode() -> Result<()> {
        let settings = Settings::from_vars(vars(&[("IMAGE_MODE", "link")]))?;
        assert_eq!(settings.image_mode, ImageModeSetting::Link);
        Ok(())
    }
}
