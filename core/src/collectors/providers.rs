// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Built-in providers and the default list order.

use std::collections::HashMap;

use crate::{
    collectors::{
        BridgeSpec, Collector, CollectorSpec, FilesystemSpec, PaginatedSpec, ProviderInfo,
        RemoteListSpec,
    },
    config,
    db::{
        models::{ListOrderRef, NewListOrder, NewProvider},
        ConnectionPool,
    },
    protocols::eth::ChainId,
    Error,
};

pub const UNISWAP: &str = "uniswap";
pub const COINGECKO: &str = "coingecko";
pub const TRUST_WALLET: &str = "trustwallet";
pub const PUMP_TIRES: &str = "pumptires";
pub const OMNIBRIDGE: &str = "omnibridge";

/// Owner of list orders that aren't published by a single provider.
const LIST_ORDER_OWNER: &str = "tokenlists";
pub const DEFAULT_LIST_ORDER: &str = "default";

/// Every collector known to the binary, keyed by provider key.
pub fn builtin() -> Vec<Collector> {
    vec![
        Collector::new(
            ProviderInfo::new(UNISWAP, "Uniswap", "Uniswap Labs default token list"),
            CollectorSpec::RemoteList(RemoteListSpec {
                default_list: true,
                ..RemoteListSpec::new("https://tokens.uniswap.org", "hosted")
            }),
        ),
        Collector::new(
            ProviderInfo::new(COINGECKO, "CoinGecko", "CoinGecko token lists"),
            CollectorSpec::RemoteList(
                RemoteListSpec::new(
                    "https://tokens.coingecko.com/pulsechain/all.json",
                    "pulsechain",
                )
                .with_chain_id(ChainId::PULSECHAIN),
            ),
        ),
        Collector::new(
            ProviderInfo::new(TRUST_WALLET, "Trust Wallet", "Trust Wallet assets repository"),
            CollectorSpec::FilesystemWalk(FilesystemSpec::new(config::TRUST_WALLET_ASSETS_DIR)),
        ),
        Collector::new(
            ProviderInfo::new(PUMP_TIRES, "Pump Tires", "Tokens launched on pump.tires"),
            CollectorSpec::PaginatedApi(PaginatedSpec::new(
                "https://api.pump.tires/api/tokens?page={page}",
                "pls",
                "Pump Tires PulseChain",
                ChainId::PULSECHAIN,
            )),
        ),
        Collector::new(
            ProviderInfo::new(
                OMNIBRIDGE,
                "OmniBridge",
                "Tokens bridged between Ethereum and PulseChain",
            ),
            CollectorSpec::BridgeScan(BridgeSpec {
                home_chain_id: ChainId::PULSECHAIN,
                home_address: "0x4fd0aaa7506f3d9cb8274bdb946ec42a1b8751ef".into(),
                home_start_block: 17_268_302,
                foreign_chain_id: ChainId::ETH_MAINNET,
                foreign_address: "0x1715a3e4a142d8b698131108995174f37aeba10d".into(),
                foreign_start_block: 17_264_119,
            }),
        ),
    ]
}

/// Insert the built-in providers and the default list order. Safe to run repeatedly.
pub fn seed(pool: &ConnectionPool) -> Result<(), Error> {
    let collectors = builtin();
    pool.deferred_transaction(|mut tx_conn| {
        let mut provider_ids = HashMap::new();
        for collector in collectors.iter() {
            let provider_id = NewProvider::builder()
                .key(&collector.provider.key)
                .name(&collector.provider.name)
                .description(&collector.provider.description)
                .build()
                .upsert(&mut tx_conn)?;
            provider_ids.insert(collector.key(), provider_id);
        }
        let owner_id = NewProvider::builder()
            .key(LIST_ORDER_OWNER)
            .name("Token Lists")
            .description("Curated orders of provider lists")
            .build()
            .upsert(&mut tx_conn)?;

        let items = default_ranking()
            .into_iter()
            .map(|(provider_key, list_key)| {
                let provider_id = provider_ids.get(provider_key).ok_or_else(|| Error::Fatal {
                    error: format!("Ranked provider '{provider_key}' isn't built in"),
                })?;
                Ok(ListOrderRef {
                    provider_id: provider_id.clone(),
                    list_key: list_key.into(),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        NewListOrder::builder()
            .provider_id(&owner_id)
            .key(DEFAULT_LIST_ORDER)
            .name("Default")
            .description("Highest ranked provider first")
            .build()
            .upsert(&mut tx_conn, &items)?;
        Ok(())
    })?;
    log::info!("Seeded {} providers", collectors.len());
    Ok(())
}

fn default_ranking() -> [(&'static str, &'static str); 4] {
    [
        (PUMP_TIRES, "pls"),
        (TRUST_WALLET, "pulsechain"),
        (COINGECKO, "pulsechain"),
        (UNISWAP, "hosted"),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use anyhow::Result;

    use super::*;
    use crate::db::{
        models::{ListOrder, Provider},
        TmpDb,
    };

    #[test]
    fn keys_are_unique() {
        let collectors = builtin();
        let keys: HashSet<&str> = collectors.iter().map(Collector::key).collect();
        assert_eq!(keys.len(), collectors.len());
    }

    #[test]
    fn seed_is_idempotent() -> Result<()> {
        let db = TmpDb::new()?;
        seed(&db.pool)?;
        let counts = db.table_counts()?;
        seed(&db.pool)?;
        assert_eq!(db.table_counts()?, counts);

        let mut conn = db.pool.connection()?;
        let providers = Provider::list_all(&mut conn)?;
        assert_eq!(providers.len(), builtin().len() + 1);
        let resolved = ListOrder::resolve(&mut conn, DEFAULT_LIST_ORDER)?;
        assert_eq!(resolved.len(), 4);
        assert_eq!(resolved[0], (PUMP_TIRES.to_string(), "pls".to_string()));
        Ok(())
    }
}
