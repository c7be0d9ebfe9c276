// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use futures::{stream, StreamExt};

use crate::{
    collectors::{CollectorSummary, EntryCounts, ProviderInfo, TokenEntry},
    config,
    db::models::{Bridge, Network, NewBridge, NewBridgeLink},
    ingest::{self, ListContext, ListInfo},
    protocols::{
        eth::{
            display_address, normalize_address, parse_address, ChainId, FailoverRpc,
            ReadOptions, TokenRegistration,
        },
        NetworkType,
    },
    resources::CoreResourcesI,
    Error,
};

/// An OmniBridge style bridge with a contract on each of two chains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeSpec {
    pub home_chain_id: ChainId,
    pub home_address: String,
    pub home_start_block: u64,
    pub foreign_chain_id: ChainId,
    pub foreign_address: String,
    pub foreign_start_block: u64,
}

/// Inclusive block ranges of at most `step` blocks covering `from..=to`.
pub fn block_ranges(from: u64, to: u64, step: u64) -> Vec<(u64, u64)> {
    let step = step.max(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(step - 1).min(to);
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Side {
    Home,
    Foreign,
}

/// One bridge contract and the lists that its registrations are stored in.
struct SideScan<'a> {
    side: Side,
    chain_id: ChainId,
    other_chain_id: ChainId,
    address: &'a str,
    start_block: u64,
    cursor: u64,
    /// List of tokens on `chain_id`.
    list: &'a ListContext,
    /// List of tokens on `other_chain_id`.
    other_list: &'a ListContext,
}

impl<'a> SideScan<'a> {
    fn first_block(&self) -> u64 {
        if self.cursor == 0 {
            self.start_block
        } else {
            self.cursor + 1
        }
    }
}

pub(super) async fn collect(
    resources: &dyn CoreResourcesI,
    provider: &ProviderInfo,
    spec: &BridgeSpec,
) -> Result<CollectorSummary, Error> {
    let home_address = normalize_address(&spec.home_address)?;
    let foreign_address = normalize_address(&spec.foreign_address)?;

    let home_list = side_list(resources, provider, "home", spec.home_chain_id).await?;
    let foreign_list = side_list(resources, provider, "foreign", spec.foreign_chain_id).await?;
    let bridge = upsert_bridge(
        resources,
        &home_list.provider_id,
        spec,
        home_address.clone(),
        foreign_address.clone(),
    )
    .await?;

    let mut summary = CollectorSummary::new(&provider.key);
    summary.lists = 2;

    let home = SideScan {
        side: Side::Home,
        chain_id: spec.home_chain_id,
        other_chain_id: spec.foreign_chain_id,
        address: &home_address,
        start_block: spec.home_start_block,
        cursor: cursor_value(bridge.current_home_block_number),
        list: &home_list,
        other_list: &foreign_list,
    };
    summary.add(scan_side(resources, &bridge, &home).await?);

    let foreign = SideScan {
        side: Side::Foreign,
        chain_id: spec.foreign_chain_id,
        other_chain_id: spec.home_chain_id,
        address: &foreign_address,
        start_block: spec.foreign_start_block,
        cursor: cursor_value(bridge.current_foreign_block_number),
        list: &foreign_list,
        other_list: &home_list,
    };
    summary.add(scan_side(resources, &bridge, &foreign).await?);

    Ok(summary)
}

fn cursor_value(block_number: i64) -> u64 {
    u64::try_from(block_number).unwrap_or_default()
}

async fn side_list(
    resources: &dyn CoreResourcesI,
    provider: &ProviderInfo,
    key: &str,
    chain_id: ChainId,
) -> Result<ListContext, Error> {
    let info = ListInfo::builder()
        .provider(provider.clone())
        .key(key)
        .name(format!("{} {chain_id}", provider.name))
        .chain_id(Some(chain_id))
        .build();
    ingest::store_list_with_image(resources, info).await
}

async fn upsert_bridge(
    resources: &dyn CoreResourcesI,
    provider_id: &str,
    spec: &BridgeSpec,
    home_address: String,
    foreign_address: String,
) -> Result<Bridge, Error> {
    let provider_id = provider_id.to_string();
    let home_chain_id = spec.home_chain_id;
    let foreign_chain_id = spec.foreign_chain_id;
    resources
        .connection_pool()
        .deferred_transaction_async(move |mut tx_conn| {
            let home_network_id =
                Network::insert_from_chain_id(&mut tx_conn, home_chain_id, NetworkType::Evm)?;
            let foreign_network_id =
                Network::insert_from_chain_id(&mut tx_conn, foreign_chain_id, NetworkType::Evm)?;
            NewBridge::builder()
                .provider_id(&provider_id)
                .home_network_id(&home_network_id)
                .home_address(&home_address)
                .foreign_network_id(&foreign_network_id)
                .foreign_address(&foreign_address)
                .build()
                .upsert(&mut tx_conn)
        })
        .await
}

/// Scan one bridge contract from its cursor to the latest block. The cursor is saved after
/// every block range, so an interrupted scan resumes where it stopped.
async fn scan_side(
    resources: &dyn CoreResourcesI,
    bridge: &Bridge,
    scan: &SideScan<'_>,
) -> Result<EntryCounts, Error> {
    let rpc = resources.rpc_manager().failover(scan.chain_id)?;
    let other_rpc = resources.rpc_manager().failover(scan.other_chain_id)?;
    let bridge_address = parse_address(scan.address)?;
    let latest = rpc.latest_block_number().await?;
    let mut counts = EntryCounts::default();

    let ranges = block_ranges(scan.first_block(), latest, config::BRIDGE_BLOCK_RANGE);
    log::debug!(
        "Scanning {} block ranges of the {:?} bridge on chain {}",
        ranges.len(),
        scan.side,
        scan.chain_id
    );
    for (from_block, to_block) in ranges {
        let registrations = rpc
            .token_registrations(bridge_address, from_block, to_block)
            .await?;
        if !registrations.is_empty() {
            log::info!(
                "Found {} token registrations in blocks {from_block}..={to_block} on chain {}",
                registrations.len(),
                scan.chain_id
            );
        }

        let results: Vec<(TokenRegistration, Result<(), Error>)> = stream::iter(registrations)
            .map(|registration| {
                let (rpc, other_rpc) = (&rpc, &other_rpc);
                async move {
                    let result =
                        store_registration(resources, bridge, scan, rpc, other_rpc, &registration)
                            .await;
                    (registration, result)
                }
            })
            .buffer_unordered(config::COLLECTOR_CONCURRENCY)
            .collect()
            .await;
        for (registration, result) in results {
            match result {
                Ok(()) => counts.stored += 1,
                Err(err) => counts.record_failure(
                    resources,
                    &scan.list.provider_key,
                    scan.chain_id,
                    &display_address(&registration.bridged_token),
                    &err,
                ),
            }
        }

        save_cursor(resources, &bridge.bridge_id, scan.side, to_block).await?;
    }

    Ok(counts)
}

/// Store both tokens of a registration and the link between them.
async fn store_registration(
    resources: &dyn CoreResourcesI,
    bridge: &Bridge,
    scan: &SideScan<'_>,
    rpc: &FailoverRpc,
    other_rpc: &FailoverRpc,
    registration: &TokenRegistration,
) -> Result<(), Error> {
    let options = ReadOptions {
        skip_bytes32: false,
        must_exist: true,
    };
    let native =
        token_entry(other_rpc, scan.other_chain_id, registration.native_token, options).await?;
    let bridged = token_entry(rpc, scan.chain_id, registration.bridged_token, options).await?;

    let native_token_id =
        ingest::store_token_with_image(resources, scan.other_list, &native).await?;
    let bridged_token_id = ingest::store_token_with_image(resources, scan.list, &bridged).await?;

    let bridge_id = bridge.bridge_id.clone();
    let transaction_hash = format!("{:#x}", registration.transaction_hash);
    resources
        .connection_pool()
        .deferred_transaction_async(move |mut tx_conn| {
            NewBridgeLink::builder()
                .native_token_id(&native_token_id)
                .bridged_token_id(&bridged_token_id)
                .bridge_id(&bridge_id)
                .transaction_hash(&transaction_hash)
                .build()
                .insert(&mut tx_conn)
        })
        .await?;
    Ok(())
}

async fn token_entry(
    rpc: &FailoverRpc,
    chain_id: ChainId,
    address: ethers::types::Address,
    options: ReadOptions,
) -> Result<TokenEntry, Error> {
    let metadata = rpc.read_token_metadata(address, options).await?;
    Ok(TokenEntry {
        address: display_address(&address),
        chain_id,
        name: metadata.name.clone(),
        symbol: metadata.symbol.clone(),
        decimals: metadata.decimals,
        logo_uri: None,
    })
}

async fn save_cursor(
    resources: &dyn CoreResourcesI,
    bridge_id: &str,
    side: Side,
    block_number: u64,
) -> Result<(), Error> {
    let bridge_id = bridge_id.to_string();
    let (home, foreign) = match side {
        Side::Home => (block_number, 0),
        Side::Foreign => (0, block_number),
    };
    resources
        .connection_pool()
        .deferred_transaction_async(move |mut tx_conn| {
            Bridge::update_cursors(&mut tx_conn, &bridge_id, home, foreign)
        })
        .await
}
