// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Provider collectors. Every provider is configured by a `CollectorSpec` and processed by
//! `Collector::collect`.

mod bridge;
mod filesystem;
mod paginated;
pub mod providers;
mod remote_list;

use futures::{stream, StreamExt};
use serde::de::DeserializeOwned;

pub use bridge::{block_ranges, BridgeSpec};
pub use filesystem::FilesystemSpec;
pub use paginated::PaginatedSpec;
pub use remote_list::RemoteListSpec;

use crate::{
    config,
    ingest::{self, ListContext},
    protocols::eth::ChainId,
    resources::CoreResourcesI,
    Error,
};

/// A token as provided by a source, before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenEntry {
    pub address: String,
    pub chain_id: ChainId,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub logo_uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderInfo {
    pub key: String,
    pub name: String,
    pub description: String,
}

impl ProviderInfo {
    pub fn new(key: &str, name: &str, description: &str) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Where the tokens of a provider come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectorSpec {
    /// A Uniswap style token list json.
    RemoteList(RemoteListSpec),
    /// A checkout of a Trust Wallet style asset repository.
    FilesystemWalk(FilesystemSpec),
    /// A JSON API that lists tokens newest first.
    PaginatedApi(PaginatedSpec),
    /// Token registrations of a bridge.
    BridgeScan(BridgeSpec),
}

/// Counts of a finished collector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectorSummary {
    pub provider_key: String,
    pub lists: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CollectorSummary {
    fn new(provider_key: &str) -> Self {
        Self {
            provider_key: provider_key.into(),
            ..Default::default()
        }
    }

    fn add(&mut self, counts: EntryCounts) {
        self.stored += counts.stored;
        self.skipped += counts.skipped;
        self.failed += counts.failed;
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct EntryCounts {
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collector {
    pub provider: ProviderInfo,
    pub spec: CollectorSpec,
}

impl Collector {
    pub fn new(provider: ProviderInfo, spec: CollectorSpec) -> Self {
        Self { provider, spec }
    }

    pub fn key(&self) -> &str {
        &self.provider.key
    }

    /// Collect every list of the provider. Failures of single entries are recorded in the
    /// failure ledger, an error is only returned if the provider can't be collected at all.
    pub async fn collect(
        &self,
        resources: &dyn CoreResourcesI,
    ) -> Result<CollectorSummary, Error> {
        log::info!("Collecting {}", self.provider.key);
        let summary = match &self.spec {
            CollectorSpec::RemoteList(spec) => {
                remote_list::collect(resources, &self.provider, spec).await?
            }
            CollectorSpec::FilesystemWalk(spec) => {
                filesystem::collect(resources, &self.provider, spec).await?
            }
            CollectorSpec::PaginatedApi(spec) => {
                paginated::collect(resources, &self.provider, spec).await?
            }
            CollectorSpec::BridgeScan(spec) => {
                bridge::collect(resources, &self.provider, spec).await?
            }
        };
        log::info!(
            "Collected {}: {} lists, {} tokens stored, {} skipped, {} failed",
            summary.provider_key,
            summary.lists,
            summary.stored,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }
}

/// Store entries into the list through a bounded worker pool.
pub(crate) async fn store_entries(
    resources: &dyn CoreResourcesI,
    list: &ListContext,
    entries: Vec<TokenEntry>,
) -> EntryCounts {
    let results: Vec<(TokenEntry, Result<String, Error>)> = stream::iter(entries)
        .map(|entry| async move {
            let result = ingest::store_token_with_image(resources, list, &entry).await;
            (entry, result)
        })
        .buffer_unordered(config::COLLECTOR_CONCURRENCY)
        .collect()
        .await;

    let mut counts = EntryCounts::default();
    for (entry, result) in results {
        match result {
            Ok(_) => counts.stored += 1,
            Err(err) => counts.record_failure(
                resources,
                &list.provider_key,
                entry.chain_id,
                &entry.address,
                &err,
            ),
        }
    }
    counts
}

impl EntryCounts {
    /// Malformed entries are skipped, other failures are recorded in the ledger.
    pub(crate) fn record_failure(
        &mut self,
        resources: &dyn CoreResourcesI,
        provider_key: &str,
        chain_id: ChainId,
        address: &str,
        err: &Error,
    ) {
        match err {
            Error::Malformed { .. } => {
                log::debug!("Skipping malformed entry {address} of {provider_key}: {err}");
                self.skipped += 1;
            }
            err => {
                log::warn!(
                    "Failed to store {address} on chain {chain_id} from {provider_key}: {err}"
                );
                resources
                    .ledger()
                    .record(provider_key, format!("{chain_id}:{address}"), err);
                self.failed += 1;
            }
        }
    }
}

/// Deserialize every entry on its own so that an entry with a field of the wrong type only
/// skips that entry. Returns the parsed entries and the number of malformed ones.
pub(crate) fn parse_entries<T: DeserializeOwned>(
    provider_key: &str,
    values: Vec<serde_json::Value>,
) -> (Vec<T>, usize) {
    let mut entries = Vec::with_capacity(values.len());
    let mut malformed = 0;
    for value in values {
        match serde_json::from_value::<T>(value) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                log::debug!("Skipping malformed entry of {provider_key}: {err}");
                malformed += 1;
            }
        }
    }
    (entries, malformed)
}

/// Name and symbol are required, everything else has defaults.
pub(crate) fn has_required_fields(entry: &TokenEntry) -> bool {
    !entry.name.trim().is_empty() && !entry.symbol.trim().is_empty()
}
