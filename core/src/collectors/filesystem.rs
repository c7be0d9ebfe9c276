// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    collectors::{has_required_fields, store_entries, CollectorSummary, ProviderInfo, TokenEntry},
    ingest::{self, ListInfo},
    protocols::eth::{is_hex_address, ChainId},
    resources::CoreResourcesI,
    Error,
};

const BLOCKCHAINS_DIR: &str = "blockchains";
const ASSETS_DIR: &str = "assets";
const CHAIN_INFO_DIR: &str = "info";
const INFO_FILE: &str = "info.json";
const LOGO_FILE: &str = "logo.png";

/// A checkout of a Trust Wallet style asset repository:
/// `<root>/blockchains/<chain>/assets/<0xaddress>/{info.json,logo.png}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilesystemSpec {
    pub root: PathBuf,
    /// Chains to collect. All chains with a known directory name if empty.
    pub chains: Vec<ChainId>,
}

impl FilesystemSpec {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chains: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssetInfo {
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u8>,
    status: Option<String>,
}

impl AssetInfo {
    fn is_active(&self) -> bool {
        self.status.as_deref().map_or(true, |status| status == "active")
    }
}

pub(super) async fn collect(
    resources: &dyn CoreResourcesI,
    provider: &ProviderInfo,
    spec: &FilesystemSpec,
) -> Result<CollectorSummary, Error> {
    let blockchains = spec.root.join(BLOCKCHAINS_DIR);
    let mut summary = CollectorSummary::new(&provider.key);

    for (chain_dir, chain_id) in chain_dirs(&blockchains, &spec.chains).await? {
        let chain_name = file_name(&chain_dir);
        let chain_logo = existing_file_uri(&chain_dir.join(CHAIN_INFO_DIR).join(LOGO_FILE)).await;
        ingest::store_network_with_image(resources, chain_id, chain_logo.as_deref(), &provider.key)
            .await?;

        let info = ListInfo::builder()
            .provider(provider.clone())
            .key(chain_name.as_str())
            .name(format!("{} {}", provider.name, chain_name))
            .chain_id(Some(chain_id))
            .logo_uri(chain_logo)
            .build();
        let list = ingest::store_list_with_image(resources, info).await?;
        summary.lists += 1;

        let (entries, skipped) = read_assets(&chain_dir.join(ASSETS_DIR), chain_id).await?;
        log::debug!(
            "Read {} assets of {chain_name} from {}, skipped {skipped}",
            entries.len(),
            provider.key
        );
        summary.skipped += skipped;
        summary.add(store_entries(resources, &list, entries).await);
    }

    Ok(summary)
}

/// Chain directories with a known chain id, sorted by name.
async fn chain_dirs(
    blockchains: &Path,
    chains: &[ChainId],
) -> Result<Vec<(PathBuf, ChainId)>, Error> {
    let mut result = Vec::new();
    for dir in sub_dirs(blockchains).await? {
        let chain_id = match ChainId::from_trust_wallet_asset_name(&file_name(&dir)) {
            Some(chain_id) => chain_id,
            None => continue,
        };
        if chains.is_empty() || chains.contains(&chain_id) {
            result.push((dir, chain_id));
        }
    }
    Ok(result)
}

/// Token entries of the asset directories whose names are addresses. Returns the number of
/// skipped directories as well.
async fn read_assets(assets: &Path, chain_id: ChainId) -> Result<(Vec<TokenEntry>, usize), Error> {
    let mut entries = Vec::new();
    let mut skipped = 0;
    for dir in sub_dirs(assets).await? {
        let address = file_name(&dir);
        if !is_hex_address(&address) {
            continue;
        }
        match read_asset(&dir, address, chain_id).await {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }
    Ok((entries, skipped))
}

async fn read_asset(dir: &Path, address: String, chain_id: ChainId) -> Option<TokenEntry> {
    let bytes = tokio::fs::read(dir.join(INFO_FILE)).await.ok()?;
    let info: AssetInfo = match serde_json::from_slice(&bytes) {
        Ok(info) => info,
        Err(err) => {
            log::debug!("Invalid {INFO_FILE} in {}: {err}", dir.display());
            return None;
        }
    };
    if !info.is_active() {
        return None;
    }
    let entry = TokenEntry {
        address,
        chain_id,
        name: info.name?.trim().to_string(),
        symbol: info.symbol?.trim().to_string(),
        decimals: info.decimals?,
        logo_uri: existing_file_uri(&dir.join(LOGO_FILE)).await,
    };
    has_required_fields(&entry).then_some(entry)
}

async fn sub_dirs(path: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut read_dir = tokio::fs::read_dir(path).await.map_err(|err| Error::Config {
        explanation: format!("Failed to read directory '{}': {err}", path.display()),
    })?;
    let mut dirs = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

async fn existing_file_uri(path: &Path) -> Option<String> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Some(format!("file://{}", path.display())),
        _ => None,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}
