// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

use crate::{
    collectors::{
        has_required_fields, parse_entries, store_entries, CollectorSummary, ProviderInfo,
        TokenEntry,
    },
    ingest::{self, ListInfo, ListVersion},
    protocols::eth::ChainId,
    resources::CoreResourcesI,
    Error,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteListSpec {
    /// Url of the token list json. `ipfs://` is supported.
    pub url: String,
    pub list_key: String,
    /// Only keep tokens of this chain and scope the list to its network.
    pub chain_id: Option<ChainId>,
    pub default_list: bool,
}

impl RemoteListSpec {
    pub fn new(url: &str, list_key: &str) -> Self {
        Self {
            url: url.into(),
            list_key: list_key.into(),
            chain_id: None,
            default_list: false,
        }
    }

    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

/// https://github.com/Uniswap/token-lists
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenList {
    name: String,
    #[serde(default)]
    version: Option<Version>,
    #[serde(rename = "logoURI", default)]
    logo_uri: Option<String>,
    /// Parsed one by one.
    #[serde(default)]
    tokens: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Version {
    major: i32,
    minor: i32,
    patch: i32,
}

// Missing fields are reported by `into_entry`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedToken {
    chain_id: Option<u64>,
    address: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u64>,
    #[serde(rename = "logoURI")]
    logo_uri: Option<String>,
}

impl ListedToken {
    fn into_entry(self) -> Option<TokenEntry> {
        let entry = TokenEntry {
            address: self.address?,
            chain_id: ChainId::new(self.chain_id?),
            name: self.name?.trim().to_string(),
            symbol: self.symbol?.trim().to_string(),
            decimals: u8::try_from(self.decimals?).ok()?,
            logo_uri: self.logo_uri.filter(|uri| !uri.trim().is_empty()),
        };
        has_required_fields(&entry).then_some(entry)
    }
}

pub(super) async fn collect(
    resources: &dyn CoreResourcesI,
    provider: &ProviderInfo,
    spec: &RemoteListSpec,
) -> Result<CollectorSummary, Error> {
    let token_list: TokenList = resources.fetcher().fetch_json(&spec.url).await?;

    let version = token_list
        .version
        .map(|v| ListVersion {
            major: v.major,
            minor: v.minor,
            patch: v.patch,
        })
        .unwrap_or_default();
    let info = ListInfo::builder()
        .provider(provider.clone())
        .key(spec.list_key.as_str())
        .name(token_list.name.as_str())
        .chain_id(spec.chain_id)
        .version(version)
        .logo_uri(token_list.logo_uri.clone())
        .default_list(spec.default_list)
        .build();
    let list = ingest::store_list_with_image(resources, info).await?;

    let mut summary = CollectorSummary::new(&provider.key);
    summary.lists = 1;
    let (tokens, malformed) = parse_entries::<ListedToken>(&provider.key, token_list.tokens);
    summary.skipped += malformed;
    let mut entries = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token.into_entry() {
            Some(entry) if spec.chain_id.map_or(true, |c| c == entry.chain_id) => {
                entries.push(entry)
            }
            Some(_) => {}
            None => summary.skipped += 1,
        }
    }
    summary.add(store_entries(resources, &list, entries).await);
    Ok(summary)
}
