// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use futures::{stream, StreamExt};
use serde::Deserialize;

use crate::{
    collectors::{
        has_required_fields, parse_entries, store_entries, CollectorSummary, EntryCounts,
        ProviderInfo, TokenEntry,
    },
    config,
    db::models::Token,
    ingest::{self, ListContext, ListInfo},
    protocols::eth::{normalize_address, parse_address, ChainId, ReadOptions},
    resources::CoreResourcesI,
    Error,
};

const PAGE_PLACEHOLDER: &str = "{page}";

/// A JSON API that returns tokens newest first, one page per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginatedSpec {
    /// Page url with a `{page}` placeholder.
    pub url_template: String,
    pub list_key: String,
    pub list_name: String,
    pub chain_id: ChainId,
    pub first_page: u32,
    pub max_pages: usize,
}

impl PaginatedSpec {
    pub fn new(url_template: &str, list_key: &str, list_name: &str, chain_id: ChainId) -> Self {
        Self {
            url_template: url_template.into(),
            list_key: list_key.into(),
            list_name: list_name.into(),
            chain_id,
            first_page: 1,
            max_pages: config::PAGINATED_MAX_PAGES,
        }
    }

    fn page_url(&self, page: u32) -> String {
        self.url_template
            .replace(PAGE_PLACEHOLDER, &page.to_string())
    }
}

/// Records are kept as values and parsed one by one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Page {
    Records(Vec<serde_json::Value>),
    Wrapped {
        #[serde(alias = "data", alias = "tokens")]
        items: Vec<serde_json::Value>,
    },
}

impl Page {
    fn into_values(self) -> Vec<serde_json::Value> {
        match self {
            Page::Records(values) | Page::Wrapped { items: values } => values,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
struct ApiRecord {
    #[serde(alias = "tokenAddress")]
    address: String,
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u8>,
    #[serde(alias = "logoURI", alias = "logo")]
    image: Option<String>,
}

impl ApiRecord {
    fn is_complete(&self) -> bool {
        self.name.is_some() && self.symbol.is_some() && self.decimals.is_some()
    }
}

pub(super) async fn collect(
    resources: &dyn CoreResourcesI,
    provider: &ProviderInfo,
    spec: &PaginatedSpec,
) -> Result<CollectorSummary, Error> {
    let info = ListInfo::builder()
        .provider(provider.clone())
        .key(spec.list_key.as_str())
        .name(spec.list_name.as_str())
        .chain_id(Some(spec.chain_id))
        .build();
    let list = ingest::store_list_with_image(resources, info).await?;
    let known = known_addresses(resources, &list).await?;
    let mut summary = CollectorSummary::new(&provider.key);
    summary.lists = 1;

    let mut page = spec.first_page;
    for _ in 0..spec.max_pages {
        let url = spec.page_url(page);
        let values = resources
            .fetcher()
            .fetch_json::<Page>(&url)
            .await?
            .into_values();
        if values.is_empty() {
            log::info!("Stopping {} at empty page {page}", provider.key);
            break;
        }
        let (records, malformed) = parse_entries::<ApiRecord>(&provider.key, values);
        summary.skipped += malformed;
        if reached_high_water_mark(&records, &known) {
            log::info!("Stopping {} at page {page}", provider.key);
            break;
        }

        let (entries, counts) = complete_records(resources, &list, spec.chain_id, records).await;
        summary.add(counts);
        summary.add(store_entries(resources, &list, entries).await);
        page += 1;
    }

    Ok(summary)
}

/// Pages are newest first, so a known first record of a page means that everything after it
/// was collected by an earlier run.
fn reached_high_water_mark(records: &[ApiRecord], known: &HashSet<String>) -> bool {
    records
        .first()
        .and_then(|first| normalize_address(&first.address).ok())
        .map_or(false, |address| known.contains(&address))
}

async fn known_addresses(
    resources: &dyn CoreResourcesI,
    list: &ListContext,
) -> Result<HashSet<String>, Error> {
    let list_id = list.list_id.clone();
    resources
        .connection_pool()
        .deferred_transaction_async(move |mut tx_conn| {
            let tokens = Token::list_for_list_id(tx_conn.as_mut(), &list_id)?;
            Ok(tokens.into_iter().map(|token| token.provided_id).collect())
        })
        .await
}

/// Fill the gaps of incomplete records from the chain.
async fn complete_records(
    resources: &dyn CoreResourcesI,
    list: &ListContext,
    chain_id: ChainId,
    records: Vec<ApiRecord>,
) -> (Vec<TokenEntry>, EntryCounts) {
    let results: Vec<(ApiRecord, Result<TokenEntry, Error>)> = stream::iter(records)
        .map(|record| async move {
            let result = complete_record(resources, chain_id, record.clone()).await;
            (record, result)
        })
        .buffer_unordered(config::COLLECTOR_CONCURRENCY)
        .collect()
        .await;

    let mut entries = Vec::with_capacity(results.len());
    let mut counts = EntryCounts::default();
    for (record, result) in results {
        match result {
            Ok(entry) => entries.push(entry),
            Err(err) => counts.record_failure(
                resources,
                &list.provider_key,
                chain_id,
                &record.address,
                &err,
            ),
        }
    }
    (entries, counts)
}

async fn complete_record(
    resources: &dyn CoreResourcesI,
    chain_id: ChainId,
    record: ApiRecord,
) -> Result<TokenEntry, Error> {
    let address = normalize_address(&record.address)?;
    let mut entry = TokenEntry {
        address,
        chain_id,
        name: record.name.clone().unwrap_or_default(),
        symbol: record.symbol.clone().unwrap_or_default(),
        decimals: record.decimals.unwrap_or(config::DEFAULT_DECIMALS),
        logo_uri: record.image.clone().filter(|uri| !uri.trim().is_empty()),
    };

    if !record.is_complete() {
        let metadata = resources
            .rpc_manager()
            .failover(chain_id)?
            .read_token_metadata(parse_address(&entry.address)?, ReadOptions::default())
            .await?;
        if record.name.is_none() {
            entry.name = metadata.name.clone();
        }
        if record.symbol.is_none() {
            entry.symbol = metadata.symbol.clone();
        }
        if record.decimals.is_none() {
            entry.decimals = metadata.decimals;
        }
    }

    if !has_required_fields(&entry) {
        return Err(Error::Malformed {
            error: format!("Token {} has no name or symbol", entry.address),
        });
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::Result;
    use serde_json::json;
    use url::Url;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{
        collectors::{Collector, CollectorSpec},
        db::{models::Network, TmpDb},
        protocols::{
            eth::{
                test_util::{reverted, string_metadata},
                ChainId,
            },
            NetworkType,
        },
        resources::tests::test_resources,
    };

    fn record(address_suffix: char) -> serde_json::Value {
        let address = format!("0x{}", address_suffix.to_string().repeat(40));
        json!({
            "address": address,
            "name": format!("Token {address_suffix}"),
            "symbol": address_suffix.to_uppercase().to_string(),
            "decimals": 18,
        })
    }

    async fn mount_page(server: &MockServer, page: u32, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/tokens"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn collector(server: &MockServer) -> Collector {
        Collector::new(
            ProviderInfo::new("pumptires", "Pump Tires", ""),
            CollectorSpec::PaginatedApi(PaginatedSpec::new(
                &format!("{}/tokens?page={{page}}", server.uri()),
                "pls",
                "PulseChain",
                ChainId::PULSECHAIN,
            )),
        )
    }

    #[test]
    fn page_url() {
        let spec = PaginatedSpec::new(
            "https://api.example/tokens?page={page}&size=100",
            "pls",
            "PulseChain",
            ChainId::PULSECHAIN,
        );
        assert_eq!(spec.page_url(3), "https://api.example/tokens?page=3&size=100");
    }

    #[test]
    fn wrapped_pages() -> Result<()> {
        let page: Page = serde_json::from_value(json!({"items": [record('a')]}))?;
        assert_eq!(page.into_values().len(), 1);
        let page: Page = serde_json::from_value(json!({"data": []}))?;
        assert!(page.into_values().is_empty());
        let page: Page = serde_json::from_value(json!([record('a'), record('b')]))?;
        assert_eq!(page.into_values().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn record_without_address_is_skipped() -> Result<()> {
        let server = MockServer::start().await;
        mount_page(
            &server,
            1,
            json!([{"name": "No address", "symbol": "NA", "decimals": 18}, record('a')]),
        )
        .await;
        mount_page(&server, 2, json!([])).await;
        let db = TmpDb::new()?;
        let resources = test_resources(&db, Default::default())?;

        let summary = collector(&server).collect(&resources).await?;
        assert_eq!(summary.stored, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(db.table_counts()?["token"], 1);
        assert!(resources.ledger().is_empty()?);
        Ok(())
    }

    #[tokio::test]
    async fn stops_at_high_water_mark() -> Result<()> {
        let server = MockServer::start().await;
        mount_page(&server, 1, json!([record('a'), record('b')])).await;
        mount_page(&server, 2, json!([record('c')])).await;
        mount_page(&server, 3, json!([])).await;
        let db = TmpDb::new()?;

        let summary = collector(&server)
            .collect(&test_resources(&db, Default::default())?)
            .await?;
        assert_eq!(summary.stored, 3);

        // Newest token first, page 2 starts with a known token.
        server.reset().await;
        mount_page(&server, 1, json!([record('d'), record('a')])).await;
        mount_page(&server, 2, json!([record('b'), record('c')])).await;
        Mock::given(method("GET"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let summary = collector(&server)
            .collect(&test_resources(&db, Default::default())?)
            .await?;
        assert_eq!(summary.stored, 2);
        assert_eq!(db.table_counts()?["token"], 4);
        Ok(())
    }

    #[tokio::test]
    async fn fills_gaps_from_chain() -> Result<()> {
        let api = MockServer::start().await;
        mount_page(
            &api,
            1,
            json!({"items": [{"tokenAddress": format!("0x{}", "e".repeat(40)), "name": "Eee"}]}),
        )
        .await;
        mount_page(&api, 2, json!({"items": []})).await;
        let rpc = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(string_metadata(
                "On chain name",
                "EEE",
                9,
            )))
            .mount(&rpc)
            .await;
        let db = TmpDb::new()?;
        let overrides = HashMap::from([(ChainId::PULSECHAIN, vec![Url::parse(&rpc.uri())?])]);
        let resources = test_resources(&db, overrides)?;

        let summary = collector(&api).collect(&resources).await?;
        assert_eq!(summary.stored, 1);

        let mut conn = db.pool.connection()?;
        let network = Network::fetch_by_chain_id(
            &mut conn,
            ChainId::PULSECHAIN,
            NetworkType::Evm,
        )?
        .expect("network");
        let token = Token::fetch(&mut conn, &network.network_id, &format!("0x{}", "e".repeat(40)))?
            .expect("token");
        // Provided values win over on-chain values.
        assert_eq!(token.name, "Eee");
        assert_eq!(token.symbol, "EEE");
        assert_eq!(token.decimals, 9);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_incomplete_record_is_skipped() -> Result<()> {
        let api = MockServer::start().await;
        mount_page(&api, 1, json!([{"address": format!("0x{}", "f".repeat(40))}])).await;
        mount_page(&api, 2, json!([])).await;
        let rpc = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reverted()))
            .mount(&rpc)
            .await;
        let db = TmpDb::new()?;
        let overrides = HashMap::from([(ChainId::PULSECHAIN, vec![Url::parse(&rpc.uri())?])]);
        let resources = test_resources(&db, overrides)?;

        let summary = collector(&api).collect(&resources).await?;
        assert_eq!(summary.stored, 0);
        assert_eq!(summary.skipped, 1);
        assert!(resources.ledger().is_empty()?);
        Ok(())
    }
}
