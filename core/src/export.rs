// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Export the stored tokens of a chain as a Uniswap style token list.

use serde::Serialize;
use url::Url;

use crate::{
    collectors::providers::DEFAULT_LIST_ORDER,
    db::{
        models::{Image, ListOrder, ListToken, Network, Token},
        ConnectionPool,
    },
    image_store::image_path,
    protocols::{
        eth::{checksum_address, normalize_address, parse_address, ChainId},
        NetworkType,
    },
    utils::rfc3339_timestamp,
    Error,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportedVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedToken {
    pub chain_id: u64,
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: i32,
    #[serde(rename = "logoURI", skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExportedList {
    pub name: String,
    pub timestamp: String,
    pub version: ExportedVersion,
    pub tokens: Vec<ExportedToken>,
}

/// Tokens of the chain, or only `token` if provided. Each token gets the image of the highest
/// ranked list in the default list order that has one.
pub fn export_list(
    pool: &ConnectionPool,
    root_uri: &Url,
    chain_id: ChainId,
    token: Option<&str>,
) -> Result<ExportedList, Error> {
    let token_filter = token.map(normalize_address).transpose()?;
    let mut conn = pool.connection()?;

    let ranking = ListOrder::resolve(&mut conn, DEFAULT_LIST_ORDER)?;
    let tokens = match Network::fetch_by_chain_id(&mut conn, chain_id, NetworkType::Evm)? {
        Some(network) => Token::list_for_network(&mut conn, &network.network_id)?,
        None => Vec::new(),
    };

    let mut exported = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let Some(filter) = token_filter.as_deref() {
            if token.provided_id != filter {
                continue;
            }
        }
        let images = ListToken::images_for_token(&mut conn, &token.token_id)?;
        let logo_uri = match best_image(&ranking, images) {
            Some(image_hash) => Image::find(&mut conn, &image_hash, None)?
                .map(|image| image_path(root_uri, &image.image_hash, &image.ext)),
            None => None,
        };
        exported.push(ExportedToken {
            chain_id: chain_id.as_u64(),
            address: display_token_address(&token.provided_id),
            name: token.name,
            symbol: token.symbol,
            decimals: token.decimals,
            logo_uri,
        });
    }
    log::debug!("Exporting {} tokens of chain {chain_id}", exported.len());

    Ok(ExportedList {
        name: format!("Tokens {chain_id}"),
        timestamp: rfc3339_timestamp(),
        version: ExportedVersion {
            major: 1,
            minor: 0,
            patch: 0,
        },
        tokens: exported,
    })
}

/// The image of the highest ranked `(provider key, list key)` pair. Unranked lists come last in
/// the order they added the token.
fn best_image(
    ranking: &[(String, String)],
    images: Vec<(String, String, String)>,
) -> Option<String> {
    images
        .into_iter()
        .enumerate()
        .min_by_key(|(index, (provider_key, list_key, _))| {
            let rank = ranking
                .iter()
                .position(|(p, l)| p == provider_key && l == list_key)
                .unwrap_or(usize::MAX);
            (rank, *index)
        })
        .map(|(_, (_, _, image_hash))| image_hash)
}

fn display_token_address(provided_id: &str) -> String {
    match parse_address(provided_id) {
        Ok(address) => checksum_address(&address),
        Err(_) => provided_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;

    use super::*;
    use crate::{
        collectors::{providers, ProviderInfo, TokenEntry},
        db::TmpDb,
        image_store::tests::PNG_BYTES,
        ingest::{self, ListInfo},
        resources::{tests::test_resources, CoreResourcesI},
    };

    const DAI: &str = "0x6b175474e89094c44da98b954eedeac495271d0f";
    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    async fn add_token(
        resources: &dyn CoreResourcesI,
        provider_key: &str,
        list_key: &str,
        address: &str,
        logo_uri: Option<String>,
    ) -> Result<()> {
        let list = ingest::store_list_with_image(
            resources,
            ListInfo::builder()
                .provider(ProviderInfo::new(provider_key, provider_key, ""))
                .key(list_key)
                .name(list_key)
                .build(),
        )
        .await?;
        let entry = TokenEntry {
            address: address.into(),
            chain_id: ChainId::ETH_MAINNET,
            name: "Dai Stablecoin".into(),
            symbol: "DAI".into(),
            decimals: 18,
            logo_uri,
        };
        ingest::store_token_with_image(resources, &list, &entry).await?;
        Ok(())
    }

    #[tokio::test]
    async fn prefers_ranked_image() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let png = dir.path().join("dai.png");
        fs::write(&png, PNG_BYTES)?;
        let gif = dir.path().join("dai.gif");
        fs::write(&gif, b"GIF89a dai")?;

        let db = TmpDb::new()?;
        let resources = test_resources(&db, Default::default())?;
        providers::seed(&db.pool)?;
        let gif_uri = Some(gif.display().to_string());
        let png_uri = Some(png.display().to_string());
        add_token(&resources, providers::UNISWAP, "hosted", DAI, gif_uri).await?;
        add_token(&resources, providers::PUMP_TIRES, "pls", DAI, png_uri).await?;
        add_token(&resources, providers::UNISWAP, "hosted", WETH, None).await?;

        let root_uri = Url::parse("https://tokens.example")?;
        let list = export_list(&db.pool, &root_uri, ChainId::ETH_MAINNET, None)?;
        assert_eq!(list.tokens.len(), 2);
        let dai = &list.tokens[0];
        assert_eq!(dai.address, "0x6B175474E89094C44Da98b954EedeAC495271d0F");
        assert_eq!(dai.chain_id, 1);
        let logo = dai.logo_uri.as_deref().expect("logo");
        assert!(logo.starts_with("https://tokens.example/image/"));
        assert!(logo.ends_with(".png"));
        assert_eq!(list.tokens[1].logo_uri, None);
        Ok(())
    }

    #[tokio::test]
    async fn filters_by_token() -> Result<()> {
        let db = TmpDb::new()?;
        let resources = test_resources(&db, Default::default())?;
        add_token(&resources, providers::UNISWAP, "hosted", DAI, None).await?;
        add_token(&resources, providers::UNISWAP, "hosted", WETH, None).await?;

        let root_uri = Url::parse("https://tokens.example")?;
        let list = export_list(
            &db.pool,
            &root_uri,
            ChainId::ETH_MAINNET,
            Some("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
        )?;
        assert_eq!(list.tokens.len(), 1);
        assert_eq!(list.tokens[0].address, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

        let json = serde_json::to_value(&list)?;
        assert_eq!(json["tokens"][0]["chainId"], 1);
        assert!(json["tokens"][0].get("logoURI").is_none());
        Ok(())
    }

    #[test]
    fn unknown_chain_is_empty() -> Result<()> {
        let db = TmpDb::new()?;
        let root_uri = Url::parse("https://tokens.example")?;
        let list = export_list(&db.pool, &root_uri, ChainId::new(424242), None)?;
        assert!(list.tokens.is_empty());
        Ok(())
    }

    #[test]
    fn ranking_order() {
        let ranking = vec![
            ("pumptires".to_string(), "pls".to_string()),
            ("uniswap".to_string(), "hosted".to_string()),
        ];
        let image = |p: &str, l: &str, h: &str| (p.to_string(), l.to_string(), h.to_string());
        let images = vec![
            image("other", "list", "a"),
            image("uniswap", "hosted", "b"),
            image("pumptires", "pls", "c"),
        ];
        assert_eq!(best_image(&ranking, images).as_deref(), Some("c"));
        let unranked = vec![image("x", "y", "a"), image("z", "w", "b")];
        assert_eq!(best_image(&ranking, unranked).as_deref(), Some("a"));
        assert_eq!(best_image(&ranking, Vec::new()), None);
    }
}
