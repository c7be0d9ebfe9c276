// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compositions of the image store and the entity upserts.
//!
//! Images are loaded before a transaction is started and the entity, its image and the image
//! link are written in one short transaction. If the image can't be loaded, the entity is
//! still written without an image.

use typed_builder::TypedBuilder;

use crate::{
    collectors::{ProviderInfo, TokenEntry},
    db::models::{ListToken, Network, NewList, NewProvider, NewToken},
    image_store::LoadedImage,
    protocols::{
        eth::{normalize_address, ChainId},
        NetworkType,
    },
    resources::CoreResourcesI,
    Error,
};

/// Semantic version of a list.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

/// Descriptive data of a list version.
#[derive(Clone, Debug, TypedBuilder)]
pub struct ListInfo {
    pub provider: ProviderInfo,
    #[builder(setter(into))]
    pub key: String,
    #[builder(setter(into))]
    pub name: String,
    #[builder(default, setter(into))]
    pub description: String,
    #[builder(default)]
    pub chain_id: Option<ChainId>,
    #[builder(default)]
    pub version: ListVersion,
    #[builder(default)]
    pub logo_uri: Option<String>,
    #[builder(default)]
    pub default_list: bool,
}

/// Ids of a stored list that tokens are added to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListContext {
    pub provider_key: String,
    pub provider_id: String,
    pub list_id: String,
}

async fn load_image(
    resources: &dyn CoreResourcesI,
    uri: Option<&str>,
    provider_key: &str,
) -> Result<Option<LoadedImage>, Error> {
    match uri {
        Some(uri) => resources.image_store().load(uri, provider_key).await,
        None => Ok(None),
    }
}

/// Upsert the provider, the network of the list if it has one and the list version with its
/// image in one transaction.
pub async fn store_list_with_image(
    resources: &dyn CoreResourcesI,
    info: ListInfo,
) -> Result<ListContext, Error> {
    let image = load_image(resources, info.logo_uri.as_deref(), &info.provider.key).await?;
    let image_store = resources.image_store().clone();

    resources
        .connection_pool()
        .deferred_transaction_async(move |mut tx_conn| {
            let provider_id = NewProvider::builder()
                .key(&info.provider.key)
                .name(&info.provider.name)
                .description(&info.provider.description)
                .build()
                .upsert(&mut tx_conn)?;
            let network_id = info
                .chain_id
                .map(|chain_id| {
                    Network::insert_from_chain_id(&mut tx_conn, chain_id, NetworkType::Evm)
                })
                .transpose()?;
            let stored = image
                .map(|image| image_store.store_loaded(&mut tx_conn, &image))
                .transpose()?;
            let list_id = NewList::builder()
                .provider_id(&provider_id)
                .network_id(network_id.as_deref())
                .key(&info.key)
                .name(&info.name)
                .description(&info.description)
                .major(info.version.major)
                .minor(info.version.minor)
                .patch(info.version.patch)
                .image_hash(stored.as_ref().map(|image| image.image_hash.as_str()))
                .default_list(info.default_list)
                .build()
                .upsert(&mut tx_conn)?;
            Ok(ListContext {
                provider_key: info.provider.key,
                provider_id,
                list_id,
            })
        })
        .await
}

/// Upsert the token and add it to the list with its image. Returns the token id.
///
/// The address is normalized first, a malformed address fails with `Error::Malformed` before
/// anything is fetched.
pub async fn store_token_with_image(
    resources: &dyn CoreResourcesI,
    list: &ListContext,
    entry: &TokenEntry,
) -> Result<String, Error> {
    let address = normalize_address(&entry.address)?;
    let image = load_image(resources, entry.logo_uri.as_deref(), &list.provider_key).await?;
    let image_store = resources.image_store().clone();
    let list_id = list.list_id.clone();
    let entry = entry.clone();

    resources
        .connection_pool()
        .deferred_transaction_async(move |mut tx_conn| {
            let network_id =
                Network::insert_from_chain_id(&mut tx_conn, entry.chain_id, NetworkType::Evm)?;
            let token_id = NewToken::builder()
                .network_id(&network_id)
                .provided_id(&address)
                .name(&entry.name)
                .symbol(&entry.symbol)
                .decimals(entry.decimals.into())
                .build()
                .insert(&mut tx_conn)?;
            let stored = image
                .map(|image| image_store.store_loaded(&mut tx_conn, &image))
                .transpose()?;
            ListToken::upsert(
                &mut tx_conn,
                &token_id,
                &list_id,
                stored.as_ref().map(|image| image.image_hash.as_str()),
            )?;
            Ok(token_id)
        })
        .await
}

/// Upsert the network and set its image if it could be loaded. Returns the network id.
pub async fn store_network_with_image(
    resources: &dyn CoreResourcesI,
    chain_id: ChainId,
    logo_uri: Option<&str>,
    provider_key: &str,
) -> Result<String, Error> {
    let image = load_image(resources, logo_uri, provider_key).await?;
    let image_store = resources.image_store().clone();

    resources
        .connection_pool()
        .deferred_transaction_async(move |mut tx_conn| {
            let network_id =
                Network::insert_from_chain_id(&mut tx_conn, chain_id, NetworkType::Evm)?;
            if let Some(image) = image {
                let stored = image_store.store_loaded(&mut tx_conn, &image)?;
                Network::set_image(&mut tx_conn, &network_id, &stored.image_hash)?;
            }
            Ok(network_id)
        })
        .await
}
