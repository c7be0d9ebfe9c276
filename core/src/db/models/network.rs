// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};
use generic_array::{typenum::U2, GenericArray};

use crate::{
    db::{
        deterministic_id::{DeterministicId, EntityName},
        schema::network,
        DeferredTxConnection,
    },
    protocols::{eth::ChainId, NetworkType},
    utils::rfc3339_timestamp,
    Error,
};

/// A chain of an ecosystem. Identity columns can't be updated after insert, only the image.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = network)]
#[diesel(primary_key(network_id))]
pub struct Network {
    pub network_id: String,
    pub type_: NetworkType,
    pub chain_id: String,
    pub image_hash: Option<String>,
    pub created_at: String,
}

impl Network {
    /// Insert the network if it doesn't exist yet. Returns the network id in both cases.
    pub fn insert_from_chain_id(
        tx_conn: &mut DeferredTxConnection,
        chain_id: ChainId,
        network_type: NetworkType,
    ) -> Result<String, Error> {
        use network::dsl as n;

        let entity = NetworkEntity {
            type_: network_type,
            chain_id: chain_id.to_string(),
        };
        let network_id = entity.deterministic_id()?;

        diesel::insert_into(n::network)
            .values((
                n::network_id.eq(&network_id),
                n::type_.eq(network_type),
                n::chain_id.eq(&entity.chain_id),
                n::created_at.eq(rfc3339_timestamp()),
            ))
            .on_conflict_do_nothing()
            .execute(tx_conn.as_mut())?;

        Ok(network_id)
    }

    pub fn set_image(
        tx_conn: &mut DeferredTxConnection,
        network_id: &str,
        image_hash: &str,
    ) -> Result<(), Error> {
        use network::dsl as n;

        diesel::update(n::network.filter(n::network_id.eq(network_id)))
            .set(n::image_hash.eq(image_hash))
            .execute(tx_conn.as_mut())?;
        Ok(())
    }

    pub fn fetch(
        conn: &mut SqliteConnection,
        network_id: &str,
    ) -> Result<Option<Network>, Error> {
        use network::dsl as n;

        let result = n::network
            .filter(n::network_id.eq(network_id))
            .first::<Network>(conn)
            .optional()?;
        Ok(result)
    }

    pub fn fetch_by_chain_id(
        conn: &mut SqliteConnection,
        chain_id: ChainId,
        network_type: NetworkType,
    ) -> Result<Option<Network>, Error> {
        use network::dsl as n;

        let result = n::network
            .filter(n::type_.eq(network_type))
            .filter(n::chain_id.eq(chain_id.to_string()))
            .first::<Network>(conn)
            .optional()?;
        Ok(result)
    }
}

struct NetworkEntity {
    type_: NetworkType,
    chain_id: String,
}

impl<'a> DeterministicId<'a, &'a str, U2> for NetworkEntity {
    fn entity_name(&'a self) -> EntityName {
        EntityName::Network
    }

    fn unique_columns(&'a self) -> GenericArray<&'a str, U2> {
        let network_type: &'static str = self.type_.into();
        [network_type, self.chain_id.as_str()].into()
    }
}
