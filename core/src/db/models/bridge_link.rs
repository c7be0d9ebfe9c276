// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};
use generic_array::{typenum::U3, GenericArray};
use typed_builder::TypedBuilder;

use crate::{
    db::{
        deterministic_id::{DeterministicId, EntityName},
        schema::bridge_link,
        DeferredTxConnection,
    },
    utils::rfc3339_timestamp,
    Error,
};

/// Relation between a token and its bridged counterpart on the other network.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = bridge_link)]
#[diesel(primary_key(bridge_link_id))]
pub struct BridgeLink {
    pub bridge_link_id: String,
    pub native_token_id: String,
    pub bridged_token_id: String,
    pub bridge_id: String,
    pub transaction_hash: String,
    pub created_at: String,
}

impl BridgeLink {
    pub fn list_for_bridge(
        conn: &mut SqliteConnection,
        bridge_id: &str,
    ) -> Result<Vec<BridgeLink>, Error> {
        use bridge_link::dsl as bl;

        Ok(bl::bridge_link
            .filter(bl::bridge_id.eq(bridge_id))
            .order(bl::created_at.asc())
            .load::<BridgeLink>(conn)?)
    }
}

#[derive(Debug, TypedBuilder, Insertable)]
#[diesel(table_name = bridge_link)]
pub struct NewBridgeLink<'a> {
    native_token_id: &'a str,
    bridged_token_id: &'a str,
    bridge_id: &'a str,
    transaction_hash: &'a str,
}

impl<'a> NewBridgeLink<'a> {
    /// Insert the link unless it exists. Returns the bridge link id.
    pub fn insert(&self, tx_conn: &mut DeferredTxConnection) -> Result<String, Error> {
        use bridge_link::dsl as bl;

        let bridge_link_id = self.deterministic_id()?;
        diesel::insert_into(bl::bridge_link)
            .values((
                self,
                bl::bridge_link_id.eq(&bridge_link_id),
                bl::created_at.eq(rfc3339_timestamp()),
            ))
            .on_conflict_do_nothing()
            .execute(tx_conn.as_mut())?;
        Ok(bridge_link_id)
    }
}

impl<'a> DeterministicId<'a, &'a str, U3> for NewBridgeLink<'a> {
    fn entity_name(&'a self) -> EntityName {
        EntityName::BridgeLink
    }

    fn unique_columns(&'a self) -> GenericArray<&'a str, U3> {
        [self.native_token_id, self.bridged_token_id, self.bridge_id].into()
    }
}
