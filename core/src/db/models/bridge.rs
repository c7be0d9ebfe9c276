// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, sql_types::BigInt, SqliteConnection};
use generic_array::{typenum::U5, GenericArray};
use typed_builder::TypedBuilder;

use crate::{
    db::{
        deterministic_id::{DeterministicId, EntityName},
        schema::bridge,
        DeferredTxConnection,
    },
    utils::rfc3339_timestamp,
    Error,
};

/// A token bridge between two networks with the block cursors of the last scan.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = bridge)]
#[diesel(primary_key(bridge_id))]
pub struct Bridge {
    pub bridge_id: String,
    pub type_: String,
    pub provider_id: String,
    pub home_network_id: String,
    pub home_address: String,
    pub foreign_network_id: String,
    pub foreign_address: String,
    pub current_home_block_number: i64,
    pub current_foreign_block_number: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl Bridge {
    pub fn fetch(conn: &mut SqliteConnection, bridge_id: &str) -> Result<Option<Bridge>, Error> {
        use bridge::dsl as b;

        Ok(b::bridge
            .filter(b::bridge_id.eq(bridge_id))
            .first::<Bridge>(conn)
            .optional()?)
    }

    /// Persist the highest scanned block on each side. Cursors never move backwards.
    /// One statement, so the deferred transaction takes the write lock right away instead of
    /// upgrading a read snapshot that a concurrent writer may have invalidated.
    pub fn update_cursors(
        tx_conn: &mut DeferredTxConnection,
        bridge_id: &str,
        home_block_number: u64,
        foreign_block_number: u64,
    ) -> Result<(), Error> {
        use bridge::dsl as b;

        let home = i64::try_from(home_block_number)?;
        let foreign = i64::try_from(foreign_block_number)?;
        let updated = diesel::update(b::bridge.filter(b::bridge_id.eq(bridge_id)))
            .set((
                b::current_home_block_number.eq(greatest(b::current_home_block_number, home)),
                b::current_foreign_block_number
                    .eq(greatest(b::current_foreign_block_number, foreign)),
                b::updated_at.eq(rfc3339_timestamp()),
            ))
            .execute(tx_conn.as_mut())?;
        if updated == 0 {
            return Err(Error::Fatal {
                error: format!("No bridge with id '{bridge_id}'"),
            });
        }
        Ok(())
    }
}

sql_function! {
    /// Sqlite's scalar `MAX` of two values.
    #[sql_name = "MAX"]
    fn greatest(a: BigInt, b: BigInt) -> BigInt;
}

#[derive(Debug, TypedBuilder, Insertable)]
#[diesel(table_name = bridge)]
pub struct NewBridge<'a> {
    #[builder(default = "omnibridge")]
    type_: &'a str,
    provider_id: &'a str,
    home_network_id: &'a str,
    home_address: &'a str,
    foreign_network_id: &'a str,
    foreign_address: &'a str,
}

impl<'a> NewBridge<'a> {
    /// Insert the bridge unless it exists and return the stored row with its cursors.
    pub fn upsert(&self, tx_conn: &mut DeferredTxConnection) -> Result<Bridge, Error> {
        use bridge::dsl as b;

        let bridge_id = self.deterministic_id()?;
        let now = rfc3339_timestamp();

        diesel::insert_into(b::bridge)
            .values((self, b::bridge_id.eq(&bridge_id), b::created_at.eq(&now)))
            .on_conflict(b::bridge_id)
            .do_update()
            .set(b::updated_at.eq(&now))
            .execute(tx_conn.as_mut())?;

        let bridge = b::bridge
            .filter(b::bridge_id.eq(&bridge_id))
            .first::<Bridge>(tx_conn.as_mut())?;
        Ok(bridge)
    }
}

impl<'a> DeterministicId<'a, &'a str, U5> for NewBridge<'a> {
    fn entity_name(&'a self) -> EntityName {
        EntityName::Bridge
    }

    fn unique_columns(&'a self) -> GenericArray<&'a str, U5> {
        [
            self.provider_id,
            self.home_network_id,
            self.home_address,
            self.foreign_network_id,
            self.foreign_address,
        ]
        .into()
    }
}
