// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};
use generic_array::{typenum::U3, GenericArray};
use typed_builder::TypedBuilder;

use crate::{
    db::{
        deterministic_id::{DeterministicId, EntityName},
        schema::{list, provider},
        DeferredTxConnection,
    },
    utils::rfc3339_timestamp,
    Error,
};

/// A versioned token list of a provider. A new version is a new row.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = list)]
#[diesel(primary_key(list_id))]
pub struct List {
    pub list_id: String,
    pub provider_id: String,
    pub network_id: Option<String>,
    pub key: String,
    pub name: String,
    pub description: String,
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    pub image_hash: Option<String>,
    pub default_list: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl List {
    pub fn fetch(conn: &mut SqliteConnection, list_id: &str) -> Result<Option<List>, Error> {
        use list::dsl as l;

        Ok(l::list
            .filter(l::list_id.eq(list_id))
            .first::<List>(conn)
            .optional()?)
    }

    /// The highest version of a list of a provider.
    pub fn find_latest(
        conn: &mut SqliteConnection,
        provider_key: &str,
        list_key: &str,
    ) -> Result<Option<List>, Error> {
        let result = list::table
            .inner_join(provider::table)
            .filter(provider::key.eq(provider_key))
            .filter(list::key.eq(list_key))
            .order((list::major.desc(), list::minor.desc(), list::patch.desc()))
            .select(list::all_columns)
            .first::<List>(conn)
            .optional()?;
        Ok(result)
    }

    pub fn set_image(
        tx_conn: &mut DeferredTxConnection,
        list_id: &str,
        image_hash: &str,
    ) -> Result<(), Error> {
        use list::dsl as l;

        diesel::update(l::list.filter(l::list_id.eq(list_id)))
            .set((
                l::image_hash.eq(image_hash),
                l::updated_at.eq(rfc3339_timestamp()),
            ))
            .execute(tx_conn.as_mut())?;
        Ok(())
    }
}

#[derive(Debug, TypedBuilder, Insertable)]
#[diesel(table_name = list)]
pub struct NewList<'a> {
    provider_id: &'a str,
    #[builder(default)]
    network_id: Option<&'a str>,
    key: &'a str,
    name: &'a str,
    #[builder(default = "")]
    description: &'a str,
    #[builder(default)]
    major: i32,
    #[builder(default)]
    minor: i32,
    #[builder(default)]
    patch: i32,
    #[builder(default)]
    image_hash: Option<&'a str>,
    #[builder(default)]
    default_list: bool,
}

impl<'a> NewList<'a> {
    /// Insert the list version or update its descriptive columns. Returns the list id.
    pub fn upsert(&self, tx_conn: &mut DeferredTxConnection) -> Result<String, Error> {
        use list::dsl as l;

        let list_id = self.deterministic_id()?;
        let now = rfc3339_timestamp();

        diesel::insert_into(l::list)
            .values((self, l::list_id.eq(&list_id), l::created_at.eq(&now)))
            .on_conflict(l::list_id)
            .do_update()
            .set((
                l::network_id.eq(self.network_id),
                l::name.eq(self.name),
                l::description.eq(self.description),
                l::default_list.eq(self.default_list),
                l::updated_at.eq(&now),
            ))
            .execute(tx_conn.as_mut())?;

        // A missing image doesn't clear the image of an earlier run.
        if let Some(image_hash) = self.image_hash {
            List::set_image(tx_conn, &list_id, image_hash)?;
        }

        Ok(list_id)
    }
}

impl<'a> NewList<'a> {
    /// Fixed width version so that the key and the version can't shift into each other in the
    /// concatenated unique columns (`1.12.0` vs `11.2.0`).
    fn version_column(&self) -> String {
        format!("{:011}.{:011}.{:011}", self.major, self.minor, self.patch)
    }
}

impl<'a> DeterministicId<'a, String, U3> for NewList<'a> {
    fn entity_name(&'a self) -> EntityName {
        EntityName::List
    }

    fn unique_columns(&'a self) -> GenericArray<String, U3> {
        [
            self.provider_id.to_string(),
            self.key.to_string(),
            self.version_column(),
        ]
        .into()
    }
}
