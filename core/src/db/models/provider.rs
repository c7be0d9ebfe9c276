// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};
use generic_array::{typenum::U1, GenericArray};
use typed_builder::TypedBuilder;

use crate::{
    db::{
        deterministic_id::{DeterministicId, EntityName},
        schema::provider,
        DeferredTxConnection,
    },
    utils::rfc3339_timestamp,
    Error,
};

#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = provider)]
#[diesel(primary_key(provider_id))]
pub struct Provider {
    pub provider_id: String,
    pub key: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl Provider {
    pub fn fetch_by_key(
        conn: &mut SqliteConnection,
        key: &str,
    ) -> Result<Option<Provider>, Error> {
        use provider::dsl as p;

        let result = p::provider
            .filter(p::key.eq(key))
            .first::<Provider>(conn)
            .optional()?;
        Ok(result)
    }

    pub fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Provider>, Error> {
        use provider::dsl as p;

        Ok(p::provider.order(p::key.asc()).load::<Provider>(conn)?)
    }
}

#[derive(Debug, TypedBuilder, Insertable)]
#[diesel(table_name = provider)]
pub struct NewProvider<'a> {
    key: &'a str,
    name: &'a str,
    #[builder(default = "")]
    description: &'a str,
}

impl<'a> NewProvider<'a> {
    /// Insert the provider or update its name and description. Returns the provider id.
    pub fn upsert(&self, tx_conn: &mut DeferredTxConnection) -> Result<String, Error> {
        use provider::dsl as p;

        let provider_id = self.deterministic_id()?;
        let now = rfc3339_timestamp();

        diesel::insert_into(p::provider)
            .values((self, p::provider_id.eq(&provider_id), p::created_at.eq(&now)))
            .on_conflict(p::provider_id)
            .do_update()
            .set((
                p::name.eq(self.name),
                p::description.eq(self.description),
                p::updated_at.eq(&now),
            ))
            .execute(tx_conn.as_mut())?;

        Ok(provider_id)
    }
}

impl<'a> DeterministicId<'a, &'a str, U1> for NewProvider<'a> {
    fn entity_name(&'a self) -> EntityName {
        EntityName::Provider
    }

    fn unique_columns(&'a self) -> GenericArray<&'a str, U1> {
        [self.key].into()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::db::TmpDb;

    #[test]
    fn upsert_is_idempotent() -> Result<()> {
        let db = TmpDb::new()?;
        let first = db.pool.deferred_transaction(|mut tx_conn| {
            NewProvider::builder()
                .key("uniswap")
                .name("Uniswap")
                .build()
                .upsert(&mut tx_conn)
        })?;
        let second = db.pool.deferred_transaction(|mut tx_conn| {
            NewProvider::builder()
                .key("uniswap")
                .name("Uniswap Labs")
                .description("Default token list")
                .build()
                .upsert(&mut tx_conn)
        })?;
        assert_eq!(first, second);

        let mut conn = db.pool.connection()?;
        let providers = Provider::list_all(&mut conn)?;
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "Uniswap Labs");
        assert!(providers[0].updated_at.is_some());
        Ok(())
    }

    #[test]
    fn fetch_by_key() -> Result<()> {
        let db = TmpDb::new()?;
        db.pool.deferred_transaction(|mut tx_conn| {
            NewProvider::builder()
                .key("trustwallet")
                .name("Trust Wallet")
                .build()
                .upsert(&mut tx_conn)
        })?;
        let mut conn = db.pool.connection()?;
        assert!(Provider::fetch_by_key(&mut conn, "trustwallet")?.is_some());
        assert!(Provider::fetch_by_key(&mut conn, "unknown")?.is_none());
        Ok(())
    }
}
