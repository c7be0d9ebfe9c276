// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};
use generic_array::{typenum::U2, GenericArray};
use typed_builder::TypedBuilder;

use crate::{
    db::{
        deterministic_id::{DeterministicId, EntityName},
        schema::{list_order, list_order_item, provider},
        DeferredTxConnection,
    },
    utils::rfc3339_timestamp,
    Error,
};

/// A ranking of lists. Consumers pick the image and metadata of a token from the highest
/// ranked list that contains it.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = list_order)]
#[diesel(primary_key(list_order_id))]
pub struct ListOrder {
    pub list_order_id: String,
    pub provider_id: String,
    pub key: String,
    pub type_: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = list_order_item)]
#[diesel(primary_key(list_order_item_id))]
pub struct ListOrderItem {
    pub list_order_item_id: String,
    pub list_order_id: String,
    pub provider_id: String,
    pub list_key: String,
    pub ranking: i32,
}

/// Reference to a list by provider and list key so that an order survives new list versions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListOrderRef {
    pub provider_id: String,
    pub list_key: String,
}

impl ListOrder {
    pub fn fetch_by_key(
        conn: &mut SqliteConnection,
        key: &str,
    ) -> Result<Option<ListOrder>, Error> {
        use list_order::dsl as lo;

        Ok(lo::list_order
            .filter(lo::key.eq(key))
            .order(lo::created_at.asc())
            .first::<ListOrder>(conn)
            .optional()?)
    }

    /// Resolve the order to `(provider key, list key)` pairs, highest rank first.
    pub fn resolve(
        conn: &mut SqliteConnection,
        key: &str,
    ) -> Result<Vec<(String, String)>, Error> {
        let order = match Self::fetch_by_key(conn, key)? {
            Some(order) => order,
            None => return Ok(Vec::new()),
        };
        let items = list_order_item::table
            .inner_join(provider::table.on(provider::provider_id.eq(list_order_item::provider_id)))
            .filter(list_order_item::list_order_id.eq(&order.list_order_id))
            .order(list_order_item::ranking.asc())
            .select((provider::key, list_order_item::list_key))
            .load::<(String, String)>(conn)?;
        Ok(items)
    }
}

#[derive(Debug, TypedBuilder)]
pub struct NewListOrder<'a> {
    provider_id: &'a str,
    key: &'a str,
    name: &'a str,
    #[builder(default = "")]
    description: &'a str,
    #[builder(default = "priority")]
    type_: &'a str,
}

impl<'a> NewListOrder<'a> {
    /// Insert or update the order and replace its items. Returns the list order id.
    pub fn upsert(
        &self,
        tx_conn: &mut DeferredTxConnection,
        items: &[ListOrderRef],
    ) -> Result<String, Error> {
        use list_order::dsl as lo;
        use list_order_item::dsl as loi;

        let list_order_id = self.deterministic_id()?;
        let now = rfc3339_timestamp();

        diesel::insert_into(lo::list_order)
            .values((
                lo::list_order_id.eq(&list_order_id),
                lo::provider_id.eq(self.provider_id),
                lo::key.eq(self.key),
                lo::type_.eq(self.type_),
                lo::name.eq(self.name),
                lo::description.eq(self.description),
                lo::created_at.eq(&now),
            ))
            .on_conflict(lo::list_order_id)
            .do_update()
            .set((
                lo::name.eq(self.name),
                lo::description.eq(self.description),
                lo::type_.eq(self.type_),
                lo::updated_at.eq(&now),
            ))
            .execute(tx_conn.as_mut())?;

        diesel::delete(loi::list_order_item.filter(loi::list_order_id.eq(&list_order_id)))
            .execute(tx_conn.as_mut())?;

        for (ranking, item) in items.iter().enumerate() {
            let ranking = i32::try_from(ranking).map_err(|_| Error::Fatal {
                error: format!("Too many items in list order '{}'", self.key),
            })?;
            let ranking_str = ranking.to_string();
            let item_id = ListOrderItemEntity {
                list_order_id: &list_order_id,
                ranking: &ranking_str,
            }
            .deterministic_id()?;
            diesel::insert_into(loi::list_order_item)
                .values((
                    loi::list_order_item_id.eq(&item_id),
                    loi::list_order_id.eq(&list_order_id),
                    loi::provider_id.eq(&item.provider_id),
                    loi::list_key.eq(&item.list_key),
                    loi::ranking.eq(ranking),
                ))
                .execute(tx_conn.as_mut())?;
        }

        Ok(list_order_id)
    }
}

impl<'a> DeterministicId<'a, &'a str, U2> for NewListOrder<'a> {
    fn entity_name(&'a self) -> EntityName {
        EntityName::ListOrder
    }

    fn unique_columns(&'a self) -> GenericArray<&'a str, U2> {
        [self.provider_id, self.key].into()
    }
}

struct ListOrderItemEntity<'a> {
    list_order_id: &'a str,
    ranking: &'a str,
}

impl<'a> DeterministicId<'a, &'a str, U2> for ListOrderItemEntity<'a> {
    fn entity_name(&'a self) -> EntityName {
        EntityName::ListOrderItem
    }

    fn unique_columns(&'a self) -> GenericArray<&'a str, U2> {
        [self.list_order_id, self.ranking].into()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::db::{models::NewProvider, TmpDb};

    fn upsert_order(db: &TmpDb, list_keys: &[(&str, &str)]) -> Result<String> {
        let id = db.pool.deferred_transaction(|mut tx_conn| {
            let mut items = Vec::new();
            for (provider_key, list_key) in list_keys {
                let provider_id = NewProvider::builder()
                    .key(provider_key)
                    .name(provider_key)
                    .build()
                    .upsert(&mut tx_conn)?;
                items.push(ListOrderRef {
                    provider_id,
                    list_key: list_key.to_string(),
                });
            }
            let owner = NewProvider::builder()
                .key("tokenlists")
                .name("Token Lists")
                .build()
                .upsert(&mut tx_conn)?;
            NewListOrder::builder()
                .provider_id(&owner)
                .key("default")
                .name("Default")
                .build()
                .upsert(&mut tx_conn, &items)
        })?;
        Ok(id)
    }

    #[test]
    fn resolves_in_ranking_order() -> Result<()> {
        let db = TmpDb::new()?;
        upsert_order(&db, &[("pumptires", "pls"), ("uniswap", "hosted")])?;

        let mut conn = db.pool.connection()?;
        let resolved = ListOrder::resolve(&mut conn, "default")?;
        assert_eq!(
            resolved,
            vec![
                ("pumptires".to_string(), "pls".to_string()),
                ("uniswap".to_string(), "hosted".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn upsert_replaces_items() -> Result<()> {
        let db = TmpDb::new()?;
        let first = upsert_order(&db, &[("pumptires", "pls"), ("uniswap", "hosted")])?;
        let second = upsert_order(&db, &[("coingecko", "ethereum")])?;
        assert_eq!(first, second);

        let mut conn = db.pool.connection()?;
        let resolved = ListOrder::resolve(&mut conn, "default")?;
        assert_eq!(
            resolved,
            vec![("coingecko".to_string(), "ethereum".to_string())]
        );
        Ok(())
    }

    #[test]
    fn unknown_order_is_empty() -> Result<()> {
        let db = TmpDb::new()?;
        let mut conn = db.pool.connection()?;
        assert!(ListOrder::resolve(&mut conn, "missing")?.is_empty());
        Ok(())
    }
}
