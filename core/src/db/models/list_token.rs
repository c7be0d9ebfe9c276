// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};
use generic_array::{typenum::U2, GenericArray};

use crate::{
    db::{
        deterministic_id::{DeterministicId, EntityName},
        schema::{list, list_token, provider},
        DeferredTxConnection,
    },
    utils::rfc3339_timestamp,
    Error,
};

/// Membership of a token in a list with the image the list provides for it.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = list_token)]
#[diesel(primary_key(list_token_id))]
pub struct ListToken {
    pub list_token_id: String,
    pub token_id: String,
    pub list_id: String,
    pub image_hash: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl ListToken {
    /// Add the token to the list. An existing image is only replaced by a new one, never cleared.
    pub fn upsert(
        tx_conn: &mut DeferredTxConnection,
        token_id: &str,
        list_id: &str,
        image_hash: Option<&str>,
    ) -> Result<String, Error> {
        use list_token::dsl as lt;

        let list_token_id = ListTokenEntity { token_id, list_id }.deterministic_id()?;
        let now = rfc3339_timestamp();

        let insert = diesel::insert_into(lt::list_token).values((
            lt::list_token_id.eq(&list_token_id),
            lt::token_id.eq(token_id),
            lt::list_id.eq(list_id),
            lt::image_hash.eq(image_hash),
            lt::created_at.eq(&now),
        ));
        match image_hash {
            Some(image_hash) => insert
                .on_conflict(lt::list_token_id)
                .do_update()
                .set((lt::image_hash.eq(image_hash), lt::updated_at.eq(&now)))
                .execute(tx_conn.as_mut())?,
            None => insert
                .on_conflict(lt::list_token_id)
                .do_update()
                .set(lt::updated_at.eq(&now))
                .execute(tx_conn.as_mut())?,
        };

        Ok(list_token_id)
    }

    pub fn list_for_list_id(
        conn: &mut SqliteConnection,
        list_id: &str,
    ) -> Result<Vec<ListToken>, Error> {
        use list_token::dsl as lt;

        Ok(lt::list_token
            .filter(lt::list_id.eq(list_id))
            .order(lt::created_at.asc())
            .load::<ListToken>(conn)?)
    }

    /// Images that lists provide for the token as `(provider key, list key, image hash)`.
    pub fn images_for_token(
        conn: &mut SqliteConnection,
        token_id: &str,
    ) -> Result<Vec<(String, String, String)>, Error> {
        let rows = list_token::table
            .inner_join(list::table.inner_join(provider::table))
            .filter(list_token::token_id.eq(token_id))
            .filter(list_token::image_hash.is_not_null())
            .order(list_token::created_at.asc())
            .select((provider::key, list::key, list_token::image_hash))
            .load::<(String, String, Option<String>)>(conn)?;
        Ok(rows
            .into_iter()
            .filter_map(|(provider_key, list_key, image_hash)| {
                image_hash.map(|hash| (provider_key, list_key, hash))
            })
            .collect())
    }

    pub fn count_for_list_id(conn: &mut SqliteConnection, list_id: &str) -> Result<i64, Error> {
        use list_token::dsl as lt;

        Ok(lt::list_token
            .filter(lt::list_id.eq(list_id))
            .count()
            .get_result(conn)?)
    }
}

struct ListTokenEntity<'a> {
    token_id: &'a str,
    list_id: &'a str,
}

impl<'a> DeterministicId<'a, &'a str, U2> for ListTokenEntity<'a> {
    fn entity_name(&'a self) -> EntityName {
        EntityName::ListToken
    }

    fn unique_columns(&'a self) -> GenericArray<&'a str, U2> {
        [self.token_id, self.list_id].into()
    }
}
