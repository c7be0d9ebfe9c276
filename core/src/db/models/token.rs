// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};
use generic_array::{typenum::U2, GenericArray};
use typed_builder::TypedBuilder;

use crate::{
    db::{
        deterministic_id::{DeterministicId, EntityName},
        schema::{list_token, token},
        DeferredTxConnection,
    },
    protocols::TokenType,
    utils::rfc3339_timestamp,
    Error,
};

/// A token on a network. Rows are never updated, the first provider to insert a token
/// determines its metadata.
#[derive(Clone, Debug, PartialEq, Eq, Queryable)]
pub struct Token {
    pub token_id: String,
    pub network_id: String,
    /// Contract address or other network specific id in lower case.
    pub provided_id: String,
    pub name: String,
    pub symbol: String,
    pub decimals: i32,
    pub type_: TokenType,
    pub created_at: String,
}

impl Token {
    pub fn fetch(
        conn: &mut SqliteConnection,
        network_id: &str,
        provided_id: &str,
    ) -> Result<Option<Token>, Error> {
        use token::dsl as t;

        let result = t::token
            .filter(t::network_id.eq(network_id))
            .filter(t::provided_id.eq(provided_id.to_lowercase()))
            .first::<Token>(conn)
            .optional()?;
        Ok(result)
    }

    /// Tokens of a list in insertion order.
    pub fn list_for_list_id(
        conn: &mut SqliteConnection,
        list_id: &str,
    ) -> Result<Vec<Token>, Error> {
        let tokens = token::table
            .inner_join(list_token::table.on(list_token::token_id.eq(token::token_id)))
            .filter(list_token::list_id.eq(list_id))
            .order(list_token::created_at.asc())
            .select(token::all_columns)
            .load::<Token>(conn)?;
        Ok(tokens)
    }

    /// Tokens of a network ordered by address.
    pub fn list_for_network(
        conn: &mut SqliteConnection,
        network_id: &str,
    ) -> Result<Vec<Token>, Error> {
        use token::dsl as t;

        Ok(t::token
            .filter(t::network_id.eq(network_id))
            .order(t::provided_id.asc())
            .load::<Token>(conn)?)
    }

    pub fn count(conn: &mut SqliteConnection) -> Result<i64, Error> {
        Ok(token::table.count().get_result(conn)?)
    }
}

#[derive(Debug, TypedBuilder)]
pub struct NewToken<'a> {
    network_id: &'a str,
    provided_id: &'a str,
    name: &'a str,
    symbol: &'a str,
    decimals: i32,
    #[builder(default)]
    type_: TokenType,
}

impl<'a> NewToken<'a> {
    /// Insert the token unless it exists. Returns the token id in both cases.
    pub fn insert(&self, tx_conn: &mut DeferredTxConnection) -> Result<String, Error> {
        use token::dsl as t;

        let entity = TokenEntity {
            network_id: self.network_id,
            provided_id: self.provided_id.to_lowercase(),
        };
        let token_id = entity.deterministic_id()?;

        diesel::insert_into(t::token)
            .values((
                t::token_id.eq(&token_id),
                t::network_id.eq(self.network_id),
                t::provided_id.eq(&entity.provided_id),
                t::name.eq(self.name),
                t::symbol.eq(self.symbol),
                t::decimals.eq(self.decimals),
                t::type_.eq(self.type_),
                t::created_at.eq(rfc3339_timestamp()),
            ))
            .on_conflict_do_nothing()
            .execute(tx_conn.as_mut())?;

        Ok(token_id)
    }
}

struct TokenEntity<'a> {
    network_id: &'a str,
    provided_id: String,
}

impl<'a> DeterministicId<'a, &'a str, U2> for TokenEntity<'a> {
    fn entity_name(&'a self) -> EntityName {
        EntityName::Token
    }

    fn unique_columns(&'a self) -> GenericArray<&'a str, U2> {
        [self.network_id, self.provided_id.as_str()].into()
    }
}
