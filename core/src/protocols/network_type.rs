// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core_macros::sql_text;

/// The ecosystem a network belongs to. Together with the chain id it identifies a network.
/// Lists that aren't bound to a chain use chain id 0.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum_macros::EnumString,
    strum_macros::Display,
    strum_macros::IntoStaticStr,
    // Diesel traits
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[strum(serialize_all = "snake_case")]
pub enum NetworkType {
    #[default]
    Evm,
    Solana,
}

sql_text!(NetworkType);
