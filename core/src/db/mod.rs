// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod connection_pool;
pub mod deterministic_id;
pub mod models;
pub(crate) mod schema;
mod schema_migrations;

pub use connection_pool::{ConnectionPool, DeferredTxConnection, ExclusiveTxConnection};

#[cfg(test)]
pub use connection_pool::tests::TmpDb;
