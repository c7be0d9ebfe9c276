// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use generic_array::{ArrayLength, GenericArray};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use strum_macros::{EnumIter, EnumString};

use crate::Error;

/// Deterministic ids make repeated ingestion idempotent: the same logical entity collected in a
/// different run, or by a different provider concurrently, always maps to the same primary key,
/// so writes can be resolved with `ON CONFLICT` instead of coordination.
/// Every entity except images (which are keyed by the hash of their content) MUST use a
/// deterministic id as its PK, and the PK MUST be computed through this trait so that all
/// entities hash the same way.
/// The purpose of this trait is to make it easy to review which entity uses what unique values to
/// determine its deterministic id.
pub trait DeterministicId<'a, T: AsRef<[u8]> + 'a, N: ArrayLength<T>> {
    /// The name of the database entity. Only used for diagnostics, it's not part of the hash.
    fn entity_name(&'a self) -> EntityName;

    /// Returns the column values for a row that define an entity. The deterministic id is derived
    /// from these values. The order matters and shouldn't change.
    /// We use `GenericArray`, because with this declaration, it's not possible to create a zero length
    /// array which would be a logic error and because it supports `IntoIter`.
    fn unique_columns(&'a self) -> GenericArray<T, N>;

    /// Compute a deterministic id for a database entity based on their unique columns.
    /// The id is the `0x` prefixed hex of `keccak256(concat(columns))`.
    fn deterministic_id(&'a self) -> Result<String, Error> {
        let unique_columns = self.unique_columns();
        let mut hasher = Keccak256::new();
        let mut total_len = 0;
        for v in unique_columns {
            let v: &[u8] = v.as_ref();
            total_len += v.len();
            hasher.update(v);
        }
        if total_len == 0 {
            return Err(Error::Fatal {
                error: format!(
                    "All unique columns are empty for entity '{}'",
                    self.entity_name()
                ),
            });
        }
        Ok(format!("0x{}", hex::encode(hasher.finalize())))
    }
}

/// Hash image content. The result is the primary key of the image table.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, EnumString, strum_macros::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum EntityName {
    Bridge,
    BridgeLink,
    List,
    ListOrder,
    ListOrderItem,
    ListToken,
    Network,
    Provider,
    Token,
    #[cfg(test)]
    Mock,
}
