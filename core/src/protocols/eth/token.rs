// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use crate::config;

/// ERC-20 metadata as read from the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[readonly::make]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    pub fn new(name: String, symbol: String, decimals: u8) -> Self {
        Self {
            name,
            symbol,
            decimals,
        }
    }

    /// Placeholder for tokens that couldn't be read with either ABI.
    pub fn unreadable() -> Self {
        Self {
            name: "".into(),
            symbol: "".into(),
            decimals: config::DEFAULT_DECIMALS,
        }
    }

    pub fn is_unreadable(&self) -> bool {
        self.name.is_empty() && self.symbol.is_empty()
    }

    pub(super) fn from_bytes32(name: &[u8; 32], symbol: &[u8; 32], decimals: u8) -> Self {
        Self {
            name: decode_bytes32_string(name),
            symbol: decode_bytes32_string(symbol),
            decimals,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Don't retry with the `bytes32` ABI if the string ABI fails.
    pub skip_bytes32: bool,
    /// Fail with `Error::TokenUnreadable` instead of returning placeholder metadata.
    pub must_exist: bool,
}

/// Decode a `bytes32` name or symbol: trailing NUL padding is removed and invalid UTF-8 is
/// replaced.
pub fn decode_bytes32_string(value: &[u8; 32]) -> String {
    let end = value
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    String::from_utf8_lossy(&value[..end]).into_owned()
}
