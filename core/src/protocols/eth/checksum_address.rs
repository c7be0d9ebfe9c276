// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ethers::core::{types::Address, utils::to_checksum};
use lazy_static::lazy_static;
use regex::Regex;

use crate::Error;

lazy_static! {
    static ref HEX_ADDRESS: Regex =
        Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex is valid");
}

/// Whether the string looks like a hex encoded 20 byte address, regardless of case.
/// Directory walkers use this to pick out token directories.
pub fn is_hex_address(candidate: &str) -> bool {
    HEX_ADDRESS.is_match(candidate)
}

/// Normalize an address to the canonical lower case form used in the store. Addresses are
/// compared case insensitively, so this must be applied before computing any key.
pub fn normalize_address(address: &str) -> Result<String, Error> {
    let trimmed = address.trim();
    if !is_hex_address(trimmed) {
        return Err(Error::Malformed {
            error: format!("Not a hex address: '{trimmed}'"),
        });
    }
    Ok(trimmed.to_lowercase())
}

pub fn parse_address(address: &str) -> Result<Address, Error> {
    let normalized = normalize_address(address)?;
    normalized.parse().map_err(|_| Error::Malformed {
        error: format!("Not a hex address: '{normalized}'"),
    })
}

/// Display an address with the EIP-55 checksum, eg. for exports.
pub fn checksum_address(address: &Address) -> String {
    to_checksum(address, None)
}

/// Display an address in the canonical form of the store.
pub fn display_address(address: &Address) -> String {
    // Default display implementation elides the middle.
    format!("{:#x}", address)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn normalizes_to_lower_case() -> Result<()> {
        let addr = "0x8b6B4C4BaEA2fE3615adB7fB9Ae2af2b67b0077a";
        assert_eq!(
            normalize_address(addr)?,
            "0x8b6b4c4baea2fe3615adb7fb9ae2af2b67b0077a"
        );
        Ok(())
    }

    #[test]
    fn mixed_case_equal_after_normalization() -> Result<()> {
        let upper = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA1111";
        let lower = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1111";
        assert_eq!(normalize_address(upper)?, normalize_address(lower)?);
        Ok(())
    }

    #[test]
    fn no_prefix_is_not_ok() {
        let addr = "8b6B4C4BaEA2fE3615adB7fB9Ae2af2b67b0077a";
        assert!(matches!(
            normalize_address(addr),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn wrong_length_is_not_ok() {
        assert!(!is_hex_address("0x8b6B4C4BaEA2fE3615adB7fB9Ae2af2b67b0077"));
        assert!(!is_hex_address("0xzz6B4C4BaEA2fE3615adB7fB9Ae2af2b67b0077a"));
    }

    #[test]
    fn display_round_trip() -> Result<()> {
        let addr = "0x8b6b4c4baea2fe3615adb7fb9ae2af2b67b0077a";
        let parsed = parse_address(addr)?;
        assert_eq!(display_address(&parsed), addr);
        assert_eq!(
            checksum_address(&parsed),
            "0x8b6B4C4BaEA2fE3615adB7fB9Ae2af2b67b0077a"
        );
        Ok(())
    }
}
