// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod chain_id;
mod checksum_address;
mod contracts;
mod rpc_provider;
mod token;

pub use chain_id::ChainId;
pub use checksum_address::{
    checksum_address, display_address, is_hex_address, normalize_address, parse_address,
};
#[cfg(test)]
pub use rpc_provider::test_util;
pub use rpc_provider::{
    FailoverRpc, RpcManager, RpcManagerI, RpcProvider, TokenRegistration,
};
pub use token::{decode_bytes32_string, ReadOptions, TokenMetadata};
