// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Each contract lives in its own module, because abigen generates call structs with the same
// names for the string and bytes32 variants.

mod erc20 {
    use ethers::contract::abigen;

    abigen!(
        ERC20Contract,
        r#"[
            function name() external view returns (string memory)
            function symbol() external view returns (string memory)
            function decimals() external view returns (uint8)
        ]"#
    );
}

// Legacy tokens (eg. MKR) return `bytes32` for name and symbol.
mod erc20_bytes32 {
    use ethers::contract::abigen;

    abigen!(
        ERC20Bytes32Contract,
        r#"[
            function name() external view returns (bytes32)
            function symbol() external view returns (bytes32)
            function decimals() external view returns (uint8)
        ]"#
    );
}

mod token_bridge {
    use ethers::contract::abigen;

    abigen!(
        TokenBridgeContract,
        r#"[
            event NewTokenRegistered(address indexed nativeToken, address indexed bridgedToken)
        ]"#,
        event_derives(serde::Deserialize, serde::Serialize)
    );
}

pub use erc20::ERC20Contract;
pub use erc20_bytes32::ERC20Bytes32Contract;
pub use token_bridge::{NewTokenRegisteredFilter, TokenBridgeContract};
