// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod eth;
mod network_type;
mod token_type;

pub use crate::protocols::{network_type::NetworkType, token_type::TokenType};
