// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod bridge;
mod bridge_link;
mod image;
mod link;
mod list;
mod list_order;
mod list_token;
mod network;
mod provider;
mod token;

pub use bridge::{Bridge, NewBridge};
pub use bridge_link::{BridgeLink, NewBridgeLink};
pub use image::{Image, NewImage};
pub use link::Link;
pub use list::{List, NewList};
pub use list_order::{ListOrder, ListOrderItem, ListOrderRef, NewListOrder};
pub use list_token::ListToken;
pub use network::Network;
pub use provider::{NewProvider, Provider};
pub use token::{NewToken, Token};
