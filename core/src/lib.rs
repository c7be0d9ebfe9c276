// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[macro_use]
extern crate diesel;
extern crate lazy_static;

// These are public, because they're used by the collect tool
pub mod async_runtime;
pub mod collectors;
pub mod config;
pub mod db;
pub mod export;
pub mod failure_ledger;
pub mod fetch;
pub mod image_store;
pub mod ingest;
pub mod orchestrator;
pub mod protocols;
pub mod resources;

mod error;
mod http_client;
mod retry;
mod utils;

pub use crate::{
    async_runtime::block_on,
    config::Settings,
    error::Error,
    orchestrator::{CollectionReport, Orchestrator},
    resources::{CoreResources, CoreResourcesI},
};
