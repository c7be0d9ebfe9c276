// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{fmt::Debug, sync::Arc};

use typed_builder::TypedBuilder;

use crate::{
    config::Settings,
    db::ConnectionPool,
    failure_ledger::FailureLedger,
    fetch::Fetcher,
    http_client::HttpClient,
    image_store::ImageStore,
    protocols::eth,
    Error,
};

/// Let us inject mock resources and retain references to them without type erasure.
pub trait CoreResourcesI: Debug + Send + Sync {
    fn connection_pool(&self) -> &ConnectionPool;
    fn fetcher(&self) -> &Fetcher;
    fn rpc_manager(&self) -> &dyn eth::RpcManagerI;
    fn ledger(&self) -> &FailureLedger;
    fn image_store(&self) -> &ImageStore;
    fn settings(&self) -> &Settings;
}

// All Send + Sync. The runtime context of a collection run: every piece of mutable state
// (gateway counter, in-flight requests, failure ledger, RPC rotation) lives here.
#[derive(Debug, TypedBuilder)]
#[readonly::make]
pub struct CoreResources {
    connection_pool: ConnectionPool,
    fetcher: Arc<Fetcher>,
    rpc_manager: Box<dyn eth::RpcManagerI>,
    ledger: Arc<FailureLedger>,
    image_store: ImageStore,
    settings: Settings,
}

impl CoreResources {
    /// Wire up the resources from settings. Doesn't touch the network or the database.
    pub fn from_settings(settings: Settings) -> Result<Self, Error> {
        let connection_pool = ConnectionPool::new(&settings.database_url)?;
        let ledger = Arc::new(FailureLedger::new());
        let http_client = HttpClient::new(settings.http_cache_dir.clone())?;
        let fetcher = Arc::new(Fetcher::new(
            http_client,
            settings.ipfs_gateways.clone(),
            ledger.clone(),
        ));
        let rpc_manager = Box::new(eth::RpcManager::new(settings.rpc_overrides.clone()));
        let image_store = ImageStore::new(
            connection_pool.clone(),
            fetcher.clone(),
            settings.root_uri.clone(),
            settings.image_mode,
        );
        Ok(Self::builder()
            .connection_pool(connection_pool)
            .fetcher(fetcher)
            .rpc_manager(rpc_manager)
            .ledger(ledger)
            .image_store(image_store)
            .settings(settings)
            .build())
    }
}

impl CoreResourcesI for CoreResources {
    fn connection_pool(&self) -> &ConnectionPool {
        &self.connection_pool
    }

    fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    fn rpc_manager(&self) -> &dyn eth::RpcManagerI {
        &*self.rpc_manager
    }

    fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    fn image_store(&self) -> &ImageStore {
        &self.image_store
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
pub mod tests {
    use std::collections::HashMap;

    use anyhow::Result;
    use url::Url;

    use super::*;
    use crate::{
        db::TmpDb, fetch::tests::test_fetcher, image_store::ImageModeSetting,
        protocols::eth::ChainId,
    };

    /// Resources on a temp database with test retry policies and the given RPC endpoints.
    pub fn test_resources(
        db: &TmpDb,
        rpc_overrides: HashMap<ChainId, Vec<Url>>,
    ) -> Result<CoreResources> {
        test_resources_with_mode(db, rpc_overrides, ImageModeSetting::Save)
    }

    pub fn test_resources_with_mode(
        db: &TmpDb,
        rpc_overrides: HashMap<ChainId, Vec<Url>>,
        image_mode: ImageModeSetting,
    ) -> Result<CoreResources> {
        let ledger = Arc::new(FailureLedger::new());
        let fetcher = Arc::new(test_fetcher(ledger.clone())?);
        let settings = Settings {
            database_url: db.pool.db_path().to_string(),
            image_mode,
            rpc_overrides: rpc_overrides.clone(),
            ..Default::default()
        };
        let image_store = ImageStore::new(
            db.pool.clone(),
            fetcher.clone(),
            settings.root_uri.clone(),
            image_mode,
        );
        Ok(CoreResources::builder()
            .connection_pool(db.pool.clone())
            .fetcher(fetcher)
            .rpc_manager(Box::new(eth::RpcManager::without_backoff(rpc_overrides)))
            .ledger(ledger)
            .image_store(image_store)
            .settings(settings)
            .build())
    }

    #[test]
    fn from_settings_wires_shared_ledger() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = Settings {
            database_url: dir.path().join("tokens.sqlite3").display().to_string(),
            ..Default::default()
        };
        let resources = CoreResources::from_settings(settings)?;
        resources.fetcher().ledger().record("fetch", "uri", "failed");
        assert_eq!(resources.ledger().len()?, 1);
        Ok(())
    }
}
