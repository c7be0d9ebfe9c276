// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{collections::HashSet, sync::Arc};

use futures::future::join_all;
use itertools::Itertools;

use crate::{
    collectors::{providers, Collector, CollectorSummary},
    failure_ledger::Failure,
    resources::CoreResourcesI,
    Error,
};

const COLLECTOR_SCOPE: &str = "collector";

/// Outcome of a collection run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub summaries: Vec<CollectorSummary>,
    /// Keys of the collectors that failed as a whole.
    pub failed_collectors: Vec<String>,
    /// Every failure recorded during the run.
    pub failures: Vec<Failure>,
}

impl CollectionReport {
    pub fn is_success(&self) -> bool {
        self.failed_collectors.is_empty()
    }
}

/// Runs collectors concurrently. A failing collector doesn't affect the others.
#[derive(Debug)]
pub struct Orchestrator {
    resources: Arc<dyn CoreResourcesI>,
    collectors: Vec<Collector>,
}

impl Orchestrator {
    pub fn new(resources: Arc<dyn CoreResourcesI>, collectors: Vec<Collector>) -> Self {
        Self {
            resources,
            collectors,
        }
    }

    /// Orchestrator of the built-in providers.
    pub fn builtin(resources: Arc<dyn CoreResourcesI>) -> Self {
        Self::new(resources, providers::builtin())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.collectors.iter().map(Collector::key).collect()
    }

    /// Run the collectors with the given keys, or all of them if `keys` is empty, then shut
    /// down. Unknown keys fail before anything is collected.
    pub async fn collect(&self, keys: &HashSet<String>) -> Result<CollectionReport, Error> {
        let selected = self.select(keys)?;
        log::info!(
            "Starting collection of {}",
            selected.iter().map(|collector| collector.key()).join(", ")
        );

        let resources = &*self.resources;
        let results = join_all(selected.iter().map(|collector| async move {
            (collector.key(), collector.collect(resources).await)
        }))
        .await;

        let mut report = CollectionReport::default();
        for (key, result) in results {
            match result {
                Ok(summary) => report.summaries.push(summary),
                Err(err) => {
                    log::error!("Collector {key} failed: {err}");
                    self.resources.ledger().record(COLLECTOR_SCOPE, key, &err);
                    report.failed_collectors.push(key.to_string());
                }
            }
        }

        report.failures = self.shutdown()?;
        Ok(report)
    }

    fn select(&self, keys: &HashSet<String>) -> Result<Vec<&Collector>, Error> {
        let known: HashSet<&str> = self.collectors.iter().map(Collector::key).collect();
        let unknown: Vec<&str> = keys
            .iter()
            .map(String::as_str)
            .filter(|key| !known.contains(key))
            .sorted_unstable()
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Config {
                explanation: format!(
                    "Unknown providers: {}. Known providers: {}",
                    unknown.join(", "),
                    self.keys().join(", ")
                ),
            });
        }
        Ok(self
            .collectors
            .iter()
            .filter(|collector| keys.is_empty() || keys.contains(collector.key()))
            .collect())
    }

    /// Cancel outstanding requests, flush the database and report the failure ledger.
    pub fn shutdown(&self) -> Result<Vec<Failure>, Error> {
        self.resources.fetcher().cancel_all_requests()?;
        if let Err(err) = self.resources.connection_pool().checkpoint() {
            log::warn!("Failed to checkpoint database: {err}");
        }
        self.resources.ledger().report()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::{
        collectors::{CollectorSpec, ProviderInfo, RemoteListSpec},
        db::TmpDb,
        resources::tests::test_resources,
    };

    fn remote_list(server: &MockServer, key: &str, list_path: &str) -> Collector {
        Collector::new(
            ProviderInfo::new(key, key, ""),
            CollectorSpec::RemoteList(RemoteListSpec::new(
                &format!("{}{list_path}", server.uri()),
                "hosted",
            )),
        )
    }

    async fn orchestrator(db: &TmpDb, server: &MockServer) -> Result<Orchestrator> {
        Mock::given(method("GET"))
            .and(path("/good.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Good",
                "tokens": [{
                    "address": "0x95b303987a60c71504d99aa1b13b4da07b0790ab",
                    "chainId": 1,
                    "name": "Good",
                    "symbol": "GOOD",
                    "decimals": 18,
                }],
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(server)
            .await;
        let resources = Arc::new(test_resources(db, Default::default())?);
        Ok(Orchestrator::new(
            resources,
            vec![
                remote_list(server, "good", "/good.json"),
                remote_list(server, "bad", "/bad.json"),
            ],
        ))
    }

    #[tokio::test]
    async fn failing_collector_is_isolated() -> Result<()> {
        let server = MockServer::start().await;
        let db = TmpDb::new()?;
        let orchestrator = orchestrator(&db, &server).await?;

        let report = orchestrator.collect(&HashSet::new()).await?;
        assert!(!report.is_success());
        assert_eq!(report.failed_collectors, vec!["bad".to_string()]);
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.summaries[0].stored, 1);
        assert!(report
            .failures
            .iter()
            .any(|failure| failure.scope == COLLECTOR_SCOPE && failure.target == "bad"));
        assert_eq!(db.table_counts()?["token"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn selects_by_key() -> Result<()> {
        let server = MockServer::start().await;
        let db = TmpDb::new()?;
        let orchestrator = orchestrator(&db, &server).await?;

        let keys = HashSet::from(["good".to_string()]);
        let report = orchestrator.collect(&keys).await?;
        assert!(report.is_success());
        assert_eq!(report.summaries.len(), 1);
        assert!(report.failures.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_key_collects_nothing() -> Result<()> {
        let server = MockServer::start().await;
        let db = TmpDb::new()?;
        let orchestrator = orchestrator(&db, &server).await?;

        let keys = HashSet::from(["good".to_string(), "nope".to_string()]);
        let result = orchestrator.collect(&keys).await;
        assert!(matches!(result, Err(Error::Config { .. })));
        assert_eq!(db.table_counts()?["provider"], 0);
        Ok(())
    }

    #[test]
    fn builtin_keys() -> Result<()> {
        let db = TmpDb::new()?;
        let resources = Arc::new(test_resources(&db, Default::default())?);
        let orchestrator = Orchestrator::builtin(resources);
        assert!(orchestrator.keys().contains(&providers::UNISWAP));
        Ok(())
    }
}
