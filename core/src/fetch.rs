// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::future::{AbortHandle, Abortable};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use url::Url;

use crate::{
    config,
    failure_ledger::FailureLedger,
    http_client::{HttpClient, HttpResponse},
    retry::{retry_if_retriable, with_retry, RetryPolicy},
    Error,
};

const IPFS_SCHEME_PREFIX: &str = "ipfs://";
const FETCH_SCOPE: &str = "fetch";

/// HTTP(S) and IPFS fetcher shared by all collectors.
///
/// Requests are limited per host, time out after `config::FETCH_TIMEOUT` and can be aborted
/// with `cancel_all_requests`. Every failure is recorded in the failure ledger.
pub struct Fetcher {
    client: HttpClient,
    gateways: Vec<Url>,
    gateway_counter: AtomicUsize,
    host_limits: Mutex<HashMap<String, Arc<Semaphore>>>,
    in_flight: Mutex<HashMap<u64, AbortHandle>>,
    next_request_id: AtomicU64,
    ledger: Arc<FailureLedger>,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: HttpClient, gateways: Vec<Url>, ledger: Arc<FailureLedger>) -> Self {
        Self {
            client,
            gateways,
            gateway_counter: AtomicUsize::new(0),
            host_limits: Default::default(),
            in_flight: Default::default(),
            next_request_id: AtomicU64::new(0),
            ledger,
            timeout: config::FETCH_TIMEOUT,
            retry_policy: RetryPolicy::fetch(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Map an `http(s)` or `ipfs` uri to the url to request. IPFS uris are served by the
    /// configured gateways in round robin order.
    pub fn resolve_uri(&self, uri: &str) -> Result<Url, Error> {
        let uri = uri.trim();
        if let Some(rest) = uri.strip_prefix(IPFS_SCHEME_PREFIX) {
            return self.ipfs_gateway_url(rest);
        }
        match Url::parse(uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
            _ => Err(Error::UnrecognizedProtocol { uri: uri.into() }),
        }
    }

    fn ipfs_gateway_url(&self, content_path: &str) -> Result<Url, Error> {
        if self.gateways.is_empty() {
            return Err(Error::Config {
                explanation: "No IPFS gateways configured".into(),
            });
        }
        // Some lists use the redundant `ipfs://ipfs/<cid>` form.
        let content_path = content_path
            .strip_prefix("ipfs/")
            .unwrap_or(content_path)
            .trim_start_matches('/');
        if content_path.is_empty() {
            return Err(Error::Malformed {
                error: "IPFS uri without content id".into(),
            });
        }
        let index = self.gateway_counter.fetch_add(1, Ordering::Relaxed) % self.gateways.len();
        let gateway = self.gateways[index].as_str().trim_end_matches('/');
        let url = Url::parse(&format!("{gateway}/ipfs/{content_path}"))?;
        Ok(url)
    }

    fn host_semaphore(&self, host: &str) -> Result<Arc<Semaphore>, Error> {
        let mut host_limits = self.host_limits.lock()?;
        let semaphore = host_limits
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(config::MAX_REQUESTS_PER_HOST)));
        Ok(semaphore.clone())
    }

    fn register(&self, abort_handle: AbortHandle) -> Result<u64, Error> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.in_flight.lock()?.insert(request_id, abort_handle);
        Ok(request_id)
    }

    fn unregister(&self, request_id: u64) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&request_id);
        }
    }

    /// Number of registered requests, including the ones waiting for a host permit.
    pub fn in_flight_count(&self) -> Result<usize, Error> {
        Ok(self.in_flight.lock()?.len())
    }

    /// Abort every outstanding request. Returns the number of aborted requests.
    pub fn cancel_all_requests(&self) -> Result<usize, Error> {
        let mut in_flight = self.in_flight.lock()?;
        let count = in_flight.len();
        for (_, abort_handle) in in_flight.drain() {
            abort_handle.abort();
        }
        if count > 0 {
            log::info!("Cancelled {count} outstanding requests");
        }
        Ok(count)
    }

    async fn fetch_once(&self, url: Url) -> Result<HttpResponse, Error> {
        let host = url.host_str().unwrap_or_default().to_string();
        let semaphore = self.host_semaphore(&host)?;
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let request_id = self.register(abort_handle)?;

        let timeout = self.timeout;
        let request = async {
            let _permit = semaphore.acquire().await.map_err(|_| Error::Fatal {
                error: "Host semaphore closed".into(),
            })?;
            match tokio::time::timeout(timeout, self.client.get(url.clone())).await {
                Ok(response) => response.map_err(Error::from),
                Err(_) => Err(Error::Retriable {
                    error: format!("Request to {host} timed out after {timeout:?}"),
                }),
            }
        };
        let result = Abortable::new(request, abort_registration).await;
        self.unregister(request_id);

        match result {
            Ok(response) => response,
            Err(_aborted) => Err(Error::Cancelled {
                uri: url.to_string(),
            }),
        }
    }

    /// Fetch the uri, retrying transient failures. Failures are recorded in the ledger.
    pub async fn fetch(&self, uri: &str) -> Result<HttpResponse, Error> {
        let result = with_retry(
            &self.retry_policy,
            // Resolve on each attempt so that IPFS retries go to the next gateway.
            |_| {
                let url = self.resolve_uri(uri);
                async move { self.fetch_once(url?).await }
            },
            retry_if_retriable,
        )
        .await;
        if let Err(err) = &result {
            self.ledger.record(FETCH_SCOPE, uri, err);
        }
        result
    }

    pub async fn fetch_bytes(&self, uri: &str) -> Result<Vec<u8>, Error> {
        Ok(self.fetch(uri).await?.body)
    }

    /// Fetch and deserialize a JSON document. Invalid JSON is recorded in the ledger.
    pub async fn fetch_json<T: DeserializeOwned>(&self, uri: &str) -> Result<T, Error> {
        let body = self.fetch_bytes(uri).await?;
        serde_json::from_slice(&body).map_err(|err| {
            let err: Error = err.into();
            self.ledger.record(FETCH_SCOPE, uri, &err);
            err
        })
    }
}

impl Debug for Fetcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("gateways", &self.gateways)
            .field("timeout", &self.timeout)
            .finish()
    }
}
