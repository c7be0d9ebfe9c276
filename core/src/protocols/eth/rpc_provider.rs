// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    collections::{HashMap, HashSet},
    fmt::{Debug, Formatter},
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use ethers::{
    contract::{parse_log, ContractError, EthEvent, Multicall, MulticallError},
    core::types::{Address, Filter, H256},
    providers::{Http, Middleware, Provider, ProviderError, RpcError},
};
use url::Url;

use crate::{
    config,
    protocols::eth::{
        checksum_address::display_address,
        contracts::{ERC20Bytes32Contract, ERC20Contract, NewTokenRegisteredFilter},
        token::{ReadOptions, TokenMetadata},
        ChainId,
    },
    retry::{with_retry, RetryDecision, RetryPolicy},
    Error,
};

type HttpMulticallError = MulticallError<Provider<Http>>;

/// A bridge registration read from `NewTokenRegistered` logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRegistration {
    pub native_token: Address,
    pub bridged_token: Address,
    pub transaction_hash: H256,
}

#[derive(Clone, Debug)]
pub struct RpcProvider {
    pub(super) provider: Provider<Http>,
    pub(super) chain_id: ChainId,
    endpoint: Url,
}

impl RpcProvider {
    pub fn new(chain_id: ChainId, http_endpoint: Url) -> Self {
        let provider = Provider::new(Http::new(http_endpoint.clone()));
        Self {
            provider,
            chain_id,
            endpoint: http_endpoint,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Read name, symbol and decimals of an ERC-20 token in one Multicall3 aggregate call.
    ///
    /// Tokens that revert with the string ABI are retried with the legacy `bytes32` ABI unless
    /// `skip_bytes32` is set. Tokens that can't be read with either return
    /// `TokenMetadata::unreadable`, or `Error::TokenUnreadable` if `must_exist` is set.
    /// Transport failures are returned as `Error::Retriable` so that the failover can rotate
    /// endpoints.
    pub async fn read_token_metadata(
        &self,
        address: Address,
        options: ReadOptions,
    ) -> Result<TokenMetadata, Error> {
        let multicall_address: Address =
            config::MULTICALL3_ADDRESS
                .parse()
                .map_err(|_| Error::Fatal {
                    error: "Invalid Multicall3 address".into(),
                })?;

        match self.read_string_metadata(address, multicall_address).await {
            Ok(metadata) => return Ok(metadata),
            Err(err) if is_transport_error(&err) => return Err(transport_error(err)),
            Err(err) => log::debug!(
                "String metadata read failed for {} on chain {}: {}",
                display_address(&address),
                self.chain_id,
                err
            ),
        }

        if !options.skip_bytes32 {
            match self.read_bytes32_metadata(address, multicall_address).await {
                Ok(metadata) => return Ok(metadata),
                Err(err) if is_transport_error(&err) => {
                    return Err(transport_error(err))
                }
                Err(err) => log::debug!(
                    "Bytes32 metadata read failed for {} on chain {}: {}",
                    display_address(&address),
                    self.chain_id,
                    err
                ),
            }
        }

        if options.must_exist {
            Err(Error::TokenUnreadable {
                chain_id: self.chain_id.as_u64(),
                address: display_address(&address),
            })
        } else {
            Ok(TokenMetadata::unreadable())
        }
    }

    async fn read_string_metadata(
        &self,
        address: Address,
        multicall_address: Address,
    ) -> Result<TokenMetadata, HttpMulticallError> {
        let client = Arc::new(self.provider.clone());
        let contract = ERC20Contract::new(address, client.clone());
        let mut multicall = Multicall::new(client, Some(multicall_address)).await?;
        multicall
            .add_call(contract.name(), false)
            .add_call(contract.symbol(), false)
            .add_call(contract.decimals(), false);
        let (name, symbol, decimals): (String, String, u8) = multicall.call().await?;
        Ok(TokenMetadata::new(name, symbol, decimals))
    }

    async fn read_bytes32_metadata(
        &self,
        address: Address,
        multicall_address: Address,
    ) -> Result<TokenMetadata, HttpMulticallError> {
        let client = Arc::new(self.provider.clone());
        let contract = ERC20Bytes32Contract::new(address, client.clone());
        let mut multicall = Multicall::new(client, Some(multicall_address)).await?;
        multicall
            .add_call(contract.name(), false)
            .add_call(contract.symbol(), false)
            .add_call(contract.decimals(), false);
        let (name, symbol, decimals): (H256, H256, u8) = multicall.call().await?;
        Ok(TokenMetadata::from_bytes32(
            name.as_fixed_bytes(),
            symbol.as_fixed_bytes(),
            decimals,
        ))
    }

    pub async fn latest_block_number(&self) -> Result<u64, Error> {
        let block_number = self.provider.get_block_number().await?;
        Ok(block_number.as_u64())
    }

    /// `NewTokenRegistered` events emitted by `bridge` in the inclusive block range.
    pub async fn token_registrations(
        &self,
        bridge: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TokenRegistration>, Error> {
        let filter = Filter::new()
            .address(bridge)
            .topic0(NewTokenRegisteredFilter::signature())
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.provider.get_logs(&filter).await?;
        let mut registrations = Vec::with_capacity(logs.len());
        for log in logs {
            let transaction_hash = log.transaction_hash.unwrap_or_default();
            let event: NewTokenRegisteredFilter =
                parse_log(log).map_err(|err| Error::Malformed {
                    error: format!("Invalid NewTokenRegistered log: {err}"),
                })?;
            registrations.push(TokenRegistration {
                native_token: event.native_token,
                bridged_token: event.bridged_token,
                transaction_hash,
            });
        }
        Ok(registrations)
    }
}

/// Whether the error is a failure to reach a node, as opposed to the node rejecting the call.
fn is_transport_error(err: &HttpMulticallError) -> bool {
    match err {
        MulticallError::ContractError(ContractError::MiddlewareError { e })
        | MulticallError::ContractError(ContractError::ProviderError { e }) => {
            !is_node_rejection(e)
        }
        _ => false,
    }
}

fn is_node_rejection(err: &ProviderError) -> bool {
    // Code 3 is the standard execution reverted code, but many nodes use -32000 with a message.
    err.as_error_response()
        .map(|response| response.code == 3 || response.message.contains("revert"))
        .unwrap_or(false)
}

fn transport_error(err: HttpMulticallError) -> Error {
    match err {
        MulticallError::ContractError(ContractError::MiddlewareError { e })
        | MulticallError::ContractError(ContractError::ProviderError { e }) => e.into(),
        err => Error::Retriable {
            error: err.to_string(),
        },
    }
}

#[derive(Debug, Default)]
struct FailoverState {
    active: usize,
    unusable: HashSet<usize>,
}

/// Ordered RPC endpoints of a chain with failover. A failed endpoint is marked unusable and the
/// next untried one becomes active. Once every endpoint has failed, the marks are cleared and
/// rotation starts over from the first endpoint.
pub struct FailoverRpc {
    chain_id: ChainId,
    endpoints: Vec<Url>,
    policy: RetryPolicy,
    state: Mutex<FailoverState>,
}

impl FailoverRpc {
    pub fn new(
        chain_id: ChainId,
        endpoints: Vec<Url>,
        policy: RetryPolicy,
    ) -> Result<Self, Error> {
        if endpoints.is_empty() {
            return Err(Error::Config {
                explanation: format!(
                    "No RPC endpoints for chain {chain_id}. Set {}{chain_id}",
                    config::RPC_ENV_PREFIX
                ),
            });
        }
        Ok(Self {
            chain_id,
            endpoints,
            policy,
            state: Default::default(),
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn active_endpoint(&self) -> Result<Url, Error> {
        let state = self.state.lock()?;
        Ok(self.endpoints[state.active].clone())
    }

    /// The provider of the active endpoint and the index of that endpoint.
    fn active_provider(&self) -> Result<(usize, RpcProvider), Error> {
        let state = self.state.lock()?;
        let endpoint = self.endpoints[state.active].clone();
        Ok((state.active, RpcProvider::new(self.chain_id, endpoint)))
    }

    /// Mark the endpoint at `failed` unusable and move on. Concurrent callers that failed on an
    /// endpoint that was already rotated away from leave the state unchanged.
    fn rotate(&self, failed: usize, attempt: u32, err: &Error) -> Result<(), Error> {
        let mut state = self.state.lock()?;
        if failed != state.active {
            log::debug!(
                "RPC endpoint {} of chain {} already rotated away from (attempt {attempt})",
                host_for_log(&self.endpoints[failed]),
                self.chain_id
            );
            return Ok(());
        }
        state.unusable.insert(failed);
        let failed_host = host_for_log(&self.endpoints[failed]);

        if state.unusable.len() >= self.endpoints.len() {
            log::warn!(
                "All RPC endpoints of chain {} failed (attempt {attempt}), last error: {err}. \
                 Starting over from the first endpoint.",
                self.chain_id
            );
            state.unusable.clear();
            state.active = 0;
        } else {
            let len = self.endpoints.len();
            let next = (1..len)
                .map(|offset| (failed + offset) % len)
                .find(|index| !state.unusable.contains(index))
                .unwrap_or(0);
            log::warn!(
                "RPC endpoint {failed_host} of chain {} failed (attempt {attempt}) with error: \
                 {err}. Switching to {}",
                self.chain_id,
                host_for_log(&self.endpoints[next])
            );
            state.active = next;
        }
        Ok(())
    }

    /// Run `op` against the active endpoint, rotating endpoints on retriable errors with
    /// exponential backoff between attempts.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut(RpcProvider) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        // Endpoint of the latest attempt.
        let used = AtomicUsize::new(0);
        with_retry(
            &self.policy,
            |_| {
                let call = self.active_provider().map(|(index, provider)| {
                    used.store(index, Ordering::SeqCst);
                    op(provider)
                });
                async move { call?.await }
            },
            |attempt, err| {
                if !err.is_retriable() {
                    return RetryDecision::Abort;
                }
                match self.rotate(used.load(Ordering::SeqCst), attempt, err) {
                    Ok(()) => RetryDecision::Retry,
                    Err(rotate_err) => {
                        log::error!("Failed to rotate RPC endpoint: {rotate_err}");
                        RetryDecision::Abort
                    }
                }
            },
        )
        .await
    }

    pub async fn read_token_metadata(
        &self,
        address: Address,
        options: ReadOptions,
    ) -> Result<TokenMetadata, Error> {
        self.call(|provider| async move {
            provider.read_token_metadata(address, options).await
        })
        .await
    }

    pub async fn latest_block_number(&self) -> Result<u64, Error> {
        self.call(|provider| async move { provider.latest_block_number().await })
            .await
    }

    pub async fn token_registrations(
        &self,
        bridge: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TokenRegistration>, Error> {
        self.call(|provider| async move {
            provider
                .token_registrations(bridge, from_block, to_block)
                .await
        })
        .await
    }
}

impl Debug for FailoverRpc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Endpoint urls may contain api keys.
        let hosts: Vec<&str> = self.endpoints.iter().map(host_for_log).collect();
        f.debug_struct("FailoverRpc")
            .field("chain_id", &self.chain_id)
            .field("endpoints", &hosts)
            .finish()
    }
}

fn host_for_log(url: &Url) -> &str {
    url.host_str().unwrap_or("<no host>")
}

/// A trait to let us inject mock endpoints at test time.
pub trait RpcManagerI: Debug + Send + Sync {
    /// RPC endpoints of the chain in order of preference.
    fn endpoints(&self, chain_id: ChainId) -> Vec<Url>;

    /// The failover client of the chain. Rotation state is shared by all callers.
    fn failover(&self, chain_id: ChainId) -> Result<Arc<FailoverRpc>, Error>;
}

pub struct RpcManager {
    overrides: HashMap<ChainId, Vec<Url>>,
    backoff: bool,
    failovers: Mutex<HashMap<ChainId, Arc<FailoverRpc>>>,
}

impl RpcManager {
    /// Endpoints in `overrides` take precedence over the built-in defaults of a chain.
    pub fn new(overrides: HashMap<ChainId, Vec<Url>>) -> Self {
        Self {
            overrides,
            backoff: true,
            failovers: Default::default(),
        }
    }

    #[cfg(test)]
    pub fn without_backoff(overrides: HashMap<ChainId, Vec<Url>>) -> Self {
        Self {
            backoff: false,
            ..Self::new(overrides)
        }
    }

    fn policy(&self, endpoint_count: usize) -> RetryPolicy {
        let mut policy = RetryPolicy::rpc(endpoint_count);
        if !self.backoff {
            policy.base_delay = Default::default();
            policy.max_delay = Default::default();
        }
        policy
    }
}

impl Default for RpcManager {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl Debug for RpcManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let chains: Vec<&ChainId> = self.overrides.keys().collect();
        f.debug_struct("RpcManager")
            .field("overridden_chains", &chains)
            .finish()
    }
}

impl RpcManagerI for RpcManager {
    fn endpoints(&self, chain_id: ChainId) -> Vec<Url> {
        match self.overrides.get(&chain_id) {
            Some(endpoints) if !endpoints.is_empty() => endpoints.clone(),
            _ => chain_id.default_rpc_endpoints(),
        }
    }

    fn failover(&self, chain_id: ChainId) -> Result<Arc<FailoverRpc>, Error> {
        let mut failovers = self.failovers.lock()?;
        if let Some(failover) = failovers.get(&chain_id) {
            return Ok(failover.clone());
        }
        let endpoints = self.endpoints(chain_id);
        let policy = self.policy(endpoints.len());
        let failover = Arc::new(FailoverRpc::new(chain_id, endpoints, policy)?);
        failovers.insert(chain_id, failover.clone());
        Ok(failover)
    }
}

#[cfg(test)]
pub mod test_util {
    use ethers::abi::{encode, Token};
    use serde_json::json;

    /// JSON-RPC response body of a Multicall3 `aggregate3` call where every call succeeded.
    pub fn aggregate3_response(return_data: Vec<Vec<u8>>) -> serde_json::Value {
        let results = return_data
            .into_iter()
            .map(|data| Token::Tuple(vec![Token::Bool(true), Token::Bytes(data)]))
            .collect();
        let encoded = encode(&[Token::Array(results)]);
        json!({"jsonrpc": "2.0", "id": 1, "result": format!("0x{}", hex::encode(encoded))})
    }

    pub fn string_metadata(name: &str, symbol: &str, decimals: u8) -> serde_json::Value {
        aggregate3_response(vec![
            encode(&[Token::String(name.into())]),
            encode(&[Token::String(symbol.into())]),
            encode(&[Token::Uint(decimals.into())]),
        ])
    }

    pub fn bytes32_metadata(name: &[u8], symbol: &[u8], decimals: u8) -> serde_json::Value {
        let padded = |value: &[u8]| {
            let mut word = vec![0u8; 32];
            word[..value.len()].copy_from_slice(value);
            word
        };
        aggregate3_response(vec![
            encode(&[Token::FixedBytes(padded(name))]),
            encode(&[Token::FixedBytes(padded(symbol))]),
            encode(&[Token::Uint(decimals.into())]),
        ])
    }

    pub fn reverted() -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 3, "message": "execution reverted"}
        })
    }
}
