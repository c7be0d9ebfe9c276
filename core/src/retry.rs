// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{future::Future, time::Duration};

use crate::{config, Error};

/// Exponential backoff: the delay before attempt `n + 1` is `min(base * 2^(n-1), max)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy of the RPC failover: `RPC_MAX_RETRIES` rounds over every endpoint.
    pub fn rpc(endpoint_count: usize) -> Self {
        let endpoint_count = u32::try_from(endpoint_count.max(1)).unwrap_or(u32::MAX);
        Self {
            max_attempts: config::RPC_MAX_RETRIES.saturating_mul(endpoint_count),
            base_delay: config::RPC_BACKOFF_BASE,
            max_delay: config::RPC_BACKOFF_MAX,
        }
    }

    /// Policy for transient HTTP failures.
    pub fn fetch() -> Self {
        Self {
            max_attempts: config::FETCH_MAX_ATTEMPTS,
            base_delay: config::FETCH_RETRY_DELAY,
            max_delay: config::FETCH_RETRY_DELAY,
        }
    }

    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the failed attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Abort,
}

/// Run `op` until it succeeds, `on_failure` aborts, or the policy runs out of attempts.
/// `on_failure` is called after every failed attempt, including the last one, so callers can
/// update their state (eg. rotate endpoints) before the error is returned.
pub async fn with_retry<T, Op, Fut, OnFailure>(
    policy: &RetryPolicy,
    mut op: Op,
    mut on_failure: OnFailure,
) -> Result<T, Error>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
    OnFailure: FnMut(u32, &Error) -> RetryDecision,
{
    let mut attempt: u32 = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let decision = on_failure(attempt, &err);
                if decision == RetryDecision::Abort || attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Retry decision for operations that only distinguish transient errors.
pub fn retry_if_retriable(_attempt: u32, err: &Error) -> RetryDecision {
    if err.is_retriable() {
        RetryDecision::Retry
    } else {
        RetryDecision::Abort
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::Result;

    use super::*;

    #[test]
    fn rpc_backoff_schedule() {
        let policy = RetryPolicy::rpc(2);
        assert_eq!(policy.max_attempts, 6);
        let delays: Vec<u128> = (1..=5).map(|n| policy.delay(n).as_millis()).collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 10000, 10000]);
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::rpc(1);
        assert_eq!(policy.delay(u32::MAX), config::RPC_BACKOFF_MAX);
    }

    #[tokio::test]
    async fn retries_until_success() -> Result<()> {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            &RetryPolicy::immediate(5),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Error::Retriable {
                            error: "flaky".into(),
                        })
                    } else {
                        Ok(attempt)
                    }
                }
            },
            retry_if_retriable,
        )
        .await?;
        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let failures = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(
            &RetryPolicy::immediate(4),
            |_| async {
                Err(Error::Retriable {
                    error: "down".into(),
                })
            },
            |attempt, err| {
                failures.fetch_add(1, Ordering::SeqCst);
                retry_if_retriable(attempt, err)
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(failures.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn aborts_on_non_retriable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(
            &RetryPolicy::immediate(10),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Error::Malformed {
                        error: "bad".into(),
                    })
                }
            },
            retry_if_retriable,
        )
        .await;
        assert!(matches!(result, Err(Error::Malformed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
