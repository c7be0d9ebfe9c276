// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::r2d2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The operation resulted in an error, but it can be retried. Network and RPC failures.
    #[error("Retriable Error: '{error}'")]
    Retriable { error: String },
    /// A runtime invariant violation.
    #[error("Fatal Error: '{error}'")]
    Fatal { error: String },
    /// Invalid configuration or command line input.
    #[error("Config Error: {explanation}")]
    Config { explanation: String },
    /// Only http(s) and ipfs uris can be fetched.
    #[error("Unrecognized protocol for uri '{uri}'")]
    UnrecognizedProtocol { uri: String },
    /// Upstream data is missing a required field or isn't in the expected format.
    #[error("Malformed upstream data: '{error}'")]
    Malformed { error: String },
    /// Token metadata couldn't be read from the chain with either ABI.
    #[error("Token unreadable: '{address}' on chain {chain_id}")]
    TokenUnreadable { chain_id: u64, address: String },
    /// Attempt to update a row of an append-only table.
    #[error("Immutable row: '{error}'")]
    Immutable { error: String },
    /// The server answered with a non-2xx status.
    #[error("HTTP status {status} for '{uri}'")]
    HttpStatus { uri: String, status: u16 },
    /// The request was aborted by `Fetcher::cancel_all_requests`.
    #[error("Request cancelled: '{uri}'")]
    Cancelled { uri: String },
}

impl Error {
    /// Whether retrying the same operation may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Retriable { .. } => true,
            Error::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<r2d2::PoolError> for Error {
    fn from(err: r2d2::PoolError) -> Self {
        Error::Fatal {
            error: err.to_string(),
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        const SQLITE_BUSY_MESSAGE: &str = "database is locked";
        // Raised by the immutability triggers in the migrations.
        const IMMUTABLE_SUFFIX: &str = "is immutable";

        match err {
            diesel::result::Error::DatabaseError(kind, info) => {
                if info.message() == SQLITE_BUSY_MESSAGE {
                    Error::Retriable {
                        error: "Failed to acquire DB lock in busy_timeout.".to_string(),
                    }
                } else if info.message().ends_with(IMMUTABLE_SUFFIX) {
                    Error::Immutable {
                        error: info.message().to_string(),
                    }
                } else {
                    Error::Fatal {
                        error: format!(
                            "Unexpected Diesel database error kind: '{:?}' message: '{}'",
                            kind,
                            info.message()
                        ),
                    }
                }
            }
            _ => Error::Fatal {
                error: err.to_string(),
            },
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Fatal {
            error: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Fatal {
            error: err.to_string(),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Malformed {
            // Error is opaque, ok to log.
            error: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::Config {
            explanation: format!("Failed to parse int due to error: {err}"),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(err: std::num::TryFromIntError) -> Self {
        Error::Fatal {
            error: err.to_string(),
        }
    }
}

impl From<strum::ParseError> for Error {
    fn from(err: strum::ParseError) -> Self {
        Error::Config {
            explanation: format!("Unknown variant: {err}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Malformed {
            error: err.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Retriable {
            error: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Retriable {
            error: err.to_string(),
        }
    }
}

impl From<ethers::providers::ProviderError> for Error {
    fn from(err: ethers::providers::ProviderError) -> Self {
        (&err).into()
    }
}

impl From<&ethers::providers::ProviderError> for Error {
    fn from(err: &ethers::providers::ProviderError) -> Self {
        use ethers::providers::ProviderError;
        match err {
            ProviderError::JsonRpcClientError(error) => Self::Retriable {
                error: error
                    .as_error_response()
                    .map(|e| format!("JSON-RPC error {}: {}", e.code, e.message))
                    .unwrap_or_else(|| error.to_string()),
            },
            err => Self::Retriable {
                error: err.to_string(),
            },
        }
    }
}
