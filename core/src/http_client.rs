// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Debug;

use http_cache_reqwest::{CACacheManager, Cache, CacheMode, HttpCache};
use reqwest::{header::CONTENT_TYPE, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use url::Url;

use crate::{config, Error};

/// A successful response with the body read into memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ClientWithMiddleware,
}

impl HttpClient {
    /// Responses are cached on disk in `cache_dir` if it's set.
    pub fn new(cache_dir: Option<String>) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(config::USER_AGENT)
            .build()
            .map_err(|err| Error::Fatal {
                error: format!("Failed to build HTTP client: {err}"),
            })?;
        let builder = ClientBuilder::new(client);
        let client = match cache_dir {
            Some(path) => builder
                .with(Cache(HttpCache {
                    mode: CacheMode::Default,
                    manager: CACacheManager { path },
                    options: None,
                }))
                .build(),
            None => builder.build(),
        };
        Ok(Self { client })
    }

    /// GET the url. Non-2xx statuses are errors.
    pub async fn get(&self, url: Url) -> Result<HttpResponse, HttpClientError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpClientError::Status {
                uri: url.to_string(),
                status: status.as_u16(),
            });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response.bytes().await?;
        Ok(HttpResponse {
            status: status.as_u16(),
            content_type,
            body: body.into(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    // Intentionally opaque as request URL may contain api keys.
    #[error("Request error.")]
    Request { error: reqwest::Error },
    #[error("Middleware error: {error}")]
    Middleware { error: String },
    #[error("HTTP status {status}")]
    Status { uri: String, status: u16 },
}

impl From<reqwest_middleware::Error> for HttpClientError {
    fn from(error: reqwest_middleware::Error) -> Self {
        match error {
            reqwest_middleware::Error::Reqwest(err) => err.into(),
            reqwest_middleware::Error::Middleware(error) => HttpClientError::Middleware {
                error: error.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for HttpClientError {
    fn from(error: reqwest::Error) -> Self {
        HttpClientError::Request { error }
    }
}

impl From<HttpClientError> for Error {
    fn from(error: HttpClientError) -> Self {
        match error {
            HttpClientError::Request { error } => {
                let kind = if error.is_timeout() {
                    "timeout"
                } else if error.is_connect() {
                    "connection"
                } else {
                    "request"
                };
                Error::Retriable {
                    error: format!("HTTP {kind} error"),
                }
            }
            HttpClientError::Middleware { error } => Error::Retriable { error },
            HttpClientError::Status { uri, status } => Error::HttpStatus { uri, status },
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn sends_user_agent() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list.json"))
            .and(header("user-agent", config::USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string("{}"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(None)?;
        let url = Url::parse(&format!("{}/list.json", server.uri()))?;
        let response = client.get(url).await?;
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(response.body, b"{}");
        Ok(())
    }

    #[tokio::test]
    async fn non_success_status_is_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(None)?;
        let url = Url::parse(&format!("{}/missing", server.uri()))?;
        let err: Error = client
            .get(url)
            .await
            .expect_err("404 is an error")
            .into();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
        assert!(!err.is_retriable());
        Ok(())
    }
}
