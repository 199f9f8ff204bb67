// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The seam between the protocol engine and the network.
//!
//! The client sends every request through an [HttpTransport]. The default
//! implementation uses [reqwest]. Applications may provide their own, for
//! example to route requests through a proxy, or to record them in tests.

use crate::storage::request_info::RawResponse;
use http::header::HeaderMap;
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A fully prepared request, ready to send.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct HttpRequest {
    pub method: http::Method,
    /// The target URL, without query parameters.
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<bytes::Bytes>,
    /// Send cookies and other ambient credentials with the request.
    pub include_credentials: bool,
    /// The maximum time to wait for the response.
    pub timeout: Option<Duration>,
}

/// A request that did not produce an HTTP response.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("the request timed out")]
    Timeout(#[source] BoxError),
    #[error("cannot send the request or read the response")]
    Io(#[source] BoxError),
}

impl TransportError {
    pub fn timeout<T: Into<BoxError>>(source: T) -> Self {
        Self::Timeout(source.into())
    }

    pub fn io<T: Into<BoxError>>(source: T) -> Self {
        Self::Io(source.into())
    }
}

/// Sends one request and reads the complete response.
///
/// Implementations must not retry, and must return any response the service
/// sends, including error responses.
#[async_trait::async_trait]
pub trait HttpTransport: std::fmt::Debug + Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<RawResponse, TransportError>;
}

/// The default [HttpTransport].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    credentialed: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(TransportError::io)?;
        let credentialed = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(TransportError::io)?;
        Ok(Self {
            client,
            credentialed,
        })
    }

    fn map_send_error(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            return TransportError::timeout(e);
        }
        TransportError::io(e)
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        let client = if request.include_credentials {
            &self.credentialed
        } else {
            &self.client
        };
        let mut builder = client
            .request(request.method, &request.url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(Self::map_send_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(Self::map_send_error)?;
        Ok(RawResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
