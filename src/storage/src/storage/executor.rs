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

//! Sends request descriptors through the transport.
//!
//! The executor adds the headers common to all requests, and implements the
//! retry loop for single-shot requests. Resumable upload chunks are sent
//! exactly once, see [Executor::execute_once].

use super::request_info::{RawResponse, RequestInfo, ResponseHandler};
use crate::backoff_policy::BackoffPolicy;
use google_cloud_gax::retry_state::RetryState;
use crate::retry_policy::RetryPolicy;
use crate::transport::{HttpRequest, HttpTransport};
use crate::{Error, Result};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const APP_ID_HEADER: HeaderName = HeaderName::from_static("x-firebase-gmpid");
const APP_CHECK_HEADER: HeaderName = HeaderName::from_static("x-firebase-appcheck");
const VERSION_HEADER: HeaderName = HeaderName::from_static("x-firebase-storage-version");

/// Development workstations authenticate the emulator proxy with cookies.
const CREDENTIALED_HOST_SUFFIX: &str = ".cloudworkstations.dev";

/// The values used to build the headers common to all requests.
#[derive(Clone, Default)]
pub(crate) struct HeaderConfig {
    pub app_id: Option<String>,
    pub auth_token: Option<String>,
    pub app_check_token: Option<String>,
    pub version: Option<String>,
}

impl std::fmt::Debug for HeaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const REDACTED: &str = "[censored]";
        f.debug_struct("HeaderConfig")
            .field("app_id", &self.app_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| REDACTED))
            .field(
                "app_check_token",
                &self.app_check_token.as_ref().map(|_| REDACTED),
            )
            .field("version", &self.version)
            .finish()
    }
}

impl HeaderConfig {
    pub fn to_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(app_id) = &self.app_id {
            headers.insert(APP_ID_HEADER, header_value("app id", app_id)?);
        }
        if let Some(token) = &self.auth_token {
            let mut value = header_value("auth token", &format!("Firebase {token}"))?;
            value.set_sensitive(true);
            headers.insert(http::header::AUTHORIZATION, value);
        }
        if let Some(token) = &self.app_check_token {
            let mut value = header_value("app check token", token)?;
            value.set_sensitive(true);
            headers.insert(APP_CHECK_HEADER, value);
        }
        let version = self.version.as_deref().unwrap_or("AppManager");
        headers.insert(
            VERSION_HEADER,
            header_value("version", &format!("webjs/{version}"))?,
        );
        Ok(headers)
    }
}

fn header_value(what: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        Error::invalid_argument(format!("the {what} is not a valid header value")).with_source(e)
    })
}

/// Returns true if requests to `host` should include credentials.
pub(crate) fn is_credentialed_host(host: &str) -> bool {
    let host = host.split(':').next().unwrap_or(host);
    host.ends_with(CREDENTIALED_HOST_SUFFIX)
}

#[derive(Clone)]
pub(crate) struct Executor {
    transport: Arc<dyn HttpTransport>,
    headers: HeaderMap,
    include_credentials: bool,
    retry_policy: RetryPolicy,
    backoff: Arc<dyn BackoffPolicy>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("transport", &self.transport)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("include_credentials", &self.include_credentials)
            .field("retry_policy", &self.retry_policy)
            .field("backoff", &self.backoff)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Executor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        headers: &HeaderConfig,
        include_credentials: bool,
        retry_policy: RetryPolicy,
        backoff: Arc<dyn BackoffPolicy>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        Ok(Self {
            transport,
            headers: headers.to_headers()?,
            include_credentials,
            retry_policy,
            backoff,
            timeout,
        })
    }

    /// Sends a single-shot request, retrying transient failures.
    ///
    /// Retries responses with retryable status codes and requests that fail
    /// without a response. Gives up when the retry policy is exhausted,
    /// returning a [retry limit exceeded][crate::error::ErrorCode::RetryLimitExceeded]
    /// error with the last failure as its source.
    pub async fn execute<H>(
        &self,
        info: &RequestInfo<H>,
        cancel: &CancellationToken,
    ) -> Result<H::Output>
    where
        H: ResponseHandler,
    {
        let loop_start = Instant::now();
        let mut attempt_count = 0;
        loop {
            attempt_count += 1;
            let error = match self.attempt(info, cancel).await {
                Ok(response) if info.is_retryable(response.status) => {
                    info.handler.on_error(&response)
                }
                Ok(response) => return info.handle(&response),
                Err(e) if e.is_canceled() => return Err(e),
                Err(e) => e,
            };
            self.wait_for_retry(loop_start, attempt_count, error, cancel)
                .await?;
        }
    }

    /// Waits before the next attempt of a retry loop.
    ///
    /// Returns an error if the retry policy is exhausted or the operation is
    /// canceled while waiting.
    pub async fn wait_for_retry(
        &self,
        loop_start: Instant,
        attempt_count: u32,
        error: Error,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let state = RetryState::default()
            .set_start(loop_start)
            .set_attempt_count(attempt_count);
        let delay = self.backoff.on_failure(&state);
        if !self.retry_policy.allows(loop_start, attempt_count, delay) {
            return Err(Error::retry_limit_exceeded().with_source(error));
        }
        tracing::warn!(attempt_count, ?delay, "retrying after transient error: {error}");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::canceled()),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Sends a request exactly once.
    ///
    /// Requests that fail without a response return an error where
    /// [is_network()][Error::is_network] is true.
    pub async fn execute_once<H>(
        &self,
        info: &RequestInfo<H>,
        cancel: &CancellationToken,
    ) -> Result<H::Output>
    where
        H: ResponseHandler,
    {
        let response = self.attempt(info, cancel).await?;
        info.handle(&response)
    }

    async fn attempt<H>(
        &self,
        info: &RequestInfo<H>,
        cancel: &CancellationToken,
    ) -> Result<RawResponse>
    where
        H: ResponseHandler,
    {
        if cancel.is_cancelled() {
            return Err(Error::canceled());
        }
        let request = self.prepare(info);
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::canceled()),
            r = self.transport.send(request) => r.map_err(Error::network)?,
        };
        tracing::debug!(url = %info.url, status = response.status, "received response");
        Ok(response)
    }

    fn prepare<H>(&self, info: &RequestInfo<H>) -> HttpRequest
    where
        H: ResponseHandler,
    {
        let mut headers = info.headers.clone();
        headers.extend(self.headers.clone());
        HttpRequest {
            method: info.method.clone(),
            url: info.url.clone(),
            query: info.query.clone(),
            headers,
            body: info.body.clone(),
            include_credentials: self.include_credentials,
            timeout: self.timeout,
        }
    }
}
