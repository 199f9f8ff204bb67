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

//! Side-effect free descriptions of a single HTTP exchange.
//!
//! A [RequestInfo] captures everything needed to send one request and to
//! interpret its response. Building one never performs I/O, and the same
//! descriptor can be sent any number of times.

use crate::{Error, Result};
use http::header::{HeaderMap, HeaderName, HeaderValue};

/// A response received from the service.
///
/// The transport fully reads the body before handing the response to the
/// descriptor handlers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The HTTP reason phrase, may be empty.
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Appends a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(n, v);
        }
        self
    }

    pub fn with_body<V: Into<bytes::Bytes>>(mut self, body: V) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The response body as (lossy) text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Interprets the response for one kind of request.
///
/// Handlers are pure functions of the response and the context captured
/// when the descriptor was built.
pub trait ResponseHandler: std::fmt::Debug + Send + Sync {
    /// The result of a successful request.
    type Output;

    /// Parses a response with an accepted status code.
    fn on_success(&self, response: &RawResponse) -> Result<Self::Output>;

    /// Classifies a response with any other status code.
    fn on_error(&self, response: &RawResponse) -> Error;
}

/// Describes one HTTP exchange with the service.
#[derive(Clone, Debug)]
pub struct RequestInfo<H> {
    pub(crate) url: String,
    pub(crate) method: http::Method,
    pub(crate) headers: HeaderMap,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<bytes::Bytes>,
    pub(crate) success_codes: Vec<u16>,
    pub(crate) additional_retry_codes: Vec<u16>,
    pub(crate) handler: H,
}

impl<H> RequestInfo<H>
where
    H: ResponseHandler,
{
    pub(crate) fn new<U: Into<String>>(url: U, method: http::Method, handler: H) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            success_codes: vec![200],
            additional_retry_codes: Vec::new(),
            handler,
        }
    }

    pub(crate) fn with_header(mut self, name: &'static str, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value).map_err(|e| {
            Error::invalid_argument(format!("invalid value for header `{name}`")).with_source(e)
        })?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub(crate) fn with_query<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query.push((key.into(), value.into()));
        self
    }

    pub(crate) fn with_body<V: Into<bytes::Bytes>>(mut self, body: V) -> Self {
        self.body = Some(body.into());
        self
    }

    pub(crate) fn with_success_codes<I: IntoIterator<Item = u16>>(mut self, codes: I) -> Self {
        self.success_codes = codes.into_iter().collect();
        self
    }

    /// The target URL, without query parameters.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &http::Method {
        &self.method
    }

    /// The descriptor-specific headers.
    ///
    /// The client adds authentication and version headers when the request
    /// is sent.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&bytes::Bytes> {
        self.body.as_ref()
    }

    /// The status codes handled by [ResponseHandler::on_success].
    pub fn success_codes(&self) -> &[u16] {
        &self.success_codes
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns true if `status` is a failure that should be retried.
    pub(crate) fn is_retryable(&self, status: u16) -> bool {
        !self.success_codes.contains(&status)
            && crate::retry_policy::is_retryable_status(status, &self.additional_retry_codes)
    }

    /// Turns a response into the descriptor's result.
    pub fn handle(&self, response: &RawResponse) -> Result<H::Output> {
        if self.success_codes.contains(&response.status) {
            return self.handler.on_success(response);
        }
        Err(self.handler.on_error(response))
    }
}
