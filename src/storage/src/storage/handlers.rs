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

//! The response handlers for each kind of request.
//!
//! The set of handlers is closed. Each one is a small value type capturing
//! the context it needs to interpret a response, such as the location or the
//! upload progress when the request was built.

use super::request_info::{RawResponse, ResponseHandler};
use super::status::{Scope, translate};
use crate::location::{Location, encode};
use crate::model::{ListResult, ObjectMetadata, ResumableUploadStatus};
use crate::{Error, Result};

pub(crate) const UPLOAD_STATUS: &str = "x-goog-upload-status";
pub(crate) const UPLOAD_URL: &str = "x-goog-upload-url";
pub(crate) const UPLOAD_SIZE_RECEIVED: &str = "x-goog-upload-size-received";

/// Parses the object metadata in the response body.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataHandler {
    location: Location,
    scope: Scope,
}

impl MetadataHandler {
    pub(crate) fn new(location: Location) -> Self {
        Self {
            location,
            scope: Scope::Object,
        }
    }

    /// Metadata returned when an upload creates the object.
    ///
    /// The upload request targets the bucket, so a 404 does not mean the
    /// object is missing.
    pub(crate) fn for_upload(location: Location) -> Self {
        Self {
            location,
            scope: Scope::Bucket,
        }
    }
}

impl ResponseHandler for MetadataHandler {
    type Output = ObjectMetadata;

    fn on_success(&self, response: &RawResponse) -> Result<Self::Output> {
        ObjectMetadata::from_json(&response.body)
    }

    fn on_error(&self, response: &RawResponse) -> Error {
        translate(response, &self.location, self.scope)
    }
}

/// Parses one page of a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ListHandler {
    location: Location,
}

impl ListHandler {
    pub(crate) fn new(location: Location) -> Self {
        Self { location }
    }
}

impl ResponseHandler for ListHandler {
    type Output = ListResult;

    fn on_success(&self, response: &RawResponse) -> Result<Self::Output> {
        ListResult::from_json(self.location.bucket(), &response.body)
    }

    fn on_error(&self, response: &RawResponse) -> Error {
        translate(response, &self.location, Scope::Bucket)
    }
}

/// Returns the object contents, truncated to an optional limit.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadHandler {
    location: Location,
    max_download_bytes: Option<u64>,
}

impl DownloadHandler {
    pub(crate) fn new(location: Location, max_download_bytes: Option<u64>) -> Self {
        Self {
            location,
            max_download_bytes,
        }
    }
}

impl ResponseHandler for DownloadHandler {
    type Output = bytes::Bytes;

    fn on_success(&self, response: &RawResponse) -> Result<Self::Output> {
        let mut body = response.body.clone();
        if let Some(max) = self.max_download_bytes {
            // The service may ignore the range header and return the full
            // object.
            body.truncate(usize::try_from(max).unwrap_or(usize::MAX));
        }
        Ok(body)
    }

    fn on_error(&self, response: &RawResponse) -> Error {
        translate(response, &self.location, Scope::Object)
    }
}

/// Builds a download URL from the first download token in the metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadUrlHandler {
    location: Location,
    base_url: String,
}

impl DownloadUrlHandler {
    pub(crate) fn new<T: Into<String>>(location: Location, base_url: T) -> Self {
        Self {
            location,
            base_url: base_url.into(),
        }
    }
}

impl ResponseHandler for DownloadUrlHandler {
    type Output = String;

    fn on_success(&self, response: &RawResponse) -> Result<Self::Output> {
        let metadata = ObjectMetadata::from_json(&response.body)?;
        let token = metadata
            .download_tokens
            .iter()
            .find(|t| !t.is_empty())
            .ok_or_else(Error::no_download_url)?;
        let bucket = match metadata.bucket.as_str() {
            "" => self.location.bucket(),
            b => b,
        };
        let path = match metadata.full_path.as_str() {
            "" => self.location.path(),
            p => p,
        };
        Ok(format!(
            "{}/b/{}/o/{}?alt=media&token={}",
            self.base_url,
            encode(bucket),
            encode(path),
            encode(token)
        ))
    }

    fn on_error(&self, response: &RawResponse) -> Error {
        translate(response, &self.location, Scope::Object)
    }
}

/// Accepts any successful response, ignoring the body.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteHandler {
    location: Location,
}

impl DeleteHandler {
    pub(crate) fn new(location: Location) -> Self {
        Self { location }
    }
}

impl ResponseHandler for DeleteHandler {
    type Output = ();

    fn on_success(&self, _response: &RawResponse) -> Result<Self::Output> {
        Ok(())
    }

    fn on_error(&self, response: &RawResponse) -> Error {
        translate(response, &self.location, Scope::Object)
    }
}

/// Extracts the session URL from a response to the `start` command.
#[derive(Clone, Debug, PartialEq)]
pub struct StartUploadHandler {
    location: Location,
}

impl StartUploadHandler {
    pub(crate) fn new(location: Location) -> Self {
        Self { location }
    }
}

impl ResponseHandler for StartUploadHandler {
    type Output = String;

    fn on_success(&self, response: &RawResponse) -> Result<Self::Output> {
        check_upload_status(response, &["active"])?;
        response
            .header(UPLOAD_URL)
            .map(str::to_string)
            .ok_or_else(|| Error::unknown("missing upload session URL in response"))
    }

    fn on_error(&self, response: &RawResponse) -> Error {
        translate(response, &self.location, Scope::Bucket)
    }
}

/// Parses the response to the `query` command.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadStatusHandler {
    location: Location,
    total: u64,
}

impl UploadStatusHandler {
    pub(crate) fn new(location: Location, total: u64) -> Self {
        Self { location, total }
    }
}

impl ResponseHandler for UploadStatusHandler {
    type Output = ResumableUploadStatus;

    fn on_success(&self, response: &RawResponse) -> Result<Self::Output> {
        let status = check_upload_status(response, &["active", "final"])?;
        let received = response
            .header(UPLOAD_SIZE_RECEIVED)
            .ok_or_else(|| Error::unknown("missing upload size in response"))?;
        let current = received.trim().parse::<u64>().map_err(|e| {
            Error::unknown(format!("invalid upload size in response: {received}")).with_source(e)
        })?;
        if status == "final" {
            let metadata = ObjectMetadata::from_json(&response.body)?;
            return ResumableUploadStatus::committed(current, self.total, metadata);
        }
        ResumableUploadStatus::partial(current, self.total)
    }

    fn on_error(&self, response: &RawResponse) -> Error {
        translate(response, &self.location, Scope::Bucket)
    }
}

/// Parses the response to an `upload` command.
///
/// The service acknowledges the whole chunk or fails the request, so the new
/// progress is the old progress plus the chunk size.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkUploadHandler {
    location: Location,
    current: u64,
    bytes_to_send: u64,
    total: u64,
}

impl ChunkUploadHandler {
    pub(crate) fn new(location: Location, current: u64, bytes_to_send: u64, total: u64) -> Self {
        Self {
            location,
            current,
            bytes_to_send,
            total,
        }
    }
}

impl ResponseHandler for ChunkUploadHandler {
    type Output = ResumableUploadStatus;

    fn on_success(&self, response: &RawResponse) -> Result<Self::Output> {
        let status = check_upload_status(response, &["active", "final"])?;
        let current = self.current + self.bytes_to_send;
        if status == "final" {
            let metadata = ObjectMetadata::from_json(&response.body)?;
            return ResumableUploadStatus::committed(current, self.total, metadata);
        }
        ResumableUploadStatus::partial(current, self.total)
    }

    fn on_error(&self, response: &RawResponse) -> Error {
        translate(response, &self.location, Scope::Object)
    }
}

fn check_upload_status<'a>(response: &'a RawResponse, allowed: &[&str]) -> Result<&'a str> {
    match response.header(UPLOAD_STATUS) {
        Some(s) if allowed.contains(&s) => Ok(s),
        Some(s) => Err(Error::unknown(format!(
            "unexpected upload status `{s}`, expected one of {allowed:?}"
        ))),
        None => Err(Error::unknown("missing upload status in response")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn location() -> Location {
        Location::new("my-bucket", "a/b.txt")
    }

    fn metadata_body(tokens: &str) -> String {
        json!({
            "bucket": "my-bucket",
            "name": "a/b.txt",
            "size": "5",
            "downloadTokens": tokens,
        })
        .to_string()
    }

    #[test]
    fn metadata() -> anyhow::Result<()> {
        let handler = MetadataHandler::new(location());
        let response = RawResponse::new(200).with_body(metadata_body(""));
        let got = handler.on_success(&response)?;
        assert_eq!(got.full_path, "a/b.txt");
        assert_eq!(got.size, 5);

        let err = handler
            .on_success(&RawResponse::new(200).with_body("not json"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown, "{err:?}");
        Ok(())
    }

    #[test]
    fn metadata_scope() {
        let got = MetadataHandler::new(location()).on_error(&RawResponse::new(404));
        assert_eq!(got.code(), ErrorCode::ObjectNotFound);
        let got = MetadataHandler::for_upload(location()).on_error(&RawResponse::new(404));
        assert_eq!(got.code(), ErrorCode::Unknown);
    }

    #[test]
    fn list() -> anyhow::Result<()> {
        let handler = ListHandler::new(Location::new("my-bucket", "a"));
        let body = json!({
            "prefixes": ["a/b/"],
            "items": [{"name": "a/c.txt", "bucket": "my-bucket"}],
            "nextPageToken": "t1",
        });
        let got = handler.on_success(&RawResponse::new(200).with_body(body.to_string()))?;
        assert_eq!(got.prefixes, vec![Location::new("my-bucket", "a/b")]);
        assert_eq!(got.items, vec![Location::new("my-bucket", "a/c.txt")]);
        assert_eq!(got.next_page_token.as_deref(), Some("t1"));

        let got = handler.on_error(&RawResponse::new(404));
        assert_eq!(got.code(), ErrorCode::Unknown);
        Ok(())
    }

    #[test]
    fn download() -> anyhow::Result<()> {
        let response = RawResponse::new(200).with_body("hello world");
        let got = DownloadHandler::new(location(), None).on_success(&response)?;
        assert_eq!(got, bytes::Bytes::from_static(b"hello world"));
        let got = DownloadHandler::new(location(), Some(5)).on_success(&response)?;
        assert_eq!(got, bytes::Bytes::from_static(b"hello"));
        let got = DownloadHandler::new(location(), Some(100)).on_success(&response)?;
        assert_eq!(got.len(), 11);

        let got = DownloadHandler::new(location(), None).on_error(&RawResponse::new(416));
        assert_eq!(got.code(), ErrorCode::RangeNotSatisfiable);
        Ok(())
    }

    #[test]
    fn download_url() -> anyhow::Result<()> {
        let handler = DownloadUrlHandler::new(location(), "https://example.com/v0");
        let response = RawResponse::new(200).with_body(metadata_body("tok1,tok2"));
        let got = handler.on_success(&response)?;
        assert_eq!(
            got,
            "https://example.com/v0/b/my-bucket/o/a%2Fb.txt?alt=media&token=tok1"
        );

        let response = RawResponse::new(200).with_body(metadata_body(""));
        let err = handler.on_success(&response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoDownloadUrl, "{err:?}");
        Ok(())
    }

    #[test]
    fn delete() -> anyhow::Result<()> {
        let handler = DeleteHandler::new(location());
        handler.on_success(&RawResponse::new(204))?;
        let got = handler.on_error(&RawResponse::new(403));
        assert_eq!(got.code(), ErrorCode::Unauthorized);
        Ok(())
    }

    #[test]
    fn start_upload() -> anyhow::Result<()> {
        let handler = StartUploadHandler::new(location());
        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "active")
            .with_header(UPLOAD_URL, "https://example.com/session/1");
        assert_eq!(handler.on_success(&response)?, "https://example.com/session/1");

        let response = RawResponse::new(200).with_header(UPLOAD_STATUS, "active");
        let err = handler.on_success(&response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown, "{err:?}");

        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "final")
            .with_header(UPLOAD_URL, "https://example.com/session/1");
        let err = handler.on_success(&response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown, "{err:?}");
        Ok(())
    }

    #[test]
    fn upload_status_active() -> anyhow::Result<()> {
        let handler = UploadStatusHandler::new(location(), 1000);
        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "active")
            .with_header(UPLOAD_SIZE_RECEIVED, "300");
        let got = handler.on_success(&response)?;
        assert_eq!(got.current(), 300);
        assert_eq!(got.total(), 1000);
        assert!(!got.finalized());
        Ok(())
    }

    #[test]
    fn upload_status_final() -> anyhow::Result<()> {
        let handler = UploadStatusHandler::new(location(), 5);
        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "final")
            .with_header(UPLOAD_SIZE_RECEIVED, "5")
            .with_body(metadata_body(""));
        let got = handler.on_success(&response)?;
        assert!(got.finalized());
        assert_eq!(got.metadata().map(|m| m.size), Some(5));
        Ok(())
    }

    #[test]
    fn upload_status_errors() {
        let handler = UploadStatusHandler::new(location(), 100);
        let response = RawResponse::new(200).with_header(UPLOAD_STATUS, "active");
        let err = handler.on_success(&response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown, "{err:?}");

        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "active")
            .with_header(UPLOAD_SIZE_RECEIVED, "abc");
        let err = handler.on_success(&response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown, "{err:?}");

        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "cancelled")
            .with_header(UPLOAD_SIZE_RECEIVED, "10");
        let err = handler.on_success(&response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown, "{err:?}");

        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "active")
            .with_header(UPLOAD_SIZE_RECEIVED, "200");
        let err = handler.on_success(&response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerFileWrongSize, "{err:?}");
    }

    #[test]
    fn chunk_upload() -> anyhow::Result<()> {
        let handler = ChunkUploadHandler::new(location(), 256, 256, 1000);
        let response = RawResponse::new(200).with_header(UPLOAD_STATUS, "active");
        let got = handler.on_success(&response)?;
        assert_eq!(got.current(), 512);
        assert!(!got.finalized());

        let handler = ChunkUploadHandler::new(location(), 0, 5, 5);
        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "final")
            .with_body(metadata_body(""));
        let got = handler.on_success(&response)?;
        assert!(got.finalized());
        assert_eq!(got.current(), 5);
        Ok(())
    }

    #[test]
    fn chunk_upload_final_too_early() {
        let handler = ChunkUploadHandler::new(location(), 0, 256, 1000);
        let response = RawResponse::new(200)
            .with_header(UPLOAD_STATUS, "final")
            .with_body(metadata_body(""));
        let err = handler.on_success(&response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerFileWrongSize, "{err:?}");
    }

    #[test]
    fn chunk_upload_error() {
        let handler = ChunkUploadHandler::new(location(), 0, 256, 1000);
        let got = handler.on_error(&RawResponse::new(404).with_body("gone"));
        assert_eq!(got.code(), ErrorCode::ObjectNotFound);
        assert_eq!(got.server_response(), Some("gone"));
    }
}
