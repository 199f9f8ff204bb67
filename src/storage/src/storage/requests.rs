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

//! Builders for the single-shot request descriptors.
//!
//! Each function returns a [RequestInfo] ready to send. None of them perform
//! any I/O. The `base_url` parameter is the service root, for example
//! `https://firebasestorage.googleapis.com/v0`.

use super::handlers::{
    DeleteHandler, DownloadHandler, DownloadUrlHandler, ListHandler, MetadataHandler,
};
use super::request_info::RequestInfo;
use crate::location::Location;
use crate::model::{ListOptions, SettableMetadata, UploadMetadata, UploadResource};
use crate::upload_source::UploadSource;
use crate::{Error, Result};

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub(crate) const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const MAX_RESULTS_LIMIT: u32 = 1000;

pub(crate) fn get_metadata(base_url: &str, location: &Location) -> Result<RequestInfo<MetadataHandler>> {
    let url = object_url(base_url, location)?;
    Ok(RequestInfo::new(
        url,
        http::Method::GET,
        MetadataHandler::new(location.clone()),
    ))
}

/// Changes the writable metadata fields.
///
/// Fields set to `None` are omitted from the request and left unchanged.
pub(crate) fn update_metadata(
    base_url: &str,
    location: &Location,
    metadata: &SettableMetadata,
) -> Result<RequestInfo<MetadataHandler>> {
    let url = object_url(base_url, location)?;
    let body = serde_json::to_vec(metadata)
        .map_err(|e| Error::invalid_argument("cannot serialize the metadata").with_source(e))?;
    RequestInfo::new(
        url,
        http::Method::PATCH,
        MetadataHandler::new(location.clone()),
    )
    .with_body(body)
    .with_header("content-type", JSON_CONTENT_TYPE)
}

pub(crate) fn delete_object(base_url: &str, location: &Location) -> Result<RequestInfo<DeleteHandler>> {
    let url = object_url(base_url, location)?;
    Ok(RequestInfo::new(
        url,
        http::Method::DELETE,
        DeleteHandler::new(location.clone()),
    )
    .with_success_codes([200, 204]))
}

/// Lists the objects and prefixes directly under `location`.
pub(crate) fn list(
    base_url: &str,
    location: &Location,
    options: &ListOptions,
) -> Result<RequestInfo<ListHandler>> {
    let prefix = if location.is_root() {
        String::new()
    } else {
        format!("{}/", location.path())
    };
    let url = format!("{base_url}{}", location.bucket_only_server_url());
    let mut info = RequestInfo::new(url, http::Method::GET, ListHandler::new(location.clone()))
        .with_query("prefix", prefix)
        .with_query("delimiter", "/");
    if let Some(token) = &options.page_token {
        info = info.with_query("pageToken", token.as_str());
    }
    if let Some(max) = options.max_results {
        if !(1..=MAX_RESULTS_LIMIT).contains(&max) {
            return Err(Error::invalid_argument(format!(
                "max_results must be between 1 and {MAX_RESULTS_LIMIT}, got {max}"
            )));
        }
        info = info.with_query("maxResults", max.to_string());
    }
    Ok(info)
}

/// Downloads the object contents.
///
/// With `max_download_bytes` the request asks for a prefix of the object, and
/// the result is truncated to that size.
pub(crate) fn get_bytes(
    base_url: &str,
    location: &Location,
    max_download_bytes: Option<u64>,
) -> Result<RequestInfo<DownloadHandler>> {
    let url = object_url(base_url, location)?;
    let info = RequestInfo::new(
        url,
        http::Method::GET,
        DownloadHandler::new(location.clone(), max_download_bytes),
    )
    .with_query("alt", "media")
    .with_success_codes([200, 206]);
    match max_download_bytes {
        None => Ok(info),
        Some(max) => info.with_header("range", &format!("bytes=0-{max}")),
    }
}

pub(crate) fn get_download_url(
    base_url: &str,
    location: &Location,
) -> Result<RequestInfo<DownloadUrlHandler>> {
    let url = object_url(base_url, location)?;
    Ok(RequestInfo::new(
        url,
        http::Method::GET,
        DownloadUrlHandler::new(location.clone(), base_url),
    ))
}

/// Uploads an object in a single `multipart/related` request.
pub(crate) fn multipart_upload(
    base_url: &str,
    location: &Location,
    blob: &dyn UploadSource,
    metadata: &UploadMetadata,
) -> Result<RequestInfo<MetadataHandler>> {
    check_object(location)?;
    let metadata = metadata_for_upload(blob, metadata);
    let resource = serde_json::to_vec(&UploadResource {
        name: location.path(),
        metadata: &metadata,
    })
    .map_err(|e| Error::invalid_argument("cannot serialize the metadata").with_source(e))?;
    let data = blob
        .slice(0, blob.size())
        .ok_or_else(Error::cannot_slice_blob)?;
    let content_type = metadata
        .settable
        .content_type
        .as_deref()
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let boundary = loop {
        let candidate = generate_boundary();
        if !contains(&resource, candidate.as_bytes()) && !contains(&data, candidate.as_bytes()) {
            break candidate;
        }
    };
    let body = multipart_body(&boundary, &resource, content_type, &data);

    let url = format!("{base_url}{}", location.bucket_only_server_url());
    RequestInfo::new(
        url,
        http::Method::POST,
        MetadataHandler::for_upload(location.clone()),
    )
    .with_query("name", location.path())
    .with_body(body)
    .with_header("x-goog-upload-protocol", "multipart")?
    .with_header(
        "content-type",
        &format!("multipart/related; boundary={boundary}"),
    )
}

/// Returns the metadata sent when creating an object.
///
/// The content type defaults to the type reported by the upload source, and
/// then to `application/octet-stream`.
pub(crate) fn metadata_for_upload(blob: &dyn UploadSource, metadata: &UploadMetadata) -> UploadMetadata {
    let mut metadata = metadata.clone();
    if metadata.settable.content_type.is_none() {
        metadata.settable.content_type =
            Some(blob.content_type().unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()));
    }
    metadata
}

pub(crate) fn check_object(location: &Location) -> Result<()> {
    if location.is_root() {
        return Err(Error::invalid_argument(format!(
            "the operation requires an object, `{location}` refers to the bucket root"
        )));
    }
    Ok(())
}

fn object_url(base_url: &str, location: &Location) -> Result<String> {
    check_object(location)?;
    Ok(format!("{base_url}{}", location.full_server_url()))
}

fn generate_boundary() -> String {
    format!("{}{}", rand::random::<u64>(), rand::random::<u64>())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn multipart_body(boundary: &str, resource: &[u8], content_type: &str, data: &[u8]) -> bytes::Bytes {
    let delimiter = format!("--{boundary}");
    let mut body = bytes::BytesMut::with_capacity(resource.len() + data.len() + 256);
    body.extend_from_slice(delimiter.as_bytes());
    body.extend_from_slice(format!("\r\nContent-Type: {JSON_CONTENT_TYPE}\r\n\r\n").as_bytes());
    body.extend_from_slice(resource);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(delimiter.as_bytes());
    body.extend_from_slice(format!("\r\nContent-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(delimiter.as_bytes());
    body.extend_from_slice(b"--");
    body.freeze()
}
