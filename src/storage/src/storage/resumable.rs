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

//! The resumable upload protocol.
//!
//! A resumable upload starts a session, then sends the data in one or more
//! chunks. Each chunk is sent once. After a failure the client queries the
//! session to learn how many bytes the service received, and resumes from
//! that point.

use super::handlers::{ChunkUploadHandler, StartUploadHandler, UploadStatusHandler};
use super::request_info::RequestInfo;
use super::requests::{JSON_CONTENT_TYPE, check_object, metadata_for_upload};
use crate::location::Location;
use crate::model::{ResumableUploadStatus, UploadMetadata, UploadResource};
use crate::upload_source::UploadSource;
use crate::{Error, Result};

/// The alignment unit for resumable upload chunks.
///
/// All chunks, except the last, must be a multiple of this size.
pub const RESUMABLE_UPLOAD_QUANTUM: u64 = 256 * 1024;

/// The default chunk size for resumable uploads.
pub const DEFAULT_CHUNK_SIZE: u64 = RESUMABLE_UPLOAD_QUANTUM;

const UPLOAD_PROTOCOL: &str = "x-goog-upload-protocol";
const UPLOAD_COMMAND: &str = "x-goog-upload-command";
const UPLOAD_OFFSET: &str = "x-goog-upload-offset";
const UPLOAD_CONTENT_LENGTH: &str = "x-goog-upload-header-content-length";
const UPLOAD_CONTENT_TYPE: &str = "x-goog-upload-header-content-type";

/// Rounds a chunk size up to the alignment unit.
///
/// Zero means unbounded: the remaining data is sent in a single chunk.
pub(crate) fn aligned_chunk_size(chunk_size: u64) -> u64 {
    chunk_size
        .div_ceil(RESUMABLE_UPLOAD_QUANTUM)
        .checked_mul(RESUMABLE_UPLOAD_QUANTUM)
        .unwrap_or(u64::MAX / RESUMABLE_UPLOAD_QUANTUM * RESUMABLE_UPLOAD_QUANTUM)
}

/// The command sent with each chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadCommand {
    /// Send more data, the upload remains active.
    Upload,
    /// Send the last chunk of data and commit the object.
    UploadFinalize,
    /// Commit the object without sending more data.
    Finalize,
}

impl UploadCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::UploadFinalize => "upload, finalize",
            Self::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for UploadCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The next chunk to send, derived from the upload progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    offset: u64,
    bytes_to_send: u64,
    command: UploadCommand,
}

impl ChunkPlan {
    /// Plans the chunk following `status`.
    ///
    /// A `chunk_size` of zero means unbounded.
    pub fn new(status: &ResumableUploadStatus, chunk_size: u64) -> Self {
        let remaining = status.total() - status.current();
        let bytes_to_send = match chunk_size {
            0 => remaining,
            n => remaining.min(n),
        };
        let command = match bytes_to_send {
            0 => UploadCommand::Finalize,
            n if n == remaining => UploadCommand::UploadFinalize,
            _ => UploadCommand::Upload,
        };
        Self {
            offset: status.current(),
            bytes_to_send,
            command,
        }
    }

    /// The first byte in the chunk.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn bytes_to_send(&self) -> u64 {
        self.bytes_to_send
    }

    /// The end of the chunk, exclusive.
    pub fn end(&self) -> u64 {
        self.offset + self.bytes_to_send
    }

    pub fn command(&self) -> UploadCommand {
        self.command
    }
}

/// Creates the request to start a resumable upload session.
pub(crate) fn start_resumable_upload(
    base_url: &str,
    location: &Location,
    blob: &dyn UploadSource,
    metadata: &UploadMetadata,
) -> Result<RequestInfo<StartUploadHandler>> {
    check_object(location)?;
    let metadata = metadata_for_upload(blob, metadata);
    let body = serde_json::to_vec(&UploadResource {
        name: location.path(),
        metadata: &metadata,
    })
    .map_err(|e| Error::invalid_argument("cannot serialize the metadata").with_source(e))?;
    let content_type = metadata.settable.content_type.as_deref().unwrap_or_default();

    let url = format!("{base_url}{}", location.bucket_only_server_url());
    RequestInfo::new(
        url,
        http::Method::POST,
        StartUploadHandler::new(location.clone()),
    )
    .with_query("name", location.path())
    .with_body(body)
    .with_header(UPLOAD_PROTOCOL, "resumable")?
    .with_header(UPLOAD_COMMAND, "start")?
    .with_header(UPLOAD_CONTENT_LENGTH, &blob.size().to_string())?
    .with_header(UPLOAD_CONTENT_TYPE, content_type)?
    .with_header("content-type", JSON_CONTENT_TYPE)
}

/// Creates the request to query the progress of an upload session.
///
/// The request is idempotent.
pub(crate) fn get_resumable_upload_status(
    session_url: &str,
    location: &Location,
    blob: &dyn UploadSource,
) -> Result<RequestInfo<UploadStatusHandler>> {
    RequestInfo::new(
        session_url,
        http::Method::POST,
        UploadStatusHandler::new(location.clone(), blob.size()),
    )
    .with_header(UPLOAD_COMMAND, "query")
}

/// Creates the request to send the chunk following `status`.
pub(crate) fn continue_resumable_upload(
    session_url: &str,
    location: &Location,
    blob: &dyn UploadSource,
    chunk_size: u64,
    status: &ResumableUploadStatus,
) -> Result<RequestInfo<ChunkUploadHandler>> {
    if blob.size() != status.total() {
        return Err(Error::server_file_wrong_size(format!(
            "the upload source has {} bytes, the upload session expects {}",
            blob.size(),
            status.total()
        )));
    }
    let plan = ChunkPlan::new(status, chunk_size);
    let body = blob
        .slice(plan.offset(), plan.end())
        .ok_or_else(Error::cannot_slice_blob)?;
    RequestInfo::new(
        session_url,
        http::Method::POST,
        ChunkUploadHandler::new(
            location.clone(),
            plan.offset(),
            plan.bytes_to_send(),
            status.total(),
        ),
    )
    .with_body(body)
    .with_header(UPLOAD_COMMAND, plan.command().as_str())?
    .with_header(UPLOAD_OFFSET, &plan.offset().to_string())
}
