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

//! Firebase Storage client for Rust
//!
//! This crate implements the protocol used by Firebase Storage clients:
//! object metadata, downloads, listing, deletes, multipart uploads, and
//! resumable uploads. Most applications will use the [Storage][client::Storage]
//! client.
//!
//! Every request is first described as a [RequestInfo][request::RequestInfo],
//! a plain value with the URL, headers, body, and a handler to interpret the
//! response. The client sends descriptors through an
//! [HttpTransport][transport::HttpTransport], retrying single-shot requests
//! that fail with transient errors.
//!
//! Resumable uploads send the data in chunks. Each chunk is sent once, and the
//! upload recovers from failures by querying the service for the number of
//! bytes it received, see [ResumableUpload][upload::ResumableUpload].
//!
//! **WARNING:** this crate is under active development. We expect multiple
//! breaking changes in the upcoming releases.

pub mod backoff_policy;
pub mod error;
pub mod location;
pub mod model;
pub mod upload_source;

pub use error::{Error, Result};

pub(crate) mod retry_policy;
mod storage;

/// Clients to interact with Firebase Storage.
pub mod client {
    pub use crate::storage::client::{ClientBuilder, Storage};
}

/// Request descriptors and response handlers.
pub mod request {
    pub use crate::storage::handlers::{
        ChunkUploadHandler, DeleteHandler, DownloadHandler, DownloadUrlHandler, ListHandler,
        MetadataHandler, StartUploadHandler, UploadStatusHandler,
    };
    pub use crate::storage::request_info::{RawResponse, RequestInfo, ResponseHandler};
}

/// The HTTP transport used by the client.
pub mod transport {
    pub use crate::storage::transport::{HttpRequest, HttpTransport, ReqwestTransport, TransportError};
}

/// Resumable uploads.
pub mod upload {
    pub use crate::storage::resumable::{
        ChunkPlan, DEFAULT_CHUNK_SIZE, RESUMABLE_UPLOAD_QUANTUM, UploadCommand,
    };
    pub use crate::storage::upload::{ResumableUpload, UploadState};
}
