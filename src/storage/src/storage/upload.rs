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

//! The resumable upload state machine.

use super::client::StorageInner;
use super::resumable::{
    aligned_chunk_size, continue_resumable_upload, get_resumable_upload_status,
    start_resumable_upload,
};
use crate::error::ErrorCode;
use crate::location::Location;
use crate::model::{ObjectMetadata, ResumableUploadStatus, UploadMetadata};
use crate::retry_policy::is_retryable_status;
use crate::upload_source::UploadSource;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// The state of a [ResumableUpload].
///
/// ```norust
/// Idle -> SessionStarting -> Uploading -> Finalized
///               |               |  ^
///               v               v  | resync()
///             Failed <----------+--+
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    /// The upload has not started.
    Idle,
    /// Waiting for the service to create the upload session.
    SessionStarting,
    /// The session exists and more data (or the final commit) must be sent.
    Uploading,
    /// The service committed the object.
    Finalized,
    /// The last operation failed with the given code.
    ///
    /// If the upload session exists, [resync()][ResumableUpload::resync]
    /// queries the service and resumes the upload.
    Failed(ErrorCode),
}

/// An upload that sends the data in chunks, and can resume after failures.
///
/// At most one request is in flight at any time. Each chunk is sent exactly
/// once. After a failure, [resync()][ResumableUpload::resync] asks the service
/// how many bytes it has persisted, and the upload continues from that point.
/// [run()][ResumableUpload::run] does this automatically for transient
/// failures.
///
/// # Example
/// ```
/// # use firebase_storage::client::Storage;
/// # use firebase_storage::location::Location;
/// # async fn sample(client: &Storage) -> anyhow::Result<()> {
/// use firebase_storage::model::UploadMetadata;
/// use firebase_storage::upload::UploadState;
/// use firebase_storage::upload_source::Blob;
/// let mut upload = client.resumable_upload(
///     Location::new("my-bucket", "videos/cat.mp4"),
///     Blob::from(vec![0_u8; 1024 * 1024]),
///     UploadMetadata::new(),
/// );
/// upload.start().await?;
/// while upload.state() == UploadState::Uploading {
///     let progress = upload.upload_next_chunk().await?;
///     println!("uploaded {} of {} bytes", progress.current(), progress.total());
/// }
/// println!("object={:?}", upload.metadata());
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct ResumableUpload<S> {
    inner: Arc<StorageInner>,
    location: Location,
    source: S,
    metadata: UploadMetadata,
    chunk_size: u64,
    state: UploadState,
    session_url: Option<String>,
    progress: Option<ResumableUploadStatus>,
    cancel: CancellationToken,
}

impl<S> ResumableUpload<S>
where
    S: UploadSource,
{
    pub(crate) fn new(
        inner: Arc<StorageInner>,
        location: Location,
        source: S,
        metadata: UploadMetadata,
        cancel: CancellationToken,
    ) -> Self {
        let chunk_size = inner.chunk_size;
        Self {
            inner,
            location,
            source,
            metadata,
            chunk_size,
            state: UploadState::Idle,
            session_url: None,
            progress: None,
            cancel,
        }
    }

    /// Changes the chunk size for this upload.
    ///
    /// The value is rounded up to a multiple of 256KiB. Zero sends all the
    /// data in a single request.
    pub fn with_chunk_size(mut self, v: u64) -> Self {
        self.chunk_size = aligned_chunk_size(v);
        self
    }

    /// Returns a token that cancels this upload.
    ///
    /// Canceling aborts the request in flight, and the upload fails with a
    /// [canceled][ErrorCode::Canceled] error.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// The upload session URL, once the session is created.
    pub fn session_url(&self) -> Option<&str> {
        self.session_url.as_deref()
    }

    /// The last progress acknowledged by the service.
    ///
    /// Remains available after a failure, it is the point where the upload
    /// would resume.
    pub fn progress(&self) -> Option<&ResumableUploadStatus> {
        self.progress.as_ref()
    }

    /// The committed object metadata, once the upload is finalized.
    pub fn metadata(&self) -> Option<&ObjectMetadata> {
        self.progress.as_ref().and_then(|p| p.metadata())
    }

    /// Creates the upload session.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != UploadState::Idle {
            return Err(self.wrong_state("start"));
        }
        self.state = UploadState::SessionStarting;
        match self.start_session().await {
            Ok((url, progress)) => {
                tracing::debug!(location = %self.location, session_url = %url, "upload session started");
                self.session_url = Some(url);
                self.progress = Some(progress);
                self.state = UploadState::Uploading;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Sends the next chunk and returns the new progress.
    pub async fn upload_next_chunk(&mut self) -> Result<ResumableUploadStatus> {
        let (url, progress) = match (&self.state, &self.session_url, &self.progress) {
            (UploadState::Uploading, Some(url), Some(progress)) => (url.clone(), progress.clone()),
            _ => return Err(self.wrong_state("upload a chunk")),
        };
        match self.send_chunk(&url, &progress).await {
            Ok(status) => Ok(self.advance(status)),
            Err(e) => self.fail(e),
        }
    }

    /// Queries the service for the upload progress.
    ///
    /// Use this to recover after a failure. The upload returns to the
    /// [Uploading][UploadState::Uploading] state, or to
    /// [Finalized][UploadState::Finalized] if the service already committed
    /// the object.
    pub async fn resync(&mut self) -> Result<ResumableUploadStatus> {
        let url = match (&self.state, &self.session_url) {
            (UploadState::Uploading | UploadState::Failed(_), Some(url)) => url.clone(),
            _ => return Err(self.wrong_state("query the upload status")),
        };
        match self.query(&url).await {
            Ok(status) => Ok(self.advance(status)),
            Err(e) => self.fail(e),
        }
    }

    /// Runs the upload to completion and returns the committed object.
    ///
    /// Starts the session if needed. Chunks that fail with transient errors
    /// are recovered with [resync()][ResumableUpload::resync], subject to the
    /// client retry policy. Any other error stops the upload.
    pub async fn run(&mut self) -> Result<ObjectMetadata> {
        if self.state == UploadState::Idle {
            self.start().await?;
        }
        let mut loop_start = Instant::now();
        let mut attempt_count = 0;
        loop {
            match self.state {
                UploadState::Finalized => return self.committed(),
                UploadState::Uploading => {}
                _ => return Err(self.wrong_state("run")),
            }
            let error = match self.upload_next_chunk().await {
                Ok(_) => {
                    loop_start = Instant::now();
                    attempt_count = 0;
                    continue;
                }
                Err(e) if is_transient(&e) => e,
                Err(e) => return Err(e),
            };
            attempt_count += 1;
            if let Err(e) = self
                .inner
                .executor
                .wait_for_retry(loop_start, attempt_count, error, &self.cancel)
                .await
            {
                return self.fail(e);
            }
            self.resync().await?;
        }
    }

    async fn start_session(&self) -> Result<(String, ResumableUploadStatus)> {
        let info = start_resumable_upload(
            &self.inner.base_url,
            &self.location,
            &self.source,
            &self.metadata,
        )?;
        let url = self.inner.executor.execute(&info, &self.cancel).await?;
        let progress = ResumableUploadStatus::partial(0, self.source.size())?;
        Ok((url, progress))
    }

    async fn send_chunk(&self, url: &str, progress: &ResumableUploadStatus) -> Result<ResumableUploadStatus> {
        let info = continue_resumable_upload(url, &self.location, &self.source, self.chunk_size, progress)?;
        self.inner.executor.execute_once(&info, &self.cancel).await
    }

    async fn query(&self, url: &str) -> Result<ResumableUploadStatus> {
        let info = get_resumable_upload_status(url, &self.location, &self.source)?;
        let status = self.inner.executor.execute(&info, &self.cancel).await?;
        let acknowledged = self.progress.as_ref().map_or(0, |p| p.current());
        if status.current() < acknowledged {
            return Err(Error::server_file_wrong_size(format!(
                "the service previously acknowledged {acknowledged} bytes, but now reports only {}",
                status.current()
            )));
        }
        Ok(status)
    }

    fn advance(&mut self, status: ResumableUploadStatus) -> ResumableUploadStatus {
        tracing::debug!(
            location = %self.location,
            current = status.current(),
            total = status.total(),
            finalized = status.finalized(),
            "upload progress"
        );
        self.state = if status.finalized() {
            UploadState::Finalized
        } else {
            UploadState::Uploading
        };
        self.progress = Some(status.clone());
        status
    }

    fn fail<T>(&mut self, error: Error) -> Result<T> {
        tracing::debug!(location = %self.location, "upload failed: {error}");
        self.state = UploadState::Failed(error.code());
        Err(error)
    }

    fn committed(&self) -> Result<ObjectMetadata> {
        self.metadata()
            .cloned()
            .ok_or_else(|| Error::unknown("the upload is finalized, but has no metadata"))
    }

    fn wrong_state(&self, action: &str) -> Error {
        Error::invalid_argument(format!(
            "cannot {action} while the upload is in the {:?} state",
            self.state
        ))
    }
}

/// Chunk failures that may succeed after querying the upload status.
fn is_transient(error: &Error) -> bool {
    error.is_network()
        || error
            .http_status_code()
            .is_some_and(|code| is_retryable_status(code, &[]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Storage;
    use crate::storage::client::tests::{test_builder, test_inner_client};
    use crate::storage::executor::tests::MockTransport;
    use crate::storage::request_info::RawResponse;
    use crate::transport::{HttpRequest, TransportError};
    use crate::upload_source::Blob;
    use crate::upload_source::tests::MockSource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SESSION: &str = "https://example.com/upload/session-1";
    const QUANTUM: u64 = 256 * 1024;

    fn location() -> Location {
        Location::new("my-bucket", "a/b.txt")
    }

    fn command(request: &HttpRequest) -> Option<&str> {
        request
            .headers
            .get("x-goog-upload-command")
            .and_then(|v| v.to_str().ok())
    }

    fn offset(request: &HttpRequest) -> Option<&str> {
        request
            .headers
            .get("x-goog-upload-offset")
            .and_then(|v| v.to_str().ok())
    }

    fn body_len(request: &HttpRequest) -> usize {
        request.body.as_ref().map_or(0, |b| b.len())
    }

    fn started() -> RawResponse {
        RawResponse::new(200)
            .with_header("x-goog-upload-status", "active")
            .with_header("x-goog-upload-url", SESSION)
    }

    fn active() -> RawResponse {
        RawResponse::new(200).with_header("x-goog-upload-status", "active")
    }

    fn finalized(size: u64) -> RawResponse {
        let body = json!({"bucket": "my-bucket", "name": "a/b.txt", "size": size.to_string()});
        RawResponse::new(200)
            .with_header("x-goog-upload-status", "final")
            .with_body(body.to_string())
    }

    fn expect_start(transport: &mut MockTransport, seq: &mut mockall::Sequence) {
        transport
            .expect_send()
            .withf(|r| command(r) == Some("start"))
            .times(1)
            .in_sequence(seq)
            .returning(|_| Ok(started()));
    }

    fn upload<T: crate::transport::HttpTransport + 'static>(transport: T, size: usize) -> ResumableUpload<Blob> {
        let inner = test_inner_client(test_builder().with_transport(transport));
        ResumableUpload::new(
            inner,
            location(),
            Blob::new(vec![0_u8; size]),
            UploadMetadata::new(),
            CancellationToken::new(),
        )
        .with_chunk_size(QUANTUM)
    }

    #[tokio::test]
    async fn two_chunks() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        transport
            .expect_send()
            .withf(|r| {
                r.url == SESSION
                    && command(r) == Some("upload")
                    && offset(r) == Some("0")
                    && body_len(r) == 262144
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(active()));
        transport
            .expect_send()
            .withf(|r| {
                command(r) == Some("upload, finalize")
                    && offset(r) == Some("262144")
                    && body_len(r) == 500000 - 262144
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(finalized(500000)));

        let mut upload = upload(transport, 500000);
        assert_eq!(upload.state(), UploadState::Idle);
        upload.start().await?;
        assert_eq!(upload.state(), UploadState::Uploading);
        assert_eq!(upload.session_url(), Some(SESSION));
        assert_eq!(upload.progress().map(|p| p.current()), Some(0));

        let progress = upload.upload_next_chunk().await?;
        assert_eq!(progress.current(), 262144);
        assert!(!progress.finalized());
        assert_eq!(upload.state(), UploadState::Uploading);

        let progress = upload.upload_next_chunk().await?;
        assert_eq!(progress.current(), 500000);
        assert!(progress.finalized());
        assert_eq!(upload.state(), UploadState::Finalized);
        assert_eq!(upload.metadata().map(|m| m.size), Some(500000));

        let err = upload.upload_next_chunk().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument, "{err:?}");
        assert_eq!(upload.state(), UploadState::Finalized);
        Ok(())
    }

    #[tokio::test]
    async fn missing_session_url() -> anyhow::Result<()> {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(RawResponse::new(200).with_header("x-goog-upload-status", "active")));
        let mut upload = upload(transport, 10);
        let err = upload.start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unknown, "{err:?}");
        assert_eq!(upload.state(), UploadState::Failed(ErrorCode::Unknown));
        assert_eq!(upload.session_url(), None);

        let err = upload.resync().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn chunk_permission_denied() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        transport
            .expect_send()
            .withf(|r| command(r) == Some("upload, finalize"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(RawResponse::new(403)));

        let mut upload = upload(transport, 100);
        let err = upload.run().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized, "{err:?}");
        assert_eq!(err.path(), Some("a/b.txt"));
        assert_eq!(upload.state(), UploadState::Failed(ErrorCode::Unauthorized));
        assert_eq!(upload.progress().map(|p| p.current()), Some(0));
        Ok(())
    }

    #[tokio::test]
    async fn run_recovers_with_query() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        transport
            .expect_send()
            .withf(|r| command(r) == Some("upload") && offset(r) == Some("0"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransportError::io(std::io::Error::other("reset"))));
        transport
            .expect_send()
            .withf(|r| command(r) == Some("query") && r.url == SESSION)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(RawResponse::new(200)
                    .with_header("x-goog-upload-status", "active")
                    .with_header("x-goog-upload-size-received", "262144"))
            });
        transport
            .expect_send()
            .withf(|r| {
                command(r) == Some("upload, finalize")
                    && offset(r) == Some("262144")
                    && body_len(r) == 100
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(finalized(262244)));

        let mut upload = upload(transport, 262244);
        let object = upload.run().await?;
        assert_eq!(object.size, 262244);
        assert_eq!(upload.state(), UploadState::Finalized);
        Ok(())
    }

    #[tokio::test]
    async fn resync_after_failure() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        transport
            .expect_send()
            .withf(|r| command(r) == Some("upload, finalize"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(RawResponse::new(503)));
        transport
            .expect_send()
            .withf(|r| command(r) == Some("query"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(RawResponse::new(200)
                    .with_header("x-goog-upload-status", "final")
                    .with_header("x-goog-upload-size-received", "10")
                    .with_body(json!({"name": "a/b.txt", "size": "10"}).to_string()))
            });

        let mut upload = upload(transport, 10);
        upload.start().await?;
        let err = upload.upload_next_chunk().await.unwrap_err();
        assert_eq!(err.http_status_code(), Some(503), "{err:?}");
        assert_eq!(upload.state(), UploadState::Failed(ErrorCode::Unknown));

        let first = upload.resync().await?;
        assert_eq!(upload.state(), UploadState::Finalized);
        assert!(first.finalized());
        assert_eq!(upload.metadata().map(|m| m.size), Some(10));

        let err = upload.resync().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument, "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn query_is_idempotent() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        transport
            .expect_send()
            .withf(|r| command(r) == Some("query"))
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(RawResponse::new(200)
                    .with_header("x-goog-upload-status", "active")
                    .with_header("x-goog-upload-size-received", "0"))
            });

        let mut upload = upload(transport, 10);
        upload.start().await?;
        let first = upload.resync().await?;
        let second = upload.resync().await?;
        assert_eq!(first, second);
        assert_eq!(upload.state(), UploadState::Uploading);
        Ok(())
    }

    #[tokio::test]
    async fn query_rewind() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        transport
            .expect_send()
            .withf(|r| command(r) == Some("upload"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(active()));
        transport
            .expect_send()
            .withf(|r| command(r) == Some("query"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(RawResponse::new(200)
                    .with_header("x-goog-upload-status", "active")
                    .with_header("x-goog-upload-size-received", "1000"))
            });

        let mut upload = upload(transport, 2 * QUANTUM as usize);
        upload.start().await?;
        upload.upload_next_chunk().await?;
        let err = upload.resync().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerFileWrongSize, "{err:?}");
        assert_eq!(upload.progress().map(|p| p.current()), Some(QUANTUM));
        Ok(())
    }

    #[tokio::test]
    async fn final_too_early() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        transport
            .expect_send()
            .withf(|r| command(r) == Some("upload"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(finalized(QUANTUM)));

        let mut upload = upload(transport, 2 * QUANTUM as usize);
        let err = upload.run().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerFileWrongSize, "{err:?}");
        assert_eq!(upload.state(), UploadState::Failed(ErrorCode::ServerFileWrongSize));
        Ok(())
    }

    #[tokio::test]
    async fn cannot_slice() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        let mut source = MockSource::new();
        source.expect_size().return_const(100_u64);
        source.expect_content_type().return_const(None::<String>);
        source.expect_slice().returning(|_, _| None);

        let inner = test_inner_client(test_builder().with_transport(transport));
        let mut upload = ResumableUpload::new(
            inner,
            location(),
            source,
            UploadMetadata::new(),
            CancellationToken::new(),
        );
        let err = upload.run().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::CannotSliceBlob, "{err:?}");
        assert_eq!(upload.state(), UploadState::Failed(ErrorCode::CannotSliceBlob));
        Ok(())
    }

    #[tokio::test]
    async fn unbounded_chunk() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        transport
            .expect_send()
            .withf(|r| command(r) == Some("upload, finalize") && body_len(r) == 3 * 262144)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(finalized(3 * 262144)));

        let upload = upload(transport, 3 * QUANTUM as usize);
        let mut upload = upload.with_chunk_size(0);
        upload.run().await?;
        assert_eq!(upload.state(), UploadState::Finalized);
        Ok(())
    }

    #[tokio::test]
    async fn cancel_during_chunk() -> anyhow::Result<()> {
        let mut seq = mockall::Sequence::new();
        let mut transport = MockTransport::new();
        expect_start(&mut transport, &mut seq);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        transport
            .expect_send()
            .withf(|r| command(r) == Some("upload"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                trigger.cancel();
                Err(TransportError::io(std::io::Error::other("aborted")))
            });

        let client = test_builder().with_transport(transport).build()?;
        let mut upload = client
            .with_cancellation_token(cancel)
            .resumable_upload(location(), Blob::new(vec![0_u8; 2 * QUANTUM as usize]), UploadMetadata::new())
            .with_chunk_size(QUANTUM);
        let err = upload.run().await.unwrap_err();
        assert!(err.is_canceled(), "{err:?}");
        assert_eq!(upload.state(), UploadState::Failed(ErrorCode::Canceled));
        Ok(())
    }

    #[tokio::test]
    async fn cancel_before_start() -> anyhow::Result<()> {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let client: Storage = test_builder().with_transport(transport).build()?;
        let mut upload = client.resumable_upload(location(), Blob::new("hello"), UploadMetadata::new());
        upload.cancel();
        let err = upload.run().await.unwrap_err();
        assert!(err.is_canceled(), "{err:?}");
        assert_eq!(upload.state(), UploadState::Failed(ErrorCode::Canceled));
        Ok(())
    }
}
