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

//! Errors returned by the Firebase Storage client.
//!
//! Every failure reported by the client is classified into exactly one
//! [ErrorCode] at the point it is detected. The classification never changes
//! as the error propagates, with one exception: the retry loop for
//! single-shot requests wraps the last transient failure in a
//! [retry limit exceeded][ErrorCode::RetryLimitExceeded] error once it runs
//! out of attempts.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The result type for all fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of error kinds reported by the client.
///
/// # Example
/// ```
/// # use firebase_storage::error::{Error, ErrorCode};
/// fn describe(error: &Error) -> &'static str {
///     match error.code() {
///         ErrorCode::ObjectNotFound => "no such object",
///         ErrorCode::Unauthenticated => "please sign in",
///         _ => "something went wrong",
///     }
/// }
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// The service returned an unexpected status, or the response violated
    /// the protocol.
    Unknown,
    /// The request did not include valid credentials.
    Unauthenticated,
    /// The App Check token was rejected.
    UnauthorizedApp,
    /// The bucket quota is exhausted.
    QuotaExceeded,
    /// The caller is not allowed to access the object.
    Unauthorized,
    /// The object does not exist.
    ObjectNotFound,
    /// The service and the client disagree about the size of an upload.
    ServerFileWrongSize,
    /// The upload source cannot produce the requested byte range.
    CannotSliceBlob,
    /// The retry loop ran out of attempts or time.
    RetryLimitExceeded,
    /// The service cannot satisfy the requested byte range.
    RangeNotSatisfiable,
    /// The operation was canceled by the caller.
    Canceled,
    /// The caller provided an invalid argument.
    InvalidArgument,
    /// The object has no download tokens.
    NoDownloadUrl,
}

impl ErrorCode {
    /// The stable string form of the code, e.g. `storage/object-not-found`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "storage/unknown",
            Self::Unauthenticated => "storage/unauthenticated",
            Self::UnauthorizedApp => "storage/unauthorized-app",
            Self::QuotaExceeded => "storage/quota-exceeded",
            Self::Unauthorized => "storage/unauthorized",
            Self::ObjectNotFound => "storage/object-not-found",
            Self::ServerFileWrongSize => "storage/server-file-wrong-size",
            Self::CannotSliceBlob => "storage/cannot-slice-blob",
            Self::RetryLimitExceeded => "storage/retry-limit-exceeded",
            Self::RangeNotSatisfiable => "storage/range-not-satisfiable",
            Self::Canceled => "storage/canceled",
            Self::InvalidArgument => "storage/invalid-argument",
            Self::NoDownloadUrl => "storage/no-download-url",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type for the Firebase Storage client.
///
/// Use [code()][Error::code] to branch on the kind of failure. Errors that
/// refer to a bucket or object carry it, see [bucket()][Error::bucket] and
/// [path()][Error::path].
///
/// # Example
/// ```
/// # use firebase_storage::{client::Storage, location::Location};
/// # use firebase_storage::error::ErrorCode;
/// # async fn sample(client: &Storage) -> anyhow::Result<()> {
/// let location = Location::new("my-bucket", "images/cat.png");
/// match client.get_metadata(&location).await {
///     Ok(metadata) => println!("{metadata:?}"),
///     Err(e) if e.code() == ErrorCode::ObjectNotFound => {
///         println!("{} does not exist", e.path().unwrap_or_default());
///     }
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    status_code: Option<u16>,
    server_response: Option<String>,
    network: bool,
    source: Option<BoxError>,
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("an unknown error occurred: {0}")]
    Unknown(String),
    #[error("user is not authenticated, please authenticate and try again")]
    Unauthenticated,
    #[error("this app does not have permission to access Firebase Storage on this project")]
    UnauthorizedApp,
    #[error("quota for bucket '{0}' exceeded, please view quota on https://firebase.google.com/pricing/")]
    QuotaExceeded(String),
    #[error("user does not have permission to access '{0}'")]
    Unauthorized(String),
    #[error("object '{0}' does not exist")]
    ObjectNotFound(String),
    #[error("server recorded incorrect upload file size: {0}")]
    ServerFileWrongSize(String),
    #[error("cannot slice blob for upload, please retry the upload")]
    CannotSliceBlob,
    #[error("max retry time for operation exceeded, please try again")]
    RetryLimitExceeded,
    #[error("the requested range is not satisfiable")]
    RangeNotSatisfiable,
    #[error("user canceled the upload/download")]
    Canceled,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("the given file does not have any download URLs")]
    NoDownloadUrl,
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            status_code: None,
            server_response: None,
            network: false,
            source: None,
        }
    }

    pub(crate) fn unknown<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::Unknown(message.into()))
    }

    pub(crate) fn unauthenticated() -> Self {
        Self::new(ErrorKind::Unauthenticated)
    }

    pub(crate) fn unauthorized_app() -> Self {
        Self::new(ErrorKind::UnauthorizedApp)
    }

    pub(crate) fn quota_exceeded<T: Into<String>>(bucket: T) -> Self {
        Self::new(ErrorKind::QuotaExceeded(bucket.into()))
    }

    pub(crate) fn unauthorized<T: Into<String>>(path: T) -> Self {
        Self::new(ErrorKind::Unauthorized(path.into()))
    }

    pub(crate) fn object_not_found<T: Into<String>>(path: T) -> Self {
        Self::new(ErrorKind::ObjectNotFound(path.into()))
    }

    pub(crate) fn server_file_wrong_size<T: Into<String>>(detail: T) -> Self {
        Self::new(ErrorKind::ServerFileWrongSize(detail.into()))
    }

    pub(crate) fn cannot_slice_blob() -> Self {
        Self::new(ErrorKind::CannotSliceBlob)
    }

    pub(crate) fn retry_limit_exceeded() -> Self {
        Self::new(ErrorKind::RetryLimitExceeded)
    }

    pub(crate) fn range_not_satisfiable() -> Self {
        Self::new(ErrorKind::RangeNotSatisfiable)
    }

    pub(crate) fn canceled() -> Self {
        Self::new(ErrorKind::Canceled)
    }

    pub(crate) fn invalid_argument<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorKind::InvalidArgument(message.into()))
    }

    pub(crate) fn no_download_url() -> Self {
        Self::new(ErrorKind::NoDownloadUrl)
    }

    /// A request that never produced an HTTP response: connection errors,
    /// timeouts, and similar transport failures.
    pub(crate) fn network<T: Into<BoxError>>(source: T) -> Self {
        Self {
            network: true,
            source: Some(source.into()),
            ..Self::unknown("the request did not complete")
        }
    }

    pub(crate) fn with_source<T: Into<BoxError>>(mut self, source: T) -> Self {
        self.source = Some(source.into());
        self
    }

    pub(crate) fn with_http_response(mut self, status_code: u16, body: String) -> Self {
        self.status_code = Some(status_code);
        self.server_response = (!body.is_empty()).then_some(body);
        self
    }

    /// The kind of error.
    pub fn code(&self) -> ErrorCode {
        match &self.kind {
            ErrorKind::Unknown(_) => ErrorCode::Unknown,
            ErrorKind::Unauthenticated => ErrorCode::Unauthenticated,
            ErrorKind::UnauthorizedApp => ErrorCode::UnauthorizedApp,
            ErrorKind::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            ErrorKind::Unauthorized(_) => ErrorCode::Unauthorized,
            ErrorKind::ObjectNotFound(_) => ErrorCode::ObjectNotFound,
            ErrorKind::ServerFileWrongSize(_) => ErrorCode::ServerFileWrongSize,
            ErrorKind::CannotSliceBlob => ErrorCode::CannotSliceBlob,
            ErrorKind::RetryLimitExceeded => ErrorCode::RetryLimitExceeded,
            ErrorKind::RangeNotSatisfiable => ErrorCode::RangeNotSatisfiable,
            ErrorKind::Canceled => ErrorCode::Canceled,
            ErrorKind::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ErrorKind::NoDownloadUrl => ErrorCode::NoDownloadUrl,
        }
    }

    /// The bucket this error refers to, if any.
    pub fn bucket(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::QuotaExceeded(b) => Some(b.as_str()),
            _ => None,
        }
    }

    /// The object path this error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Unauthorized(p) | ErrorKind::ObjectNotFound(p) => Some(p.as_str()),
            _ => None,
        }
    }

    /// The HTTP status code, if the error was created from an HTTP response.
    pub fn http_status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// The body of the HTTP response, if any, that produced this error.
    ///
    /// The service often includes details useful for troubleshooting in the
    /// response body.
    pub fn server_response(&self) -> Option<&str> {
        self.server_response.as_deref()
    }

    /// The request failed before receiving any HTTP response.
    ///
    /// These errors are transient: the request may or may not have reached
    /// the service. For resumable uploads, query the upload status before
    /// sending more data.
    pub fn is_network(&self) -> bool {
        self.network
    }

    /// The operation was canceled by the application.
    pub fn is_canceled(&self) -> bool {
        matches!(self.kind, ErrorKind::Canceled)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Firebase Storage: {} ({})", self.kind, self.code())?;
        if let Some(code) = self.status_code {
            write!(f, ", http status code: {code}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
