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

use super::executor::{Executor, HeaderConfig, is_credentialed_host};
use super::requests;
use super::resumable::{DEFAULT_CHUNK_SIZE, aligned_chunk_size};
use super::upload::ResumableUpload;
use crate::backoff_policy::BackoffPolicy;
use crate::location::Location;
use crate::model::{ListOptions, ListResult, ObjectMetadata, SettableMetadata, UploadMetadata};
use crate::retry_policy::{DEFAULT_ATTEMPT_LIMIT, DEFAULT_TIME_LIMIT, RetryPolicy};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::upload_source::UploadSource;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The default host used by the service.
const DEFAULT_HOST: &str = "firebasestorage.googleapis.com";

/// The default protocol used by the service.
const DEFAULT_PROTOCOL: &str = "https";

/// Implements a client for Firebase Storage.
///
/// # Example
/// ```
/// # use firebase_storage::client::Storage;
/// # use firebase_storage::location::Location;
/// # async fn sample() -> anyhow::Result<()> {
/// let client = Storage::builder()
///     .with_auth_token("my-firebase-id-token")
///     .build()?;
/// let location = Location::new("my-project.appspot.com", "images/cat.png");
/// let contents = client.get_bytes(&location, None).await?;
/// println!("object contents={contents:?}");
/// # Ok(()) }
/// ```
///
/// # Configuration
///
/// To configure `Storage` use the `with_*` methods in the type returned by
/// [builder()][Storage::builder]. The default configuration should work for
/// most applications. Common configuration changes include:
///
/// * [with_auth_token()]: the Firebase Authentication ID token for the
///   current user. Without a token requests are anonymous.
/// * [with_app_check_token()]: the App Check token for the application.
/// * [with_emulator()]: use the local Firebase Storage emulator.
///
/// # Pooling and Cloning
///
/// `Storage` holds a connection pool internally, it is advised to
/// create one and then reuse it. You do not need to wrap `Storage` in
/// an [Rc](std::rc::Rc) or [Arc] to reuse it, because it already uses an `Arc`
/// internally.
///
/// # Cancellation
///
/// Use [with_cancellation_token()][Storage::with_cancellation_token] to get a
/// client whose requests stop when the token is canceled.
///
/// [with_auth_token()]: ClientBuilder::with_auth_token
/// [with_app_check_token()]: ClientBuilder::with_app_check_token
/// [with_emulator()]: ClientBuilder::with_emulator
#[derive(Clone, Debug)]
pub struct Storage {
    inner: Arc<StorageInner>,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub(crate) struct StorageInner {
    pub executor: Executor,
    /// The service root, for example `https://firebasestorage.googleapis.com/v0`.
    pub base_url: String,
    pub chunk_size: u64,
}

impl Storage {
    /// Returns a builder for [Storage].
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # fn sample() -> anyhow::Result<()> {
    /// let client = Storage::builder().build()?;
    /// # Ok(()) }
    /// ```
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn new(builder: ClientBuilder) -> Result<Self> {
        tracing::info!("builder={builder:?}");
        let transport = match builder.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new().map_err(|e| {
                Error::unknown("cannot create the default HTTP transport").with_source(e)
            })?),
        };
        let host = builder.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        let protocol = builder
            .protocol
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
        let retry_policy = RetryPolicy::new(
            builder.retry_limit.unwrap_or(DEFAULT_ATTEMPT_LIMIT),
            builder
                .max_operation_retry_time
                .unwrap_or(DEFAULT_TIME_LIMIT),
        );
        let backoff = builder
            .backoff_policy
            .unwrap_or_else(crate::backoff_policy::default);
        let endpoint = url::Url::parse(&format!("{protocol}://{host}")).map_err(|e| {
            Error::invalid_argument(format!("invalid service endpoint {protocol}://{host}"))
                .with_source(e)
        })?;
        let include_credentials = endpoint.host_str().is_some_and(is_credentialed_host);
        let executor = Executor::new(
            transport,
            &builder.headers,
            include_credentials,
            retry_policy,
            backoff,
            builder.request_timeout,
        )?;
        let inner = StorageInner {
            executor,
            base_url: format!("{protocol}://{host}/v0"),
            chunk_size: builder.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
        };
        Ok(Self {
            inner: Arc::new(inner),
            cancel: CancellationToken::new(),
        })
    }

    /// Returns a client sharing this client's configuration whose requests
    /// are canceled when `token` is canceled.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # use firebase_storage::location::Location;
    /// # async fn sample(client: &Storage) -> anyhow::Result<()> {
    /// use tokio_util::sync::CancellationToken;
    /// let token = CancellationToken::new();
    /// let scoped = client.with_cancellation_token(token.clone());
    /// let task = tokio::spawn(async move {
    ///     scoped.get_bytes(&Location::new("my-bucket", "large.bin"), None).await
    /// });
    /// token.cancel();
    /// let result = task.await?;
    /// assert!(result.is_err_and(|e| e.is_canceled()));
    /// # Ok(()) }
    /// ```
    pub fn with_cancellation_token(&self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: token,
        }
    }

    /// Fetches the metadata for an object.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # use firebase_storage::location::Location;
    /// # async fn sample(client: &Storage) -> anyhow::Result<()> {
    /// let metadata = client
    ///     .get_metadata(&Location::new("my-bucket", "images/cat.png"))
    ///     .await?;
    /// println!("size={}, type={:?}", metadata.size, metadata.content_type);
    /// # Ok(()) }
    /// ```
    pub async fn get_metadata(&self, location: &Location) -> Result<ObjectMetadata> {
        let info = requests::get_metadata(&self.inner.base_url, location)?;
        self.inner.executor.execute(&info, &self.cancel).await
    }

    /// Changes the metadata for an object.
    ///
    /// Only the fields set in `metadata` are changed.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # use firebase_storage::location::Location;
    /// # async fn sample(client: &Storage) -> anyhow::Result<()> {
    /// use firebase_storage::model::SettableMetadata;
    /// let updated = client
    ///     .update_metadata(
    ///         &Location::new("my-bucket", "images/cat.png"),
    ///         &SettableMetadata::new().set_cache_control("max-age=3600"),
    ///     )
    ///     .await?;
    /// println!("updated={updated:?}");
    /// # Ok(()) }
    /// ```
    pub async fn update_metadata(
        &self,
        location: &Location,
        metadata: &SettableMetadata,
    ) -> Result<ObjectMetadata> {
        let info = requests::update_metadata(&self.inner.base_url, location, metadata)?;
        self.inner.executor.execute(&info, &self.cancel).await
    }

    pub async fn delete_object(&self, location: &Location) -> Result<()> {
        let info = requests::delete_object(&self.inner.base_url, location)?;
        self.inner.executor.execute(&info, &self.cancel).await
    }

    /// Lists one page of objects and prefixes directly under `location`.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # use firebase_storage::location::Location;
    /// # async fn sample(client: &Storage) -> anyhow::Result<()> {
    /// use firebase_storage::model::ListOptions;
    /// let folder = Location::new("my-bucket", "images");
    /// let mut options = ListOptions::new().set_max_results(100);
    /// loop {
    ///     let page = client.list(&folder, &options).await?;
    ///     page.items.iter().for_each(|item| println!("{item}"));
    ///     match page.next_page_token {
    ///         Some(token) => options = options.set_page_token(token),
    ///         None => break,
    ///     }
    /// }
    /// # Ok(()) }
    /// ```
    pub async fn list(&self, location: &Location, options: &ListOptions) -> Result<ListResult> {
        let info = requests::list(&self.inner.base_url, location, options)?;
        self.inner.executor.execute(&info, &self.cancel).await
    }

    /// Lists all the objects and prefixes directly under `location`.
    ///
    /// Fetches pages until the service returns no page token. Prefer
    /// [list()][Storage::list] for large folders.
    pub async fn list_all(&self, location: &Location) -> Result<ListResult> {
        let mut result = ListResult::default();
        let mut options = ListOptions::new();
        loop {
            let page = self.list(location, &options).await?;
            result.prefixes.extend(page.prefixes);
            result.items.extend(page.items);
            match page.next_page_token {
                Some(token) => options = options.set_page_token(token),
                None => return Ok(result),
            }
        }
    }

    /// Returns a stream of result pages for the folder at `location`.
    ///
    /// The stream ends after the first page without a page token, or after
    /// the first error.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # use firebase_storage::location::Location;
    /// # async fn sample(client: &Storage) -> anyhow::Result<()> {
    /// use firebase_storage::model::ListOptions;
    /// use futures::TryStreamExt;
    /// let folder = Location::new("my-bucket", "images");
    /// let mut pages =
    ///     std::pin::pin!(client.list_stream(folder, ListOptions::new().set_max_results(100)));
    /// while let Some(page) = pages.try_next().await? {
    ///     page.items.iter().for_each(|item| println!("{item}"));
    /// }
    /// # Ok(()) }
    /// ```
    pub fn list_stream(
        &self,
        location: Location,
        options: ListOptions,
    ) -> impl futures::Stream<Item = Result<ListResult>> + Send + 'static {
        let client = self.clone();
        futures::stream::unfold(Some(options), move |state| {
            let client = client.clone();
            let location = location.clone();
            async move {
                let options = state?;
                match client.list(&location, &options).await {
                    Ok(page) => {
                        let next = page
                            .next_page_token
                            .clone()
                            .map(|token| options.set_page_token(token));
                        Some((Ok(page), next))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
    }

    /// Downloads the contents of an object.
    ///
    /// With `max_download_bytes` only a prefix of the object is downloaded.
    pub async fn get_bytes(
        &self,
        location: &Location,
        max_download_bytes: Option<u64>,
    ) -> Result<bytes::Bytes> {
        let info = requests::get_bytes(&self.inner.base_url, location, max_download_bytes)?;
        self.inner.executor.execute(&info, &self.cancel).await
    }

    /// Returns a URL that grants read access to the object.
    ///
    /// Fails with [no download URL][crate::error::ErrorCode::NoDownloadUrl] if
    /// the object has no download tokens.
    pub async fn get_download_url(&self, location: &Location) -> Result<String> {
        let info = requests::get_download_url(&self.inner.base_url, location)?;
        self.inner.executor.execute(&info, &self.cancel).await
    }

    /// Uploads an object in a single request.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # use firebase_storage::location::Location;
    /// # async fn sample(client: &Storage) -> anyhow::Result<()> {
    /// use firebase_storage::model::UploadMetadata;
    /// use firebase_storage::upload_source::Blob;
    /// let object = client
    ///     .upload_bytes(
    ///         &Location::new("my-bucket", "notes/hello.txt"),
    ///         &Blob::from("hello world"),
    ///         &UploadMetadata::new().set_content_type("text/plain"),
    ///     )
    ///     .await?;
    /// println!("uploaded {} bytes", object.size);
    /// # Ok(()) }
    /// ```
    pub async fn upload_bytes<S>(
        &self,
        location: &Location,
        source: &S,
        metadata: &UploadMetadata,
    ) -> Result<ObjectMetadata>
    where
        S: UploadSource,
    {
        let info = requests::multipart_upload(&self.inner.base_url, location, source, metadata)?;
        self.inner.executor.execute(&info, &self.cancel).await
    }

    /// Creates a resumable upload.
    ///
    /// The upload does not start until you call
    /// [start()][ResumableUpload::start] or [run()][ResumableUpload::run].
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # use firebase_storage::location::Location;
    /// # async fn sample(client: &Storage) -> anyhow::Result<()> {
    /// use firebase_storage::model::UploadMetadata;
    /// use firebase_storage::upload_source::Blob;
    /// let mut upload = client.resumable_upload(
    ///     Location::new("my-bucket", "videos/cat.mp4"),
    ///     Blob::from(vec![0_u8; 4 * 1024 * 1024]),
    ///     UploadMetadata::new().set_content_type("video/mp4"),
    /// );
    /// let object = upload.run().await?;
    /// println!("uploaded {} bytes", object.size);
    /// # Ok(()) }
    /// ```
    pub fn resumable_upload<S>(
        &self,
        location: Location,
        source: S,
        metadata: UploadMetadata,
    ) -> ResumableUpload<S>
    where
        S: UploadSource,
    {
        ResumableUpload::new(
            self.inner.clone(),
            location,
            source,
            metadata,
            self.cancel.child_token(),
        )
    }
}

/// A builder for [Storage].
///
/// ```
/// # use firebase_storage::client::Storage;
/// # fn sample() -> anyhow::Result<()> {
/// let builder = Storage::builder();
/// let client = builder
///     .with_app_id("1:1234567890:web:abcdef")
///     .with_auth_token("my-firebase-id-token")
///     .build()?;
/// # Ok(()) }
/// ```
#[derive(Clone, Debug, Default)]
pub struct ClientBuilder {
    pub(crate) host: Option<String>,
    pub(crate) protocol: Option<String>,
    pub(crate) headers: HeaderConfig,
    pub(crate) retry_limit: Option<u32>,
    pub(crate) max_operation_retry_time: Option<Duration>,
    pub(crate) backoff_policy: Option<Arc<dyn BackoffPolicy>>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) chunk_size: Option<u64>,
    pub(crate) transport: Option<Arc<dyn HttpTransport>>,
}

impl ClientBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a new client.
    ///
    /// Fails if any of the configured tokens cannot be used as an HTTP header
    /// value, or if the default transport cannot be initialized.
    pub fn build(self) -> Result<Storage> {
        Storage::new(self)
    }

    /// Sets the service host, including the port if needed.
    pub fn with_host<V: Into<String>>(mut self, v: V) -> Self {
        self.host = Some(v.into());
        self
    }

    /// Sets the protocol, `https` by default.
    pub fn with_protocol<V: Into<String>>(mut self, v: V) -> Self {
        self.protocol = Some(v.into());
        self
    }

    /// Sends all requests to the Firebase Storage emulator.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # fn sample() -> anyhow::Result<()> {
    /// let client = Storage::builder()
    ///     .with_emulator("localhost", 9199)
    ///     .build()?;
    /// # Ok(()) }
    /// ```
    pub fn with_emulator<V: AsRef<str>>(self, host: V, port: u16) -> Self {
        let host = host.as_ref();
        let host = if host.parse::<std::net::Ipv6Addr>().is_ok() {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        self.with_host(host)
            .with_protocol("http")
    }

    /// Sets the Firebase application id, sent in the `X-Firebase-GMPID`
    /// header.
    pub fn with_app_id<V: Into<String>>(mut self, v: V) -> Self {
        self.headers.app_id = Some(v.into());
        self
    }

    /// Sets the Firebase Authentication ID token for the current user.
    pub fn with_auth_token<V: Into<String>>(mut self, v: V) -> Self {
        self.headers.auth_token = Some(v.into());
        self
    }

    /// Sets the App Check token for the application.
    pub fn with_app_check_token<V: Into<String>>(mut self, v: V) -> Self {
        self.headers.app_check_token = Some(v.into());
        self
    }

    /// Sets the SDK version reported in the `X-Firebase-Storage-Version`
    /// header.
    pub fn with_version<V: Into<String>>(mut self, v: V) -> Self {
        self.headers.version = Some(v.into());
        self
    }

    /// Sets the maximum number of attempts for single-shot requests.
    ///
    /// Values smaller than one are treated as one.
    pub fn with_retry_limit(mut self, v: u32) -> Self {
        self.retry_limit = Some(v);
        self
    }

    /// Sets the maximum time spent retrying a request.
    pub fn with_max_operation_retry_time<V: Into<Duration>>(mut self, v: V) -> Self {
        self.max_operation_retry_time = Some(v.into());
        self
    }

    /// Configure the retry backoff policy.
    ///
    /// The backoff policy controls how long to wait in between retry
    /// attempts.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::client::Storage;
    /// # fn sample() -> anyhow::Result<()> {
    /// use firebase_storage::backoff_policy::ExponentialBackoffBuilder;
    /// use std::time::Duration;
    /// let policy = ExponentialBackoffBuilder::new()
    ///     .with_initial_delay(Duration::from_millis(500))
    ///     .with_maximum_delay(Duration::from_secs(30))
    ///     .build()?;
    /// let client = Storage::builder()
    ///     .with_backoff_policy(policy)
    ///     .build()?;
    /// # Ok(()) }
    /// ```
    pub fn with_backoff_policy<V: BackoffPolicy + 'static>(mut self, v: V) -> Self {
        self.backoff_policy = Some(Arc::new(v));
        self
    }

    /// Sets the timeout for each HTTP request.
    pub fn with_request_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.request_timeout = Some(v.into());
        self
    }

    /// Sets the chunk size for resumable uploads.
    ///
    /// The value is rounded up to a multiple of 256KiB. Zero sends all the
    /// data in a single request.
    pub fn with_chunk_size(mut self, v: u64) -> Self {
        self.chunk_size = Some(aligned_chunk_size(v));
        self
    }

    /// Replaces the HTTP transport.
    pub fn with_transport<V: HttpTransport + 'static>(mut self, v: V) -> Self {
        self.transport = Some(Arc::new(v));
        self
    }
}
