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

//! Identifies buckets and objects in Firebase Storage.

use crate::{Error, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// The characters escaped in URL components, matches `encodeURIComponent()`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A bucket and an object path within that bucket.
///
/// An empty path refers to the root of the bucket. Paths are normalized on
/// construction: empty components (leading, trailing, or repeated `/`) are
/// removed.
///
/// # Example
/// ```
/// # use firebase_storage::location::Location;
/// let location = Location::new("my-bucket", "/images//cat.png");
/// assert_eq!(location.bucket(), "my-bucket");
/// assert_eq!(location.path(), "images/cat.png");
/// assert_eq!(location.name(), "cat.png");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Location {
    bucket: String,
    path: String,
}

impl Location {
    /// Creates a new location.
    pub fn new<B, P>(bucket: B, path: P) -> Self
    where
        B: Into<String>,
        P: AsRef<str>,
    {
        Self {
            bucket: bucket.into(),
            path: normalize(path.as_ref()),
        }
    }

    /// Parses a location from a `gs://` URL or a Firebase Storage download URL.
    ///
    /// # Example
    /// ```
    /// # use firebase_storage::location::Location;
    /// let location = Location::parse("gs://my-bucket/images/cat.png")?;
    /// assert_eq!(location, Location::new("my-bucket", "images/cat.png"));
    ///
    /// let location = Location::parse(
    ///     "https://firebasestorage.googleapis.com/v0/b/my-bucket/o/images%2Fcat.png?alt=media")?;
    /// assert_eq!(location, Location::new("my-bucket", "images/cat.png"));
    /// # Ok::<(), firebase_storage::Error>(())
    /// ```
    pub fn parse(url: &str) -> Result<Self> {
        if let Some(rest) = url.strip_prefix("gs://") {
            let (bucket, path) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "missing bucket name in `{url}`"
                )));
            }
            return Ok(Self::new(bucket, path));
        }
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::invalid_argument(format!("invalid URL `{url}`")).with_source(e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::invalid_argument(format!(
                "unsupported URL scheme in `{url}`"
            )));
        }
        let mut segments = parsed.path().trim_start_matches('/').splitn(5, '/');
        match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some("v0"), Some("b"), Some(bucket), Some("o"), path) if !bucket.is_empty() => {
                let bucket = decode(bucket)?;
                let path = decode(path.unwrap_or_default())?;
                Ok(Self::new(bucket, path))
            }
            _ => Err(Error::invalid_argument(format!(
                "`{url}` is not a Firebase Storage URL"
            ))),
        }
    }

    /// The bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The normalized object path, empty for the bucket root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// The last component of the path.
    pub fn name(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map(|(_, last)| last)
            .unwrap_or(&self.path)
    }

    /// The parent location, `None` for the bucket root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let parent = self
            .path
            .rsplit_once('/')
            .map(|(parent, _)| parent)
            .unwrap_or_default();
        Some(Self {
            bucket: self.bucket.clone(),
            path: parent.to_string(),
        })
    }

    /// A location relative to this one.
    pub fn child<P: AsRef<str>>(&self, path: P) -> Self {
        let child = normalize(path.as_ref());
        let path = match (self.path.as_str(), child.as_str()) {
            (p, "") => p.to_string(),
            ("", c) => c.to_string(),
            (p, c) => format!("{p}/{c}"),
        };
        Self {
            bucket: self.bucket.clone(),
            path,
        }
    }

    /// The URL path for bucket-scoped requests: uploads and list.
    pub(crate) fn bucket_only_server_url(&self) -> String {
        format!("/b/{}/o", encode(&self.bucket))
    }

    /// The URL path for object-scoped requests.
    pub(crate) fn full_server_url(&self) -> String {
        format!("/b/{}/o/{}", encode(&self.bucket), encode(&self.path))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.path)
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn encode(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

fn decode(component: &str) -> Result<String> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| Error::invalid_argument("URL is not valid UTF-8").with_source(e))
}
