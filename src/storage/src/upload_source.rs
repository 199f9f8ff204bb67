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

//! Data sources for uploads.
//!
//! Resumable uploads send the data in several chunks, and may need to resend
//! a chunk after a transient failure. The upload source must therefore
//! support reading any byte range, any number of times.

/// A read-only source of data for uploads.
///
/// Implementations must return the same bytes for the same range on every
/// call. Reading a range never consumes or changes the source.
pub trait UploadSource: std::fmt::Debug + Send + Sync {
    /// The total size of the data, in bytes.
    fn size(&self) -> u64;

    /// The MIME type of the data, if known.
    fn content_type(&self) -> Option<String> {
        None
    }

    /// Returns the bytes in `[start, end)`.
    ///
    /// Returns `None` if the range cannot be produced, for example, because
    /// the range is out of bounds or the underlying data is no longer
    /// available.
    fn slice(&self, start: u64, end: u64) -> Option<bytes::Bytes>;
}

/// An in-memory upload source.
///
/// Cloning a `Blob` and slicing it are cheap, neither copies the data.
///
/// # Example
/// ```
/// # use firebase_storage::upload_source::{Blob, UploadSource};
/// let blob = Blob::from("the quick brown fox").with_content_type("text/plain");
/// assert_eq!(blob.size(), 19);
/// assert_eq!(blob.slice(4, 9).as_deref(), Some(b"quick".as_slice()));
/// assert_eq!(blob.content_type().as_deref(), Some("text/plain"));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blob {
    data: bytes::Bytes,
    content_type: Option<String>,
}

impl Blob {
    pub fn new<V: Into<bytes::Bytes>>(data: V) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    /// Sets the MIME type used when the upload metadata does not set one.
    pub fn with_content_type<V: Into<String>>(mut self, v: V) -> Self {
        self.content_type = Some(v.into());
        self
    }

    /// The full contents of the blob.
    pub fn bytes(&self) -> &bytes::Bytes {
        &self.data
    }
}

impl UploadSource for Blob {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn content_type(&self) -> Option<String> {
        self.content_type.clone()
    }

    fn slice(&self, start: u64, end: u64) -> Option<bytes::Bytes> {
        let start = usize::try_from(start).ok()?;
        let end = usize::try_from(end).ok()?;
        if start > end || end > self.data.len() {
            return None;
        }
        Some(self.data.slice(start..end))
    }
}

impl From<bytes::Bytes> for Blob {
    fn from(value: bytes::Bytes) -> Self {
        Self::new(value)
    }
}

impl From<&'static str> for Blob {
    fn from(value: &'static str) -> Self {
        Self::new(bytes::Bytes::from_static(value.as_bytes()))
    }
}

impl From<&'static [u8]> for Blob {
    fn from(value: &'static [u8]) -> Self {
        Self::new(bytes::Bytes::from_static(value))
    }
}

impl From<String> for Blob {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for Blob {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use test_case::test_case;

    mockall::mock! {
        #[derive(Debug)]
        pub(crate) Source {}

        impl UploadSource for Source {
            fn size(&self) -> u64;
            fn content_type(&self) -> Option<String>;
            fn slice(&self, start: u64, end: u64) -> Option<bytes::Bytes>;
        }
    }

    #[test_case(0, 0, Some(""))]
    #[test_case(0, 3, Some("the"))]
    #[test_case(4, 9, Some("quick"))]
    #[test_case(10, 10, Some(""))]
    #[test_case(0, 10, Some("the quick "))]
    #[test_case(5, 4, None)]
    #[test_case(0, 11, None)]
    #[test_case(11, 12, None)]
    fn slice(start: u64, end: u64, want: Option<&str>) {
        let blob = Blob::from("the quick ");
        let got = blob.slice(start, end);
        assert_eq!(got.as_deref(), want.map(str::as_bytes), "{blob:?}");
    }

    #[test]
    fn slice_does_not_consume() {
        let blob = Blob::from(vec![1_u8, 2, 3, 4]);
        let first = blob.slice(1, 3);
        let second = blob.slice(1, 3);
        assert_eq!(first, second);
        assert_eq!(blob.size(), 4);
        assert_eq!(blob.bytes().as_ref(), &[1_u8, 2, 3, 4]);
    }

    #[test]
    fn conversions() {
        assert_eq!(Blob::from("abc").size(), 3);
        assert_eq!(Blob::from(String::from("abcd")).size(), 4);
        assert_eq!(Blob::from(b"ab".as_slice()).size(), 2);
        assert_eq!(Blob::from(bytes::Bytes::from_static(b"a")).size(), 1);
        assert!(Blob::from("x").content_type().is_none());
    }
}
