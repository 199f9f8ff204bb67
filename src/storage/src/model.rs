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

//! The data types sent to and received from Firebase Storage.

use crate::location::Location;
use crate::{Error, Result};
use serde_with::formats::CommaSeparator;
use serde_with::{DisplayFromStr, PickFirst, StringWithSeparator};
use std::collections::BTreeMap;

/// The metadata for an object, as returned by the service.
#[serde_with::serde_as]
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct ObjectMetadata {
    /// The bucket containing the object.
    pub bucket: String,

    /// The object generation, as a decimal string.
    pub generation: String,

    /// The metadata generation, as a decimal string.
    pub metageneration: String,

    /// The full path of the object within the bucket.
    #[serde(rename = "name")]
    pub full_path: String,

    /// The object size in bytes.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub size: u64,

    /// The creation time, in RFC 3339 format.
    pub time_created: String,

    /// The last update time, in RFC 3339 format.
    pub updated: String,

    /// The base64-encoded MD5 hash of the object contents.
    pub md5_hash: Option<String>,

    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: Option<String>,

    /// Application-defined key/value pairs.
    #[serde(rename = "metadata")]
    pub custom_metadata: BTreeMap<String, String>,

    /// Tokens that grant public read access through download URLs.
    #[serde_as(as = "StringWithSeparator::<CommaSeparator, String>")]
    pub download_tokens: Vec<String>,
}

impl ObjectMetadata {
    /// The last component of [full_path][ObjectMetadata::full_path].
    pub fn name(&self) -> &str {
        self.full_path
            .rsplit_once('/')
            .map(|(_, n)| n)
            .unwrap_or(&self.full_path)
    }

    /// The location of this object.
    pub fn location(&self) -> Location {
        Location::new(self.bucket.clone(), &self.full_path)
    }

    pub(crate) fn from_json(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| Error::unknown("cannot parse the object metadata").with_source(e))
    }
}

/// The metadata fields an application can change.
///
/// Fields set to `None` are left unchanged by
/// [update_metadata()][crate::client::Storage::update_metadata].
///
/// # Example
/// ```
/// # use firebase_storage::model::SettableMetadata;
/// let metadata = SettableMetadata::new()
///     .set_content_type("image/png")
///     .set_custom_metadata([("owner", "cat")]);
/// assert_eq!(metadata.content_type.as_deref(), Some("image/png"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SettableMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "metadata", skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<BTreeMap<String, String>>,
}

impl SettableMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cache_control<V: Into<String>>(mut self, v: V) -> Self {
        self.cache_control = Some(v.into());
        self
    }

    pub fn set_content_disposition<V: Into<String>>(mut self, v: V) -> Self {
        self.content_disposition = Some(v.into());
        self
    }

    pub fn set_content_encoding<V: Into<String>>(mut self, v: V) -> Self {
        self.content_encoding = Some(v.into());
        self
    }

    pub fn set_content_language<V: Into<String>>(mut self, v: V) -> Self {
        self.content_language = Some(v.into());
        self
    }

    pub fn set_content_type<V: Into<String>>(mut self, v: V) -> Self {
        self.content_type = Some(v.into());
        self
    }

    pub fn set_custom_metadata<I, K, V>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.custom_metadata = Some(v.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }
}

/// The metadata for a new object.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UploadMetadata {
    #[serde(flatten)]
    pub settable: SettableMetadata,

    /// The base64-encoded MD5 hash of the data, verified by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5_hash: Option<String>,
}

impl UploadMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_md5_hash<V: Into<String>>(mut self, v: V) -> Self {
        self.md5_hash = Some(v.into());
        self
    }

    pub fn set_content_type<V: Into<String>>(mut self, v: V) -> Self {
        self.settable = self.settable.set_content_type(v);
        self
    }

    pub fn set_settable(mut self, v: SettableMetadata) -> Self {
        self.settable = v;
        self
    }
}

impl From<SettableMetadata> for UploadMetadata {
    fn from(value: SettableMetadata) -> Self {
        Self::new().set_settable(value)
    }
}

/// The resource sent in multipart uploads and when starting resumable
/// uploads.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadResource<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub metadata: &'a UploadMetadata,
}

/// Options for [list()][crate::client::Storage::list].
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct ListOptions {
    /// The maximum number of results per page, between 1 and 1000.
    pub max_results: Option<u32>,

    /// Continue a previous listing.
    pub page_token: Option<String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_results(mut self, v: u32) -> Self {
        self.max_results = Some(v);
        self
    }

    pub fn set_page_token<V: Into<String>>(mut self, v: V) -> Self {
        self.page_token = Some(v.into());
        self
    }
}

/// One page of results from [list()][crate::client::Storage::list].
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct ListResult {
    /// The "folders" directly under the listed location.
    pub prefixes: Vec<Location>,

    /// The objects directly under the listed location.
    pub items: Vec<Location>,

    /// Set if there are more results.
    pub next_page_token: Option<String>,
}

impl ListResult {
    pub(crate) fn from_json(bucket: &str, body: &[u8]) -> Result<Self> {
        #[derive(serde::Deserialize, Default)]
        #[serde(default)]
        struct Item {
            name: String,
        }
        #[derive(serde::Deserialize, Default)]
        #[serde(default, rename_all = "camelCase")]
        struct Page {
            prefixes: Vec<String>,
            items: Vec<Item>,
            next_page_token: Option<String>,
        }

        let page = serde_json::from_slice::<Page>(body)
            .map_err(|e| Error::unknown("cannot parse the list response").with_source(e))?;
        Ok(Self {
            prefixes: page
                .prefixes
                .iter()
                .map(|p| Location::new(bucket, p.trim_end_matches('/')))
                .collect(),
            items: page
                .items
                .iter()
                .map(|i| Location::new(bucket, &i.name))
                .collect(),
            next_page_token: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}

/// The progress of a resumable upload, as acknowledged by the service.
///
/// Values of this type are never modified. Each exchange with the service
/// produces a new value.
#[derive(Clone, Debug, PartialEq)]
pub struct ResumableUploadStatus {
    current: u64,
    total: u64,
    metadata: Option<Box<ObjectMetadata>>,
}

impl ResumableUploadStatus {
    /// An upload in progress.
    ///
    /// Fails if the service reports more bytes than the upload contains.
    pub(crate) fn partial(current: u64, total: u64) -> Result<Self> {
        if current > total {
            return Err(Error::server_file_wrong_size(format!(
                "the service reports {current} bytes received, but the upload has only {total}"
            )));
        }
        Ok(Self {
            current,
            total,
            metadata: None,
        })
    }

    /// A committed upload.
    ///
    /// Fails if the service finalized the upload before receiving all the
    /// bytes.
    pub(crate) fn committed(current: u64, total: u64, metadata: ObjectMetadata) -> Result<Self> {
        if current != total {
            return Err(Error::server_file_wrong_size(format!(
                "the service finalized the upload at {current} bytes, expected {total}"
            )));
        }
        Ok(Self {
            current,
            total,
            metadata: Some(Box::new(metadata)),
        })
    }

    /// The number of bytes acknowledged by the service.
    pub fn current(&self) -> u64 {
        self.current
    }

    /// The size of the upload.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// The service has committed the object.
    pub fn finalized(&self) -> bool {
        self.metadata.is_some()
    }

    /// The committed object metadata, present iff the upload is finalized.
    pub fn metadata(&self) -> Option<&ObjectMetadata> {
        self.metadata.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn object_metadata() -> anyhow::Result<()> {
        let body = json!({
            "bucket": "my-bucket",
            "generation": "123",
            "metageneration": "1",
            "name": "images/cat.png",
            "size": "500000",
            "timeCreated": "2025-01-02T03:04:05.000Z",
            "updated": "2025-01-02T03:04:05.000Z",
            "md5Hash": "d63R1fQSI9VYL8pzalyzNQ==",
            "contentType": "image/png",
            "metadata": {"owner": "cat"},
            "downloadTokens": "token-1,token-2",
            "unknownField": true,
        });
        let got = ObjectMetadata::from_json(body.to_string().as_bytes())?;
        assert_eq!(got.bucket, "my-bucket");
        assert_eq!(got.full_path, "images/cat.png");
        assert_eq!(got.name(), "cat.png");
        assert_eq!(got.size, 500000);
        assert_eq!(got.content_type.as_deref(), Some("image/png"));
        assert_eq!(got.custom_metadata.get("owner").map(String::as_str), Some("cat"));
        assert_eq!(got.download_tokens, vec!["token-1", "token-2"]);
        assert_eq!(got.location(), Location::new("my-bucket", "images/cat.png"));
        Ok(())
    }

    #[test]
    fn object_metadata_numeric_size() -> anyhow::Result<()> {
        let got = ObjectMetadata::from_json(br#"{"name": "a", "size": 42}"#)?;
        assert_eq!(got.size, 42);
        assert!(got.download_tokens.is_empty(), "{got:?}");
        Ok(())
    }

    #[test]
    fn object_metadata_error() {
        let err = ObjectMetadata::from_json(b"not json").expect_err("bad input should fail");
        assert_eq!(err.code(), ErrorCode::Unknown);
    }

    #[test]
    fn settable_metadata() -> anyhow::Result<()> {
        let metadata = SettableMetadata::new()
            .set_cache_control("no-cache")
            .set_content_disposition("inline")
            .set_content_encoding("gzip")
            .set_content_language("en")
            .set_content_type("text/plain")
            .set_custom_metadata([("k0", "v0")]);
        let got = serde_json::to_value(&metadata)?;
        let want = json!({
            "cacheControl": "no-cache",
            "contentDisposition": "inline",
            "contentEncoding": "gzip",
            "contentLanguage": "en",
            "contentType": "text/plain",
            "metadata": {"k0": "v0"},
        });
        assert_eq!(got, want);

        let got = serde_json::to_value(SettableMetadata::new())?;
        assert_eq!(got, json!({}));
        Ok(())
    }

    #[test]
    fn upload_resource() -> anyhow::Result<()> {
        let metadata = UploadMetadata::new()
            .set_content_type("text/plain")
            .set_md5_hash("abc=");
        let resource = UploadResource {
            name: "a/b.txt",
            metadata: &metadata,
        };
        let got = serde_json::to_value(&resource)?;
        let want = json!({"name": "a/b.txt", "contentType": "text/plain", "md5Hash": "abc="});
        assert_eq!(got, want);
        Ok(())
    }

    #[test]
    fn list_result() -> anyhow::Result<()> {
        let body = json!({
            "prefixes": ["dir/a/", "dir/b/"],
            "items": [{"name": "dir/x.txt", "bucket": "b"}],
            "nextPageToken": "next",
        });
        let got = ListResult::from_json("b", body.to_string().as_bytes())?;
        assert_eq!(
            got.prefixes,
            vec![Location::new("b", "dir/a"), Location::new("b", "dir/b")]
        );
        assert_eq!(got.items, vec![Location::new("b", "dir/x.txt")]);
        assert_eq!(got.next_page_token.as_deref(), Some("next"));

        let got = ListResult::from_json("b", b"{}")?;
        assert_eq!(got, ListResult::default());
        Ok(())
    }

    #[test]
    fn resumable_status() -> anyhow::Result<()> {
        let status = ResumableUploadStatus::partial(100, 500)?;
        assert_eq!((status.current(), status.total()), (100, 500));
        assert!(!status.finalized());
        assert!(status.metadata().is_none());

        let err = ResumableUploadStatus::partial(501, 500).expect_err("too much progress");
        assert_eq!(err.code(), ErrorCode::ServerFileWrongSize);

        let status = ResumableUploadStatus::committed(500, 500, ObjectMetadata::default())?;
        assert!(status.finalized());
        assert!(status.metadata().is_some());

        let err = ResumableUploadStatus::committed(499, 500, ObjectMetadata::default())
            .expect_err("short finalize");
        assert_eq!(err.code(), ErrorCode::ServerFileWrongSize);
        Ok(())
    }

    #[test]
    fn list_options() {
        let options = ListOptions::new().set_max_results(10).set_page_token("t");
        assert_eq!(options.max_results, Some(10));
        assert_eq!(options.page_token.as_deref(), Some("t"));
    }
}
