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

//! Backoff policies for the retry loops.
//!
//! The client waits between attempts of a single-shot request, and between a
//! failed resumable chunk and the status query that recovers from it. The
//! policy types come from [google_cloud_gax]; this module re-exports them so
//! applications can configure [ClientBuilder][crate::client::ClientBuilder]
//! without a direct dependency.

pub use google_cloud_gax::backoff_policy::BackoffPolicy;
pub use google_cloud_gax::exponential_backoff::{
    Error, ExponentialBackoff, ExponentialBackoffBuilder,
};
use std::sync::Arc;
use std::time::Duration;

/// The first delay after a failed attempt.
const INITIAL_DELAY: Duration = Duration::from_secs(1);

/// No single wait exceeds this, even late in a long resumable upload.
const MAXIMUM_DELAY: Duration = Duration::from_secs(60);

/// The default backoff for Firebase Storage requests.
///
/// Exponential backoff with jitter, starting at one second and doubling on
/// each attempt, up to one minute.
pub(crate) fn default() -> Arc<dyn BackoffPolicy> {
    Arc::new(
        ExponentialBackoffBuilder::new()
            .with_initial_delay(INITIAL_DELAY)
            .with_maximum_delay(MAXIMUM_DELAY)
            .with_scaling(2.0)
            .clamp(),
    )
}
