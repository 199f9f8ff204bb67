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

//! Defines the retry policy for single-shot Firebase Storage requests.
//!
//! The service [recommends] retrying 408, 429, and all 5xx HTTP status codes.
//! Requests that fail before receiving any response are also retried. Each
//! request descriptor may extend the set of retryable status codes.
//!
//! Resumable chunk uploads do not use this policy. Each chunk is sent once,
//! and the upload recovers by querying the service for the number of bytes
//! it received.
//!
//! [recommends]: https://cloud.google.com/storage/docs/retry-strategy

use std::time::{Duration, Instant};

/// The default number of attempts for single-shot requests.
pub(crate) const DEFAULT_ATTEMPT_LIMIT: u32 = 10;

/// The default maximum time spent retrying a single-shot request.
pub(crate) const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(2 * 60);

/// Returns true if a response with `status` should be retried.
pub(crate) fn is_retryable_status(status: u16, additional: &[u16]) -> bool {
    matches!(status, 408 | 429 | 500..600) || additional.contains(&status)
}

/// Limits the number of attempts and the time spent in the retry loop.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RetryPolicy {
    attempt_limit: u32,
    time_limit: Duration,
}

impl RetryPolicy {
    pub fn new(attempt_limit: u32, time_limit: Duration) -> Self {
        Self {
            attempt_limit: attempt_limit.max(1),
            time_limit,
        }
    }

    pub fn attempt_limit(&self) -> u32 {
        self.attempt_limit
    }

    /// Returns true if the loop may start another attempt after waiting for
    /// `delay`.
    pub fn allows(&self, loop_start: Instant, attempt_count: u32, delay: Duration) -> bool {
        if attempt_count >= self.attempt_limit {
            return false;
        }
        loop_start.elapsed() + delay <= self.time_limit
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_LIMIT, DEFAULT_TIME_LIMIT)
    }
}
