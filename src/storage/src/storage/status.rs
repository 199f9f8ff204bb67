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

//! Maps HTTP status codes to domain errors.

use super::request_info::RawResponse;
use crate::Error;
use crate::location::Location;

/// The service includes this text in 401 responses caused by App Check.
const APP_CHECK_INVALID: &str = "Firebase App Check token is invalid";

/// The kind of resource a request refers to.
///
/// Only object-scoped requests refine 404 into
/// [object not found][crate::error::ErrorCode::ObjectNotFound]. For
/// bucket-scoped requests, such as listing or starting an upload, a 404 says
/// nothing about the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scope {
    Bucket,
    Object,
}

/// Classifies a non-success response.
pub(crate) fn translate(response: &RawResponse, location: &Location, scope: Scope) -> Error {
    let body = response.text();
    let error = match response.status {
        401 if body.contains(APP_CHECK_INVALID) || response.status_text.contains(APP_CHECK_INVALID) => {
            Error::unauthorized_app()
        }
        401 => Error::unauthenticated(),
        402 => Error::quota_exceeded(location.bucket()),
        403 => Error::unauthorized(location.path()),
        404 if scope == Scope::Object => Error::object_not_found(location.path()),
        416 => Error::range_not_satisfiable(),
        status => Error::unknown(format!(
            "unexpected HTTP status code {status} {}",
            response.status_text
        )),
    };
    error.with_http_response(response.status, body)
}
