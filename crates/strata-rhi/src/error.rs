// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the error type shared by every RHI operation.

use thiserror::Error;

/// The coarse outcome of an RHI operation.
///
/// Every [`RhiError`] maps onto exactly one code, which lets callers branch on the
/// category of a failure without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// The operation completed.
    Success,
    /// A generic backend failure.
    Fail,
    /// The API was misused, typically by calling into an object in the wrong state.
    InvalidOperation,
    /// An argument was out of range or referenced something that does not exist.
    InvalidArgument,
    /// A memory budget was exhausted.
    OutOfMemory,
    /// A wait expired before the awaited work completed.
    NotReady,
}

impl ResultCode {
    /// Returns the code describing the given result.
    pub fn from_result<T>(result: &RhiResult<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Success,
            Err(err) => err.code(),
        }
    }
}

/// An error raised by the RHI core or by a backend.
#[derive(Debug, Error)]
pub enum RhiError {
    /// A generic failure, usually reported by the backend.
    #[error("operation failed: {0}")]
    Fail(String),

    /// The object was not in a state that allows the operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A pool or heap budget would be exceeded.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// A blocking wait timed out.
    #[error("not ready: {0}")]
    NotReady(String),

    /// A generational handle outlived the object it referenced.
    #[error("stale {0} handle")]
    StaleHandle(&'static str),

    /// A configuration file could not be read or parsed.
    #[error("failed to load configuration from '{path}': {reason}")]
    Configuration {
        /// The path of the file that failed to load.
        path: String,
        /// The underlying I/O or parse error.
        reason: String,
    },
}

impl RhiError {
    /// Returns the [`ResultCode`] category of this error.
    pub fn code(&self) -> ResultCode {
        match self {
            RhiError::Fail(_) | RhiError::Configuration { .. } => ResultCode::Fail,
            RhiError::InvalidOperation(_) => ResultCode::InvalidOperation,
            RhiError::InvalidArgument(_) | RhiError::StaleHandle(_) => ResultCode::InvalidArgument,
            RhiError::OutOfMemory(_) => ResultCode::OutOfMemory,
            RhiError::NotReady(_) => ResultCode::NotReady,
        }
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::error!("{msg}");
        RhiError::InvalidOperation(msg)
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::error!("{msg}");
        RhiError::InvalidArgument(msg)
    }

    pub(crate) fn out_of_memory(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::error!("{msg}");
        RhiError::OutOfMemory(msg)
    }
}

/// Shorthand for results returned by the RHI.
pub type RhiResult<T> = Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_a_code() {
        assert_eq!(RhiError::Fail("x".into()).code(), ResultCode::Fail);
        assert_eq!(
            RhiError::InvalidOperation("x".into()).code(),
            ResultCode::InvalidOperation
        );
        assert_eq!(
            RhiError::InvalidArgument("x".into()).code(),
            ResultCode::InvalidArgument
        );
        assert_eq!(RhiError::OutOfMemory("x".into()).code(), ResultCode::OutOfMemory);
        assert_eq!(RhiError::NotReady("x".into()).code(), ResultCode::NotReady);
        assert_eq!(
            RhiError::StaleHandle("layout").code(),
            ResultCode::InvalidArgument
        );
    }

    #[test]
    fn result_code_from_result() {
        let ok: RhiResult<u32> = Ok(3);
        let err: RhiResult<u32> = Err(RhiError::OutOfMemory("budget".into()));
        assert_eq!(ResultCode::from_result(&ok), ResultCode::Success);
        assert_eq!(ResultCode::from_result(&err), ResultCode::OutOfMemory);
    }

    #[test]
    fn configuration_error_display() {
        let err = RhiError::Configuration {
            path: "limits.ron".to_string(),
            reason: "unexpected token".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "failed to load configuration from 'limits.ron': unexpected token"
        );
    }
}
