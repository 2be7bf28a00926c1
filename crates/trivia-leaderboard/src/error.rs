//! Typed rejection for a score submission call.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use trivia_core::TriviaError;

/// Error category sent back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unauthenticated,
    InvalidArgument,
    FailedPrecondition,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidArgument => "invalid-argument",
            Self::FailedPrecondition => "failed-precondition",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializes as `{ "code": "...", "message": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{code}: {message}")]
pub struct SubmissionError {
    pub code: ErrorCode,
    pub message: String,
}

impl SubmissionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "sign in to submit a score")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedPrecondition, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl From<TriviaError> for SubmissionError {
    fn from(err: TriviaError) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let err = SubmissionError::failed_precondition("too fast");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({ "code": "failed-precondition", "message": "too fast" })
        );
        assert_eq!(err.to_string(), "failed-precondition: too fast");
    }

    #[test]
    fn test_storage_errors_are_internal() {
        let err: SubmissionError = TriviaError::storage("disk full").into();
        assert_eq!(err.code, ErrorCode::Internal);
    }
}
