//! Resolution results stored against links.

use serde::{Deserialize, Serialize};

/// Outcome of resolving a link: the node's data or a per-link error.
///
/// Errors here are data-level. They flow through reads without failing the
/// caller and render as inline error items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadResult<T> {
    /// Resolved value.
    Data(T),
    /// Per-link failure message.
    Error(String),
}

impl<T> ReadResult<T> {
    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Get the data, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Data(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    /// Get the error message, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Data(_) => None,
            Self::Error(message) => Some(message),
        }
    }

    /// Check if this is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Map the data, keeping errors as-is.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReadResult<U> {
        match self {
            Self::Data(value) => ReadResult::Data(f(value)),
            Self::Error(message) => ReadResult::Error(message),
        }
    }

    /// Convert into a standard `Result`.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Data(value) => Ok(value),
            Self::Error(message) => Err(message),
        }
    }
}

impl<T> From<Result<T, String>> for ReadResult<T> {
    fn from(result: Result<T, String>) -> Self {
        match result {
            Ok(value) => Self::Data(value),
            Err(message) => Self::Error(message),
        }
    }
}
