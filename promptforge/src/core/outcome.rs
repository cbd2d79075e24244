//! Typed outcomes of external calls.

use std::fmt;

/// Why a single attempt at an external call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// Network error, timeout, non-success status or unusable response.
    Retryable(String),
    /// The service refused the request in a way retries cannot fix
    /// (bad credentials, forbidden).
    Fatal(String),
}

impl CallFailure {
    /// Creates a retryable failure.
    #[must_use]
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable(reason.into())
    }

    /// Creates a fatal failure.
    #[must_use]
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    /// Returns true if another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Returns the failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Retryable(reason) | Self::Fatal(reason) => reason,
        }
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable(reason) => write!(f, "retryable: {reason}"),
            Self::Fatal(reason) => write!(f, "fatal: {reason}"),
        }
    }
}

/// The final result of a call after the retry wrapper is done with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The call produced a usable value.
    Completed(T),
    /// Every attempt failed with a retryable failure.
    Exhausted {
        /// How many attempts were made.
        attempts: usize,
        /// The failure reported by the last attempt.
        last_error: String,
    },
    /// An attempt failed fatally; no further attempts were made.
    Fatal {
        /// The failure reason.
        reason: String,
    },
}

impl<T> CallOutcome<T> {
    /// Returns true if the call completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the value if the call completed.
    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Maps the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            Self::Completed(value) => CallOutcome::Completed(f(value)),
            Self::Exhausted {
                attempts,
                last_error,
            } => CallOutcome::Exhausted {
                attempts,
                last_error,
            },
            Self::Fatal { reason } => CallOutcome::Fatal { reason },
        }
    }
}
