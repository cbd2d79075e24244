//! Error types for the promptforge pipeline.
//!
//! Only run-level failures live here. A single external call that fails is
//! not an error of the run: it is reported through
//! [`CallFailure`](crate::core::CallFailure) and absorbed by the dispatcher.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// The main error type for promptforge operations.
///
/// Every variant is fatal: the stage stops before (or, for
/// [`ServiceFatal`](Self::ServiceFatal), right after flushing) any further
/// external calls.
#[derive(Debug, Error)]
pub enum PromptforgeError {
    /// The input file does not exist.
    #[error("Input not found: {}", path.display())]
    InputNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The input exists but does not carry the required fields.
    #[error("Malformed input {}: {reason}", path.display())]
    MalformedInput {
        /// The offending path.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// The existing output file could not be read back as a ledger.
    #[error("Corrupt ledger {}: {reason}; refusing to overwrite prior work", path.display())]
    CorruptLedger {
        /// The ledger path.
        path: PathBuf,
        /// Why it could not be parsed.
        reason: String,
    },

    /// The text-generation service failed its startup probe.
    #[error("Service unavailable at {endpoint}: {reason}")]
    ServiceUnavailable {
        /// The probed endpoint.
        endpoint: String,
        /// The probe failure.
        reason: String,
    },

    /// The text-generation service rejected a call in a way retries cannot fix.
    #[error("Service rejected request for record {index}: {reason}")]
    ServiceFatal {
        /// The record whose call surfaced the failure.
        index: usize,
        /// The service's explanation.
        reason: String,
    },

    /// Invalid configuration or missing credentials.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PromptforgeError {
    /// Creates an input-not-found error.
    #[must_use]
    pub fn input_not_found(path: impl AsRef<Path>) -> Self {
        Self::InputNotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Creates a malformed-input error.
    #[must_use]
    pub fn malformed_input(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Creates a corrupt-ledger error.
    #[must_use]
    pub fn corrupt_ledger(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::CorruptLedger {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Creates a service-unavailable error.
    #[must_use]
    pub fn service_unavailable(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Returns the short machine-readable kind of this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputNotFound { .. } => "input_not_found",
            Self::MalformedInput { .. } => "malformed_input",
            Self::CorruptLedger { .. } => "corrupt_ledger",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::ServiceFatal { .. } => "service_fatal",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }

    /// Returns true when the failure is a precondition checked before any
    /// external call was made.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InputNotFound { .. }
                | Self::MalformedInput { .. }
                | Self::CorruptLedger { .. }
                | Self::ServiceUnavailable { .. }
                | Self::Config(_)
        )
    }
}

impl From<serde_json::Error> for PromptforgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_not_found_message() {
        let err = PromptforgeError::input_not_found("data/raw/prompts.csv");
        assert_eq!(err.to_string(), "Input not found: data/raw/prompts.csv");
        assert_eq!(err.kind(), "input_not_found");
    }

    #[test]
    fn test_corrupt_ledger_mentions_refusal() {
        let err = PromptforgeError::corrupt_ledger("out.json", "expected value at line 1");
        assert!(err.to_string().contains("refusing to overwrite"));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_service_fatal_is_not_precondition() {
        let err = PromptforgeError::ServiceFatal {
            index: 4,
            reason: "401 invalid x-api-key".to_string(),
        };
        assert!(!err.is_precondition());
        assert!(err.to_string().contains("record 4"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: PromptforgeError = parse.unwrap_err().into();
        assert_eq!(err.kind(), "serialization");
    }
}
