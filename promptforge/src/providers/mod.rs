//! Text-generation backends.
//!
//! Two interchangeable backends sit behind [`TextGenerator`]: a hosted
//! messages API and a local generate API. Each call reports a typed
//! [`CallFailure`] so the retry wrapper can tell transient trouble from a
//! rejected request.

mod anthropic;
mod ollama;

pub use anthropic::AnthropicGenerator;
pub use ollama::OllamaGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::CallFailure;
use crate::errors::PromptforgeError;

/// Which kind of backend produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Hosted messages API.
    Hosted,
    /// Local generate API.
    Local,
}

/// One generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System instructions.
    pub system: String,
    /// The single user message.
    pub user: String,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
    /// Sampling temperature; backend default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_output_tokens,
            temperature: None,
        }
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Flattens system and user text into a single prompt string.
    #[must_use]
    pub fn flattened(&self) -> String {
        if self.system.trim().is_empty() {
            self.user.clone()
        } else {
            format!("{}\n\n{}", self.system, self.user)
        }
    }
}

/// Trait implemented by concrete text-generation backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the backend kind.
    fn backend(&self) -> Backend;

    /// Checks once, before any work starts, that the service is reachable.
    async fn probe(&self) -> Result<(), PromptforgeError>;

    /// Generates text for one request. One call, no retries.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, CallFailure>;
}

/// Truncates `text` to at most `limit` characters.
#[must_use]
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

pub(crate) fn classify_transport_error(err: &reqwest::Error) -> CallFailure {
    if err.is_timeout() {
        CallFailure::retryable(format!("request timed out: {err}"))
    } else if err.is_connect() {
        CallFailure::retryable(format!("connection failed: {err}"))
    } else {
        CallFailure::retryable(format!("request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattened_joins_with_blank_line() {
        let request = GenerationRequest::new("系统", "用户", 100);
        assert_eq!(request.flattened(), "系统\n\n用户");

        let bare = GenerationRequest::new("  ", "only user", 100);
        assert_eq!(bare.flattened(), "only user");
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("霓虹街头女孩", 4), "霓虹街头");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_request_serializes_without_unset_temperature() {
        let request = GenerationRequest::new("s", "u", 10);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());

        let hot = request.with_temperature(0.7);
        assert_eq!(hot.temperature, Some(0.7));
    }
}
