//! Hosted messages API backend.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{classify_transport_error, Backend, GenerationRequest, TextGenerator};
use crate::config::HostedConfig;
use crate::core::CallFailure;
use crate::errors::PromptforgeError;

/// Async client for the hosted messages API.
#[derive(Debug, Clone)]
pub struct AnthropicGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl AnthropicGenerator {
    /// Builds a client with an explicit API key.
    pub fn new(
        api_key: &str,
        config: &HostedConfig,
        timeout: Duration,
    ) -> Result<Self, PromptforgeError> {
        if api_key.trim().is_empty() {
            return Err(PromptforgeError::Config("missing hosted API key".into()));
        }
        if config.model.trim().is_empty() {
            return Err(PromptforgeError::Config("missing hosted model name".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| PromptforgeError::Config("invalid hosted API key".into()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&config.api_version)
                .map_err(|_| PromptforgeError::Config("invalid api_version".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| PromptforgeError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    /// Builds a client reading the API key from `config.api_key_env`.
    pub fn from_env(config: &HostedConfig, timeout: Duration) -> Result<Self, PromptforgeError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PromptforgeError::Config(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        Self::new(&api_key, config, timeout)
    }

    /// Returns the messages endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Maps a non-success status to a call failure.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> CallFailure {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        CallFailure::fatal(format!("hosted API returned {status}: {body}"))
    } else {
        CallFailure::retryable(format!("hosted API returned {status}: {body}"))
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    fn backend(&self) -> Backend {
        Backend::Hosted
    }

    async fn probe(&self) -> Result<(), PromptforgeError> {
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CallFailure> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_output_tokens,
            system: &request.system,
            temperature: request.temperature,
            messages: vec![Message {
                role: "user",
                content: &request.user,
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport_error(&err))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_status(status, &text));
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|err| CallFailure::retryable(format!("malformed hosted response: {err}")))?;
        if let Some(usage) = &parsed.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Hosted call usage"
            );
        }

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(CallFailure::retryable("hosted response missing text content"));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
