//! Local generate API backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{classify_transport_error, Backend, GenerationRequest, TextGenerator};
use crate::config::LocalConfig;
use crate::core::CallFailure;
use crate::errors::PromptforgeError;

/// Async client for a locally hosted generate API.
///
/// System and user text are flattened into one prompt; the request asks for
/// a single non-streamed response.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    /// Builds a client for the configured local service.
    pub fn new(config: &LocalConfig, timeout: Duration) -> Result<Self, PromptforgeError> {
        if config.model.trim().is_empty() {
            return Err(PromptforgeError::Config("missing local model name".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| PromptforgeError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Overrides the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Returns the model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn probe(&self) -> Result<(), PromptforgeError> {
        let endpoint = self.url("/api/tags");
        let resp = self
            .client
            .get(&endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|err| PromptforgeError::service_unavailable(&endpoint, err.to_string()))?;
        if !resp.status().is_success() {
            return Err(PromptforgeError::service_unavailable(
                &endpoint,
                format!("status {}", resp.status()),
            ));
        }
        info!(endpoint = %endpoint, model = %self.model, "Local service reachable");
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, CallFailure> {
        let prompt = request.flattened();
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature.unwrap_or(self.temperature),
                num_predict: request.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(self.url("/api/generate"))
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
            return Err(CallFailure::retryable(format!(
                "local API returned {status}: {text}"
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|err| CallFailure::retryable(format!("malformed local response: {err}")))?;
        debug!(
            model = %self.model,
            chars = parsed.response.chars().count(),
            "Local call finished"
        );
        Ok(parsed.response)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_and_model_override() {
        let config = LocalConfig {
            base_url: "http://127.0.0.1:11434/".to_string(),
            ..LocalConfig::default()
        };
        let generator = OllamaGenerator::new(&config, Duration::from_secs(5))
            .unwrap()
            .with_model("nano-prompt");
        assert_eq!(generator.url("/api/tags"), "http://127.0.0.1:11434/api/tags");
        assert_eq!(generator.model(), "nano-prompt");
        assert_eq!(generator.backend(), Backend::Local);
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            model: "m",
            prompt: "p",
            stream: false,
            options: GenerateOptions {
                temperature: 0.5,
                num_predict: 100,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], serde_json::json!(false));
        assert_eq!(json["options"]["num_predict"], serde_json::json!(100));
    }

    #[test]
    fn test_missing_response_field_is_empty() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(parsed.response.is_empty());
    }

    #[tokio::test]
    async fn test_probe_unreachable_is_service_unavailable() {
        let config = LocalConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..LocalConfig::default()
        };
        let generator = OllamaGenerator::new(&config, Duration::from_secs(1)).unwrap();
        let err = generator.probe().await.unwrap_err();
        assert!(err.is_precondition());
    }
}
