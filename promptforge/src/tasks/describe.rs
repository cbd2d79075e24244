//! Short-description task.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{parse, render, AnnotationTask};
use crate::config::PipelineConfig;
use crate::core::{CallFailure, DerivedResult, SourceRecord};
use crate::providers::{truncate_chars, Backend, GenerationRequest, TextGenerator};

/// How a describe response is turned into a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStyle {
    /// Use the trimmed response as-is.
    Verbatim,
    /// Strip reasoning chatter and take the first line that fits.
    FirstAcceptableLine,
}

impl From<Backend> for ResponseStyle {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Hosted => Self::Verbatim,
            Backend::Local => Self::FirstAcceptableLine,
        }
    }
}

/// Asks the backend for a short description of each prompt.
pub struct DescribeTask {
    generator: Arc<dyn TextGenerator>,
    system: String,
    user_template: String,
    char_limit: usize,
    max_output_tokens: u32,
    temperature: Option<f32>,
    style: ResponseStyle,
}

impl DescribeTask {
    /// Builds the task for the generator's backend kind.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, config: &PipelineConfig) -> Self {
        let prompts = &config.prompts;
        let backend = generator.backend();
        match backend {
            Backend::Hosted => Self {
                generator,
                system: prompts.hosted_describe_system.clone(),
                user_template: prompts.hosted_describe_user.clone(),
                char_limit: config.hosted.prompt_char_limit,
                max_output_tokens: config.hosted.describe_max_tokens,
                temperature: None,
                style: ResponseStyle::from(backend),
            },
            Backend::Local => Self {
                generator,
                system: prompts.local_describe_system.clone(),
                user_template: prompts.local_describe_user.clone(),
                char_limit: config.local.prompt_char_limit,
                max_output_tokens: config.local.num_predict,
                temperature: Some(config.local.temperature),
                style: ResponseStyle::from(backend),
            },
        }
    }

    /// Returns the response style.
    #[must_use]
    pub fn style(&self) -> ResponseStyle {
        self.style
    }

    /// Builds the request for one record.
    #[must_use]
    pub fn request_for(&self, record: &SourceRecord) -> GenerationRequest {
        let prompt = truncate_chars(&record.prompt, self.char_limit);
        let user = render(
            &self.user_template,
            &[("PROMPT_TYPE", record.category.as_str()), ("PROMPT", prompt)],
        );
        let request = GenerationRequest::new(self.system.clone(), user, self.max_output_tokens);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }

    fn parse(&self, raw: &str) -> Result<String, CallFailure> {
        match self.style {
            ResponseStyle::Verbatim => {
                let text = raw.trim();
                if text.is_empty() {
                    Err(CallFailure::retryable("empty description"))
                } else {
                    Ok(text.to_string())
                }
            }
            ResponseStyle::FirstAcceptableLine => parse::first_acceptable_line(raw)
                .ok_or_else(|| CallFailure::retryable("no acceptable description line")),
        }
    }
}

#[async_trait]
impl AnnotationTask for DescribeTask {
    fn name(&self) -> &str {
        "describe"
    }

    async fn run(&self, record: &SourceRecord) -> Result<Vec<DerivedResult>, CallFailure> {
        let request = self.request_for(record);
        let raw = self.generator.generate(&request).await?;
        let description = self.parse(&raw)?;
        debug!(index = record.index, description = %description, "Described record");
        Ok(vec![DerivedResult::original(record, description)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockTextGenerator;
    use mockall::predicate::always;

    fn mock(backend: Backend, reply: &'static str) -> Arc<dyn TextGenerator> {
        let mut generator = MockTextGenerator::new();
        generator.expect_backend().return_const(backend);
        generator
            .expect_generate()
            .with(always())
            .times(1)
            .returning(move |_| Ok(reply.to_string()));
        Arc::new(generator)
    }

    #[tokio::test]
    async fn test_hosted_uses_trimmed_response() {
        let task = DescribeTask::new(mock(Backend::Hosted, "  霓虹街头女孩 \n"), &PipelineConfig::hosted_annotate());
        let record = SourceRecord::new(7, "a neon girl", "text");

        let results = task.run(&record).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].derived_text, "霓虹街头女孩");
        assert_eq!(results[0].source_index, 7);
        assert!(!results[0].is_variant);
    }

    #[tokio::test]
    async fn test_local_filters_reasoning() {
        let task = DescribeTask::new(
            mock(Backend::Local, "<think>hmm</think>\n输出：咖啡馆里看书的女生"),
            &PipelineConfig::local_annotate(),
        );
        assert_eq!(task.style(), ResponseStyle::FirstAcceptableLine);

        let results = task.run(&SourceRecord::new(0, "p", "text")).await.unwrap();
        assert_eq!(results[0].derived_text, "咖啡馆里看书的女生");
    }

    #[tokio::test]
    async fn test_unusable_response_is_retryable() {
        let task = DescribeTask::new(mock(Backend::Local, "好"), &PipelineConfig::local_annotate());
        let err = task.run(&SourceRecord::new(0, "p", "text")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_request_truncates_prompt_and_sets_type() {
        let mut generator = MockTextGenerator::new();
        generator.expect_backend().return_const(Backend::Hosted);
        let mut config = PipelineConfig::hosted_annotate();
        config.hosted.prompt_char_limit = 4;
        let task = DescribeTask::new(Arc::new(generator), &config);

        let request = task.request_for(&SourceRecord::new(0, "abcdefgh", "json"));
        assert!(request.user.contains("提示词类型：json"));
        assert!(request.user.contains("abcd"));
        assert!(!request.user.contains("abcde"));
        assert_eq!(request.max_output_tokens, 100);
        assert_eq!(request.temperature, None);
    }
}
