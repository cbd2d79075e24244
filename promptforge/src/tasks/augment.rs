//! Paraphrase-variant task.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{parse, render, AnnotationTask};
use crate::config::PipelineConfig;
use crate::core::{CallFailure, DerivedResult, SourceRecord};
use crate::providers::{GenerationRequest, TextGenerator};

/// Emits the original description plus up to two paraphrases of it.
pub struct AugmentTask {
    generator: Arc<dyn TextGenerator>,
    system: String,
    user_template: String,
    max_output_tokens: u32,
}

impl AugmentTask {
    /// Creates the task.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, config: &PipelineConfig) -> Self {
        Self {
            generator,
            system: config.prompts.augment_system.clone(),
            user_template: config.prompts.augment_user.clone(),
            max_output_tokens: config.hosted.augment_max_tokens,
        }
    }

    /// Builds the request for a description.
    #[must_use]
    pub fn request_for(&self, description: &str) -> GenerationRequest {
        GenerationRequest::new(
            self.system.clone(),
            render(&self.user_template, &[("DESCRIPTION", description)]),
            self.max_output_tokens,
        )
    }
}

#[async_trait]
impl AnnotationTask for AugmentTask {
    fn name(&self) -> &str {
        "augment"
    }

    async fn run(&self, record: &SourceRecord) -> Result<Vec<DerivedResult>, CallFailure> {
        let description = record
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| CallFailure::retryable("record has no description to paraphrase"))?;

        let raw = self.generator.generate(&self.request_for(description)).await?;
        let variants = parse::split_variants(&raw);
        if variants.is_empty() {
            return Err(CallFailure::retryable("no variants in response"));
        }
        debug!(index = record.index, variants = variants.len(), "Augmented record");

        let mut results = Vec::with_capacity(variants.len() + 1);
        results.push(DerivedResult::original(record, description));
        results.extend(variants.into_iter().map(|v| DerivedResult::variant(record, v)));
        Ok(results)
    }
}
