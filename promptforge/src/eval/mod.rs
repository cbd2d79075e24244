//! Evaluation of a fine-tuned model served by a local backend.
//!
//! Each sampled instruction is sent through the same permit gate and retry
//! wrapper as the annotation stages; the generated prompt is then scored
//! against the reference output.

mod score;

pub use score::{structure_score, KeywordScorer, PROMPT_ELEMENTS};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{EvalConfig, PipelineConfig};
use crate::core::{CallFailure, CallOutcome, TrainingSample};
use crate::errors::PromptforgeError;
use crate::pipeline::{ConcurrencyGate, RetryPolicy};
use crate::providers::{GenerationRequest, TextGenerator};

/// Which model is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalTarget {
    /// The fine-tuned model.
    Finetuned,
    /// The base model it was tuned from.
    Base,
}

impl EvalTarget {
    /// Returns the label written to the report.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Finetuned => "Finetuned Model",
            Self::Base => "Base Model",
        }
    }

    /// Returns the model name to request from the local backend.
    #[must_use]
    pub fn model_name(self, config: &EvalConfig) -> &str {
        match self {
            Self::Finetuned => &config.finetuned_model,
            Self::Base => &config.base_model,
        }
    }

    /// Returns the default report file name.
    #[must_use]
    pub fn report_file_name(self) -> &'static str {
        match self {
            Self::Finetuned => "eval_results_finetuned.json",
            Self::Base => "eval_results_base.json",
        }
    }
}

/// Scores for one evaluated sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// The instruction sent to the model.
    pub instruction: String,
    /// The expected prompt.
    pub reference: String,
    /// The model's prompt.
    pub generated: String,
    /// Keyword overlap score.
    pub keyword_score: f64,
    /// Structure score.
    pub structure_score: f64,
}

/// Aggregate evaluation results, written as `eval_results_*.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    /// Human-readable model label.
    pub model: String,
    /// The model name the backend served.
    pub model_name: String,
    /// Samples drawn.
    pub sampled: usize,
    /// Samples whose generation was exhausted.
    pub skipped: usize,
    /// Mean keyword overlap.
    pub avg_keyword_score: f64,
    /// Mean structure score.
    pub avg_structure_score: f64,
    /// Mean of the two averages.
    pub overall_score: f64,
    /// Per-sample results, in sample order.
    pub results: Vec<SampleResult>,
}

impl EvalReport {
    #[allow(clippy::cast_precision_loss)]
    fn build(model: &str, model_name: &str, sampled: usize, results: Vec<SampleResult>) -> Self {
        let (avg_keyword_score, avg_structure_score) = if results.is_empty() {
            (0.0, 0.0)
        } else {
            let n = results.len() as f64;
            (
                results.iter().map(|r| r.keyword_score).sum::<f64>() / n,
                results.iter().map(|r| r.structure_score).sum::<f64>() / n,
            )
        };
        Self {
            model: model.to_string(),
            model_name: model_name.to_string(),
            sampled,
            skipped: sampled - results.len(),
            avg_keyword_score,
            avg_structure_score,
            overall_score: (avg_keyword_score + avg_structure_score) / 2.0,
            results,
        }
    }
}

/// Runs sampled instructions through a model and scores the outputs.
pub struct Evaluator {
    generator: Arc<dyn TextGenerator>,
    scorer: KeywordScorer,
    retry: RetryPolicy,
    gate: ConcurrencyGate,
    system: String,
    max_output_tokens: u32,
    temperature: f32,
}

impl Evaluator {
    /// Creates an evaluator from the pipeline configuration.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        config: &PipelineConfig,
    ) -> Result<Self, PromptforgeError> {
        Ok(Self {
            generator,
            scorer: KeywordScorer::new()?,
            retry: RetryPolicy::new(config.retry.clone(), config.call_timeout()),
            gate: ConcurrencyGate::new(config.concurrency),
            system: config.prompts.eval_system.clone(),
            max_output_tokens: config.eval.num_predict,
            temperature: config.eval.temperature,
        })
    }

    /// Evaluates every sample and builds the report.
    pub async fn evaluate(
        &self,
        samples: &[TrainingSample],
        model: &str,
        model_name: &str,
    ) -> EvalReport {
        info!(model = %model, model_name = %model_name, samples = samples.len(), "Evaluating");

        let mut in_flight: FuturesUnordered<_> = samples
            .iter()
            .enumerate()
            .map(|(i, sample)| self.generate(i, sample))
            .collect();

        let mut scored: Vec<(usize, SampleResult)> = Vec::with_capacity(samples.len());
        while let Some((i, sample, outcome)) = in_flight.next().await {
            match outcome {
                CallOutcome::Completed(generated) => {
                    scored.push((i, self.score(sample, generated)));
                }
                CallOutcome::Exhausted { last_error, .. } => {
                    warn!(sample = i, error = %last_error, "Skipping sample");
                }
                CallOutcome::Fatal { reason } => {
                    warn!(sample = i, reason = %reason, "Skipping sample");
                }
            }
        }
        drop(in_flight);

        scored.sort_by_key(|(i, _)| *i);
        let report = EvalReport::build(
            model,
            model_name,
            samples.len(),
            scored.into_iter().map(|(_, r)| r).collect(),
        );
        info!(
            model = %report.model,
            scored = report.results.len(),
            skipped = report.skipped,
            keyword = report.avg_keyword_score,
            structure = report.avg_structure_score,
            overall = report.overall_score,
            "Evaluation finished"
        );
        report
    }

    fn score(&self, sample: &TrainingSample, generated: String) -> SampleResult {
        SampleResult {
            keyword_score: self.scorer.keyword_overlap(&generated, &sample.output),
            structure_score: structure_score(&generated, &sample.output),
            instruction: sample.instruction.clone(),
            reference: sample.output.clone(),
            generated,
        }
    }

    async fn generate<'a>(
        &'a self,
        i: usize,
        sample: &'a TrainingSample,
    ) -> (usize, &'a TrainingSample, CallOutcome<String>) {
        let Ok(_permit) = self.gate.acquire().await else {
            return (
                i,
                sample,
                CallOutcome::Fatal {
                    reason: "concurrency gate closed".to_string(),
                },
            );
        };
        let request = GenerationRequest::new(
            self.system.clone(),
            sample.instruction.clone(),
            self.max_output_tokens,
        )
        .with_temperature(self.temperature);
        let outcome = self
            .retry
            .execute(i, || async {
                let text = self.generator.generate(&request).await?;
                let text = text.trim();
                if text.is_empty() {
                    Err(CallFailure::retryable("empty generation"))
                } else {
                    Ok(text.to_string())
                }
            })
            .await;
        (i, sample, outcome)
    }
}
