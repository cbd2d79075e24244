//! Stage entry points.
//!
//! Each stage checks its preconditions (input present and well-formed,
//! ledger readable, service reachable) before making any external call or
//! writing any file, then does its work.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::checkpoint::{load_results, write_json_atomic, ProgressLedger, ResultSink};
use crate::config::PipelineConfig;
use crate::core::{SourceRecord, TrainingSample};
use crate::dataset::{format_training_sample, load_augmented, seeded_sample, split_dataset};
use crate::errors::PromptforgeError;
use crate::eval::{EvalReport, EvalTarget, Evaluator};
use crate::events::EventSink;
use crate::observability::StageTimer;
use crate::pipeline::{Dispatcher, RunSummary};
use crate::providers::{truncate_chars, TextGenerator};
use crate::source::SourceReader;
use crate::tasks::{AnnotationTask, AugmentTask, DescribeTask};

/// Default source file for the annotate stage.
pub const DEFAULT_SOURCE: &str = "data/raw/NanoBananaProPrompts.xlsx";
/// Default annotate output, also the augment input.
pub const DEFAULT_ANNOTATED: &str = "data/processed/raw_training_data.json";
/// Default augment output, also the prepare-dataset input.
pub const DEFAULT_AUGMENTED: &str = "data/processed/augmented_training_data.json";
/// Default training split.
pub const DEFAULT_TRAIN: &str = "data/processed/training_data.json";
/// Default validation split, also the evaluate input.
pub const DEFAULT_VALIDATION: &str = "data/processed/validation_data.json";
/// Default directory for evaluation reports.
pub const DEFAULT_EVAL_DIR: &str = "data";

/// Input and output paths of a dispatching stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    /// Where records are read from.
    pub input: PathBuf,
    /// Where results are checkpointed.
    pub output: PathBuf,
}

impl StagePaths {
    /// Creates a new path pair.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Options shared by the dispatching stages.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Attempt at most this many remaining records.
    pub limit: Option<usize>,
    /// Receives run lifecycle events.
    pub events: Option<Arc<dyn EventSink>>,
}

impl RunOptions {
    /// Sets the record limit.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Describes every source record that has no result yet.
pub async fn annotate(
    config: &PipelineConfig,
    generator: Arc<dyn TextGenerator>,
    paths: &StagePaths,
    options: RunOptions,
) -> Result<RunSummary, PromptforgeError> {
    let timer = StageTimer::start("annotate");
    let records = SourceReader::new(&paths.input, config.source.clone()).read()?;
    let task = Arc::new(DescribeTask::new(generator.clone(), config));
    let summary = dispatch(config, generator, task, records, &paths.output, options).await?;
    timer.finish();
    Ok(summary)
}

/// Adds paraphrase variants for every annotated record not yet augmented.
pub async fn augment(
    config: &PipelineConfig,
    generator: Arc<dyn TextGenerator>,
    paths: &StagePaths,
    options: RunOptions,
) -> Result<RunSummary, PromptforgeError> {
    let timer = StageTimer::start("augment");
    let records = SourceReader::read_annotated(&paths.input)?;
    let task = Arc::new(AugmentTask::new(generator.clone(), config));
    let summary = dispatch(config, generator, task, records, &paths.output, options).await?;
    timer.finish();
    Ok(summary)
}

async fn dispatch(
    config: &PipelineConfig,
    generator: Arc<dyn TextGenerator>,
    task: Arc<dyn AnnotationTask>,
    records: Vec<SourceRecord>,
    output: &Path,
    options: RunOptions,
) -> Result<RunSummary, PromptforgeError> {
    let previous = load_results(output)?;
    let ledger = ProgressLedger::from_results(&previous);
    info!(
        path = %output.display(),
        results = previous.len(),
        completed = ledger.len(),
        "Rebuilt progress ledger"
    );
    generator.probe().await?;

    let mut sink = ResultSink::new(output, previous);
    let mut dispatcher = Dispatcher::from_config(task, config).with_limit(options.limit);
    if let Some(events) = options.events {
        dispatcher = dispatcher.with_events(events);
    }
    dispatcher.run(&records, &ledger, &mut sink).await
}

/// Counts reported by the prepare-dataset stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareSummary {
    /// Rows read from the augmented file.
    pub total: usize,
    /// Samples in the training split.
    pub train: usize,
    /// Samples in the validation split.
    pub validation: usize,
}

/// Formats the augmented rows into training samples and writes the split.
pub fn prepare(
    config: &PipelineConfig,
    input: impl AsRef<Path>,
    train_output: impl AsRef<Path>,
    validation_output: impl AsRef<Path>,
) -> Result<PrepareSummary, PromptforgeError> {
    let timer = StageTimer::start("prepare-dataset");
    let rows = load_augmented(input.as_ref())?;
    info!(rows = rows.len(), "Loaded augmented rows");

    let samples: Vec<TrainingSample> = rows
        .iter()
        .map(|row| format_training_sample(row, &config.prompts))
        .collect();
    let split = split_dataset(samples, config.dataset.train_ratio, config.dataset.seed);

    write_json_atomic(train_output.as_ref(), &split.train)?;
    write_json_atomic(validation_output.as_ref(), &split.validation)?;
    info!(
        train = split.train.len(),
        validation = split.validation.len(),
        train_path = %train_output.as_ref().display(),
        validation_path = %validation_output.as_ref().display(),
        "Wrote dataset split"
    );
    if let Some(first) = split.train.first() {
        info!(
            instruction = truncate_chars(&first.instruction, 200),
            output = truncate_chars(&first.output, 300),
            "Sample training row"
        );
    }

    timer.finish();
    Ok(PrepareSummary {
        total: rows.len(),
        train: split.train.len(),
        validation: split.validation.len(),
    })
}

/// Reads a JSON array of training samples.
pub fn load_samples(path: impl AsRef<Path>) -> Result<Vec<TrainingSample>, PromptforgeError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PromptforgeError::input_not_found(path));
    }
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|err| PromptforgeError::malformed_input(path, err.to_string()))
}

/// Scores a seeded sample of the validation set and writes the report.
pub async fn evaluate(
    config: &PipelineConfig,
    generator: Arc<dyn TextGenerator>,
    target: EvalTarget,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<EvalReport, PromptforgeError> {
    let timer = StageTimer::start("evaluate");
    let validation = load_samples(input)?;
    info!(total = validation.len(), "Loaded validation samples");
    generator.probe().await?;

    let samples = seeded_sample(&validation, config.eval.samples, config.eval.seed);
    let evaluator = Evaluator::new(generator, config)?;
    let report = evaluator
        .evaluate(&samples, target.label(), target.model_name(&config.eval))
        .await;

    write_json_atomic(output.as_ref(), &report)?;
    info!(path = %output.as_ref().display(), "Wrote evaluation report");
    timer.finish();
    Ok(report)
}
