//! # Promptforge
//!
//! Data preparation for a text-to-image prompt assistant.
//!
//! Promptforge turns a spreadsheet of long-form image-generation prompts into
//! instruction/output training pairs:
//!
//! - **Annotate**: ask a text-generation service for a short Chinese
//!   description of every prompt
//! - **Augment**: add paraphrase variants of every description
//! - **Prepare**: format instruction/output pairs and split them with a
//!   seeded shuffle
//! - **Evaluate**: score a fine-tuned model served by a local backend
//!
//! The annotate and augment stages share one engine: a bounded-concurrency
//! dispatcher with exponential-backoff retries that checkpoints its output so
//! an interrupted run resumes without redoing or duplicating work.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use promptforge::prelude::*;
//!
//! let config = PipelineConfig::hosted_annotate();
//! let generator = Arc::new(AnthropicGenerator::from_env(&config.hosted, config.call_timeout())?);
//! let paths = StagePaths::new("data/raw/prompts.csv", "data/processed/raw_training_data.json");
//! let summary = stages::annotate(&config, generator, &paths, RunOptions::default()).await?;
//! println!("{} of {} records annotated", summary.completed_total, summary.input_records);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod dataset;
pub mod errors;
pub mod eval;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod source;
pub mod stages;
pub mod tasks;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{load_results, ProgressLedger, ResultSink};
    pub use crate::config::{
        DatasetConfig, EvalConfig, HostedConfig, LocalConfig, PipelineConfig, PromptTemplates,
        RetryConfig, SourceConfig,
    };
    pub use crate::core::{
        CallFailure, CallOutcome, DerivedResult, SourceRecord, TrainingSample,
    };
    pub use crate::errors::PromptforgeError;
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, RunEvent};
    pub use crate::pipeline::{Dispatcher, RetryPolicy, RunProgress, RunSummary};
    pub use crate::providers::{
        AnthropicGenerator, GenerationRequest, OllamaGenerator, TextGenerator,
    };
    pub use crate::source::SourceReader;
    pub use crate::stages::{self, RunOptions, StagePaths};
    pub use crate::tasks::{AnnotationTask, AugmentTask, DescribeTask, ResponseStyle};
}
