//! Shared command-line plumbing for the promptforge stage binaries.
//!
//! Every binary is a standalone entry point with no subcommands. They share
//! the `--config` and `--log-format` flags and the exit-status policy: a
//! failed precondition prints a diagnostic and exits with status 2, any
//! other failure exits with status 1.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]

use anyhow::{Context, Result};
use clap::{Args, Parser, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use promptforge::config::PipelineConfig;
use promptforge::errors::PromptforgeError;
use promptforge::eval::EvalReport;
use promptforge::observability::{init_tracing, LogFormat};
use promptforge::pipeline::RunSummary;
use promptforge::providers::{truncate_chars, AnthropicGenerator, OllamaGenerator, TextGenerator};
use promptforge::stages;

/// Sample outputs echoed after an evaluation.
const SAMPLE_OUTPUTS_SHOWN: usize = 3;
/// Characters of reference and generated text shown per sample.
const SAMPLE_PREVIEW_CHARS: usize = 150;

/// Flags shared by every stage binary.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// JSON file overriding any configuration field.
    #[arg(long, env = "PROMPTFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format: text or json.
    #[arg(long, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl CommonArgs {
    /// Installs logging.
    pub fn init_logging(&self) {
        init_tracing(self.log_format);
    }

    /// Builds the configuration from `preset` and the optional config file.
    pub fn load_config(&self, preset: PipelineConfig) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => Ok(PipelineConfig::load(path, preset)?),
            None => {
                preset.validate()?;
                Ok(preset)
            }
        }
    }
}

/// Text-generation backend used by the annotate stage.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    /// Hosted messages API (needs an API key in the environment).
    Hosted,
    /// Local generate API.
    Local,
}

/// Describe every source prompt that has no description yet.
#[derive(Parser, Debug)]
#[command(name = "annotate", version, about)]
pub struct AnnotateCli {
    /// Shared flags.
    #[command(flatten)]
    pub common: CommonArgs,

    /// Backend to call.
    #[arg(long, value_enum, default_value_t = BackendArg::Hosted)]
    pub backend: BackendArg,

    /// Source file (.xlsx, .csv, .tsv, .json or .jsonl).
    #[arg(long, default_value = stages::DEFAULT_SOURCE)]
    pub input: PathBuf,

    /// Output file; also the checkpoint read back on restart.
    #[arg(long, default_value = stages::DEFAULT_ANNOTATED)]
    pub output: PathBuf,

    /// Rows above the header [default: 2 for workbooks, 0 otherwise].
    #[arg(long)]
    pub skip_rows: Option<usize>,

    /// Attempt at most this many remaining records.
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Add paraphrase variants for every annotated record.
#[derive(Parser, Debug)]
#[command(name = "augment", version, about)]
pub struct AugmentCli {
    /// Shared flags.
    #[command(flatten)]
    pub common: CommonArgs,

    /// Annotated file to read.
    #[arg(long, default_value = stages::DEFAULT_ANNOTATED)]
    pub input: PathBuf,

    /// Output file; also the checkpoint read back on restart.
    #[arg(long, default_value = stages::DEFAULT_AUGMENTED)]
    pub output: PathBuf,

    /// Attempt at most this many remaining records.
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Format the augmented rows into a seeded train/validation split.
#[derive(Parser, Debug)]
#[command(name = "prepare-dataset", version, about)]
pub struct PrepareCli {
    /// Shared flags.
    #[command(flatten)]
    pub common: CommonArgs,

    /// Augmented file to read.
    #[arg(long, default_value = stages::DEFAULT_AUGMENTED)]
    pub input: PathBuf,

    /// Training split output.
    #[arg(long, default_value = stages::DEFAULT_TRAIN)]
    pub train_output: PathBuf,

    /// Validation split output.
    #[arg(long, default_value = stages::DEFAULT_VALIDATION)]
    pub validation_output: PathBuf,
}

/// Score a model served by the local backend on the validation split.
#[derive(Parser, Debug)]
#[command(name = "evaluate", version, about)]
pub struct EvaluateCli {
    /// Shared flags.
    #[command(flatten)]
    pub common: CommonArgs,

    /// Validation split to sample from.
    #[arg(long, default_value = stages::DEFAULT_VALIDATION)]
    pub input: PathBuf,

    /// Report path; defaults to `data/eval_results_{finetuned|base}.json`.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Number of samples to evaluate.
    #[arg(long, short = 'n')]
    pub samples: Option<usize>,

    /// Evaluate the base model instead of the fine-tuned one.
    #[arg(long)]
    pub base: bool,
}

/// Builds the text-generation client for a dispatching stage.
///
/// The stage input is checked first, so a missing input is reported ahead
/// of a missing credential.
pub fn build_generator(
    backend: BackendArg,
    config: &PipelineConfig,
    input: &Path,
) -> Result<Arc<dyn TextGenerator>> {
    if !input.exists() {
        return Err(PromptforgeError::input_not_found(input).into());
    }
    let generator: Arc<dyn TextGenerator> = match backend {
        BackendArg::Hosted => Arc::new(
            AnthropicGenerator::from_env(&config.hosted, config.call_timeout())
                .context("building hosted client")?,
        ),
        BackendArg::Local => Arc::new(
            OllamaGenerator::new(&config.local, config.call_timeout())
                .context("building local client")?,
        ),
    };
    Ok(generator)
}

/// Maps a stage result to the process exit status.
pub fn finish(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let precondition = err
                .downcast_ref::<PromptforgeError>()
                .is_some_and(PromptforgeError::is_precondition);
            tracing::error!(error = %format!("{err:#}"), "Stage failed");
            eprintln!("error: {err:#}");
            if precondition {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Prints the final produced-versus-input count of a dispatching stage.
pub fn print_run_summary(summary: &RunSummary, output: &Path) {
    println!(
        "{} of {} records have results ({} new results this run, {} skipped)",
        summary.completed_total, summary.input_records, summary.new_results, summary.skipped
    );
    if !summary.skipped_indices.is_empty() {
        println!("Skipped indices (retried on the next run): {:?}", summary.skipped_indices);
    }
    println!("Output saved to: {}", output.display());
}

/// Prints the headline numbers of an evaluation report and a few samples.
pub fn print_eval_report(report: &EvalReport, output: &Path) {
    let stdout = io::stdout();
    if let Err(err) = write_eval_report(&mut stdout.lock(), report, output) {
        tracing::warn!(error = %err, "Could not print evaluation report");
    }
}

/// Writes the evaluation report text to `out`.
pub fn write_eval_report(out: &mut impl Write, report: &EvalReport, output: &Path) -> io::Result<()> {
    let rule = "=".repeat(60);
    writeln!(out, "Model: {} ({})", report.model, report.model_name)?;
    writeln!(out, "Samples: {} scored, {} skipped", report.results.len(), report.skipped)?;
    writeln!(out, "Keyword Overlap Score: {:.2}%", report.avg_keyword_score * 100.0)?;
    writeln!(out, "Structure Score: {:.2}%", report.avg_structure_score * 100.0)?;
    writeln!(out, "Overall Score: {:.2}%", report.overall_score * 100.0)?;

    if !report.results.is_empty() {
        writeln!(out, "\n{rule}\nSAMPLE OUTPUTS\n{rule}")?;
        for (i, sample) in report.results.iter().take(SAMPLE_OUTPUTS_SHOWN).enumerate() {
            writeln!(out, "\n[Sample {}]", i + 1)?;
            writeln!(out, "Input: {}", sample.instruction)?;
            writeln!(out, "Reference: {}...", truncate_chars(&sample.reference, SAMPLE_PREVIEW_CHARS))?;
            writeln!(out, "Generated: {}...", truncate_chars(&sample.generated, SAMPLE_PREVIEW_CHARS))?;
            writeln!(
                out,
                "Scores: keyword={:.2}%, structure={:.2}%",
                sample.keyword_score * 100.0,
                sample.structure_score * 100.0
            )?;
        }
    }
    writeln!(out, "\nResults saved to: {}", output.display())
}

/// Writes a run summary next to the output as `<output>.summary.json`.
pub fn write_summary_sidecar(summary: &RunSummary, output: &Path) -> Result<()> {
    let mut name = output.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".summary.json");
    let path = output.with_file_name(name);
    let body = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
