//! Score the fine-tuned (or base) model on a seeded validation sample.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use promptforge::config::PipelineConfig;
use promptforge::eval::EvalTarget;
use promptforge::providers::OllamaGenerator;
use promptforge::stages;
use promptforge_cli::{finish, print_eval_report, EvaluateCli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = EvaluateCli::parse();
    cli.common.init_logging();
    finish(run(cli).await)
}

async fn run(cli: EvaluateCli) -> Result<()> {
    let mut config = cli.common.load_config(PipelineConfig::evaluate())?;
    if let Some(samples) = cli.samples {
        config.eval.samples = samples;
    }
    let target = if cli.base {
        EvalTarget::Base
    } else {
        EvalTarget::Finetuned
    };
    let output = cli
        .output
        .unwrap_or_else(|| Path::new(stages::DEFAULT_EVAL_DIR).join(target.report_file_name()));

    let generator = OllamaGenerator::new(&config.local, config.call_timeout())
        .context("building local client")?
        .with_model(target.model_name(&config.eval));

    let report = stages::evaluate(&config, Arc::new(generator), target, &cli.input, &output).await?;
    print_eval_report(&report, &output);
    Ok(())
}
