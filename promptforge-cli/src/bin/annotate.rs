//! Describe every source prompt that has no description yet.
//!
//! Re-running resumes from the output file; records already described are
//! never sent again.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use promptforge::config::PipelineConfig;
use promptforge::events::LoggingEventSink;
use promptforge::stages::{self, RunOptions, StagePaths};
use promptforge_cli::{
    build_generator, finish, print_run_summary, write_summary_sidecar, AnnotateCli, BackendArg,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = AnnotateCli::parse();
    cli.common.init_logging();
    finish(run(cli).await)
}

async fn run(cli: AnnotateCli) -> Result<()> {
    let preset = match cli.backend {
        BackendArg::Hosted => PipelineConfig::hosted_annotate(),
        BackendArg::Local => PipelineConfig::local_annotate(),
    };
    let mut config = cli.common.load_config(preset)?;
    if let Some(skip_rows) = cli.skip_rows {
        config.source.skip_rows = Some(skip_rows);
    }

    let generator = build_generator(cli.backend, &config, &cli.input)?;

    let paths = StagePaths::new(&cli.input, &cli.output);
    let options = RunOptions::default()
        .with_limit(cli.limit)
        .with_events(Arc::new(LoggingEventSink::default()));
    let summary = stages::annotate(&config, generator, &paths, options).await?;

    write_summary_sidecar(&summary, &cli.output)?;
    print_run_summary(&summary, &cli.output);
    Ok(())
}
