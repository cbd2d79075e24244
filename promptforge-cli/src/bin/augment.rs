//! Add two paraphrase variants for every annotated record.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use promptforge::config::PipelineConfig;
use promptforge::events::LoggingEventSink;
use promptforge::stages::{self, RunOptions, StagePaths};
use promptforge_cli::{
    build_generator, finish, print_run_summary, write_summary_sidecar, AugmentCli, BackendArg,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = AugmentCli::parse();
    cli.common.init_logging();
    finish(run(cli).await)
}

async fn run(cli: AugmentCli) -> Result<()> {
    let config = cli.common.load_config(PipelineConfig::augment())?;
    let generator = build_generator(BackendArg::Hosted, &config, &cli.input)?;

    let paths = StagePaths::new(&cli.input, &cli.output);
    let options = RunOptions::default()
        .with_limit(cli.limit)
        .with_events(Arc::new(LoggingEventSink::default()));
    let summary = stages::augment(&config, generator, &paths, options).await?;

    write_summary_sidecar(&summary, &cli.output)?;
    print_run_summary(&summary, &cli.output);
    Ok(())
}
