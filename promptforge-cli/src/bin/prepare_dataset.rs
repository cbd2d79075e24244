//! Format augmented rows into instruction/output pairs and split them.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use promptforge::config::PipelineConfig;
use promptforge::stages;
use promptforge_cli::{finish, PrepareCli};

fn main() -> ExitCode {
    let cli = PrepareCli::parse();
    cli.common.init_logging();
    finish(run(&cli))
}

fn run(cli: &PrepareCli) -> Result<()> {
    let config = cli.common.load_config(PipelineConfig::new())?;
    let summary = stages::prepare(&config, &cli.input, &cli.train_output, &cli.validation_output)?;

    println!("Total samples: {}", summary.total);
    println!("Training set: {} -> {}", summary.train, cli.train_output.display());
    println!("Validation set: {} -> {}", summary.validation, cli.validation_output.display());
    Ok(())
}
