//! e2e-verify command-line entry point

mod cli;
mod tracing;

use std::process::ExitCode;

use clap::Parser;
use e2e_verify_runner::{Config, Orchestrator, RunOptions, trigger};

use crate::cli::{AssertArgs, Cli, Command};
use crate::tracing::TracingConfig;

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        ..TracingConfig::default()
    };

    let outcome = match crate::tracing::init_tracing(tracing_config) {
        Ok(()) => run(cli.command).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> miette::Result<()> {
    match command {
        Command::Assert(args) => run_assert(args).await,
    }
}

async fn run_assert(args: AssertArgs) -> miette::Result<()> {
    if let Some(case) = args.single_case() {
        let orchestrator = Orchestrator::new(RunOptions::default());
        orchestrator.run(&[case]).await?;
        return Ok(());
    }

    let config = Config::load(&args.config)?;
    let options = RunOptions::from_config(&config.assert)?;
    let orchestrator = Orchestrator::new(options);

    let Some(trigger_config) = &config.trigger else {
        orchestrator.run(&config.assert.cases).await?;
        return Ok(());
    };

    let trigger = trigger::from_config(trigger_config)?;
    let outcome = match trigger.start().await {
        Ok(Ok(())) => orchestrator.run(&config.assert.cases).await.map(|_| ()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(e2e_verify_runner::Error::configuration("trigger stopped without reporting an outcome")),
    };
    trigger.stop();
    outcome?;
    Ok(())
}
