mod cli;
mod commands;
mod error;
mod metadata;
mod output;

use clap::Parser;
use racefeed_core::Freshness;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::CliError;

const SYNTHETIC_EXIT: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("racefeed=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let envelope = commands::run(&cli).await?;
    output::render(&envelope, cli.format, cli.pretty)?;

    if envelope.meta.freshness == Some(Freshness::Synthetic) {
        return Ok(ExitCode::from(SYNTHETIC_EXIT));
    }

    Ok(ExitCode::SUCCESS)
}
