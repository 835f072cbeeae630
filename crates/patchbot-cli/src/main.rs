mod bootstrap_helpers;
mod cli_args;
mod cli_runtime;
mod cli_types;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::cli_runtime::run_cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = run_cli(cli).await?;
    Ok(ExitCode::from(exit_code))
}

#[cfg(test)]
mod tests;
