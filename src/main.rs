//! IACPM CLI entry point
//!
//! Parses arguments, runs the command and turns any error into a
//! user-friendly message with a non-zero exit code.

use anyhow::Result;
use clap::Parser;
use iacpm_cli::cli;
use iacpm_cli::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
