//! # caas CLI
//!
//! Binary entry point for the `caas` command-line tool: parses arguments
//! with `clap` and dispatches to the command implementations. All directory
//! and template logic lives in the library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
