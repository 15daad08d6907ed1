//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};

use caas::output::OutputConfig;

use crate::commands;

/// caas - administer Cordys application server clusters
#[derive(Parser, Debug)]
#[command(name = "caas")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show installation details of a system
    Info(commands::info::InfoArgs),
    /// Display the directory object tree
    Tree(commands::tree::TreeArgs),
    /// Capture an organization as a template
    Export(commands::export::ExportArgs),
    /// Apply a template to an organization
    Apply(commands::apply::ApplyArgs),
    /// Report how an organization differs from a template
    Check(commands::check::CheckArgs),
    /// Remove what a template describes from an organization
    Purge(commands::purge::PurgeArgs),
    /// Load or unload packages
    Package(commands::package::PackageArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // A second initialisation (e.g. from tests) keeps the first logger.
        let _ = Builder::from_env(Env::default().default_filter_or(self.log_level.as_str()))
            .format_timestamp(None)
            .try_init();
        let output = OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Info(args) => commands::info::execute(args, &output),
            Commands::Tree(args) => commands::tree::execute(args),
            Commands::Export(args) => commands::export::execute(args),
            Commands::Apply(args) => commands::apply::execute(args, &output),
            Commands::Check(args) => commands::check::execute(args, &output),
            Commands::Purge(args) => commands::purge::execute(args, &output),
            Commands::Package(args) => commands::package::execute(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check_with_variables() {
        let cli = Cli::parse_from([
            "caas", "check", "acme.xml", "--org", "acme", "--var", "host=n1", "--format", "json",
        ]);
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.run.template.to_str(), Some("acme.xml"));
                assert_eq!(args.run.organization.vars, vec!["host=n1"]);
                assert_eq!(args.run.format, commands::Format::Json);
            }
            other => panic!("expected check, got {:?}", other),
        }
    }
}
