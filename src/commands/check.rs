//! # Check Command Implementation
//!
//! Compares an organization with a template without changing anything.
//! Every difference is reported; the command fails when there is at least
//! one, so it can gate scripts.

use anyhow::Result;
use clap::Args;

use caas::output::OutputConfig;
use caas::registry::ConnectionRegistry;
use caas::suggestions;

use super::{print_report, RunArgs};

/// Report how an organization differs from a template
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

pub fn execute(args: CheckArgs, output: &OutputConfig) -> Result<()> {
    let run = args.run;
    let (template, variables) = run.prepare()?;
    let registry = ConnectionRegistry::new();
    let system = run.connection.open(&registry)?;
    let organization = run.organization.organization(&system)?;

    let report = template.check(&organization, &variables)?;
    print_report(&report, run.format, output, run.verbose)?;
    if !report.is_ok() {
        return Err(suggestions::differences_found(
            report.differences(),
            report.errors(),
        ));
    }
    Ok(())
}
