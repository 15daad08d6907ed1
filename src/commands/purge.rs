//! # Purge Command Implementation
//!
//! Removes the service groups, users, roles, DSOs and XML store objects a
//! template names, in reverse document order. Packages are left in place.

use anyhow::Result;
use clap::Args;

use caas::output::OutputConfig;
use caas::registry::ConnectionRegistry;
use caas::suggestions;

use super::{print_report, RunArgs};

/// Remove what a template describes from an organization
#[derive(Args, Debug)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

pub fn execute(args: PurgeArgs, output: &OutputConfig) -> Result<()> {
    let run = args.run;
    let (template, variables) = run.prepare()?;
    let registry = ConnectionRegistry::new();
    let system = run.connection.open(&registry)?;
    let organization = run.organization.organization(&system)?;

    let report = template.purge(&organization, &variables)?;
    print_report(&report, run.format, output, run.verbose)?;
    if report.errors() > 0 {
        return Err(suggestions::run_failed("purge", report.errors()));
    }
    Ok(())
}
