//! # Apply Command Implementation
//!
//! Creates or updates everything a template describes until the
//! organization matches it. Running it twice in a row changes nothing the
//! second time.

use anyhow::Result;
use clap::Args;

use caas::output::OutputConfig;
use caas::registry::ConnectionRegistry;
use caas::suggestions;

use super::{print_report, RunArgs};

/// Apply a template to an organization
#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

pub fn execute(args: ApplyArgs, output: &OutputConfig) -> Result<()> {
    let run = args.run;
    let (template, variables) = run.prepare()?;
    let registry = ConnectionRegistry::new();
    let system = run.connection.open(&registry)?;
    let organization = run.organization.organization(&system)?;

    let report = template.apply(&organization, &variables)?;
    print_report(&report, run.format, output, run.verbose)?;
    if report.errors() > 0 {
        return Err(suggestions::run_failed("apply", report.errors()));
    }
    Ok(())
}
