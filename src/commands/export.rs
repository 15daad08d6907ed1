//! # Export Command Implementation
//!
//! Captures an organization as a template file (or prints it). Values given
//! with `--var` are turned back into `${name}` placeholders so the file can
//! be applied to other organizations or systems.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use caas::registry::ConnectionRegistry;
use caas::template::{ExportOptions, Template, Variables};

use super::{ConnectionArgs, OrganizationArgs};

/// Capture an organization as a template
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub organization: OrganizationArgs,

    /// Write the template here instead of standard output.
    #[arg(short = 'O', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Leave out package elements.
    #[arg(long)]
    pub no_packages: bool,

    /// Leave out DSOs.
    #[arg(long)]
    pub no_dsos: bool,

    /// Leave out XML store objects.
    #[arg(long)]
    pub no_xml_store: bool,

    /// Leave out roles.
    #[arg(long)]
    pub no_roles: bool,

    /// Leave out users.
    #[arg(long)]
    pub no_users: bool,

    /// Leave out service groups.
    #[arg(long)]
    pub no_service_groups: bool,
}

impl ExportArgs {
    fn options(&self, variables: Variables) -> ExportOptions {
        ExportOptions {
            packages: !self.no_packages,
            dsos: !self.no_dsos,
            xml_store: !self.no_xml_store,
            roles: !self.no_roles,
            users: !self.no_users,
            service_groups: !self.no_service_groups,
            variables,
        }
    }
}

pub fn execute(args: ExportArgs) -> Result<()> {
    let options = args.options(args.organization.variables()?);
    let registry = ConnectionRegistry::new();
    let system = args.connection.open(&registry)?;
    let organization = args.organization.organization(&system)?;

    let template = Template::export(&organization, &options)
        .with_context(|| format!("Failed to export organization {}", organization.name()))?;
    match &args.output {
        Some(path) => template.save(path)?,
        None => println!("{}", template.to_xml_string()?),
    }
    Ok(())
}
