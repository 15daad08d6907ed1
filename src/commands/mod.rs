//! # CLI Command Implementations
//!
//! Each subcommand of `caas` lives in its own file with an `Args` struct
//! (derived with `clap`) and an `execute` function. The arguments every
//! command shares (which system, which properties file, which organization,
//! extra template variables) are defined here.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use caas::config::Properties;
use caas::object::DirectoryObject;
use caas::output::OutputConfig;
use caas::registry::ConnectionRegistry;
use caas::suggestions;
use caas::system::DirectorySystem;
use caas::template::substitute::parse_assignment;
use caas::template::Variables;

pub mod apply;
pub mod check;
pub mod export;
pub mod info;
pub mod package;
pub mod purge;
pub mod tree;

/// Options shared by every command that talks to a system.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Name of the system; selects `<name>.properties`.
    #[arg(short, long, value_name = "NAME", env = "CAAS_SYSTEM", default_value = "default")]
    pub system: String,

    /// Explicit properties file, searched before the default locations.
    #[arg(long, value_name = "FILE", env = "CAAS_PROPERTIES")]
    pub properties: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Open the configured system.
    pub fn open(&self, registry: &ConnectionRegistry) -> Result<Arc<DirectorySystem>> {
        let explicit = self.properties.as_deref();
        let candidates = Properties::candidate_paths(&self.system, explicit);
        let missing = match explicit {
            Some(path) => !path.is_file(),
            None => !candidates.iter().any(|path| path.is_file()),
        };
        if missing {
            let searched: Vec<&std::path::Path> = match explicit {
                Some(path) => vec![path],
                None => candidates.iter().map(PathBuf::as_path).collect(),
            };
            return Err(suggestions::properties_not_found(&self.system, &searched));
        }
        registry
            .open_from_properties(&self.system, explicit)
            .with_context(|| format!("Failed to connect to system '{}'", self.system))
    }
}

/// Options for commands that work on one organization.
#[derive(Args, Debug, Clone)]
pub struct OrganizationArgs {
    /// Organization name; defaults to the `organization` property.
    #[arg(short, long, value_name = "NAME")]
    pub org: Option<String>,

    /// Template variable, as `name=value`. May be repeated.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,
}

impl OrganizationArgs {
    pub fn organization(&self, system: &DirectorySystem) -> Result<Arc<DirectoryObject>> {
        let name = match &self.org {
            Some(name) => name.clone(),
            None => system
                .properties()
                .get("organization")
                .map(str::to_string)
                .ok_or_else(|| suggestions::organization_required(system.name()))?,
        };
        match system.organizations()?.get_by_name(&name)? {
            Some(organization) => Ok(organization),
            None => {
                let known: Vec<String> = system
                    .organizations()?
                    .items()?
                    .iter()
                    .map(|org| org.name().to_string())
                    .collect();
                let known: Vec<&str> = known.iter().map(String::as_str).collect();
                Err(suggestions::organization_not_found(&name, &known))
            }
        }
    }

    pub fn variables(&self) -> Result<Variables> {
        parse_variables(&self.vars)
    }
}

/// Parse `--var` assignments.
pub fn parse_variables(assignments: &[String]) -> Result<Variables> {
    assignments
        .iter()
        .map(|text| {
            parse_assignment(text).map_err(|e| suggestions::invalid_variable(text, &e.to_string()))
        })
        .collect()
}

/// Output format for reports.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Json,
}

/// Arguments of the three template-driven commands.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Template file.
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub organization: OrganizationArgs,

    /// Report format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Also list elements that are already in order.
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Load the template and variables before connecting, so local mistakes
    /// are reported without a round trip.
    pub fn prepare(&self) -> Result<(caas::template::Template, Variables)> {
        if !self.template.is_file() {
            return Err(suggestions::template_not_found(&self.template));
        }
        let template = caas::template::Template::from_file(&self.template)
            .with_context(|| format!("Failed to load template {}", self.template.display()))?;
        Ok((template, self.organization.variables()?))
    }
}

/// Print a report in the requested format.
pub fn print_report(
    objective: &caas::template::Objective,
    format: Format,
    output: &OutputConfig,
    verbose: bool,
) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(objective)?),
        Format::Text => print!(
            "{}",
            caas::output::render_objective(output, objective, verbose)
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variables() {
        let variables = parse_variables(&["org=acme".to_string(), "host=n1".to_string()]).unwrap();
        assert_eq!(variables.get("org"), Some("acme"));
        assert_eq!(variables.len(), 2);
        let error = parse_variables(&["broken".to_string()]).unwrap_err();
        assert!(error.to_string().contains("Invalid variable assignment"));
    }

    #[test]
    fn test_missing_properties_are_reported_with_hints() {
        let args = ConnectionArgs {
            system: "nowhere".to_string(),
            properties: Some(PathBuf::from("/nonexistent/nowhere.properties")),
        };
        let error = args.open(&ConnectionRegistry::new()).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("No properties file for system 'nowhere'"));
        assert!(message.contains("/nonexistent/nowhere.properties"));
    }
}
