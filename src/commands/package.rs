//! # Package Command Implementation
//!
//! Loads and unloads ISVP and CAP packages. Package files are validated
//! locally before the system is contacted.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use caas::package::{validate_package_file, PackageFormat};
use caas::registry::ConnectionRegistry;

use super::ConnectionArgs;

/// Load or unload packages
#[derive(Args, Debug)]
pub struct PackageArgs {
    #[command(subcommand)]
    pub action: PackageAction,
}

#[derive(Subcommand, Debug)]
pub enum PackageAction {
    /// Upload and install a package file (.isvp or .cap)
    Load {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Server-side timeout in milliseconds.
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,
    },
    /// Uninstall a loaded package
    Unload {
        #[arg(value_name = "NAME")]
        name: String,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Unload a CAP instead of an ISV package.
        #[arg(long)]
        cap: bool,

        /// Server-side timeout in milliseconds.
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,
    },
}

pub fn execute(args: PackageArgs) -> Result<()> {
    let registry = ConnectionRegistry::new();
    match args.action {
        PackageAction::Load {
            file,
            connection,
            timeout,
        } => {
            let format = validate_package_file(&file)?;
            let system = connection.open(&registry)?;
            system.load_package(&file, timeout)?;
            println!("{} package {} loaded", format, file.display());
        }
        PackageAction::Unload {
            name,
            connection,
            cap,
            timeout,
        } => {
            let format = if cap {
                PackageFormat::Cap
            } else {
                PackageFormat::Isvp
            };
            let system = connection.open(&registry)?;
            system.unload_package(&name, format, timeout)?;
            println!("{} package {} unloaded", format, name);
        }
    }
    Ok(())
}
