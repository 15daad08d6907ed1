//! # Info Command Implementation
//!
//! Displays the installation details of a system and a count of its main
//! object categories. Read-only.

use anyhow::Result;
use clap::Args;

use caas::output::{emoji, OutputConfig};
use caas::registry::ConnectionRegistry;
use caas::system::DirectorySystem;

use super::ConnectionArgs;

/// Show installation details of a system
#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub fn execute(args: InfoArgs, output: &OutputConfig) -> Result<()> {
    let registry = ConnectionRegistry::new();
    let system = args.connection.open(&registry)?;
    print!("{}", describe(&system, output)?);
    Ok(())
}

fn describe(system: &DirectorySystem, output: &OutputConfig) -> Result<String> {
    let mut lines = vec![
        format!("{} System: {}", emoji(output, "🖥", "[SYSTEM]"), system.name()),
        format!("   Endpoint: {}", system.endpoint()),
        format!("   Root: {}", system.root()),
        format!("   Version: {} (build {})", system.version(), system.build()),
        format!("   OS: {}", system.os()),
        format!("   User: {}", system.user()),
        format!(
            "   Entry cache: {}",
            if system.cache_enabled() { "enabled" } else { "disabled" }
        ),
        String::new(),
    ];

    let organizations = system.organizations()?.items()?;
    lines.push(format!("Organizations: {}", organizations.len()));
    for organization in &organizations {
        lines.push(format!("   {}", organization.name()));
    }
    lines.push(format!("Packages: {}", system.packages()?.size()?));
    lines.push(format!("Machines: {}", system.machines()?.size()?));
    let states = system.container_states()?;
    let running = states.iter().filter(|(_, running)| *running).count();
    lines.push(format!(
        "Service containers: {} ({} running)",
        states.len(),
        running
    ));

    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use caas::config::Properties;
    use caas::remote::MemoryDirectory;
    use std::sync::Arc;

    #[test]
    fn test_describe_counts_objects() {
        let memory = MemoryDirectory::new("cn=cordys,cn=defaultInst,o=example.com")
            .unwrap()
            .with_machine("node1")
            .unwrap()
            .with_package("Orders")
            .unwrap();
        let system = DirectorySystem::connect("dev", Arc::new(memory), Properties::new()).unwrap();
        system.create_organization("acme", "").unwrap();

        let text = describe(&system, &OutputConfig::from_env_and_flag("never")).unwrap();
        assert!(text.contains("[SYSTEM] System: dev"));
        assert!(text.contains("Root: cn=cordys,cn=defaultInst,o=example.com"));
        assert!(text.contains("   acme"));
        assert!(text.contains("Packages: 1"));
        assert!(text.contains("Machines: 1"));
    }
}
