//! # Tree Command Implementation
//!
//! Displays the object graph of a system (or one organization) as a tree.
//! Every list is fetched lazily, so `--depth` also limits the number of
//! requests. Read-only.

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};

use caas::lazy::LazyList;
use caas::object::{DirectoryObject, ObjectKind};
use caas::registry::ConnectionRegistry;
use caas::system::DirectorySystem;

use super::ConnectionArgs;

/// Display the directory object tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Only show this organization.
    #[arg(short, long, value_name = "NAME")]
    pub org: Option<String>,

    /// Maximum depth to display. 0 shows only the root.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

pub fn execute(args: TreeArgs) -> Result<()> {
    let registry = ConnectionRegistry::new();
    let system = args.connection.open(&registry)?;
    let depth = args.depth.unwrap_or(usize::MAX);
    let root = match &args.org {
        Some(name) => organization_node(&*system.organization(name)?, depth)?,
        None => system_node(&system, depth)?,
    };
    print_tree(&root).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
    Ok(())
}

fn system_node(system: &DirectorySystem, depth: usize) -> Result<TreeNode> {
    let mut node = TreeNode::leaf(format!("{} ({})", system.name(), system.root()));
    if depth == 0 {
        return Ok(node);
    }
    let mut organizations = TreeNode::leaf("organizations");
    if depth > 1 {
        for organization in sorted(&*system.organizations()?)? {
            organizations
                .children
                .push(organization_node(&organization, depth - 2)?);
        }
    }
    node.children.push(organizations);
    node.children
        .push(group("packages", &*system.packages()?, depth - 1)?);
    node.children
        .push(group("machines", &*system.machines()?, depth - 1)?);
    Ok(node)
}

fn organization_node(organization: &DirectoryObject, depth: usize) -> Result<TreeNode> {
    let mut node = TreeNode::leaf(format!("{} {}", organization.kind(), organization.name()));
    if depth == 0 {
        return Ok(node);
    }
    node.children
        .push(group("users", &*organization.users()?, depth - 1)?);
    node.children
        .push(group("roles", &*organization.roles()?, depth - 1)?);
    node.children
        .push(group("dso types", &*organization.dso_types()?, depth - 1)?);
    node.children.push(group(
        "service groups",
        &*organization.service_groups()?,
        depth - 1,
    )?);
    Ok(node)
}

/// A labelled list; members expand into their own children.
fn group(label: &str, list: &LazyList, depth: usize) -> Result<TreeNode> {
    let mut node = TreeNode::leaf(label);
    if depth == 0 {
        return Ok(node);
    }
    for object in sorted(list)? {
        node.children.push(object_node(&object, depth - 1)?);
    }
    Ok(node)
}

fn object_node(object: &DirectoryObject, depth: usize) -> Result<TreeNode> {
    let mut node = TreeNode::leaf(object.name());
    if depth == 0 {
        return Ok(node);
    }
    let children = match object.kind() {
        ObjectKind::ServiceGroup => Some(object.service_containers()?),
        ObjectKind::ServiceContainer => Some(object.connection_points()?),
        ObjectKind::DsoType => Some(object.dsos()?),
        _ => None,
    };
    if let Some(list) = children {
        for child in sorted(&list)? {
            node.children.push(object_node(&child, depth - 1)?);
        }
    }
    Ok(node)
}

fn sorted(list: &LazyList) -> Result<Vec<std::sync::Arc<DirectoryObject>>> {
    let mut items = list.items()?;
    items.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(items)
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caas::config::Properties;
    use caas::remote::MemoryDirectory;
    use std::sync::Arc;

    fn labels(node: &TreeNode) -> Vec<&str> {
        node.children.iter().map(|child| child.label.as_str()).collect()
    }

    #[test]
    fn test_organization_node_lists_categories() {
        let memory = MemoryDirectory::new("cn=cordys,o=example.com")
            .unwrap()
            .with_machine("node1")
            .unwrap();
        let system = DirectorySystem::connect("dev", Arc::new(memory), Properties::new()).unwrap();
        let acme = system.create_organization("acme", "").unwrap();
        acme.create_role("Approver", "", "").unwrap();

        let node = organization_node(&acme, usize::MAX).unwrap();
        assert_eq!(node.label, "organization acme");
        assert_eq!(
            labels(&node),
            vec!["users", "roles", "dso types", "service groups"]
        );
        assert_eq!(labels(&node.children[1]), vec!["Approver", "everyoneInacme"]);
    }

    #[test]
    fn test_depth_zero_does_not_expand() {
        let memory = MemoryDirectory::new("cn=cordys,o=example.com").unwrap();
        let system = DirectorySystem::connect("dev", Arc::new(memory), Properties::new()).unwrap();
        let node = system_node(&system, 0).unwrap();
        assert!(node.children.is_empty());
    }
}
