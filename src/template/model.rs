//! Typed template elements and their XML shape.
//!
//! ```xml
//! <template>
//!   <package name="Orders"/>
//!   <dso name="orders-db" type="Relational" desc="Orders">
//!     <configuration><connectionstring>...</connectionstring></configuration>
//!   </dso>
//!   <xmlstoreobject key="/Cordys/WCP/Orders.xml" version="organization" operation="append">
//!     <settings>...</settings>
//!   </xmlstoreobject>
//!   <role name="Approver" type="Application">
//!     <role name="Reviewer"/>
//!     <role name="OrderAdmin" package="Orders"/>
//!   </role>
//!   <user name="jdoe" osidentity="jdoe">
//!     <role name="Approver"/>
//!     <team name="Sales"/>
//!   </user>
//!   <servicegroup name="OrderService">
//!     <wsi name="OrderMethods" package="Orders"/>
//!     <configuration>...</configuration>
//!     <sc name="OrderService-1" machine="node1" automatic="true">
//!       <configuration>...</configuration>
//!       <cp name="socket" type="socket" uri="socket://node1:4000"/>
//!     </sc>
//!   </servicegroup>
//! </template>
//! ```

use crate::error::{Error, Result};
use crate::xml::XmlNode;

/// A by-name reference to a role or web service interface, optionally
/// defined by a package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reference {
    pub name: String,
    pub package: Option<String>,
}

impl Reference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: None,
        }
    }

    pub fn in_package(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: Some(package.into()),
        }
    }

    fn from_xml(node: &XmlNode) -> Result<Self> {
        Ok(Self {
            name: required(node, "name")?,
            package: optional(node, "package"),
        })
    }

    fn to_xml(&self, tag: &str) -> XmlNode {
        let mut node = XmlNode::new(tag).with_attr("name", self.name.as_str());
        if let Some(package) = &self.package {
            node.set_attr("package", package.as_str());
        }
        node
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsoSpec {
    pub name: String,
    pub dso_type: String,
    pub description: String,
    pub configuration: Option<XmlNode>,
}

/// How an XML store object's content is reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XmlStoreOperation {
    /// Replace the whole content.
    #[default]
    Overwrite,
    /// Add the template's top-level children that are not present yet.
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlStoreSpec {
    pub key: String,
    pub version: String,
    pub operation: XmlStoreOperation,
    pub content: XmlNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,
    pub role_type: String,
    pub roles: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub name: String,
    pub description: String,
    pub os_identity: String,
    pub roles: Vec<Reference>,
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPointSpec {
    pub name: String,
    pub cp_type: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContainerSpec {
    pub name: String,
    pub description: String,
    /// Machine named explicitly.
    pub machine: Option<String>,
    /// Machine picked by position in the system's machine list.
    pub machine_index: Option<usize>,
    pub automatic_start: bool,
    pub configuration: Option<XmlNode>,
    pub connection_points: Vec<ConnectionPointSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroupSpec {
    pub name: String,
    pub description: String,
    pub method_sets: Vec<Reference>,
    pub configuration: Option<XmlNode>,
    pub containers: Vec<ServiceContainerSpec>,
}

/// One top-level template element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Package(PackageSpec),
    Dso(DsoSpec),
    XmlStore(XmlStoreSpec),
    Role(RoleSpec),
    User(UserSpec),
    ServiceGroup(ServiceGroupSpec),
    /// An element this version does not know; skipped with a warning.
    Unknown(String),
}

impl Element {
    pub fn from_xml(node: &XmlNode) -> Result<Self> {
        let element = match node.local_name() {
            "package" => Element::Package(PackageSpec {
                name: required(node, "name")?,
            }),
            "dso" => Element::Dso(DsoSpec {
                name: required(node, "name")?,
                dso_type: required(node, "type")?,
                description: text_attr(node, "desc"),
                configuration: configuration(node),
            }),
            "xmlstoreobject" => Element::XmlStore(XmlStoreSpec {
                key: required(node, "key")?,
                version: optional(node, "version")
                    .unwrap_or_else(|| crate::defaults::DEFAULT_XML_STORE_VERSION.to_string()),
                operation: match node.attr("operation") {
                    None | Some("overwrite") => XmlStoreOperation::Overwrite,
                    Some("append") => XmlStoreOperation::Append,
                    Some(other) => {
                        return Err(invalid(node, format!("unknown operation '{}'", other)))
                    }
                },
                content: node
                    .first_element()
                    .cloned()
                    .ok_or_else(|| invalid(node, "missing content"))?,
            }),
            "role" => Element::Role(RoleSpec {
                name: required(node, "name")?,
                description: text_attr(node, "desc"),
                role_type: text_attr(node, "type"),
                roles: references(node, "role")?,
            }),
            "user" => Element::User(UserSpec {
                name: required(node, "name")?,
                description: text_attr(node, "desc"),
                os_identity: text_attr(node, "osidentity"),
                roles: references(node, "role")?,
                teams: node
                    .children_named("team")
                    .map(|team| required(team, "name"))
                    .collect::<Result<_>>()?,
            }),
            "servicegroup" => Element::ServiceGroup(ServiceGroupSpec {
                name: required(node, "name")?,
                description: text_attr(node, "desc"),
                method_sets: references(node, "wsi")?,
                configuration: configuration(node),
                containers: node
                    .children_named("sc")
                    .map(container_from_xml)
                    .collect::<Result<_>>()?,
            }),
            other => Element::Unknown(other.to_string()),
        };
        Ok(element)
    }

    pub fn to_xml(&self) -> XmlNode {
        match self {
            Element::Package(spec) => XmlNode::new("package").with_attr("name", spec.name.as_str()),
            Element::Dso(spec) => {
                let mut node = XmlNode::new("dso")
                    .with_attr("name", spec.name.as_str())
                    .with_attr("type", spec.dso_type.as_str());
                set_text_attr(&mut node, "desc", &spec.description);
                push_configuration(&mut node, spec.configuration.as_ref());
                node
            }
            Element::XmlStore(spec) => {
                let mut node = XmlNode::new("xmlstoreobject")
                    .with_attr("key", spec.key.as_str())
                    .with_attr("version", spec.version.as_str());
                if spec.operation == XmlStoreOperation::Append {
                    node.set_attr("operation", "append");
                }
                node.with_child(spec.content.clone())
            }
            Element::Role(spec) => {
                let mut node = XmlNode::new("role").with_attr("name", spec.name.as_str());
                set_text_attr(&mut node, "desc", &spec.description);
                set_text_attr(&mut node, "type", &spec.role_type);
                for role in &spec.roles {
                    node.push(role.to_xml("role"));
                }
                node
            }
            Element::User(spec) => {
                let mut node = XmlNode::new("user").with_attr("name", spec.name.as_str());
                set_text_attr(&mut node, "desc", &spec.description);
                set_text_attr(&mut node, "osidentity", &spec.os_identity);
                for role in &spec.roles {
                    node.push(role.to_xml("role"));
                }
                for team in &spec.teams {
                    node.push(XmlNode::new("team").with_attr("name", team.as_str()));
                }
                node
            }
            Element::ServiceGroup(spec) => {
                let mut node = XmlNode::new("servicegroup").with_attr("name", spec.name.as_str());
                set_text_attr(&mut node, "desc", &spec.description);
                for wsi in &spec.method_sets {
                    node.push(wsi.to_xml("wsi"));
                }
                push_configuration(&mut node, spec.configuration.as_ref());
                for container in &spec.containers {
                    node.push(container_to_xml(container));
                }
                node
            }
            Element::Unknown(tag) => XmlNode::new(tag.as_str()),
        }
    }

    /// Short label such as `role Approver`, used in reports and logs.
    pub fn label(&self) -> String {
        match self {
            Element::Package(spec) => format!("package {}", spec.name),
            Element::Dso(spec) => format!("dso {}", spec.name),
            Element::XmlStore(spec) => format!("xml store object {}", spec.key),
            Element::Role(spec) => format!("role {}", spec.name),
            Element::User(spec) => format!("user {}", spec.name),
            Element::ServiceGroup(spec) => format!("service group {}", spec.name),
            Element::Unknown(tag) => format!("<{}>", tag),
        }
    }
}

fn container_from_xml(node: &XmlNode) -> Result<ServiceContainerSpec> {
    let machine_index = match node.attr("machine-index") {
        Some(index) => Some(
            index
                .trim()
                .parse()
                .map_err(|_| invalid(node, format!("machine-index '{}' is not a number", index)))?,
        ),
        None => None,
    };
    let automatic_start = match node.attr("automatic") {
        None => true,
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => return Err(invalid(node, format!("automatic '{}' is not a boolean", value))),
        },
    };
    Ok(ServiceContainerSpec {
        name: required(node, "name")?,
        description: text_attr(node, "desc"),
        machine: optional(node, "machine"),
        machine_index,
        automatic_start,
        configuration: configuration(node),
        connection_points: node
            .children_named("cp")
            .map(|cp| {
                Ok(ConnectionPointSpec {
                    name: required(cp, "name")?,
                    cp_type: text_attr(cp, "type"),
                    uri: text_attr(cp, "uri"),
                })
            })
            .collect::<Result<_>>()?,
    })
}

fn container_to_xml(spec: &ServiceContainerSpec) -> XmlNode {
    let mut node = XmlNode::new("sc").with_attr("name", spec.name.as_str());
    set_text_attr(&mut node, "desc", &spec.description);
    if let Some(machine) = &spec.machine {
        node.set_attr("machine", machine.as_str());
    }
    if let Some(index) = spec.machine_index {
        node.set_attr("machine-index", index.to_string());
    }
    node.set_attr("automatic", spec.automatic_start.to_string());
    push_configuration(&mut node, spec.configuration.as_ref());
    for cp in &spec.connection_points {
        let mut child = XmlNode::new("cp").with_attr("name", cp.name.as_str());
        set_text_attr(&mut child, "type", &cp.cp_type);
        set_text_attr(&mut child, "uri", &cp.uri);
        node.push(child);
    }
    node
}

fn references(node: &XmlNode, tag: &str) -> Result<Vec<Reference>> {
    node.children_named(tag).map(Reference::from_xml).collect()
}

fn configuration(node: &XmlNode) -> Option<XmlNode> {
    node.child("configuration")?.first_element().cloned()
}

fn push_configuration(node: &mut XmlNode, configuration: Option<&XmlNode>) {
    if let Some(configuration) = configuration {
        node.push(XmlNode::new("configuration").with_child(configuration.clone()));
    }
}

fn required(node: &XmlNode, attribute: &str) -> Result<String> {
    match node.attr(attribute) {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(invalid(node, format!("missing '{}' attribute", attribute))),
    }
}

fn optional(node: &XmlNode, attribute: &str) -> Option<String> {
    node.attr(attribute)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn text_attr(node: &XmlNode, attribute: &str) -> String {
    node.attr(attribute).unwrap_or_default().to_string()
}

fn set_text_attr(node: &mut XmlNode, attribute: &str, value: &str) {
    if !value.is_empty() {
        node.set_attr(attribute, value);
    }
}

fn invalid(node: &XmlNode, message: impl Into<String>) -> Error {
    Error::Template {
        message: format!("<{}>: {}", node.local_name(), message.into()),
        variable: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_group() {
        let node = XmlNode::parse(
            r#"<servicegroup name="sg" desc="Orders">
                 <wsi name="OrderMethods" package="Orders"/>
                 <configuration><routing>failover</routing></configuration>
                 <sc name="sc1" machine-index="1" automatic="false">
                   <cp name="socket" type="socket" uri="socket://node:1"/>
                 </sc>
                 <sc name="sc2"/>
               </servicegroup>"#,
        )
        .unwrap();
        let Element::ServiceGroup(spec) = Element::from_xml(&node).unwrap() else {
            panic!("expected a service group");
        };
        assert_eq!(spec.method_sets, vec![Reference::in_package("OrderMethods", "Orders")]);
        assert_eq!(
            spec.configuration.as_ref().map(|c| c.name()),
            Some("routing")
        );
        assert_eq!(spec.containers.len(), 2);
        assert_eq!(spec.containers[0].machine_index, Some(1));
        assert!(!spec.containers[0].automatic_start);
        assert_eq!(spec.containers[0].connection_points[0].cp_type, "socket");
        assert!(spec.containers[1].automatic_start);
        assert_eq!(spec.containers[1].machine, None);

        assert_eq!(
            Element::from_xml(&Element::ServiceGroup(spec.clone()).to_xml()).unwrap(),
            Element::ServiceGroup(spec)
        );
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let error = Element::from_xml(&XmlNode::new("role")).unwrap_err();
        assert!(error.to_string().contains("missing 'name'"));
    }

    #[test]
    fn test_xml_store_operation_defaults_to_overwrite() {
        let node = XmlNode::new("xmlstoreobject")
            .with_attr("key", "/Cordys/x.xml")
            .with_child(XmlNode::new("x"));
        let Element::XmlStore(spec) = Element::from_xml(&node).unwrap() else {
            panic!("expected an xml store object");
        };
        assert_eq!(spec.operation, XmlStoreOperation::Overwrite);
        assert_eq!(spec.version, "organization");

        let bad = node.with_attr("operation", "merge");
        assert!(Element::from_xml(&bad).is_err());
    }

    #[test]
    fn test_unknown_element_is_kept_as_unknown() {
        assert_eq!(
            Element::from_xml(&XmlNode::new("widget")).unwrap(),
            Element::Unknown("widget".to_string())
        );
    }
}
