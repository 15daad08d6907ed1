//! Service groups, service containers and connection points.

use std::sync::Arc;

use crate::dn::Dn;
use crate::error::Result;
use crate::lazy::{LazyList, ListSource};
use crate::object::{fields, DirectoryObject, ObjectKind};
use crate::system::DirectorySystem;
use crate::xml::XmlNode;

impl DirectoryObject {
    /// Service containers of a service group, or all containers inside an
    /// organization.
    pub fn service_containers(&self) -> Result<Arc<LazyList>> {
        self.ensure_kind(
            &[ObjectKind::ServiceGroup, ObjectKind::Organization],
            "list service containers",
        )?;
        let source = if self.kind() == ObjectKind::ServiceGroup {
            ListSource::Children {
                base: self.dn().clone(),
                kind: Some(ObjectKind::ServiceContainer),
            }
        } else {
            ListSource::Search {
                base: self.dn().clone(),
                kind: ObjectKind::ServiceContainer,
            }
        };
        self.system()?.list(source)
    }

    pub fn connection_points(&self) -> Result<Arc<LazyList>> {
        self.ensure_kind(&[ObjectKind::ServiceContainer], "list connection points")?;
        self.system()?.list(ListSource::Children {
            base: self.dn().clone(),
            kind: Some(ObjectKind::ConnectionPoint),
        })
    }

    /// Create a service group with its interfaces and namespaces.
    pub fn create_service_group(
        &self,
        name: &str,
        description: &str,
        method_sets: &[Dn],
        configuration: Option<&XmlNode>,
    ) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::Organization], "create service group")?;
        let namespaces = namespaces_of(&*self.system()?, method_sets)?;
        let groups = self.container_dn(ObjectKind::ServiceGroup);
        self.create_below(groups, ObjectKind::ServiceGroup, name, |entry| {
            if !description.is_empty() {
                fields::DESCRIPTION.write(entry, &description.to_string())?;
            }
            fields::METHOD_SETS.write(entry, &method_sets.to_vec())?;
            fields::NAMESPACES.write(entry, &namespaces)?;
            if let Some(configuration) = configuration {
                fields::SERVICE_GROUP_CONFIGURATION.write(entry, configuration)?;
            }
            Ok(())
        })
    }

    /// Create a service container in this service group.
    pub fn create_service_container(
        &self,
        name: &str,
        machine: &str,
        automatic_start: bool,
        description: &str,
        configuration: Option<&XmlNode>,
    ) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::ServiceGroup], "create service container")?;
        self.create_child(ObjectKind::ServiceContainer, name, |entry| {
            fields::COMPUTER.write(entry, &machine.to_string())?;
            fields::AUTOMATIC_START.write(entry, &automatic_start)?;
            if !description.is_empty() {
                fields::DESCRIPTION.write(entry, &description.to_string())?;
            }
            if let Some(configuration) = configuration {
                fields::SERVICE_CONTAINER_CONFIGURATION.write(entry, configuration)?;
            }
            Ok(())
        })
    }

    pub fn create_connection_point(
        &self,
        name: &str,
        cp_type: &str,
        uri: &str,
    ) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::ServiceContainer], "create connection point")?;
        self.create_child(ObjectKind::ConnectionPoint, name, |entry| {
            if !cp_type.is_empty() {
                fields::CONNECTION_POINT_TYPE.write(entry, &cp_type.to_string())?;
            }
            if !uri.is_empty() {
                fields::CONNECTION_POINT_URI.write(entry, &uri.to_string())?;
            }
            Ok(())
        })
    }

    pub fn is_running(&self) -> Result<bool> {
        self.ensure_kind(&[ObjectKind::ServiceContainer], "status")?;
        Ok(self
            .system()?
            .container_states()?
            .into_iter()
            .any(|(dn, up)| up && &dn == self.dn()))
    }

    pub fn start(&self) -> Result<()> {
        self.ensure_kind(&[ObjectKind::ServiceContainer], "start")?;
        self.system()?.control_container("Start", self.dn())
    }

    pub fn stop(&self) -> Result<()> {
        self.ensure_kind(&[ObjectKind::ServiceContainer], "stop")?;
        self.system()?.control_container("Stop", self.dn())
    }

    pub fn restart(&self) -> Result<()> {
        self.ensure_kind(&[ObjectKind::ServiceContainer], "restart")?;
        self.system()?.control_container("Restart", self.dn())
    }
}

/// Union of the namespaces of the given interfaces, in first-seen order.
///
/// Interfaces that do not exist contribute nothing.
pub(crate) fn namespaces_of(system: &DirectorySystem, method_sets: &[Dn]) -> Result<Vec<String>> {
    let mut namespaces: Vec<String> = Vec::new();
    for dn in method_sets {
        let method_set = match system.get_ldap(dn) {
            Ok(method_set) => method_set,
            Err(e) if e.is_not_found() => {
                log::debug!("Interface {} not found, no namespaces", dn);
                continue;
            }
            Err(e) => return Err(e),
        };
        for namespace in method_set.get(fields::NAMESPACES)?.unwrap_or_default() {
            if !namespaces.contains(&namespace) {
                namespaces.push(namespace);
            }
        }
    }
    Ok(namespaces)
}
