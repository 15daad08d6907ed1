//! Capturing an organization as a template.

use std::sync::Arc;

use crate::dn::Dn;
use crate::error::Result;
use crate::lazy::LazyList;
use crate::object::{fields, DirectoryObject, ObjectKind};
use crate::system::DirectorySystem;
use crate::template::model::{
    ConnectionPointSpec, DsoSpec, Element, PackageSpec, Reference, RoleSpec, ServiceContainerSpec,
    ServiceGroupSpec, UserSpec, XmlStoreOperation, XmlStoreSpec,
};
use crate::template::substitute::{reverse_substitute_xml, Variables};
use crate::template::Template;

/// Which categories to capture, and which values to turn back into
/// `${name}` placeholders.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub packages: bool,
    pub dsos: bool,
    pub xml_store: bool,
    pub roles: bool,
    pub users: bool,
    pub service_groups: bool,
    pub variables: Variables,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            packages: true,
            dsos: true,
            xml_store: true,
            roles: true,
            users: true,
            service_groups: true,
            variables: Variables::new(),
        }
    }
}

pub(crate) fn export(organization: &DirectoryObject, options: &ExportOptions) -> Result<Template> {
    organization.ensure_kind(&[ObjectKind::Organization], "export")?;
    let system = organization.system()?;
    let exporter = Exporter {
        system: &*system,
        organization,
        everyone: organization
            .container_dn(ObjectKind::Role)
            .child("cn", &format!("everyoneIn{}", organization.name())),
    };
    log::info!("Exporting organization {} ...", organization.name());

    let mut elements = Vec::new();
    type Capture<'e> = &'e dyn Fn(&Exporter<'_>) -> Result<Vec<Element>>;
    let categories: [(&str, bool, Capture<'_>); 6] = [
        ("packages", options.packages, &|e: &Exporter<'_>| e.packages()),
        ("dsos", options.dsos, &|e: &Exporter<'_>| e.dsos()),
        ("xml store objects", options.xml_store, &|e: &Exporter<'_>| e.xml_store()),
        ("roles", options.roles, &|e: &Exporter<'_>| e.roles()),
        ("users", options.users, &|e: &Exporter<'_>| e.users()),
        ("service groups", options.service_groups, &|e: &Exporter<'_>| e.service_groups()),
    ];
    for (label, enabled, capture) in categories {
        if !enabled {
            log::info!("Skipping {}", label);
            continue;
        }
        let captured = capture(&exporter)?;
        log::debug!("Captured {} {}", captured.len(), label);
        elements.extend(captured);
    }

    let template = Template::from_elements(&elements);
    let document = reverse_substitute_xml(template.document(), &options.variables)?;
    log::info!(
        "Exporting organization {} ... OK ({} elements)",
        organization.name(),
        elements.len()
    );
    Ok(Template::from_document(document))
}

struct Exporter<'a> {
    system: &'a DirectorySystem,
    organization: &'a DirectoryObject,
    everyone: Dn,
}

impl Exporter<'_> {
    fn packages(&self) -> Result<Vec<Element>> {
        Ok(sorted(&*self.system.packages()?)?
            .iter()
            .map(|package| {
                Element::Package(PackageSpec {
                    name: package.name().to_string(),
                })
            })
            .collect())
    }

    fn dsos(&self) -> Result<Vec<Element>> {
        let mut elements = Vec::new();
        for dso_type in sorted(&*self.organization.dso_types()?)? {
            for dso in sorted(&*dso_type.dsos()?)? {
                elements.push(Element::Dso(DsoSpec {
                    name: dso.name().to_string(),
                    dso_type: dso_type.name().to_string(),
                    description: text(&dso, fields::DESCRIPTION)?,
                    configuration: dso.get(fields::DSO_CONFIGURATION)?,
                }));
            }
        }
        Ok(elements)
    }

    fn xml_store(&self) -> Result<Vec<Element>> {
        let mut objects = self.organization.xml_store_objects()?.items()?;
        objects.sort_by(|a, b| a.store_key().cmp(&b.store_key()));
        let mut elements = Vec::new();
        for object in objects {
            let (Some(key), Some(content)) = (object.store_key(), object.content()?) else {
                continue;
            };
            elements.push(Element::XmlStore(XmlStoreSpec {
                key: key.to_string(),
                version: object
                    .store_version()?
                    .unwrap_or_else(|| crate::defaults::DEFAULT_XML_STORE_VERSION.to_string()),
                operation: XmlStoreOperation::Overwrite,
                content,
            }));
        }
        Ok(elements)
    }

    fn roles(&self) -> Result<Vec<Element>> {
        let mut elements = Vec::new();
        for role in sorted(&*self.organization.roles()?)? {
            if *role.dn() == self.everyone {
                continue;
            }
            elements.push(Element::Role(RoleSpec {
                name: role.name().to_string(),
                description: text(&role, fields::DESCRIPTION)?,
                role_type: text(&role, fields::ROLE_TYPE)?,
                roles: self.references(&*role.roles()?)?,
            }));
        }
        Ok(elements)
    }

    fn users(&self) -> Result<Vec<Element>> {
        let mut elements = Vec::new();
        for user in sorted(&*self.organization.users()?)? {
            if user.name().eq_ignore_ascii_case("SYSTEM") {
                continue;
            }
            let mut teams: Vec<String> = user
                .user_teams()?
                .iter()
                .map(|team| team.name().to_string())
                .collect();
            teams.sort();
            elements.push(Element::User(UserSpec {
                name: user.name().to_string(),
                description: text(&user, fields::DESCRIPTION)?,
                os_identity: self.os_identity(&user)?,
                roles: self.references(&*user.roles()?)?,
                teams,
            }));
        }
        Ok(elements)
    }

    fn service_groups(&self) -> Result<Vec<Element>> {
        let mut elements = Vec::new();
        for group in sorted(&*self.organization.service_groups()?)? {
            let mut containers = Vec::new();
            for container in sorted(&*group.service_containers()?)? {
                let mut connection_points = Vec::new();
                for point in sorted(&*container.connection_points()?)? {
                    connection_points.push(ConnectionPointSpec {
                        name: point.name().to_string(),
                        cp_type: text(&point, fields::CONNECTION_POINT_TYPE)?,
                        uri: text(&point, fields::CONNECTION_POINT_URI)?,
                    });
                }
                containers.push(ServiceContainerSpec {
                    name: container.name().to_string(),
                    description: text(&container, fields::DESCRIPTION)?,
                    machine: container.get(fields::COMPUTER)?,
                    machine_index: None,
                    automatic_start: container.get(fields::AUTOMATIC_START)?.unwrap_or(true),
                    configuration: container.get(fields::SERVICE_CONTAINER_CONFIGURATION)?,
                    connection_points,
                });
            }
            elements.push(Element::ServiceGroup(ServiceGroupSpec {
                name: group.name().to_string(),
                description: text(&group, fields::DESCRIPTION)?,
                method_sets: self.references(&*group.method_sets()?)?,
                configuration: group.get(fields::SERVICE_GROUP_CONFIGURATION)?,
                containers,
            }));
        }
        Ok(elements)
    }

    /// Members of a reference list as by-name references, minus the
    /// implicit `everyoneIn<org>` role.
    fn references(&self, list: &LazyList) -> Result<Vec<Reference>> {
        let mut references: Vec<Reference> = list
            .member_dns()?
            .iter()
            .filter(|dn| **dn != self.everyone)
            .map(|dn| reference(dn, self.system.root()))
            .collect();
        references.sort();
        Ok(references)
    }

    fn os_identity(&self, user: &DirectoryObject) -> Result<String> {
        let Some(authenticated) = user.get(fields::AUTHENTICATION_USER)? else {
            return Ok(String::new());
        };
        match self.system.get_ldap(&authenticated) {
            Ok(authenticated) => Ok(authenticated.get(fields::OS_IDENTITY)?.unwrap_or_default()),
            Err(e) if e.is_not_found() => {
                log::debug!("Authenticated user {} of {} is gone", authenticated, user.name());
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// A DN directly below a `cn=<package>` entry of the root names an object
/// of that package; anything else is organization-local.
fn reference(dn: &Dn, root: &Dn) -> Reference {
    match dn.child_of_ancestor(root) {
        Some(top) if top.rdn().attribute.eq_ignore_ascii_case("cn") => {
            Reference::in_package(dn.name(), top.name())
        }
        _ => Reference::new(dn.name()),
    }
}

fn sorted(list: &LazyList) -> Result<Vec<Arc<DirectoryObject>>> {
    let mut items = list.items()?;
    items.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(items)
}

fn text(object: &DirectoryObject, field: fields::Field<String>) -> Result<String> {
    Ok(object.get(field)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_from_dn() {
        let root = Dn::parse("cn=cordys,o=example.com").unwrap();
        let packaged = Dn::parse("cn=OrderAdmin,cn=Orders,cn=cordys,o=example.com").unwrap();
        assert_eq!(
            reference(&packaged, &root),
            Reference::in_package("OrderAdmin", "Orders")
        );
        let local =
            Dn::parse("cn=Approver,cn=organizational roles,o=acme,cn=cordys,o=example.com").unwrap();
        assert_eq!(reference(&local, &root), Reference::new("Approver"));
    }

    #[test]
    fn test_default_options_capture_everything() {
        let options = ExportOptions::default();
        assert!(options.packages && options.dsos && options.xml_store);
        assert!(options.roles && options.users && options.service_groups);
        assert!(options.variables.is_empty());
    }
}
