//! Organization-scoped collections and creators.

use std::sync::Arc;

use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::lazy::{LazyList, ListSource};
use crate::object::{fields, DirectoryObject, ObjectKind};
use crate::xml::XmlNode;

impl DirectoryObject {
    fn organization_list(&self, kind: ObjectKind) -> Result<Arc<LazyList>> {
        self.ensure_kind(&[ObjectKind::Organization], "list")?;
        self.system()?.list(ListSource::Children {
            base: self.container_dn(kind),
            kind: Some(kind),
        })
    }

    fn children_list(&self, kind: ObjectKind) -> Result<Arc<LazyList>> {
        self.system()?.list(ListSource::Children {
            base: self.dn().clone(),
            kind: Some(kind),
        })
    }

    pub(crate) fn reference_list(&self, attribute: &str) -> Result<Arc<LazyList>> {
        self.system()?.list(ListSource::EntryRefs {
            owner: self.dn().clone(),
            attribute: attribute.to_string(),
        })
    }

    /// DN of the grouping entry that holds objects of `kind` in this
    /// organization.
    pub(crate) fn container_dn(&self, kind: ObjectKind) -> Dn {
        self.dn().child("cn", kind.container().unwrap_or_default())
    }

    /// DN of the organization this object belongs to, if any.
    pub fn organization_dn(&self) -> Option<Dn> {
        let mut current = Some(self.dn().clone());
        while let Some(dn) = current {
            if dn.rdn().attribute.eq_ignore_ascii_case("o") && dn.depth() > 1 {
                return Some(dn);
            }
            current = dn.parent();
        }
        None
    }

    pub fn users(&self) -> Result<Arc<LazyList>> {
        self.organization_list(ObjectKind::User)
    }

    /// Roles: an organization's or package's own roles, or the roles held
    /// by a user or role.
    pub fn roles(&self) -> Result<Arc<LazyList>> {
        match self.kind() {
            ObjectKind::Organization => self.organization_list(ObjectKind::Role),
            ObjectKind::Package => self.children_list(ObjectKind::Role),
            ObjectKind::User | ObjectKind::Role => self.reference_list(fields::ROLES.name()),
            _ => Err(unsupported("roles", self)),
        }
    }

    /// Web service interfaces: defined in an organization or package, or
    /// attached to a service group.
    pub fn method_sets(&self) -> Result<Arc<LazyList>> {
        match self.kind() {
            ObjectKind::Organization => self.organization_list(ObjectKind::WebServiceInterface),
            ObjectKind::Package => self.system()?.list(ListSource::Children {
                base: self.container_dn(ObjectKind::WebServiceInterface),
                kind: Some(ObjectKind::WebServiceInterface),
            }),
            ObjectKind::ServiceGroup => self.reference_list(fields::METHOD_SETS.name()),
            _ => Err(unsupported("method sets", self)),
        }
    }

    pub fn service_groups(&self) -> Result<Arc<LazyList>> {
        self.organization_list(ObjectKind::ServiceGroup)
    }

    pub fn dso_types(&self) -> Result<Arc<LazyList>> {
        self.organization_list(ObjectKind::DsoType)
    }

    pub fn teams(&self) -> Result<Arc<LazyList>> {
        self.organization_list(ObjectKind::Team)
    }

    pub fn worklists(&self) -> Result<Arc<LazyList>> {
        self.organization_list(ObjectKind::Worklist)
    }

    pub fn dsos(&self) -> Result<Arc<LazyList>> {
        self.ensure_kind(&[ObjectKind::DsoType], "list dsos")?;
        self.children_list(ObjectKind::Dso)
    }

    pub fn web_services(&self) -> Result<Arc<LazyList>> {
        self.ensure_kind(&[ObjectKind::WebServiceInterface], "list web services")?;
        self.children_list(ObjectKind::WebService)
    }

    pub fn assignments(&self) -> Result<Arc<LazyList>> {
        self.ensure_kind(&[ObjectKind::Team], "list assignments")?;
        self.children_list(ObjectKind::Assignment)
    }

    /// Every object in this organization's XML store.
    pub fn xml_store_objects(&self) -> Result<Arc<LazyList>> {
        self.ensure_kind(&[ObjectKind::Organization], "list XML store")?;
        self.system()?.list(ListSource::XmlStore {
            organization: self.dn().clone(),
            folder: String::new(),
            kind: ObjectKind::XmlStoreObject,
        })
    }

    pub fn process_models(&self) -> Result<Arc<LazyList>> {
        self.ensure_kind(&[ObjectKind::Organization], "list process models")?;
        self.system()?.list(ListSource::XmlStore {
            organization: self.dn().clone(),
            folder: "/Cordys/bpm".to_string(),
            kind: ObjectKind::ProcessModel,
        })
    }

    /// Create an organizational user backed by an authenticated user,
    /// creating the authenticated user first if needed.
    pub fn create_user(
        &self,
        name: &str,
        description: &str,
        os_identity: &str,
    ) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::Organization], "create user")?;
        if name.eq_ignore_ascii_case("SYSTEM") {
            return Err(Error::precondition(
                "create user",
                "the SYSTEM user must not be modified",
            ));
        }
        let system = self.system()?;
        let authenticated = system.ensure_authenticated_user(name, os_identity, self.dn())?;
        let everyone = self
            .container_dn(ObjectKind::Role)
            .child("cn", &format!("everyoneIn{}", self.name()));
        let users = self.container_dn(ObjectKind::User);
        self.create_below(users, ObjectKind::User, name, |entry| {
            fields::AUTHENTICATION_USER.write(entry, authenticated.dn())?;
            fields::ROLES.write(entry, &vec![everyone])?;
            if !description.is_empty() {
                fields::DESCRIPTION.write(entry, &description.to_string())?;
            }
            Ok(())
        })
    }

    pub fn create_role(
        &self,
        name: &str,
        description: &str,
        role_type: &str,
    ) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::Organization], "create role")?;
        let roles = self.container_dn(ObjectKind::Role);
        self.create_below(roles, ObjectKind::Role, name, |entry| {
            if !description.is_empty() {
                fields::DESCRIPTION.write(entry, &description.to_string())?;
            }
            if !role_type.is_empty() {
                fields::ROLE_TYPE.write(entry, &role_type.to_string())?;
            }
            Ok(())
        })
    }

    pub fn create_dso_type(&self, name: &str) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::Organization], "create dso type")?;
        let types = self.container_dn(ObjectKind::DsoType);
        self.create_below(types, ObjectKind::DsoType, name, |_| Ok(()))
    }

    /// Create a data source below this DSO type.
    pub fn create_dso(
        &self,
        name: &str,
        description: &str,
        configuration: Option<&XmlNode>,
    ) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::DsoType], "create dso")?;
        self.create_child(ObjectKind::Dso, name, |entry| {
            if !description.is_empty() {
                fields::DESCRIPTION.write(entry, &description.to_string())?;
            }
            if let Some(configuration) = configuration {
                fields::DSO_CONFIGURATION.write(entry, configuration)?;
            }
            Ok(())
        })
    }

    pub fn create_team(&self, name: &str, description: &str) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::Organization], "create team")?;
        let teams = self.container_dn(ObjectKind::Team);
        self.create_below(teams, ObjectKind::Team, name, |entry| {
            if !description.is_empty() {
                fields::DESCRIPTION.write(entry, &description.to_string())?;
            }
            Ok(())
        })
    }

    /// Assign `user` to this team. Existing assignments are kept.
    pub fn assign_user(&self, user: &DirectoryObject) -> Result<Arc<DirectoryObject>> {
        self.ensure_kind(&[ObjectKind::Team], "assign user")?;
        if let Some(existing) = self.assignments()?.get_by_name(user.name())? {
            return Ok(existing);
        }
        let team = self.dn().clone();
        self.create_child(ObjectKind::Assignment, user.name(), |entry| {
            fields::ASSIGNED_USER.write(entry, user.dn())?;
            fields::TEAM.write(entry, &team)
        })
    }

    /// Teams this user is assigned to.
    pub fn user_teams(&self) -> Result<Vec<Arc<DirectoryObject>>> {
        self.ensure_kind(&[ObjectKind::User], "list teams")?;
        let system = self.system()?;
        let Some(organization) = self.organization_dn() else {
            return Ok(Vec::new());
        };
        let mut teams = Vec::new();
        for team in system.get_ldap(&organization)?.teams()?.items()? {
            for assignment in team.assignments()?.items()? {
                if assignment.get(fields::ASSIGNED_USER)?.as_ref() == Some(self.dn()) {
                    teams.push(Arc::clone(&team));
                    break;
                }
            }
        }
        Ok(teams)
    }
}

fn unsupported(what: &str, object: &DirectoryObject) -> Error {
    Error::precondition(
        format!("list {}", what),
        format!("not supported on {} {}", object.kind(), object.name()),
    )
}
