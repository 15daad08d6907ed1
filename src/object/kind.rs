//! Kinds of directory objects and their capabilities.
//!
//! All objects share one concrete type; the handful of behaviors that differ
//! per kind (object class, naming attribute, the container new entries go
//! into, whether deletion is guarded) hang off `ObjectKind`.

use std::fmt;

use serde::Serialize;

use super::entry::Entry;

/// The kind of a directory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ObjectKind {
    Organization,
    User,
    Role,
    ServiceGroup,
    ServiceContainer,
    AuthenticatedUser,
    Package,
    DsoType,
    Dso,
    WebServiceInterface,
    WebService,
    ConnectionPoint,
    Connector,
    Machine,
    XmlStoreObject,
    ProcessModel,
    Team,
    Worklist,
    Assignment,
    /// Grouping entries such as `cn=organizational users`.
    Container,
}

const DIRECTORY_KINDS: [ObjectKind; 18] = [
    ObjectKind::Organization,
    ObjectKind::User,
    ObjectKind::Role,
    ObjectKind::ServiceGroup,
    ObjectKind::ServiceContainer,
    ObjectKind::AuthenticatedUser,
    ObjectKind::Package,
    ObjectKind::DsoType,
    ObjectKind::Dso,
    ObjectKind::WebServiceInterface,
    ObjectKind::WebService,
    ObjectKind::ConnectionPoint,
    ObjectKind::Connector,
    ObjectKind::Machine,
    ObjectKind::Team,
    ObjectKind::Worklist,
    ObjectKind::Assignment,
    ObjectKind::Container,
];

impl ObjectKind {
    /// The structural object class of entries of this kind.
    ///
    /// XML store kinds have no directory entry and return `None`.
    pub fn object_class(self) -> Option<&'static str> {
        let class = match self {
            ObjectKind::Organization => "organization",
            ObjectKind::User => "busorganizationaluser",
            ObjectKind::Role => "busorganizationalrole",
            ObjectKind::ServiceGroup => "bussoapnode",
            ObjectKind::ServiceContainer => "bussoapprocessor",
            ObjectKind::AuthenticatedUser => "busauthenticationuser",
            ObjectKind::Package => "bussoftwarepackage",
            ObjectKind::DsoType => "busdatasourcetype",
            ObjectKind::Dso => "busdatasource",
            ObjectKind::WebServiceInterface => "busmethodset",
            ObjectKind::WebService => "busmethod",
            ObjectKind::ConnectionPoint => "busconnectionpoint",
            ObjectKind::Connector => "busconnector",
            ObjectKind::Machine => "busmachine",
            ObjectKind::Team => "busorganizationalunit",
            ObjectKind::Worklist => "busworklist",
            ObjectKind::Assignment => "busassignment",
            ObjectKind::Container => "groupOfNames",
            ObjectKind::XmlStoreObject | ObjectKind::ProcessModel => return None,
        };
        Some(class)
    }

    /// Detect the kind of an entry from its object classes.
    pub fn from_entry(entry: &Entry) -> Option<ObjectKind> {
        DIRECTORY_KINDS.into_iter().find(|kind| {
            kind.object_class()
                .map(|class| entry.has_class(class))
                .unwrap_or(false)
        })
    }

    /// The RDN attribute used when naming new entries.
    pub fn naming_attribute(self) -> &'static str {
        match self {
            ObjectKind::Organization => "o",
            _ => "cn",
        }
    }

    /// Name of the grouping entry new entries of this kind are created in.
    ///
    /// Organization-scoped kinds live under `cn=<container>,o=<org>`;
    /// authenticated users and machines under `cn=<container>,<root>`.
    pub fn container(self) -> Option<&'static str> {
        match self {
            ObjectKind::User => Some("organizational users"),
            ObjectKind::Role => Some("organizational roles"),
            ObjectKind::ServiceGroup => Some("soap nodes"),
            ObjectKind::WebServiceInterface => Some("method sets"),
            ObjectKind::DsoType => Some("data sources"),
            ObjectKind::Team => Some("teams"),
            ObjectKind::Worklist => Some("worklists"),
            ObjectKind::AuthenticatedUser => Some("authenticated users"),
            ObjectKind::Machine => Some("machines"),
            _ => None,
        }
    }

    /// Containers created together with every organization.
    pub fn organization_containers() -> [&'static str; 7] {
        [
            "organizational users",
            "organizational roles",
            "soap nodes",
            "method sets",
            "data sources",
            "teams",
            "worklists",
        ]
    }

    /// Whether deleting an object of this kind runs a guard first.
    pub fn has_pre_delete_guard(self) -> bool {
        matches!(
            self,
            ObjectKind::Package
                | ObjectKind::Organization
                | ObjectKind::ServiceContainer
                | ObjectKind::User
                | ObjectKind::AuthenticatedUser
        )
    }

    /// Objects kept in the XML store rather than the directory.
    pub fn is_xml_store(self) -> bool {
        matches!(self, ObjectKind::XmlStoreObject | ObjectKind::ProcessModel)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObjectKind::Organization => "organization",
            ObjectKind::User => "user",
            ObjectKind::Role => "role",
            ObjectKind::ServiceGroup => "service group",
            ObjectKind::ServiceContainer => "service container",
            ObjectKind::AuthenticatedUser => "authenticated user",
            ObjectKind::Package => "package",
            ObjectKind::DsoType => "dso type",
            ObjectKind::Dso => "dso",
            ObjectKind::WebServiceInterface => "web service interface",
            ObjectKind::WebService => "web service",
            ObjectKind::ConnectionPoint => "connection point",
            ObjectKind::Connector => "connector",
            ObjectKind::Machine => "machine",
            ObjectKind::XmlStoreObject => "xml store object",
            ObjectKind::ProcessModel => "process model",
            ObjectKind::Team => "team",
            ObjectKind::Worklist => "worklist",
            ObjectKind::Assignment => "assignment",
            ObjectKind::Container => "container",
        };
        f.write_str(label)
    }
}
