//! Typed property accessors over directory entries.
//!
//! Every attribute the client reads or writes is declared once here as a
//! `Field<T>`. The value type is fixed at the declaration, so
//! `obj.get(ROLES)` is always a `Vec<Dn>` and `obj.get(AUTOMATIC_START)`
//! always a `bool`. A missing or malformed value reads as `None`.

use std::marker::PhantomData;

use crate::dn::Dn;
use crate::error::Result;
use crate::xml::{self, XmlNode};

use super::entry::Entry;

/// Conversion between a Rust value and the string values of an attribute.
pub trait FieldValue: Sized {
    fn read(values: &[String]) -> Option<Self>;
    fn write(&self) -> Result<Vec<String>>;
}

impl FieldValue for String {
    fn read(values: &[String]) -> Option<Self> {
        values.first().cloned()
    }

    fn write(&self) -> Result<Vec<String>> {
        Ok(vec![self.clone()])
    }
}

impl FieldValue for bool {
    fn read(values: &[String]) -> Option<Self> {
        match values.first()?.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    fn write(&self) -> Result<Vec<String>> {
        Ok(vec![self.to_string()])
    }
}

impl FieldValue for Vec<String> {
    fn read(values: &[String]) -> Option<Self> {
        Some(values.to_vec())
    }

    fn write(&self) -> Result<Vec<String>> {
        Ok(self.clone())
    }
}

impl FieldValue for Dn {
    fn read(values: &[String]) -> Option<Self> {
        Dn::parse(values.first()?).ok()
    }

    fn write(&self) -> Result<Vec<String>> {
        Ok(vec![self.to_string()])
    }
}

impl FieldValue for Vec<Dn> {
    fn read(values: &[String]) -> Option<Self> {
        Some(
            values
                .iter()
                .filter_map(|value| Dn::parse(value).ok())
                .collect(),
        )
    }

    fn write(&self) -> Result<Vec<String>> {
        Ok(self.iter().map(Dn::to_string).collect())
    }
}

impl FieldValue for XmlNode {
    fn read(values: &[String]) -> Option<Self> {
        xml::parse(values.first()?).ok()
    }

    fn write(&self) -> Result<Vec<String>> {
        Ok(vec![self.to_xml_string()?])
    }
}

/// A typed attribute of a directory entry.
pub struct Field<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> std::fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field({})", self.name)
    }
}

impl<T: FieldValue> Field<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Read the field from an entry.
    pub fn read(&self, entry: &Entry) -> Option<T> {
        let values = entry.values(self.name);
        if values.is_empty() {
            return None;
        }
        T::read(values)
    }

    /// Write the field into an entry.
    pub fn write(&self, entry: &mut Entry, value: &T) -> Result<()> {
        entry.set(self.name, value.write()?);
        Ok(())
    }
}

pub const CN: Field<String> = Field::new("cn");
pub const DESCRIPTION: Field<String> = Field::new("description");
pub const OBJECT_CLASS: Field<Vec<String>> = Field::new("objectclass");

/// Roles held by a user, or sub-roles of a role.
pub const ROLES: Field<Vec<Dn>> = Field::new("role");
pub const ROLE_TYPE: Field<String> = Field::new("busorganizationalroletype");

pub const AUTHENTICATION_USER: Field<Dn> = Field::new("authenticationuser");
pub const OS_IDENTITY: Field<String> = Field::new("osidentity");
pub const DEFAULT_CONTEXT: Field<Dn> = Field::new("defaultcontext");

/// Web service interfaces attached to a service group.
pub const METHOD_SETS: Field<Vec<Dn>> = Field::new("busmethodsets");
/// Namespaces of a service group or web service interface.
pub const NAMESPACES: Field<Vec<String>> = Field::new("labeleduri");
pub const SERVICE_GROUP_CONFIGURATION: Field<XmlNode> = Field::new("bussoapnodeconfiguration");

pub const SERVICE_CONTAINER_CONFIGURATION: Field<XmlNode> =
    Field::new("bussoapprocessorconfiguration");
pub const COMPUTER: Field<String> = Field::new("computer");
pub const AUTOMATIC_START: Field<bool> = Field::new("automaticstart");

pub const CONNECTION_POINT_URI: Field<String> = Field::new("labeleduri");
pub const CONNECTION_POINT_TYPE: Field<String> = Field::new("busconnectionpointtype");

pub const DSO_CONFIGURATION: Field<XmlNode> = Field::new("busdatasourceconfiguration");

pub const ASSIGNED_USER: Field<Dn> = Field::new("assigneduser");
pub const TEAM: Field<Dn> = Field::new("team");

pub const PACKAGE_VERSION: Field<String> = Field::new("busversion");
