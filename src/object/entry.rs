//! Directory entries in their wire shape.
//!
//! An entry travels as
//!
//! ```xml
//! <entry dn="cn=admin,cn=organizational roles,o=system,cn=cordys">
//!   <objectclass><string>top</string><string>busorganizationalrole</string></objectclass>
//!   <cn><string>admin</string></cn>
//! </entry>
//! ```
//!
//! `Entry` is the parsed form: a DN plus multi-valued string attributes keyed
//! by lower-cased attribute name.

use std::collections::BTreeMap;

use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::xml::XmlNode;

/// A directory entry: DN plus multi-valued attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    /// A new entry with the given object classes and naming attribute.
    pub fn new(dn: Dn, object_classes: &[&str]) -> Self {
        let mut entry = Self {
            attributes: BTreeMap::new(),
            dn,
        };
        let rdn = entry.dn.rdn().clone();
        entry.set(
            "objectclass",
            object_classes.iter().map(|c| c.to_string()).collect(),
        );
        entry.set(&rdn.attribute, vec![rdn.value]);
        entry
    }

    /// Parse an `<entry dn="...">` element.
    pub fn from_xml(node: &XmlNode) -> Result<Self> {
        if node.local_name() != "entry" {
            return Err(Error::xml(format!(
                "expected <entry>, found <{}>",
                node.name()
            )));
        }
        let dn = node
            .attr("dn")
            .ok_or_else(|| Error::xml("entry without dn attribute"))?;
        let mut attributes = BTreeMap::new();
        for attribute in node.elements() {
            let values = attribute
                .children_named("string")
                .map(|value| value.text())
                .collect::<Vec<_>>();
            attributes
                .entry(attribute.local_name().to_lowercase())
                .or_insert_with(Vec::new)
                .extend(values);
        }
        Ok(Self {
            dn: Dn::parse(dn)?,
            attributes,
        })
    }

    /// Serialize back to the wire shape.
    pub fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("entry").with_attr("dn", self.dn.to_string());
        for (name, values) in &self.attributes {
            let mut attribute = XmlNode::new(name.as_str());
            for value in values {
                attribute.push(XmlNode::new("string").with_text(value.as_str()));
            }
            node.push(attribute);
        }
        node
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn attributes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.attributes
    }

    /// All values of an attribute; empty when absent.
    pub fn values(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of an attribute.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// Replace an attribute. An empty list removes it.
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        let name = name.to_lowercase();
        if values.is_empty() {
            self.attributes.remove(&name);
        } else {
            self.attributes.insert(name, values);
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.attributes.remove(&name.to_lowercase());
    }

    pub fn object_classes(&self) -> &[String] {
        self.values("objectclass")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.object_classes()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_xml_round_trip() {
        let dn = Dn::parse("cn=admin,cn=organizational roles,o=system,cn=cordys").unwrap();
        let mut entry = Entry::new(dn, &["top", "busorganizationalrole"]);
        entry.set("description", vec!["Administrator".to_string()]);

        let xml = entry.to_xml();
        assert_eq!(xml.attr("dn"), Some("cn=admin,cn=organizational roles,o=system,cn=cordys"));
        let parsed = Entry::from_xml(&xml).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.value("cn"), Some("admin"));
        assert!(parsed.has_class("BusOrganizationalRole"));
    }

    #[test]
    fn test_attribute_names_are_case_insensitive() {
        let xml = XmlNode::parse(
            r#"<entry dn="o=system"><ObjectClass><string>organization</string></ObjectClass></entry>"#,
        )
        .unwrap();
        let entry = Entry::from_xml(&xml).unwrap();
        assert_eq!(entry.values("objectclass"), ["organization".to_string()]);
        assert!(entry.values("missing").is_empty());
    }

    #[test]
    fn test_setting_empty_values_removes_attribute() {
        let mut entry = Entry::new(Dn::parse("o=system").unwrap(), &["organization"]);
        entry.set("description", vec!["x".to_string()]);
        entry.set("description", Vec::new());
        assert!(entry.value("description").is_none());
    }

    #[test]
    fn test_rejects_non_entry_element() {
        let xml = XmlNode::new("tuple");
        assert!(Entry::from_xml(&xml).is_err());
    }
}
