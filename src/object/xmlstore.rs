//! XML store objects.
//!
//! These have no directory entry; their snapshot is the `<tuple>` returned by
//! `GetXMLObject` and their identity is `(organization, key)`.

use crate::error::{Error, Result};
use crate::lazy::Change;
use crate::object::{DirectoryObject, ObjectKey};
use crate::remote::{old_payload, request, XMLSTORE_NAMESPACE};
use crate::xml::XmlNode;

impl DirectoryObject {
    /// The store key (`/Cordys/...`) of an XML store object.
    pub fn store_key(&self) -> Option<&str> {
        match self.key() {
            ObjectKey::XmlStore { key, .. } => Some(key),
            ObjectKey::Dn(_) => None,
        }
    }

    /// Current content; `None` when the object does not exist.
    pub fn content(&self) -> Result<Option<XmlNode>> {
        self.ensure_xml_store("read content")?;
        match self.snapshot() {
            Ok(tuple) => Ok(old_payload(&tuple).cloned()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store version the object was read from.
    pub fn store_version(&self) -> Result<Option<String>> {
        self.ensure_xml_store("read version")?;
        match self.snapshot() {
            Ok(tuple) => Ok(tuple.attr("version").map(str::to_string)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create or overwrite the object's content.
    pub fn write_content(&self, content: &XmlNode, version: &str) -> Result<()> {
        self.ensure_xml_store("write content")?;
        let existed = self.content()?.is_some();
        self.send_xml_update(XmlNode::new("new").with_child(content.clone()), version)?;
        let system = self.system()?;
        system.invalidate(Change::Entry(self.key().clone()))?;
        if !existed {
            system.invalidate(Change::XmlStore {
                organization: self.dn().clone(),
            })?;
        }
        Ok(())
    }

    pub(crate) fn delete_xml_object(&self) -> Result<()> {
        let version = self
            .store_version()?
            .unwrap_or_else(|| crate::defaults::DEFAULT_XML_STORE_VERSION.to_string());
        log::info!("Deleting XML store object {} ...", self.key());
        self.send_xml_update(XmlNode::new("old"), &version)?;
        let system = self.system()?;
        system.invalidate(Change::XmlStore {
            organization: self.dn().clone(),
        })?;
        self.clear();
        Ok(())
    }

    fn send_xml_update(&self, payload: XmlNode, version: &str) -> Result<()> {
        let key = self
            .store_key()
            .ok_or_else(|| Error::precondition("update XML store", "not an XML store object"))?;
        let update = request("UpdateXMLObject", XMLSTORE_NAMESPACE).with_child(
            XmlNode::new("tuple")
                .with_attr("key", key)
                .with_attr("version", version)
                .with_attr("name", self.name())
                .with_child(payload),
        );
        self.system()?.call_in(self.dn(), &update)?;
        Ok(())
    }

    fn ensure_xml_store(&self, operation: &str) -> Result<()> {
        if self.kind().is_xml_store() {
            Ok(())
        } else {
            Err(Error::precondition(
                operation,
                format!("{} is not an XML store object", self.key()),
            ))
        }
    }
}
