//! # Directory Objects
//!
//! A [`DirectoryObject`] is a lazily populated proxy for one remote entry. All
//! kinds (organization, user, role, service group, ...) share this one type;
//! the kind is a tag and kind-specific operations check it at the call.
//!
//! ## Lifecycle
//!
//! - Objects are only constructed by the owning
//!   [`DirectorySystem`](crate::system::DirectorySystem), which caches them by
//!   key. Holding two `Arc`s for the same DN means holding the same object.
//! - The entry snapshot is fetched on first access and kept until the object
//!   is cleared. Clearing keeps identity; only eviction from the system cache
//!   (after a delete) retires an object.
//! - Typed writes via [`DirectoryObject::set`] are staged and only sent when
//!   [`DirectoryObject::commit`] is called. Unchanged entries are never sent.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::system::{Change, DirectorySystem};
use crate::xml::XmlNode;

pub mod entry;
pub mod fields;
pub mod kind;
mod organization;
mod service;
mod xmlstore;

pub use entry::Entry;
pub use fields::{Field, FieldValue};
pub use kind::ObjectKind;
pub(crate) use service::namespaces_of;

/// Identity of a directory object within its system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    /// A directory entry.
    Dn(Dn),
    /// An XML store object, addressed by organization and store key.
    XmlStore { organization: Dn, key: String },
}

impl ObjectKey {
    /// Canonical string used as the cache key.
    pub fn normalized(&self) -> String {
        match self {
            ObjectKey::Dn(dn) => dn.normalized(),
            ObjectKey::XmlStore { organization, key } => {
                format!("xmlstore:{}:{}", organization.normalized(), key)
            }
        }
    }

    /// The DN of the entry, or of the owning organization.
    pub fn dn(&self) -> &Dn {
        match self {
            ObjectKey::Dn(dn) => dn,
            ObjectKey::XmlStore { organization, .. } => organization,
        }
    }

    /// Whether the keyed object lives at or below `ancestor`.
    pub fn is_within(&self, ancestor: &Dn) -> bool {
        self.dn().is_within(ancestor)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKey::Dn(dn) => write!(f, "{}", dn),
            ObjectKey::XmlStore { organization, key } => write!(f, "{} ({})", key, organization),
        }
    }
}

/// A cached proxy for one remote directory entry or XML store object.
pub struct DirectoryObject {
    kind: ObjectKind,
    key: ObjectKey,
    system: Weak<DirectorySystem>,
    system_name: String,
    snapshot: Mutex<Option<XmlNode>>,
    pending: Mutex<Option<Entry>>,
}

impl fmt::Debug for DirectoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryObject")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .finish()
    }
}

impl DirectoryObject {
    pub(crate) fn new(
        kind: ObjectKind,
        key: ObjectKey,
        system: Weak<DirectorySystem>,
        system_name: &str,
    ) -> Self {
        Self {
            kind,
            key,
            system,
            system_name: system_name.to_string(),
            snapshot: Mutex::new(None),
            pending: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// DN of the entry. XML store objects report their organization's DN.
    pub fn dn(&self) -> &Dn {
        self.key.dn()
    }

    /// Short name: the RDN value, or the last segment of an XML store key.
    pub fn name(&self) -> &str {
        match &self.key {
            ObjectKey::Dn(dn) => dn.name(),
            ObjectKey::XmlStore { key, .. } => key.rsplit('/').next().unwrap_or(key),
        }
    }

    /// The system this object belongs to.
    pub fn system(&self) -> Result<Arc<DirectorySystem>> {
        self.system.upgrade().ok_or_else(|| Error::SystemClosed {
            name: self.system_name.clone(),
        })
    }

    /// The containing directory object, if it lies inside the installation.
    pub fn parent(&self) -> Result<Option<Arc<DirectoryObject>>> {
        let system = self.system()?;
        let parent = match &self.key {
            ObjectKey::Dn(dn) => dn.parent(),
            ObjectKey::XmlStore { organization, .. } => Some(organization.clone()),
        };
        match parent {
            Some(parent) if parent.is_under(system.root()) => system.get_ldap(&parent).map(Some),
            _ => Ok(None),
        }
    }

    /// The raw snapshot, fetched on first use.
    ///
    /// For directory entries this is the `<entry>` element; for XML store
    /// objects the `<tuple>` carrying the content. With caching disabled on
    /// the system every call fetches again.
    pub fn snapshot(&self) -> Result<XmlNode> {
        let system = self.system()?;
        if !system.cache_enabled() {
            return system.fetch_snapshot(&self.key);
        }
        let mut snapshot = lock(&self.snapshot, "object snapshot")?;
        if let Some(cached) = snapshot.as_ref() {
            return Ok(cached.clone());
        }
        let fetched = system.fetch_snapshot(&self.key)?;
        *snapshot = Some(fetched.clone());
        Ok(fetched)
    }

    /// The directory entry, fetched on first use.
    pub fn entry(&self) -> Result<Entry> {
        if self.kind.is_xml_store() {
            return Err(Error::precondition(
                "entry",
                format!("{} is stored in the XML store, not the directory", self.key),
            ));
        }
        Entry::from_xml(&self.snapshot()?)
    }

    /// Whether a snapshot is currently held.
    pub fn is_loaded(&self) -> bool {
        self.snapshot
            .lock()
            .map(|snapshot| snapshot.is_some())
            .unwrap_or(false)
    }

    /// Read a typed field, seeing staged changes first.
    pub fn get<T: FieldValue>(&self, field: Field<T>) -> Result<Option<T>> {
        if let Some(pending) = lock(&self.pending, "pending changes")?.as_ref() {
            return Ok(field.read(pending));
        }
        Ok(field.read(&self.entry()?))
    }

    /// Stage a typed field change; nothing is sent until [`commit`](Self::commit).
    pub fn set<T: FieldValue>(&self, field: Field<T>, value: &T) -> Result<()> {
        let mut pending = lock(&self.pending, "pending changes")?;
        if pending.is_none() {
            *pending = Some(self.entry()?);
        }
        if let Some(entry) = pending.as_mut() {
            field.write(entry, value)?;
        }
        Ok(())
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.is_some())
            .unwrap_or(false)
    }

    /// Send staged changes. Returns `false` when nothing differed.
    pub fn commit(&self) -> Result<bool> {
        let staged = lock(&self.pending, "pending changes")?.take();
        let Some(staged) = staged else {
            return Ok(false);
        };
        let current = self.entry()?;
        if staged == current {
            return Ok(false);
        }
        self.update_ldap(&current, &staged)?;
        Ok(true)
    }

    /// Drop staged changes.
    pub fn discard(&self) {
        *self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Forget the snapshot and staged changes; identity is kept.
    pub fn clear(&self) {
        *self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        self.discard();
    }

    pub(crate) fn seed(&self, snapshot: XmlNode) {
        let mut current = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.is_none() {
            *current = Some(snapshot);
        }
    }

    /// Compare-and-set update of this object's entry.
    pub fn update_ldap(&self, old: &Entry, new: &Entry) -> Result<()> {
        let system = self.system()?;
        system.update_entry(old, new)?;
        system.invalidate(Change::Entry(self.key.clone()))
    }

    /// Edit a copy of the current entry and send it if anything changed.
    ///
    /// Returns `true` when an update was issued.
    pub fn modify<F>(&self, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Entry) -> Result<()>,
    {
        let old = self.entry()?;
        let mut new = old.clone();
        edit(&mut new)?;
        if new == old {
            return Ok(false);
        }
        self.update_ldap(&old, &new)?;
        Ok(true)
    }

    /// Create a child entry of `kind` named `name` below this object.
    pub fn create_child<F>(&self, kind: ObjectKind, name: &str, build: F) -> Result<Arc<DirectoryObject>>
    where
        F: FnOnce(&mut Entry) -> Result<()>,
    {
        self.create_below(self.dn().clone(), kind, name, build)
    }

    pub(crate) fn create_below<F>(
        &self,
        parent: Dn,
        kind: ObjectKind,
        name: &str,
        build: F,
    ) -> Result<Arc<DirectoryObject>>
    where
        F: FnOnce(&mut Entry) -> Result<()>,
    {
        let class = kind.object_class().ok_or_else(|| {
            Error::precondition("create", format!("{} objects live in the XML store", kind))
        })?;
        if name.trim().is_empty() {
            return Err(Error::validation(format!("{} name must not be empty", kind)));
        }
        let mut entry = Entry::new(parent.child(kind.naming_attribute(), name), &["top", class]);
        build(&mut entry)?;
        self.system()?.create_in_ldap(entry)
    }

    /// Delete this object and everything below it.
    pub fn delete(&self) -> Result<()> {
        let system = self.system()?;
        if self.kind.has_pre_delete_guard() {
            self.pre_delete_hook(&system)?;
        }
        if self.kind.is_xml_store() {
            return self.delete_xml_object();
        }

        log::info!("Deleting {} {} ...", self.kind, self.name());
        for child in system.children_of(self.dn())? {
            child.delete()?;
        }
        let entry = self.entry()?;
        system.delete_entry(&entry)?;
        system.remove_ldap(self.dn())?;
        log::debug!("Deleting {} {} ... OK", self.kind, self.name());
        Ok(())
    }

    fn pre_delete_hook(&self, system: &DirectorySystem) -> Result<()> {
        match self.kind {
            ObjectKind::Package => Err(Error::precondition(
                "delete",
                format!("package {} must be unloaded, not deleted", self.name()),
            )),
            ObjectKind::User | ObjectKind::AuthenticatedUser
                if self.name().eq_ignore_ascii_case("SYSTEM") =>
            {
                Err(Error::precondition(
                    "delete",
                    "the SYSTEM user must not be modified",
                ))
            }
            ObjectKind::Organization => {
                for container in system.running_containers()? {
                    if container.dn().is_under(self.dn()) {
                        container.stop()?;
                    }
                }
                Ok(())
            }
            ObjectKind::ServiceContainer => {
                if self.is_running()? {
                    self.stop()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Fail unless this object is one of `kinds`.
    pub(crate) fn ensure_kind(&self, kinds: &[ObjectKind], operation: &str) -> Result<()> {
        if kinds.contains(&self.kind) {
            Ok(())
        } else {
            Err(Error::precondition(
                operation,
                format!("not supported on {} {}", self.kind, self.name()),
            ))
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::LockPoisoned {
        context: context.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_normalization() {
        let a = ObjectKey::Dn(Dn::parse("cn=Admin,o=System").unwrap());
        let b = ObjectKey::Dn(Dn::parse("CN=admin,O=system").unwrap());
        assert_eq!(a, b);
        assert_eq!(a.normalized(), b.normalized());

        let store = ObjectKey::XmlStore {
            organization: Dn::parse("o=System").unwrap(),
            key: "/Cordys/Config.xml".to_string(),
        };
        assert_eq!(store.normalized(), "xmlstore:o=system:/Cordys/Config.xml");
        assert!(store.is_within(&Dn::parse("o=system").unwrap()));
    }

    #[test]
    fn test_detached_object_reports_closed_system() {
        let object = DirectoryObject::new(
            ObjectKind::Role,
            ObjectKey::Dn(Dn::parse("cn=admin,o=system").unwrap()),
            Weak::new(),
            "dev",
        );
        assert_eq!(object.name(), "admin");
        match object.entry() {
            Err(Error::SystemClosed { name }) => assert_eq!(name, "dev"),
            other => panic!("expected closed system, got {:?}", other),
        }
    }

    #[test]
    fn test_xml_store_object_name_and_entry() {
        let object = DirectoryObject::new(
            ObjectKind::XmlStoreObject,
            ObjectKey::XmlStore {
                organization: Dn::parse("o=system").unwrap(),
                key: "/Cordys/WCP/Config.xml".to_string(),
            },
            Weak::new(),
            "dev",
        );
        assert_eq!(object.name(), "Config.xml");
        assert!(matches!(object.entry(), Err(Error::Precondition { .. })));
    }

    #[test]
    fn test_ensure_kind() {
        let object = DirectoryObject::new(
            ObjectKind::Role,
            ObjectKey::Dn(Dn::parse("cn=admin,o=system").unwrap()),
            Weak::new(),
            "dev",
        );
        assert!(object.ensure_kind(&[ObjectKind::Role], "x").is_ok());
        assert!(object.ensure_kind(&[ObjectKind::User], "x").is_err());
    }
}
