//! # Directory System
//!
//! A [`DirectorySystem`] is one connected installation. It owns
//!
//! - the identity cache: at most one live [`DirectoryObject`] per DN or XML
//!   store key,
//! - the registry of [`LazyList`]s, so that invalidation can reach every
//!   listing that depends on a change,
//! - the connection facts read at connect time (root DN, version, user).
//!
//! Objects and lists hold only weak references back to the system; dropping
//! the last `Arc<DirectorySystem>` (for example by closing it in the
//! [`ConnectionRegistry`](crate::registry::ConnectionRegistry)) releases the
//! whole graph.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::cache::ObjectCache;
use crate::config::Properties;
use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::lazy::{LazyList, ListSource};
use crate::object::{fields, DirectoryObject, Entry, ObjectKey, ObjectKind};
use crate::remote::{
    self, old_payload, request, single_payload, tuples, QueryParams, RemoteCaller, LDAP_NAMESPACE,
    MONITOR_NAMESPACE, XMLSTORE_NAMESPACE,
};
use crate::xml::XmlNode;

pub use crate::lazy::Change;

/// One connected installation and its object graph.
pub struct DirectorySystem {
    name: String,
    caller: Arc<dyn RemoteCaller>,
    root: Dn,
    version: String,
    build: String,
    os: String,
    user: String,
    properties: Properties,
    cache_enabled: bool,
    objects: ObjectCache,
    lists: Mutex<HashMap<String, Arc<LazyList>>>,
    me: Weak<DirectorySystem>,
}

impl std::fmt::Debug for DirectorySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySystem")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("endpoint", &self.caller.describe())
            .finish()
    }
}

impl DirectorySystem {
    /// Connect through `caller` and read the installation facts.
    ///
    /// A missing or malformed installation root is fatal.
    pub fn connect(
        name: &str,
        caller: Arc<dyn RemoteCaller>,
        properties: Properties,
    ) -> Result<Arc<Self>> {
        log::info!("Connecting to {} ({}) ...", name, caller.describe());
        let params = QueryParams::new();

        let response = caller.call(&request("GetInstallationInfo", LDAP_NAMESPACE), &params)?;
        let installation = single_payload(&response, "installation info")?;
        let root_text = installation.child_text("ldaproot").unwrap_or_default();
        let root = Dn::parse(&root_text).map_err(|_| Error::Config {
            message: format!("Malformed installation root '{}'", root_text),
            hint: Some("Check that the url points at an administrative gateway".to_string()),
        })?;

        let response = caller.call(&request("GetUserDetails", LDAP_NAMESPACE), &params)?;
        let user = single_payload(&response, "user details")?
            .child_text("authuserdn")
            .and_then(|text| Dn::parse(&text).ok())
            .map(|dn| dn.name().to_string())
            .unwrap_or_default();

        let cache_enabled = properties.get_bool("cache")?.unwrap_or(true);
        let text = |field: &str| installation.child_text(field).unwrap_or_default();
        let (version, build, os) = (text("version"), text("build"), text("os"));

        let system = Arc::new_cyclic(|me| Self {
            name: name.to_string(),
            caller,
            root,
            version,
            build,
            os,
            user,
            properties,
            cache_enabled,
            objects: ObjectCache::new(),
            lists: Mutex::new(HashMap::new()),
            me: me.clone(),
        });
        log::info!(
            "Connecting to {} ... OK (root {}, version {})",
            name,
            system.root,
            system.version
        );
        Ok(system)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Dn {
        &self.root
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn build(&self) -> &str {
        &self.build
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    /// Name of the connecting user.
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn endpoint(&self) -> String {
        self.caller.describe()
    }

    /// Number of live objects in the identity cache.
    pub fn cached_objects(&self) -> Result<usize> {
        self.objects.len()
    }

    /// Send one request.
    pub fn call(&self, request: &XmlNode, params: &QueryParams) -> Result<XmlNode> {
        log::trace!("{} -> {}", self.name, request.local_name());
        self.caller.call(request, params)
    }

    /// Send one request in the context of an organization.
    pub fn call_in(&self, organization: &Dn, request: &XmlNode) -> Result<XmlNode> {
        self.call(
            request,
            &remote::params([("organization", organization.to_string())]),
        )
    }

    // Identity cache

    /// The live object for `dn`, fetching the entry if it is not cached.
    pub fn get_ldap(&self, dn: &Dn) -> Result<Arc<DirectoryObject>> {
        let key = ObjectKey::Dn(dn.clone());
        let (object, _) = self.objects.get_or_create(&key, || {
            let snapshot = self.fetch_snapshot(&key)?;
            let entry = Entry::from_xml(&snapshot)?;
            let object = DirectoryObject::new(detect_kind(&entry), key.clone(), self.me.clone(), &self.name);
            object.seed(snapshot);
            Ok(object)
        })?;
        Ok(object)
    }

    /// [`get_ldap`](Self::get_ldap) for DN text.
    pub fn get_ldap_str(&self, dn: &str) -> Result<Arc<DirectoryObject>> {
        self.get_ldap(&Dn::parse(dn)?)
    }

    /// The live object for an entry already in hand.
    ///
    /// The entry seeds the object's snapshot if it holds none.
    pub fn get_ldap_from_entry(&self, entry_xml: &XmlNode) -> Result<Arc<DirectoryObject>> {
        let entry = Entry::from_xml(entry_xml)?;
        let key = ObjectKey::Dn(entry.dn().clone());
        let (object, _) = self.objects.get_or_create(&key, || {
            Ok(DirectoryObject::new(
                detect_kind(&entry),
                key.clone(),
                self.me.clone(),
                &self.name,
            ))
        })?;
        object.seed(entry_xml.clone());
        Ok(object)
    }

    /// Cache-only lookup.
    pub fn seek_ldap(&self, dn: &Dn) -> Result<Option<Arc<DirectoryObject>>> {
        self.objects.seek(&ObjectKey::Dn(dn.clone()))
    }

    /// Evict `dn` and everything cached below it, including listings
    /// anchored inside the subtree.
    pub fn remove_ldap(&self, dn: &Dn) -> Result<()> {
        self.invalidate(Change::Removed(dn.clone()))?;
        let removed = self.objects.remove_subtree(dn)?;
        self.lock_lists()?
            .retain(|_, list| !list.source().anchor().is_within(dn));
        log::debug!("Evicted {} cached objects below {}", removed, dn);
        Ok(())
    }

    /// Handle for an XML store object; nothing is fetched until its content
    /// is read.
    pub fn xml_store_object(
        &self,
        organization: &Dn,
        key: &str,
        kind: ObjectKind,
    ) -> Result<Arc<DirectoryObject>> {
        let key = ObjectKey::XmlStore {
            organization: organization.clone(),
            key: key.to_string(),
        };
        let (object, _) = self.objects.get_or_create(&key, || {
            Ok(DirectoryObject::new(kind, key.clone(), self.me.clone(), &self.name))
        })?;
        Ok(object)
    }

    /// Fetch the current snapshot for `key` from the remote system.
    pub fn fetch_snapshot(&self, key: &ObjectKey) -> Result<XmlNode> {
        match key {
            ObjectKey::Dn(dn) => {
                let get = request("GetLDAPObject", LDAP_NAMESPACE).with_text_child("dn", dn.to_string());
                let response = self.call(&get, &QueryParams::new())?;
                single_payload(&response, &dn.to_string()).cloned()
            }
            ObjectKey::XmlStore { organization, key } => {
                let get = request("GetXMLObject", XMLSTORE_NAMESPACE).with_child(
                    XmlNode::new("key")
                        .with_attr("version", crate::defaults::DEFAULT_XML_STORE_VERSION)
                        .with_text(key.as_str()),
                );
                let response = self.call_in(organization, &get)?;
                let found = tuples(&response).next().cloned();
                found.ok_or_else(|| Error::NotFound {
                    key: key.to_string(),
                })
            }
        }
    }

    // Mutation

    /// Create `entry` remotely and return its live object.
    pub fn create_in_ldap(&self, entry: Entry) -> Result<Arc<DirectoryObject>> {
        let dn = entry.dn().clone();
        log::info!("Creating {} ...", dn);
        let xml = entry.to_xml();
        let update = request("Update", LDAP_NAMESPACE)
            .with_child(XmlNode::new("tuple").with_child(XmlNode::new("new").with_child(xml.clone())));
        self.call(&update, &QueryParams::new())?;
        if let Some(parent) = dn.parent() {
            self.invalidate(Change::Structure { parent })?;
        }

        let key = ObjectKey::Dn(dn.clone());
        let (object, created) = self.objects.get_or_create(&key, || {
            Ok(DirectoryObject::new(detect_kind(&entry), key.clone(), self.me.clone(), &self.name))
        })?;
        if !created {
            object.clear();
        }
        object.seed(xml);
        log::debug!("Creating {} ... OK", dn);
        Ok(object)
    }

    /// Compare-and-set update: the remote rejects it if `old` is stale.
    pub fn update_entry(&self, old: &Entry, new: &Entry) -> Result<()> {
        log::info!("Updating {} ...", new.dn());
        let update = request("Update", LDAP_NAMESPACE).with_child(
            XmlNode::new("tuple")
                .with_child(XmlNode::new("old").with_child(old.to_xml()))
                .with_child(XmlNode::new("new").with_child(new.to_xml())),
        );
        self.call(&update, &QueryParams::new())?;
        Ok(())
    }

    /// Remove one leaf entry.
    pub fn delete_entry(&self, entry: &Entry) -> Result<()> {
        let update = request("Update", LDAP_NAMESPACE).with_child(
            XmlNode::new("tuple").with_child(XmlNode::new("old").with_child(entry.to_xml())),
        );
        self.call(&update, &QueryParams::new())?;
        Ok(())
    }

    /// Clear every snapshot and listing affected by `change`.
    pub fn invalidate(&self, change: Change) -> Result<()> {
        log::trace!("Invalidating {}", change);
        if let Change::Entry(key) = &change {
            if let Some(object) = self.objects.seek(key)? {
                object.clear();
            }
        }
        let lists: Vec<Arc<LazyList>> = self.lock_lists()?.values().cloned().collect();
        for list in lists.iter().filter(|list| list.is_affected_by(&change)) {
            list.clear();
        }
        Ok(())
    }

    /// Forget every cached object and listing.
    pub fn clear_cache(&self) -> Result<()> {
        self.objects.clear()?;
        self.lock_lists()?.clear();
        log::debug!("Cleared caches of {}", self.name);
        Ok(())
    }

    // Listing

    /// The shared list for `source`, registered for invalidation.
    pub fn list(&self, source: ListSource) -> Result<Arc<LazyList>> {
        let mut lists = self.lock_lists()?;
        let list = lists
            .entry(source.key())
            .or_insert_with(|| Arc::new(LazyList::new(source, self.me.clone(), &self.name)));
        Ok(Arc::clone(list))
    }

    /// Run the listing call behind `source`.
    pub fn retrieve(&self, source: &ListSource) -> Result<Vec<Arc<DirectoryObject>>> {
        match source {
            ListSource::Children { base, kind } => {
                self.search_entries("GetChildren", base, kind.and_then(ObjectKind::object_class))
            }
            ListSource::Search { base, kind } => {
                self.search_entries("SearchLDAP", base, kind.object_class())
            }
            ListSource::EntryRefs { owner, attribute } => {
                let owner = self.get_ldap(owner)?;
                let entry = owner.entry()?;
                let mut members = Vec::new();
                for value in entry.values(attribute) {
                    let Ok(dn) = Dn::parse(value) else {
                        log::debug!("Skipping malformed reference '{}' in {}", value, owner.dn());
                        continue;
                    };
                    match self.get_ldap(&dn) {
                        Ok(member) => members.push(member),
                        Err(e) if e.is_not_found() => {
                            log::debug!("Skipping dangling reference {} in {}", dn, owner.dn())
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(members)
            }
            ListSource::XmlStore {
                organization,
                folder,
                kind,
            } => {
                let get = request("GetCollection", XMLSTORE_NAMESPACE).with_child(
                    XmlNode::new("folder")
                        .with_attr("version", crate::defaults::DEFAULT_XML_STORE_VERSION)
                        .with_text(folder.as_str()),
                );
                let response = self.call_in(organization, &get)?;
                tuples(&response)
                    .filter_map(|tuple| tuple.attr("key"))
                    .map(|key| self.xml_store_object(organization, key, *kind))
                    .collect()
            }
        }
    }

    /// Every direct child entry of `dn`, in name order.
    pub fn children_of(&self, dn: &Dn) -> Result<Vec<Arc<DirectoryObject>>> {
        self.search_entries("GetChildren", dn, None)
    }

    fn search_entries(
        &self,
        method: &str,
        base: &Dn,
        object_class: Option<&str>,
    ) -> Result<Vec<Arc<DirectoryObject>>> {
        let mut search = request(method, LDAP_NAMESPACE).with_text_child("dn", base.to_string());
        if method == "SearchLDAP" {
            search = search.with_text_child("scope", "2");
        }
        if let Some(class) = object_class {
            search = search.with_text_child("filter", format!("objectclass={}", class));
        }
        search = search.with_text_child("sort", "ascending");
        let response = self.call(&search, &QueryParams::new())?;
        tuples(&response)
            .filter_map(old_payload)
            .map(|entry| self.get_ldap_from_entry(entry))
            .collect()
    }

    // Top-level collections

    pub fn organizations(&self) -> Result<Arc<LazyList>> {
        self.list(ListSource::Children {
            base: self.root.clone(),
            kind: Some(ObjectKind::Organization),
        })
    }

    pub fn packages(&self) -> Result<Arc<LazyList>> {
        self.list(ListSource::Children {
            base: self.root.clone(),
            kind: Some(ObjectKind::Package),
        })
    }

    pub fn authenticated_users(&self) -> Result<Arc<LazyList>> {
        self.list(ListSource::Children {
            base: self.container(ObjectKind::AuthenticatedUser),
            kind: Some(ObjectKind::AuthenticatedUser),
        })
    }

    pub fn connectors(&self) -> Result<Arc<LazyList>> {
        self.list(ListSource::Search {
            base: self.root.clone(),
            kind: ObjectKind::Connector,
        })
    }

    pub fn service_containers(&self) -> Result<Arc<LazyList>> {
        self.list(ListSource::Search {
            base: self.root.clone(),
            kind: ObjectKind::ServiceContainer,
        })
    }

    pub fn machines(&self) -> Result<Arc<LazyList>> {
        self.list(ListSource::Children {
            base: self.container(ObjectKind::Machine),
            kind: Some(ObjectKind::Machine),
        })
    }

    /// Organization by name.
    pub fn organization(&self, name: &str) -> Result<Arc<DirectoryObject>> {
        self.organizations()?
            .get_by_name(name)?
            .ok_or_else(|| Error::NotFound {
                key: format!("organization {}", name),
            })
    }

    /// Package by name.
    pub fn package(&self, name: &str) -> Result<Option<Arc<DirectoryObject>>> {
        self.packages()?.get_by_name(name)
    }

    /// Create an organization with its standard containers and the
    /// `everyoneIn<org>` role.
    pub fn create_organization(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<DirectoryObject>> {
        if name.trim().is_empty() {
            return Err(Error::validation("organization name must not be empty"));
        }
        let mut entry = Entry::new(self.root.child("o", name), &["top", "organization"]);
        if !description.is_empty() {
            fields::DESCRIPTION.write(&mut entry, &description.to_string())?;
        }
        let organization = self.create_in_ldap(entry)?;
        for container in ObjectKind::organization_containers() {
            organization.create_child(ObjectKind::Container, container, |_| Ok(()))?;
        }
        organization.create_role(
            &format!("everyoneIn{}", name),
            &format!("Everyone in {}", name),
            "Internal",
        )?;
        Ok(organization)
    }

    /// The authenticated user named `name`, created on demand.
    pub fn ensure_authenticated_user(
        &self,
        name: &str,
        os_identity: &str,
        default_context: &Dn,
    ) -> Result<Arc<DirectoryObject>> {
        if let Some(user) = self.authenticated_users()?.get_by_name(name)? {
            return Ok(user);
        }
        let mut entry = Entry::new(
            self.container(ObjectKind::AuthenticatedUser).child("cn", name),
            &["top", "busauthenticationuser"],
        );
        let identity = if os_identity.is_empty() { name } else { os_identity };
        fields::OS_IDENTITY.write(&mut entry, &identity.to_string())?;
        fields::DEFAULT_CONTEXT.write(&mut entry, default_context)?;
        self.create_in_ldap(entry)
    }

    // Service container monitor

    /// Service containers reported as running.
    pub fn running_containers(&self) -> Result<Vec<Arc<DirectoryObject>>> {
        let mut running = Vec::new();
        for (dn, up) in self.container_states()? {
            if up {
                running.push(self.get_ldap(&dn)?);
            }
        }
        Ok(running)
    }

    /// Run state of every known service container.
    pub fn container_states(&self) -> Result<Vec<(Dn, bool)>> {
        let response = self.call(&request("List", MONITOR_NAMESPACE), &QueryParams::new())?;
        Ok(tuples(&response)
            .filter_map(old_payload)
            .filter_map(|process| {
                let dn = Dn::parse(&process.child_text("name")?).ok()?;
                let up = process.child_text("status").as_deref() == Some("OK");
                Some((dn, up))
            })
            .collect())
    }

    /// Send `Start`, `Stop` or `Restart` for a service container.
    pub(crate) fn control_container(&self, method: &str, dn: &Dn) -> Result<()> {
        log::info!("{} {} ...", method, dn);
        let control = request(method, MONITOR_NAMESPACE).with_text_child("dn", dn.to_string());
        self.call(&control, &remote::params([("receiver", dn.to_string())]))?;
        log::info!("{} {} ... OK", method, dn);
        Ok(())
    }

    fn container(&self, kind: ObjectKind) -> Dn {
        self.root.child("cn", kind.container().unwrap_or_default())
    }

    fn lock_lists(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<LazyList>>>> {
        self.lists.lock().map_err(|_| Error::LockPoisoned {
            context: "list registry".to_string(),
        })
    }
}

fn detect_kind(entry: &Entry) -> ObjectKind {
    ObjectKind::from_entry(entry).unwrap_or(ObjectKind::Container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDirectory;

    const ROOT: &str = "cn=cordys,cn=defaultInst,o=example.com";

    fn connect() -> (Arc<MemoryDirectory>, Arc<DirectorySystem>) {
        let memory = Arc::new(
            MemoryDirectory::new(ROOT)
                .unwrap()
                .with_machine("node1")
                .unwrap(),
        );
        let system = DirectorySystem::connect("test", memory.clone(), Properties::new()).unwrap();
        (memory, system)
    }

    #[test]
    fn test_connect_reads_installation() {
        let (_, system) = connect();
        assert_eq!(system.root().to_string(), ROOT);
        assert_eq!(system.user(), "SYSTEM");
        assert!(system.cache_enabled());
        assert_eq!(system.endpoint(), "memory");
    }

    #[test]
    fn test_get_ldap_fetches_once() {
        let (memory, system) = connect();
        let dn = Dn::parse(&format!("cn=node1,cn=machines,{}", ROOT)).unwrap();
        let machine = system.get_ldap(&dn).unwrap();
        assert_eq!(machine.kind(), ObjectKind::Machine);
        machine.entry().unwrap();
        system.get_ldap(&dn).unwrap().entry().unwrap();
        assert_eq!(memory.count("GetLDAPObject").unwrap(), 1);
    }

    #[test]
    fn test_get_ldap_missing_entry_is_not_found() {
        let (_, system) = connect();
        let error = system
            .get_ldap_str(&format!("o=missing,{}", ROOT))
            .unwrap_err();
        assert!(error.is_not_found());
        assert_eq!(system.cached_objects().unwrap(), 0);
    }

    #[test]
    fn test_seek_ldap_has_no_side_effects() {
        let (memory, system) = connect();
        let dn = Dn::parse(&format!("cn=node1,cn=machines,{}", ROOT)).unwrap();
        assert!(system.seek_ldap(&dn).unwrap().is_none());
        assert_eq!(memory.count("GetLDAPObject").unwrap(), 0);
    }

    #[test]
    fn test_disabled_cache_refetches_entries() {
        let memory = Arc::new(MemoryDirectory::new(ROOT).unwrap().with_machine("node1").unwrap());
        let mut properties = Properties::new();
        properties.set("cache", "false");
        let system = DirectorySystem::connect("test", memory.clone(), properties).unwrap();
        let machine = system
            .get_ldap_str(&format!("cn=node1,cn=machines,{}", ROOT))
            .unwrap();
        machine.entry().unwrap();
        machine.entry().unwrap();
        assert_eq!(memory.count("GetLDAPObject").unwrap(), 3);
    }

    #[test]
    fn test_malformed_root_is_fatal() {
        struct BrokenRoot;
        impl RemoteCaller for BrokenRoot {
            fn call(&self, _request: &XmlNode, _params: &QueryParams) -> Result<XmlNode> {
                let installation = XmlNode::new("installation").with_text_child("ldaproot", "garbage");
                Ok(XmlNode::new("GetInstallationInfoResponse").with_child(
                    XmlNode::new("tuple").with_child(XmlNode::new("old").with_child(installation)),
                ))
            }

            fn describe(&self) -> String {
                "broken".to_string()
            }
        }
        let error = DirectorySystem::connect("broken", Arc::new(BrokenRoot), Properties::new())
            .unwrap_err();
        assert!(matches!(error, Error::Config { .. }));
    }

    #[test]
    fn test_create_organization_lays_out_containers() {
        let (memory, system) = connect();
        let org = system.create_organization("acme", "Acme Corp").unwrap();
        assert_eq!(org.kind(), ObjectKind::Organization);
        assert!(memory
            .entry(&format!("cn=organizational users,o=acme,{}", ROOT))
            .unwrap()
            .is_some());
        assert!(memory
            .entry(&format!("cn=everyoneInacme,cn=organizational roles,o=acme,{}", ROOT))
            .unwrap()
            .is_some());
        assert!(Arc::ptr_eq(&system.organization("ACME").unwrap(), &org));
    }
}
