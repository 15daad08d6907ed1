//! An in-process emulation of the administrative API.
//!
//! `MemoryDirectory` keeps a directory tree, an XML store per organization,
//! the set of running service containers and uploaded packages, and answers
//! the same request vocabulary as a live gateway. Every call is recorded so
//! tests can assert on exactly which remote operations were issued.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::object::entry::Entry;
use crate::xml::XmlNode;

use super::{
    response, QueryParams, RemoteCaller, CAP_NAMESPACE, ISV_NAMESPACE, LDAP_NAMESPACE,
    MONITOR_NAMESPACE, XMLSTORE_NAMESPACE,
};

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub method: String,
    pub params: QueryParams,
    pub request: XmlNode,
}

#[derive(Debug, Clone)]
struct StoredXmlObject {
    name: String,
    version: String,
    content: XmlNode,
}

#[derive(Debug)]
struct State {
    root: Dn,
    user: Dn,
    entries: BTreeMap<String, Entry>,
    xml_store: BTreeMap<(String, String), StoredXmlObject>,
    running: BTreeSet<String>,
    uploads: BTreeMap<String, String>,
    calls: Vec<CallRecord>,
}

/// An in-memory directory answering administrative requests.
#[derive(Debug)]
pub struct MemoryDirectory {
    state: Mutex<State>,
}

impl MemoryDirectory {
    /// An installation rooted at `root` with the containers every
    /// installation has and a `SYSTEM` authenticated user.
    pub fn new(root: &str) -> Result<Self> {
        let root = Dn::parse(root)?;
        let users = root.child("cn", "authenticated users");
        let user = users.child("cn", "SYSTEM");
        let mut state = State {
            root: root.clone(),
            user: user.clone(),
            entries: BTreeMap::new(),
            xml_store: BTreeMap::new(),
            running: BTreeSet::new(),
            uploads: BTreeMap::new(),
            calls: Vec::new(),
        };
        state.put(Entry::new(root.clone(), &["top", "groupOfNames"]));
        state.put(Entry::new(users, &["top", "groupOfNames"]));
        state.put(Entry::new(root.child("cn", "machines"), &["top", "groupOfNames"]));
        let mut system = Entry::new(user, &["top", "busauthenticationuser"]);
        system.set("osidentity", vec!["SYSTEM".to_string()]);
        state.put(system);
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Add a machine entry under `cn=machines`.
    pub fn with_machine(self, name: &str) -> Result<Self> {
        {
            let mut state = self.lock()?;
            let dn = state.root.child("cn", "machines").child("cn", name);
            let mut entry = Entry::new(dn, &["top", "busmachine"]);
            entry.set("computer", vec![name.to_string()]);
            state.put(entry);
        }
        Ok(self)
    }

    /// Add a loaded package.
    pub fn with_package(self, name: &str) -> Result<Self> {
        {
            let mut state = self.lock()?;
            let root = state.root.clone();
            state.install_package(&root, name);
        }
        Ok(self)
    }

    /// Add a role defined by a loaded package.
    pub fn with_package_role(self, package: &str, role: &str) -> Result<Self> {
        {
            let mut state = self.lock()?;
            let dn = state.root.child("cn", package).child("cn", role);
            let mut entry = Entry::new(dn, &["top", "busorganizationalrole"]);
            entry.set("busorganizationalroletype", vec!["Application".to_string()]);
            state.put(entry);
        }
        Ok(self)
    }

    /// Add a web service interface defined by a loaded package.
    pub fn with_package_method_set(
        self,
        package: &str,
        name: &str,
        namespaces: &[&str],
    ) -> Result<Self> {
        {
            let mut state = self.lock()?;
            let dn = state
                .root
                .child("cn", package)
                .child("cn", "method sets")
                .child("cn", name);
            let mut entry = Entry::new(dn, &["top", "busmethodset"]);
            entry.set(
                "labeleduri",
                namespaces.iter().map(|ns| ns.to_string()).collect(),
            );
            state.put(entry);
        }
        Ok(self)
    }

    /// Insert an arbitrary entry, replacing any entry with the same DN.
    pub fn insert_entry(&self, entry: Entry) -> Result<()> {
        self.lock()?.put(entry);
        Ok(())
    }

    /// Current stored entry for `dn`.
    pub fn entry(&self, dn: &str) -> Result<Option<Entry>> {
        let dn = Dn::parse(dn)?;
        Ok(self.lock()?.entries.get(&dn.normalized()).cloned())
    }

    /// Current content of an XML store object.
    pub fn xml_object(&self, organization: &str, key: &str) -> Result<Option<XmlNode>> {
        let organization = Dn::parse(organization)?;
        Ok(self
            .lock()?
            .xml_store
            .get(&(organization.normalized(), key.to_string()))
            .map(|object| object.content.clone()))
    }

    /// Whether the service container `dn` is running.
    pub fn is_running(&self, dn: &str) -> Result<bool> {
        let dn = Dn::parse(dn)?;
        Ok(self.lock()?.running.contains(&dn.normalized()))
    }

    /// Every request received so far.
    pub fn calls(&self) -> Result<Vec<CallRecord>> {
        Ok(self.lock()?.calls.clone())
    }

    /// Number of requests received for `method`.
    pub fn count(&self, method: &str) -> Result<usize> {
        Ok(self
            .lock()?
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count())
    }

    /// Number of requests that change remote state.
    pub fn mutation_count(&self) -> Result<usize> {
        Ok(self
            .lock()?
            .calls
            .iter()
            .filter(|call| is_mutation(&call.method))
            .count())
    }

    pub fn reset_calls(&self) -> Result<()> {
        self.lock()?.calls.clear();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::LockPoisoned {
            context: "memory directory".to_string(),
        })
    }
}

impl RemoteCaller for MemoryDirectory {
    fn call(&self, request: &XmlNode, params: &QueryParams) -> Result<XmlNode> {
        let mut state = self.lock()?;
        let method = request.local_name().to_string();
        state.calls.push(CallRecord {
            method: method.clone(),
            params: params.clone(),
            request: request.clone(),
        });
        match method.as_str() {
            "GetInstallationInfo" => Ok(state.installation_info()),
            "GetUserDetails" => Ok(state.user_details()),
            "GetLDAPObject" => state.get_ldap_object(request),
            "GetChildren" => state.search(request, false),
            "SearchLDAP" => state.search(request, true),
            "Update" => state.update(request),
            "GetXMLObject" => state.get_xml_object(request, params),
            "GetCollection" => state.get_collection(request, params),
            "UpdateXMLObject" => state.update_xml_object(request, params),
            "Start" | "Stop" | "Restart" => state.control(&method, request),
            "List" => Ok(state.list_processes()),
            "UploadISVPackage" => state.upload(request, ISV_NAMESPACE),
            "UploadCAP" => state.upload(request, CAP_NAMESPACE),
            "LoadISVPackage" => state.load_package(&method, request, "url", ISV_NAMESPACE),
            "DeployCAP" => state.load_package(&method, request, "name", CAP_NAMESPACE),
            "UnloadISVPackage" => state.unload_package(&method, request, "file", ISV_NAMESPACE),
            "UnDeployCAP" => state.unload_package(&method, request, "name", CAP_NAMESPACE),
            _ => Err(fault(&method, "Unknown method")),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn is_mutation(method: &str) -> bool {
    matches!(
        method,
        "Update"
            | "UpdateXMLObject"
            | "Start"
            | "Stop"
            | "Restart"
            | "UploadISVPackage"
            | "UploadCAP"
            | "LoadISVPackage"
            | "DeployCAP"
            | "UnloadISVPackage"
            | "UnDeployCAP"
    )
}

fn fault(method: &str, message: impl Into<String>) -> Error {
    Error::RemoteFault {
        method: method.to_string(),
        message: message.into(),
    }
}

fn entry_tuple(entry: &Entry) -> XmlNode {
    XmlNode::new("tuple").with_child(XmlNode::new("old").with_child(entry.to_xml()))
}

fn status(method: &str, namespace: &str) -> XmlNode {
    response(method, namespace).with_text_child("status", "OK")
}

fn required_text(method: &str, request: &XmlNode, name: &str) -> Result<String> {
    request
        .child_text(name)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| fault(method, format!("Missing <{}> parameter", name)))
}

fn required_dn(method: &str, request: &XmlNode) -> Result<Dn> {
    let text = required_text(method, request, "dn")?;
    Dn::parse(&text).map_err(|_| fault(method, format!("Invalid DN '{}'", text)))
}

fn organization_param(method: &str, params: &QueryParams) -> Result<String> {
    let organization = params
        .get("organization")
        .ok_or_else(|| fault(method, "No organization context"))?;
    Dn::parse(organization)
        .map(|dn| dn.normalized())
        .map_err(|_| fault(method, format!("Invalid organization '{}'", organization)))
}

/// Match an `attr=value` filter; an absent filter or `*` matches everything.
fn matches_filter(entry: &Entry, filter: Option<&str>) -> bool {
    let filter = match filter.map(str::trim) {
        None | Some("") | Some("*") => return true,
        Some(filter) => filter.trim_start_matches('(').trim_end_matches(')'),
    };
    match filter.split_once('=') {
        Some((attribute, value)) => entry
            .values(attribute.trim())
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value.trim())),
        None => false,
    }
}

impl State {
    fn put(&mut self, entry: Entry) {
        self.entries.insert(entry.dn().normalized(), entry);
    }

    fn has_children(&self, dn: &Dn) -> bool {
        self.entries.values().any(|entry| entry.dn().parent().as_ref() == Some(dn))
    }

    fn install_package(&mut self, root: &Dn, name: &str) {
        let dn = root.child("cn", name);
        let mut entry = Entry::new(dn.clone(), &["top", "bussoftwarepackage"]);
        entry.set("busversion", vec!["1.0".to_string()]);
        self.put(entry);
        self.put(Entry::new(dn.child("cn", "method sets"), &["top", "groupOfNames"]));
    }

    fn installation_info(&self) -> XmlNode {
        let installation = XmlNode::new("installation")
            .with_text_child("ldaproot", self.root.to_string())
            .with_text_child("version", "D1.006")
            .with_text_child("build", "memory")
            .with_text_child("os", std::env::consts::OS);
        response("GetInstallationInfo", LDAP_NAMESPACE).with_child(
            XmlNode::new("tuple").with_child(XmlNode::new("old").with_child(installation)),
        )
    }

    fn user_details(&self) -> XmlNode {
        let user = XmlNode::new("user").with_text_child("authuserdn", self.user.to_string());
        response("GetUserDetails", LDAP_NAMESPACE)
            .with_child(XmlNode::new("tuple").with_child(XmlNode::new("old").with_child(user)))
    }

    fn get_ldap_object(&self, request: &XmlNode) -> Result<XmlNode> {
        let dn = required_dn("GetLDAPObject", request)?;
        let mut node = response("GetLDAPObject", LDAP_NAMESPACE);
        if let Some(entry) = self.entries.get(&dn.normalized()) {
            node.push(entry_tuple(entry));
        }
        Ok(node)
    }

    fn search(&self, request: &XmlNode, subtree: bool) -> Result<XmlNode> {
        let method = if subtree { "SearchLDAP" } else { "GetChildren" };
        let base = required_dn(method, request)?;
        if !self.entries.contains_key(&base.normalized()) {
            return Err(fault(method, format!("No such entry: {}", base)));
        }
        let filter = request.child_text("filter");
        let mut found: Vec<&Entry> = self
            .entries
            .values()
            .filter(|entry| {
                if subtree {
                    entry.dn().is_under(&base)
                } else {
                    entry.dn().parent().as_ref() == Some(&base)
                }
            })
            .filter(|entry| matches_filter(entry, filter.as_deref()))
            .collect();
        if request.child_text("sort").as_deref() == Some("ascending") {
            found.sort_by_key(|entry| entry.dn().name().to_lowercase());
        }
        let mut node = response(method, LDAP_NAMESPACE);
        for entry in found {
            node.push(entry_tuple(entry));
        }
        Ok(node)
    }

    fn update(&mut self, request: &XmlNode) -> Result<XmlNode> {
        let tuple = request
            .child("tuple")
            .ok_or_else(|| fault("Update", "Missing <tuple>"))?;
        let old = tuple
            .path("old/entry")
            .map(Entry::from_xml)
            .transpose()
            .map_err(|e| fault("Update", e.to_string()))?;
        let new = tuple
            .path("new/entry")
            .map(Entry::from_xml)
            .transpose()
            .map_err(|e| fault("Update", e.to_string()))?;

        match (old, new) {
            (None, Some(new)) => {
                let key = new.dn().normalized();
                if self.entries.contains_key(&key) {
                    return Err(fault("Update", format!("Entry already exists: {}", new.dn())));
                }
                let parent_exists = new
                    .dn()
                    .parent()
                    .map(|parent| self.entries.contains_key(&parent.normalized()))
                    .unwrap_or(false);
                if !parent_exists {
                    return Err(fault("Update", format!("No parent entry for {}", new.dn())));
                }
                self.put(new);
            }
            (Some(old), Some(new)) => {
                if old.dn() != new.dn() {
                    return Err(fault("Update", "Renaming entries is not supported"));
                }
                match self.entries.get(&old.dn().normalized()) {
                    None => {
                        return Err(fault("Update", format!("No such entry: {}", old.dn())))
                    }
                    Some(current) if *current != old => {
                        return Err(fault(
                            "Update",
                            format!("Entry {} was modified concurrently", old.dn()),
                        ))
                    }
                    Some(_) => self.put(new),
                }
            }
            (Some(old), None) => {
                let key = old.dn().normalized();
                if !self.entries.contains_key(&key) {
                    return Err(fault("Update", format!("No such entry: {}", old.dn())));
                }
                if self.has_children(old.dn()) {
                    return Err(fault("Update", format!("Entry {} has children", old.dn())));
                }
                self.entries.remove(&key);
                self.running.remove(&key);
            }
            (None, None) => return Err(fault("Update", "Empty tuple")),
        }
        Ok(response("Update", LDAP_NAMESPACE).with_child(tuple.clone()))
    }

    fn get_xml_object(&self, request: &XmlNode, params: &QueryParams) -> Result<XmlNode> {
        let organization = organization_param("GetXMLObject", params)?;
        let key = required_text("GetXMLObject", request, "key")?;
        let mut node = response("GetXMLObject", XMLSTORE_NAMESPACE);
        if let Some(object) = self.xml_store.get(&(organization, key.clone())) {
            node.push(
                XmlNode::new("tuple")
                    .with_attr("key", key)
                    .with_attr("name", object.name.as_str())
                    .with_attr("version", object.version.as_str())
                    .with_child(XmlNode::new("old").with_child(object.content.clone())),
            );
        }
        Ok(node)
    }

    fn get_collection(&self, request: &XmlNode, params: &QueryParams) -> Result<XmlNode> {
        let organization = organization_param("GetCollection", params)?;
        let folder = request.child_text("folder").unwrap_or_default();
        let prefix = format!("{}/", folder.trim_end_matches('/'));
        let mut node = response("GetCollection", XMLSTORE_NAMESPACE);
        for ((org, key), object) in &self.xml_store {
            if *org == organization && (folder.is_empty() || key.starts_with(&prefix)) {
                node.push(
                    XmlNode::new("tuple")
                        .with_attr("key", key.as_str())
                        .with_attr("name", object.name.as_str())
                        .with_attr("version", object.version.as_str()),
                );
            }
        }
        Ok(node)
    }

    fn update_xml_object(&mut self, request: &XmlNode, params: &QueryParams) -> Result<XmlNode> {
        let organization = organization_param("UpdateXMLObject", params)?;
        let tuple = request
            .child("tuple")
            .ok_or_else(|| fault("UpdateXMLObject", "Missing <tuple>"))?;
        let key = tuple
            .attr("key")
            .ok_or_else(|| fault("UpdateXMLObject", "Missing key"))?
            .to_string();
        let slot = (organization, key.clone());
        if let Some(content) = tuple.child("new").and_then(XmlNode::first_element) {
            let name = tuple
                .attr("name")
                .map(str::to_string)
                .unwrap_or_else(|| key.rsplit('/').next().unwrap_or(&key).to_string());
            let version = tuple.attr("version").unwrap_or("organization").to_string();
            self.xml_store.insert(
                slot,
                StoredXmlObject {
                    name,
                    version,
                    content: content.clone(),
                },
            );
        } else if tuple.child("old").is_some() {
            if self.xml_store.remove(&slot).is_none() {
                return Err(fault("UpdateXMLObject", format!("No such object: {}", key)));
            }
        } else {
            return Err(fault("UpdateXMLObject", "Tuple has neither <new> nor <old>"));
        }
        Ok(response("UpdateXMLObject", XMLSTORE_NAMESPACE).with_child(tuple.clone()))
    }

    fn control(&mut self, method: &str, request: &XmlNode) -> Result<XmlNode> {
        let dn = required_dn(method, request)?;
        let key = dn.normalized();
        let is_container = self
            .entries
            .get(&key)
            .map(|entry| entry.has_class("bussoapprocessor"))
            .unwrap_or(false);
        if !is_container {
            return Err(fault(method, format!("{} is not a service container", dn)));
        }
        match method {
            "Stop" => {
                self.running.remove(&key);
            }
            _ => {
                self.running.insert(key);
            }
        }
        Ok(status(method, MONITOR_NAMESPACE))
    }

    fn list_processes(&self) -> XmlNode {
        let mut node = response("List", MONITOR_NAMESPACE);
        for (key, entry) in &self.entries {
            if !entry.has_class("bussoapprocessor") {
                continue;
            }
            let state = if self.running.contains(key) {
                "OK"
            } else {
                "Stopped"
            };
            let process = XmlNode::new("workerprocess")
                .with_text_child("name", entry.dn().to_string())
                .with_text_child("status", state);
            node.push(XmlNode::new("tuple").with_child(XmlNode::new("old").with_child(process)));
        }
        node
    }

    fn upload(&mut self, request: &XmlNode, namespace: &str) -> Result<XmlNode> {
        let method = request.local_name().to_string();
        let name = required_text(&method, request, "name")?;
        let content = required_text(&method, request, "content")?;
        self.uploads.insert(name, content);
        Ok(status(&method, namespace))
    }

    fn load_package(
        &mut self,
        method: &str,
        request: &XmlNode,
        parameter: &str,
        namespace: &str,
    ) -> Result<XmlNode> {
        let file = required_text(method, request, parameter)?;
        if !self.uploads.contains_key(&file) {
            return Err(fault(method, format!("Package file {} was not uploaded", file)));
        }
        let name = package_name(&file);
        let root = self.root.clone();
        if self.entries.contains_key(&root.child("cn", &name).normalized()) {
            return Err(fault(method, format!("Package {} is already loaded", name)));
        }
        self.install_package(&root, &name);
        Ok(status(method, namespace))
    }

    fn unload_package(
        &mut self,
        method: &str,
        request: &XmlNode,
        parameter: &str,
        namespace: &str,
    ) -> Result<XmlNode> {
        let name = package_name(&required_text(method, request, parameter)?);
        let dn = self.root.child("cn", &name);
        if !self.entries.contains_key(&dn.normalized()) {
            return Err(fault(method, format!("Package {} is not loaded", name)));
        }
        self.entries.retain(|_, entry| !entry.dn().is_within(&dn));
        Ok(status(method, namespace))
    }
}

fn package_name(file: &str) -> String {
    let base = file.rsplit(['/', '\\']).next().unwrap_or(file);
    match base.rsplit_once('.') {
        Some((stem, extension))
            if extension.eq_ignore_ascii_case("isvp") || extension.eq_ignore_ascii_case("cap") =>
        {
            stem.to_string()
        }
        _ => base.to_string(),
    }
}
