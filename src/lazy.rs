//! # Lazy Collections
//!
//! A [`LazyList`] stands for one remote listing call. Nothing is fetched until
//! the list is first read; the result is kept until the list is cleared, and
//! every element is resolved through the system's object cache so listing
//! never produces a second instance for an entry that is already live.
//!
//! ## Invalidation
//!
//! Each list derives a [`Dependency`] from its [`ListSource`]. Mutations report
//! a [`Change`] to [`DirectorySystem::invalidate`], which clears exactly the
//! registered lists whose dependency is affected. Call sites never need to
//! know which lists exist.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::object::{DirectoryObject, ObjectKey, ObjectKind};
use crate::system::DirectorySystem;

/// Where the members of a list come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListSource {
    /// Direct children of `base`, optionally restricted to one kind.
    Children { base: Dn, kind: Option<ObjectKind> },
    /// Every entry of `kind` anywhere below `base`.
    Search { base: Dn, kind: ObjectKind },
    /// DNs held in a multi-valued attribute of the owner's entry.
    EntryRefs { owner: Dn, attribute: String },
    /// Objects in an organization's XML store folder.
    XmlStore {
        organization: Dn,
        folder: String,
        kind: ObjectKind,
    },
}

impl ListSource {
    /// Registry key; equal sources share one list.
    pub fn key(&self) -> String {
        match self {
            ListSource::Children { base, kind } => format!(
                "children:{}:{}",
                base.normalized(),
                kind.map(|k| k.to_string()).unwrap_or_default()
            ),
            ListSource::Search { base, kind } => format!("search:{}:{}", base.normalized(), kind),
            ListSource::EntryRefs { owner, attribute } => {
                format!("refs:{}:{}", owner.normalized(), attribute.to_lowercase())
            }
            ListSource::XmlStore {
                organization,
                folder,
                kind,
            } => format!("xmlstore:{}:{}:{}", organization.normalized(), folder, kind),
        }
    }

    pub fn dependency(&self) -> Dependency {
        match self {
            ListSource::Children { base, .. } => Dependency::Children(base.clone()),
            ListSource::Search { base, .. } => Dependency::Subtree(base.clone()),
            ListSource::EntryRefs { owner, .. } => Dependency::Entry(ObjectKey::Dn(owner.clone())),
            ListSource::XmlStore { organization, .. } => {
                Dependency::XmlStore(organization.clone())
            }
        }
    }

    /// The DN this listing is anchored at.
    pub fn anchor(&self) -> &Dn {
        match self {
            ListSource::Children { base, .. } | ListSource::Search { base, .. } => base,
            ListSource::EntryRefs { owner, .. } => owner,
            ListSource::XmlStore { organization, .. } => organization,
        }
    }
}

impl fmt::Display for ListSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListSource::Children { base, kind: Some(kind) } => write!(f, "{} children of {}", kind, base),
            ListSource::Children { base, kind: None } => write!(f, "children of {}", base),
            ListSource::Search { base, kind } => write!(f, "{} entries below {}", kind, base),
            ListSource::EntryRefs { owner, attribute } => write!(f, "{} of {}", attribute, owner),
            ListSource::XmlStore {
                organization,
                folder,
                ..
            } => write!(f, "XML store folder '{}' of {}", folder, organization),
        }
    }
}

/// What a list needs to be re-read after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    Children(Dn),
    Subtree(Dn),
    Entry(ObjectKey),
    XmlStore(Dn),
}

/// A mutation reported to [`DirectorySystem::invalidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// An entry was created or deleted directly below `parent`.
    Structure { parent: Dn },
    /// The content of one entry or XML store object changed.
    Entry(ObjectKey),
    /// An XML store object was created or deleted in an organization.
    XmlStore { organization: Dn },
    /// An entry and everything below it was deleted.
    Removed(Dn),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Structure { parent } => write!(f, "structure below {}", parent),
            Change::Entry(key) => write!(f, "entry {}", key),
            Change::XmlStore { organization } => write!(f, "XML store of {}", organization),
            Change::Removed(dn) => write!(f, "removal of {}", dn),
        }
    }
}

impl Dependency {
    pub fn is_affected_by(&self, change: &Change) -> bool {
        match (self, change) {
            (Dependency::Children(base), Change::Structure { parent }) => base == parent,
            (Dependency::Subtree(base), Change::Structure { parent }) => parent.is_within(base),
            (Dependency::Entry(key), Change::Entry(changed)) => key == changed,
            (Dependency::XmlStore(org), Change::XmlStore { organization }) => org == organization,
            (Dependency::Children(base), Change::Removed(dn)) => dn.parent().as_ref() == Some(base),
            (Dependency::Subtree(base), Change::Removed(dn)) => dn.is_under(base),
            (Dependency::Entry(key), Change::Removed(dn)) => key.is_within(dn),
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct ListState {
    populated: bool,
    items: Vec<Arc<DirectoryObject>>,
}

/// A remote listing that is fetched on first use.
#[derive(Debug)]
pub struct LazyList {
    source: ListSource,
    system: Weak<DirectorySystem>,
    system_name: String,
    state: Mutex<ListState>,
}

impl LazyList {
    pub(crate) fn new(source: ListSource, system: Weak<DirectorySystem>, system_name: &str) -> Self {
        Self {
            source,
            system,
            system_name: system_name.to_string(),
            state: Mutex::new(ListState::default()),
        }
    }

    pub fn source(&self) -> &ListSource {
        &self.source
    }

    pub fn dependency(&self) -> Dependency {
        self.source.dependency()
    }

    pub fn is_populated(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.populated)
            .unwrap_or(false)
    }

    /// All members, fetching them if the list is not populated.
    pub fn items(&self) -> Result<Vec<Arc<DirectoryObject>>> {
        let system = self.system()?;
        let mut state = self.lock()?;
        if state.populated && system.cache_enabled() {
            return Ok(state.items.clone());
        }
        log::debug!("Listing {} ...", self.source);
        let items = system.retrieve(&self.source)?;
        log::debug!("Listing {} ... OK ({} items)", self.source, items.len());
        state.items = items.clone();
        state.populated = true;
        Ok(items)
    }

    pub fn iter(&self) -> Result<std::vec::IntoIter<Arc<DirectoryObject>>> {
        Ok(self.items()?.into_iter())
    }

    pub fn get(&self, index: usize) -> Result<Option<Arc<DirectoryObject>>> {
        Ok(self.items()?.get(index).cloned())
    }

    /// Member whose name matches, ignoring case.
    pub fn get_by_name(&self, name: &str) -> Result<Option<Arc<DirectoryObject>>> {
        Ok(self
            .items()?
            .into_iter()
            .find(|item| item.name().eq_ignore_ascii_case(name)))
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.items()?.is_empty())
    }

    /// Whether `object` (the same instance) is a member.
    pub fn contains(&self, object: &Arc<DirectoryObject>) -> Result<bool> {
        Ok(self.items()?.iter().any(|item| Arc::ptr_eq(item, object)))
    }

    /// Whether this list must be re-read after `change`.
    ///
    /// Besides the declared dependency, a removal affects every list that
    /// currently holds a member at or below the removed DN.
    pub fn is_affected_by(&self, change: &Change) -> bool {
        if self.dependency().is_affected_by(change) {
            return true;
        }
        let Change::Removed(removed) = change else {
            return false;
        };
        match self.state.lock() {
            Ok(state) => state.items.iter().any(|item| item.key().is_within(removed)),
            Err(_) => true,
        }
    }

    /// Mark unpopulated; the next read fetches again.
    pub fn clear(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.populated = false;
        state.items.clear();
    }

    /// Raw member DNs of a reference list, including dangling ones.
    pub fn member_dns(&self) -> Result<Vec<Dn>> {
        let (owner, attribute) = self.reference_source("read members")?;
        let owner = self.system()?.get_ldap(owner)?;
        Ok(owner
            .entry()?
            .values(attribute)
            .iter()
            .filter_map(|value| Dn::parse(value).ok())
            .collect())
    }

    /// Replace the members of a reference list. Returns `true` if sent.
    pub fn update(&self, members: &[Arc<DirectoryObject>]) -> Result<bool> {
        let dns: Vec<Dn> = members.iter().map(|member| member.dn().clone()).collect();
        self.update_dns(&dns)
    }

    /// Replace the members of a reference list by DN.
    pub fn update_dns(&self, members: &[Dn]) -> Result<bool> {
        let (owner, attribute) = self.reference_source("update")?;
        let owner = self.system()?.get_ldap(owner)?;
        let mut unique: Vec<&Dn> = Vec::new();
        for dn in members {
            if !unique.contains(&dn) {
                unique.push(dn);
            }
        }
        let values: Vec<String> = unique.iter().map(|dn| dn.to_string()).collect();
        let current: Vec<Dn> = owner
            .entry()?
            .values(attribute)
            .iter()
            .filter_map(|value| Dn::parse(value).ok())
            .collect();
        if same_members(&current, members) {
            return Ok(false);
        }
        owner.modify(|entry| {
            entry.set(attribute, values);
            Ok(())
        })
    }

    /// Append members to a reference list in one update.
    pub fn add(&self, members: &[Arc<DirectoryObject>]) -> Result<bool> {
        let dns: Vec<Dn> = members.iter().map(|member| member.dn().clone()).collect();
        self.add_dns(&dns)
    }

    /// Append members by DN; already present members are ignored.
    pub fn add_dns(&self, members: &[Dn]) -> Result<bool> {
        let mut merged = self.member_dns()?;
        for dn in members {
            if !merged.contains(dn) {
                merged.push(dn.clone());
            }
        }
        self.update_dns(&merged)
    }

    /// Remove members from a reference list in one update.
    pub fn remove(&self, members: &[Arc<DirectoryObject>]) -> Result<bool> {
        let remaining: Vec<Dn> = self
            .member_dns()?
            .into_iter()
            .filter(|dn| !members.iter().any(|member| member.dn() == dn))
            .collect();
        self.update_dns(&remaining)
    }

    fn reference_source(&self, operation: &str) -> Result<(&Dn, &str)> {
        match &self.source {
            ListSource::EntryRefs { owner, attribute } => Ok((owner, attribute.as_str())),
            other => Err(Error::precondition(
                operation,
                format!("{} is not an editable reference list", other),
            )),
        }
    }

    fn system(&self) -> Result<Arc<DirectorySystem>> {
        self.system.upgrade().ok_or_else(|| Error::SystemClosed {
            name: self.system_name.clone(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ListState>> {
        self.state.lock().map_err(|_| Error::LockPoisoned {
            context: format!("list {}", self.source),
        })
    }
}

/// Set equality of two DN lists.
pub fn same_members(a: &[Dn], b: &[Dn]) -> bool {
    a.iter().all(|dn| b.contains(dn)) && b.iter().all(|dn| a.contains(dn))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(text: &str) -> Dn {
        Dn::parse(text).unwrap()
    }

    #[test]
    fn test_children_dependency_matches_only_its_parent() {
        let dependency = ListSource::Children {
            base: dn("cn=organizational users,o=acme"),
            kind: Some(ObjectKind::User),
        }
        .dependency();
        assert!(dependency.is_affected_by(&Change::Structure {
            parent: dn("CN=Organizational Users,o=acme"),
        }));
        assert!(!dependency.is_affected_by(&Change::Structure {
            parent: dn("cn=organizational roles,o=acme"),
        }));
    }

    #[test]
    fn test_subtree_dependency_matches_nested_changes() {
        let dependency = Dependency::Subtree(dn("o=acme"));
        assert!(dependency.is_affected_by(&Change::Structure {
            parent: dn("cn=sg,cn=soap nodes,o=acme"),
        }));
        assert!(dependency.is_affected_by(&Change::Structure { parent: dn("o=acme") }));
        assert!(!dependency.is_affected_by(&Change::Structure { parent: dn("o=other") }));
    }

    #[test]
    fn test_entry_dependency() {
        let key = ObjectKey::Dn(dn("cn=jane,cn=organizational users,o=acme"));
        let dependency = ListSource::EntryRefs {
            owner: key.dn().clone(),
            attribute: "role".to_string(),
        }
        .dependency();
        assert!(dependency.is_affected_by(&Change::Entry(key)));
        assert!(!dependency.is_affected_by(&Change::XmlStore {
            organization: dn("o=acme"),
        }));
    }

    #[test]
    fn test_removal_reaches_parent_listings_and_owned_lists() {
        let removed = dn("cn=Approver,cn=organizational roles,o=acme");
        let change = Change::Removed(removed.clone());

        assert!(Dependency::Children(dn("cn=organizational roles,o=acme")).is_affected_by(&change));
        assert!(Dependency::Subtree(dn("o=acme")).is_affected_by(&change));
        assert!(!Dependency::Subtree(removed.clone()).is_affected_by(&change));
        assert!(Dependency::Entry(ObjectKey::Dn(removed)).is_affected_by(&change));
        assert!(!Dependency::Entry(ObjectKey::Dn(dn("cn=jane,cn=organizational users,o=acme")))
            .is_affected_by(&change));
    }

    #[test]
    fn test_source_keys_are_normalized() {
        let a = ListSource::Search {
            base: dn("O=Acme"),
            kind: ObjectKind::ServiceContainer,
        };
        let b = ListSource::Search {
            base: dn("o=acme"),
            kind: ObjectKind::ServiceContainer,
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_same_members_ignores_order() {
        let a = vec![dn("cn=a,o=x"), dn("cn=b,o=x")];
        let b = vec![dn("CN=B,o=x"), dn("cn=a,o=x")];
        assert!(same_members(&a, &b));
        assert!(!same_members(&a, &b[..1]));
    }
}
