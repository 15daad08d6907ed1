//! Identity cache of live directory objects

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::object::{DirectoryObject, ObjectKey};

/// Map from normalized key to the single live instance for that key.
///
/// Lookups that miss run their constructor while the map is locked, so two
/// concurrent lookups of one key can never produce two instances.
#[derive(Debug, Default)]
pub struct ObjectCache {
    objects: Mutex<HashMap<String, Arc<DirectoryObject>>>,
}

impl ObjectCache {
    /// Create a new empty object cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached object for `key`, or construct and cache it.
    ///
    /// Returns the object and whether it was created by this call.
    pub fn get_or_create<F>(&self, key: &ObjectKey, create: F) -> Result<(Arc<DirectoryObject>, bool)>
    where
        F: FnOnce() -> Result<DirectoryObject>,
    {
        let mut objects = self.lock()?;
        let normalized = key.normalized();
        if let Some(cached) = objects.get(&normalized) {
            return Ok((Arc::clone(cached), false));
        }
        let object = Arc::new(create()?);
        objects.insert(normalized, Arc::clone(&object));
        Ok((object, true))
    }

    /// Get a cached object without constructing one
    pub fn seek(&self, key: &ObjectKey) -> Result<Option<Arc<DirectoryObject>>> {
        Ok(self.lock()?.get(&key.normalized()).cloned())
    }

    /// Evict one object
    pub fn remove(&self, key: &ObjectKey) -> Result<Option<Arc<DirectoryObject>>> {
        Ok(self.lock()?.remove(&key.normalized()))
    }

    /// Evict every directory object at or below `dn`.
    ///
    /// XML store objects of an organization are evicted with it.
    pub fn remove_subtree(&self, dn: &Dn) -> Result<usize> {
        let mut objects = self.lock()?;
        let before = objects.len();
        objects.retain(|_, object| !object.key().is_within(dn));
        Ok(before - objects.len())
    }

    /// Clear all cached objects
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Get the number of cached objects
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<DirectoryObject>>>> {
        self.objects.lock().map_err(|_| Error::LockPoisoned {
            context: "object cache".to_string(),
        })
    }
}
