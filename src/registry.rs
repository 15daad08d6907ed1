//! Named connections.
//!
//! A [`ConnectionRegistry`] holds at most one [`DirectorySystem`] per name.
//! Registries are independent of each other, so tests (and host programs
//! talking to several clusters) can keep isolated sets of connections.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{ConnectionConfig, Properties};
use crate::error::{Error, Result};
use crate::remote::{HttpCaller, RemoteCaller};
use crate::system::DirectorySystem;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    systems: Mutex<BTreeMap<String, Arc<DirectorySystem>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The system registered under `name`, connecting through `caller` if
    /// there is none yet.
    pub fn open(
        &self,
        name: &str,
        caller: Arc<dyn RemoteCaller>,
        properties: Properties,
    ) -> Result<Arc<DirectorySystem>> {
        let mut systems = self.lock()?;
        if let Some(system) = systems.get(name) {
            return Ok(Arc::clone(system));
        }
        let system = DirectorySystem::connect(name, caller, properties)?;
        systems.insert(name.to_string(), Arc::clone(&system));
        Ok(system)
    }

    /// Resolve the properties file for `name` and open an HTTP connection.
    pub fn open_from_properties(
        &self,
        name: &str,
        explicit: Option<&Path>,
    ) -> Result<Arc<DirectorySystem>> {
        if let Some(system) = self.get(name)? {
            return Ok(system);
        }
        let properties = Properties::resolve(name, explicit)?;
        let config = ConnectionConfig::from_properties(&properties)?;
        let caller = Arc::new(HttpCaller::new(&config)?);
        self.open(name, caller, properties)
    }

    pub fn get(&self, name: &str) -> Result<Option<Arc<DirectorySystem>>> {
        Ok(self.lock()?.get(name).cloned())
    }

    /// Forget the system registered under `name` and drop its cached objects.
    ///
    /// Objects still held elsewhere report [`Error::SystemClosed`] once the
    /// last handle to the system is gone.
    pub fn close(&self, name: &str) -> Result<bool> {
        let removed = self.lock()?.remove(name);
        let Some(system) = removed else {
            return Ok(false);
        };
        system.clear_cache()?;
        log::debug!("Closed connection {}", name);
        Ok(true)
    }

    pub fn close_all(&self) -> Result<()> {
        let systems = std::mem::take(&mut *self.lock()?);
        for system in systems.values() {
            system.clear_cache()?;
        }
        Ok(())
    }

    /// Names of the open connections, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Arc<DirectorySystem>>>> {
        self.systems.lock().map_err(|_| Error::LockPoisoned {
            context: "connection registry".to_string(),
        })
    }
}
