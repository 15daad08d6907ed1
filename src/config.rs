//! # Connection Properties
//!
//! Each named system is described by a flat `key=value` properties file.
//! [`Properties`] loads and saves that file; [`ConnectionConfig`] is the typed
//! view the HTTP transport needs.
//!
//! ## Resolution order
//!
//! For a system called `dev` the first existing file wins:
//!
//! 1. an explicitly configured path (`--properties` / `CAAS_PROPERTIES`)
//! 2. `./dev.properties` in the working directory
//! 3. `<home>/config/caas/dev.properties`
//!
//! ## Keys
//!
//! | Key | Meaning |
//! |---|---|
//! | `url` | gateway endpoint (required for HTTP connections) |
//! | `user`, `password` | basic authentication credentials |
//! | `timeout` | client-side request timeout in seconds |
//! | `cache` | `false` disables entry caching (identity is always kept) |
//! | `organization` | default organization for commands |
//!
//! Keys inside a `[section]` are flattened to `section.key`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use url::Url;

use crate::defaults::{default_config_dir, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{Error, Result};

/// A flat string-keyed property map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
    source: Option<PathBuf>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties text.
    pub fn parse(text: &str) -> Result<Self> {
        let ini = Ini::load_from_str_noescape(text).map_err(|e| Error::Config {
            message: format!("Invalid properties: {}", e),
            hint: None,
        })?;
        Ok(Self {
            values: flatten(&ini),
            source: None,
        })
    }

    /// Load a properties file.
    pub fn load(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file_noescape(path)?;
        Ok(Self {
            values: flatten(&ini),
            source: Some(path.to_path_buf()),
        })
    }

    /// The files consulted for `system`, in precedence order.
    pub fn candidate_paths(system: &str, explicit: Option<&Path>) -> Vec<PathBuf> {
        let file_name = format!("{}.properties", system);
        let mut paths = Vec::new();
        if let Some(path) = explicit {
            paths.push(path.to_path_buf());
        }
        paths.push(PathBuf::from(&file_name));
        paths.push(default_config_dir().join(&file_name));
        paths
    }

    /// Load the highest-precedence existing properties file for `system`.
    pub fn resolve(system: &str, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::Config {
                    message: format!("Properties file not found: {}", path.display()),
                    hint: Some("Check the --properties path".to_string()),
                });
            }
        }
        let candidates = Self::candidate_paths(system, explicit);
        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => {
                log::debug!("Loading properties for {} from {}", system, path.display());
                Self::load(path)
            }
            None => Err(Error::Config {
                message: format!("No properties file found for system '{}'", system),
                hint: Some(format!(
                    "Create one of: {}",
                    candidates
                        .iter()
                        .map(|path| path.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            }),
        }
    }

    /// Write all properties to `path` as a flat `key=value` file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut ini = Ini::new();
        for (key, value) in &self.values {
            ini.with_section(None::<String>).set(key.as_str(), value.as_str());
        }
        ini.write_to_file(path)?;
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A boolean property; `true`/`yes`/`1` and `false`/`no`/`0` are accepted.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key).map(|value| value.trim().to_ascii_lowercase()) {
            None => Ok(None),
            Some(value) => match value.as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(Error::Config {
                    message: format!("Property '{}' is not a boolean: {}", key, value),
                    hint: Some("Use true or false".to_string()),
                }),
            },
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value.trim().parse().map(Some).map_err(|_| Error::Config {
                message: format!("Property '{}' is not a number: {}", key, value),
                hint: None,
            }),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn flatten(ini: &Ini) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for (section, properties) in ini.iter() {
        for (key, value) in properties.iter() {
            let key = match section {
                Some(section) => format!("{}.{}", section, key),
                None => key.to_string(),
            };
            values.insert(key, value.to_string());
        }
    }
    values
}

/// Settings for an HTTP connection, derived from [`Properties`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub cache: bool,
}

impl ConnectionConfig {
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let url = properties.get("url").ok_or_else(|| Error::Config {
            message: "Property 'url' is required".to_string(),
            hint: Some(
                "Add url=http://<host>/cordys/com.eibus.web.soap.Gateway.wcp".to_string(),
            ),
        })?;
        let timeout = properties
            .get_u64("timeout")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        Ok(Self {
            url: Url::parse(url)?,
            username: properties.get("user").map(str::to_string),
            password: properties.get("password").map(str::to_string),
            timeout,
            cache: properties.get_bool("cache")?.unwrap_or(true),
        })
    }
}
