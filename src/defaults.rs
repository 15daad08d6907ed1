//! Default values for caas configuration.
//!
//! This module provides centralized default values used across the library
//! and the commands, ensuring consistency and avoiding duplication.

use std::path::PathBuf;
use std::time::Duration;

/// Client-side timeout for one HTTP round trip when the properties file
/// does not set `timeout`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-side timeout, in milliseconds, for package load/unload requests.
pub const DEFAULT_PACKAGE_TIMEOUT_MS: u64 = 600_000;

/// XML store version used when a template does not name one.
pub const DEFAULT_XML_STORE_VERSION: &str = "organization";

/// Returns the per-user properties directory.
///
/// Resolves to `<home>/config/caas`. Falls back to `config/caas` relative to
/// the current directory if the home directory cannot be determined.
///
/// Properties files found here have the lowest precedence; see
/// [`crate::config::Properties::resolve`].
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config")
        .join("caas")
}
