//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `caas` library. It uses the `thiserror` library to create a single
//! `Error` enum that covers every failure the directory client can surface.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors. The
//!   variants follow the failure taxonomy of the administrative protocol:
//!
//!   - *Connection failures*: the remote endpoint could not be reached. These
//!     are kept apart from application faults so scripts can treat an offline
//!     system specially.
//!   - *Remote faults*: the remote system executed the request and answered
//!     with an error status. The remote message is carried verbatim and the
//!     request is never retried.
//!   - *Validation failures*: local pre-flight checks that fail before any
//!     remote call is made (missing package file, empty argument, ...).
//!   - *Precondition failures*: structurally disallowed operations such as
//!     deleting a package entry instead of unloading it.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.

use thiserror::Error;

/// Main error type for caas operations
#[derive(Error, Debug)]
pub enum Error {
    /// The remote endpoint could not be reached.
    #[error("Connection error for {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// The remote system executed a request and reported a failure.
    #[error("Remote fault in {method}: {message}")]
    RemoteFault { method: String, message: String },

    /// A local validation check failed before any remote call was made.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The requested operation is structurally disallowed.
    #[error("Operation not allowed: {operation} - {message}")]
    Precondition { operation: String, message: String },

    /// A directory entry or XML store object does not exist.
    #[error("Not found: {key}")]
    NotFound { key: String },

    /// XML text could not be parsed or written.
    #[error("XML error: {message}")]
    Xml { message: String },

    /// An error occurred during template processing.
    ///
    /// May include the name of the problematic variable when applicable.
    #[error("Template processing error: {message}{}", variable.as_ref().map(|v| format!(" (variable: {})", v)).unwrap_or_default())]
    Template {
        message: String,
        /// The template variable that caused the error, if applicable
        variable: Option<String>,
    },

    /// The connection configuration is missing or invalid.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// The `DirectorySystem` behind an object has been closed.
    #[error("System {name} is no longer connected")]
    SystemClosed { name: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An HTTP transport error, wrapped from `reqwest::Error`.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A properties file could not be read, wrapped from `ini::Error`.
    #[error("Properties error: {0}")]
    Ini(#[from] ini::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An error occurred during serialization.
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl Error {
    /// Builds a `Precondition` error.
    pub fn precondition(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Precondition {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Builds a `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Builds an `Xml` error from anything displayable.
    pub fn xml(message: impl std::fmt::Display) -> Self {
        Error::Xml {
            message: message.to_string(),
        }
    }

    /// True when the remote endpoint was unreachable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// True when the entry or object simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_connection() {
        let error = Error::Connection {
            endpoint: "http://cordys.example.com/gateway".to_string(),
            message: "connection refused".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Connection error"));
        assert!(display.contains("http://cordys.example.com/gateway"));
        assert!(display.contains("connection refused"));
        assert!(error.is_connection());
    }

    #[test]
    fn test_error_display_remote_fault() {
        let error = Error::RemoteFault {
            method: "Update".to_string(),
            message: "Entry already exists".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Remote fault in Update"));
        assert!(display.contains("Entry already exists"));
        assert!(!error.is_connection());
    }

    #[test]
    fn test_error_display_precondition() {
        let error = Error::precondition("delete", "packages must be unloaded");
        let display = format!("{}", error);
        assert!(display.contains("Operation not allowed"));
        assert!(display.contains("delete"));
        assert!(display.contains("packages must be unloaded"));
    }

    #[test]
    fn test_error_display_config_with_hint() {
        let error = Error::Config {
            message: "No properties file for system dev".to_string(),
            hint: Some("Create dev.properties".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("Configuration error"));
        assert!(display.contains("hint:"));
        assert!(display.contains("Create dev.properties"));
    }

    #[test]
    fn test_error_template_with_variable() {
        let error = Error::Template {
            message: "Undefined variable".to_string(),
            variable: Some("org".to_string()),
        };
        let display = format!("{}", error);
        assert!(display.contains("Template processing error"));
        assert!(display.contains("(variable: org)"));
    }

    #[test]
    fn test_error_not_found() {
        let error = Error::NotFound {
            key: "o=missing,cn=cordys".to_string(),
        };
        assert!(error.is_not_found());
        assert!(format!("{}", error).contains("o=missing,cn=cordys"));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();
        let display = format!("{}", error);
        assert!(display.contains("I/O error"));
        assert!(display.contains("File not found"));
    }

    #[test]
    fn test_error_from_url_error() {
        let url_error = url::Url::parse("not a url").unwrap_err();
        let error: Error = url_error.into();
        assert!(format!("{}", error).contains("URL parsing error"));
    }
}
