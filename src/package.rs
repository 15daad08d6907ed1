//! Loading and unloading packages.
//!
//! Package files are validated locally before anything is sent. ISVP files
//! are uploaded and loaded; CAP files are uploaded and deployed. The server
//! side timeout travels as the `timeout` query parameter.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::defaults::DEFAULT_PACKAGE_TIMEOUT_MS;
use crate::error::{Error, Result};
use crate::lazy::Change;
use crate::remote::{self, request, CAP_NAMESPACE, ISV_NAMESPACE};
use crate::system::DirectorySystem;

/// Package file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Isvp,
    Cap,
}

impl PackageFormat {
    /// Format implied by a file's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        if extension.eq_ignore_ascii_case("isvp") {
            Some(PackageFormat::Isvp)
        } else if extension.eq_ignore_ascii_case("cap") {
            Some(PackageFormat::Cap)
        } else {
            None
        }
    }

    fn extension(self) -> &'static str {
        match self {
            PackageFormat::Isvp => "isvp",
            PackageFormat::Cap => "cap",
        }
    }

    fn namespace(self) -> &'static str {
        match self {
            PackageFormat::Isvp => ISV_NAMESPACE,
            PackageFormat::Cap => CAP_NAMESPACE,
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageFormat::Isvp => "ISVP",
            PackageFormat::Cap => "CAP",
        })
    }
}

/// Check that `path` names an existing package file.
pub fn validate_package_file(path: &Path) -> Result<PackageFormat> {
    let format = PackageFormat::from_path(path).ok_or_else(|| {
        Error::validation(format!(
            "{} is not a package file (expected .isvp or .cap)",
            path.display()
        ))
    })?;
    if !path.is_file() {
        return Err(Error::validation(format!(
            "Package file not found: {}",
            path.display()
        )));
    }
    Ok(format)
}

impl DirectorySystem {
    /// Upload and install a package file.
    ///
    /// `timeout_ms` defaults to
    /// [`DEFAULT_PACKAGE_TIMEOUT_MS`](crate::defaults::DEFAULT_PACKAGE_TIMEOUT_MS).
    pub fn load_package(&self, path: &Path, timeout_ms: Option<u64>) -> Result<()> {
        let format = validate_package_file(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::validation(format!("Invalid file name: {}", path.display())))?
            .to_string();
        let content = STANDARD.encode(std::fs::read(path)?);
        let params = timeout_params(timeout_ms);

        log::info!("Uploading {} package {} ...", format, file_name);
        let upload_method = match format {
            PackageFormat::Isvp => "UploadISVPackage",
            PackageFormat::Cap => "UploadCAP",
        };
        let upload = request(upload_method, format.namespace())
            .with_text_child("name", file_name.as_str())
            .with_text_child("content", content);
        self.call(&upload, &params)?;
        log::info!("Uploading {} package {} ... OK", format, file_name);

        log::info!("Installing {} ...", file_name);
        let install = match format {
            PackageFormat::Isvp => request("LoadISVPackage", ISV_NAMESPACE)
                .with_text_child("url", file_name.as_str()),
            PackageFormat::Cap => {
                request("DeployCAP", CAP_NAMESPACE).with_text_child("name", file_name.as_str())
            }
        };
        self.call(&install, &params)?;
        self.invalidate(Change::Structure {
            parent: self.root().clone(),
        })?;
        log::info!("Installing {} ... OK", file_name);
        Ok(())
    }

    /// Uninstall the package called `name`.
    pub fn unload_package(
        &self,
        name: &str,
        format: PackageFormat,
        timeout_ms: Option<u64>,
    ) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::validation("package name must not be empty"));
        }
        log::info!("Unloading {} package {} ...", format, name);
        let unload = match format {
            PackageFormat::Isvp => request("UnloadISVPackage", ISV_NAMESPACE)
                .with_text_child("file", format!("{}.{}", name, format.extension())),
            PackageFormat::Cap => request("UnDeployCAP", CAP_NAMESPACE).with_text_child("name", name),
        };
        self.call(&unload, &timeout_params(timeout_ms))?;
        let package = self.root().child("cn", name);
        self.invalidate(Change::Structure {
            parent: self.root().clone(),
        })?;
        self.remove_ldap(&package)?;
        log::info!("Unloading {} package {} ... OK", format, name);
        Ok(())
    }
}

fn timeout_params(timeout_ms: Option<u64>) -> remote::QueryParams {
    remote::params([(
        "timeout",
        timeout_ms.unwrap_or(DEFAULT_PACKAGE_TIMEOUT_MS).to_string(),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use crate::remote::MemoryDirectory;
    use std::sync::Arc;
    use tempfile::TempDir;

    const ROOT: &str = "cn=cordys,cn=defaultInst,o=example.com";

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            PackageFormat::from_path(Path::new("a/Orders.ISVP")),
            Some(PackageFormat::Isvp)
        );
        assert_eq!(
            PackageFormat::from_path(Path::new("Orders.cap")),
            Some(PackageFormat::Cap)
        );
        assert_eq!(PackageFormat::from_path(Path::new("Orders.zip")), None);
    }

    #[test]
    fn test_invalid_package_file_is_rejected_before_any_call() {
        let memory = Arc::new(MemoryDirectory::new(ROOT).unwrap());
        let system = DirectorySystem::connect("test", memory.clone(), Properties::new()).unwrap();
        memory.reset_calls().unwrap();

        let dir = TempDir::new().unwrap();
        let wrong_extension = dir.path().join("orders.zip");
        std::fs::write(&wrong_extension, b"zip").unwrap();

        for path in [wrong_extension, dir.path().join("missing.isvp")] {
            let error = system.load_package(&path, None).unwrap_err();
            assert!(matches!(error, Error::Validation { .. }), "{:?}", error);
        }
        assert!(memory.calls().unwrap().is_empty());
    }

    #[test]
    fn test_load_and_unload_cap() {
        let memory = Arc::new(MemoryDirectory::new(ROOT).unwrap());
        let system = DirectorySystem::connect("test", memory.clone(), Properties::new()).unwrap();
        assert!(system.package("Orders").unwrap().is_none());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Orders.cap");
        std::fs::write(&path, b"cap bytes").unwrap();
        system.load_package(&path, Some(1000)).unwrap();

        let deploy = memory
            .calls()
            .unwrap()
            .into_iter()
            .find(|call| call.method == "DeployCAP")
            .unwrap();
        assert_eq!(deploy.params.get("timeout").map(String::as_str), Some("1000"));
        assert!(system.package("Orders").unwrap().is_some());

        system
            .unload_package("Orders", PackageFormat::Cap, None)
            .unwrap();
        assert!(system.package("Orders").unwrap().is_none());
    }
}
