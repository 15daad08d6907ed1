//! Shared fixtures for the integration and CLI tests.
//!
//! Add `mod common;` to a test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//!
//! let (memory, system) = connect(directory());
//! let acme = organization(&system);
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use assert_fs::prelude::*;

use caas::config::Properties;
use caas::object::DirectoryObject;
use caas::remote::MemoryDirectory;
use caas::system::DirectorySystem;

pub const ROOT: &str = "cn=cordys,cn=defaultInst,o=example.com";

pub const ORDERS_NAMESPACE: &str = "http://schemas.acme.com/orders/1.0";

/// A template touching every element kind.
pub const FULL_TEMPLATE: &str = r#"
<template>
  <package name="Orders"/>
  <dso name="orders-db" type="Relational" desc="Orders database of ${org}">
    <configuration><connection url="jdbc:db://db1/${org}" user="orders"/></configuration>
  </dso>
  <xmlstoreobject key="/Cordys/WCP/Orders.xml" version="organization">
    <settings><limit>${dollar}500</limit></settings>
  </xmlstoreobject>
  <role name="Reviewer" desc="Reviews orders"/>
  <role name="Approver" desc="Approves orders" type="Application">
    <role name="Reviewer"/>
    <role name="OrderAdmin" package="Orders"/>
  </role>
  <user name="jdoe" desc="Jane Doe" osidentity="jane">
    <role name="Approver"/>
    <team name="Sales"/>
  </user>
  <servicegroup name="OrderService" desc="Order processing">
    <wsi name="OrderMethods" package="Orders"/>
    <configuration><routing ui_algorithm="failover"/></configuration>
    <sc name="OrderService-1" automatic="true">
      <configuration><startup>fast</startup></configuration>
      <cp name="socket" type="socket" uri="socket://node:4000"/>
    </sc>
  </servicegroup>
</template>
"#;

/// An emulated installation with two machines and one package defining a
/// role and a web service interface.
pub fn directory() -> MemoryDirectory {
    MemoryDirectory::new(ROOT)
        .and_then(|d| d.with_machine("m0"))
        .and_then(|d| d.with_machine("m1"))
        .and_then(|d| d.with_package("Orders"))
        .and_then(|d| d.with_package_role("Orders", "OrderAdmin"))
        .and_then(|d| d.with_package_method_set("Orders", "OrderMethods", &[ORDERS_NAMESPACE]))
        .expect("Failed to build memory directory")
}

pub fn connect(directory: MemoryDirectory) -> (Arc<MemoryDirectory>, Arc<DirectorySystem>) {
    let memory = Arc::new(directory);
    let system = DirectorySystem::connect("test", memory.clone(), Properties::new())
        .expect("Failed to connect to memory directory");
    (memory, system)
}

/// The `acme` organization, freshly created.
pub fn organization(system: &DirectorySystem) -> Arc<DirectoryObject> {
    system
        .create_organization("acme", "Acme Corp")
        .expect("Failed to create organization")
}

/// Methods of every recorded request, in order.
pub fn methods(memory: &MemoryDirectory) -> Vec<String> {
    memory
        .calls()
        .expect("Failed to read calls")
        .into_iter()
        .map(|call| call.method)
        .collect()
}

/// A temporary working directory for CLI tests.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// A command for the caas binary running in the fixture directory, with
    /// the environment cleared of caas settings.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("caas");
        cmd.current_dir(self.path())
            .env_remove("CAAS_SYSTEM")
            .env_remove("CAAS_PROPERTIES")
            .env_remove("XDG_CONFIG_HOME")
            .env("HOME", self.path())
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
