//! # caas
//!
//! A scriptable administration client for Cordys application server
//! clusters. The library exposes the cluster's directory as a graph of lazily
//! loaded, identity-cached objects and drives declarative organization
//! templates against it. The `caas` command-line tool is a thin front end.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use caas::config::Properties;
//! use caas::remote::MemoryDirectory;
//! use caas::system::DirectorySystem;
//! use caas::template::{Template, Variables};
//!
//! let directory = Arc::new(
//!     MemoryDirectory::new("cn=cordys,cn=defaultInst,o=example.com")
//!         .unwrap()
//!         .with_machine("node1")
//!         .unwrap(),
//! );
//! let system = DirectorySystem::connect("dev", directory, Properties::new()).unwrap();
//! let acme = system.create_organization("acme", "Acme Corp").unwrap();
//!
//! let template = Template::parse(
//!     r#"<template><role name="Approver" desc="Approves orders for ${org}"/></template>"#,
//! )
//! .unwrap();
//! let report = template.apply(&acme, &Variables::new()).unwrap();
//! assert!(report.is_ok());
//! assert!(acme.roles().unwrap().get_by_name("Approver").unwrap().is_some());
//! ```
//!
//! ## Core Concepts
//!
//! - **Systems (`system`, `registry`)**: a [`system::DirectorySystem`] is one
//!   connection. It owns the object cache, the lazy list registry and the
//!   remote caller. A [`registry::ConnectionRegistry`] keeps one system per
//!   name.
//! - **Objects (`object`, `lazy`, `cache`)**: every directory entry and XML
//!   store object is a [`object::DirectoryObject`], fetched on first access
//!   and shared by identity. Collections are [`lazy::LazyList`]s that fill on
//!   first read and are cleared by dependency-tracked invalidation.
//! - **Transport (`remote`, `xml`, `dn`)**: SOAP requests built as
//!   [`xml::XmlNode`] trees and sent through a [`remote::RemoteCaller`]. The
//!   HTTP caller talks to a real gateway; [`remote::MemoryDirectory`] is a
//!   deterministic in-process directory.
//! - **Templates (`template`)**: export, apply, check and purge of an
//!   organization's declarative description.
//! - **Packages (`package`)**: upload, load and unload of ISVP/CAP files.
//! - **Configuration (`config`, `defaults`)**: named `.properties` files per
//!   system.

pub mod cache;
pub mod config;
pub mod defaults;
pub mod dn;
pub mod error;
pub mod lazy;
pub mod object;
pub mod output;
pub mod package;
pub mod registry;
pub mod remote;
pub mod suggestions;
pub mod system;
pub mod template;
pub mod xml;
