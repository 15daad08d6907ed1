//! Walking a resolved template against an organization.
//!
//! Elements are visited in document order (reverse order for purge). A
//! failure in one element is logged and recorded in its objective; the walk
//! continues with the next element. Every update is preceded by an
//! attribute-level diff, so an organization that already matches receives no
//! update at all.

use std::sync::Arc;

use crate::dn::Dn;
use crate::error::{Error, Result};
use crate::lazy::{same_members, LazyList};
use crate::object::{fields, namespaces_of, DirectoryObject, Entry, Field, ObjectKind};
use crate::system::DirectorySystem;
use crate::template::model::{
    DsoSpec, Element, PackageSpec, Reference, RoleSpec, ServiceContainerSpec, ServiceGroupSpec,
    UserSpec, XmlStoreOperation, XmlStoreSpec,
};
use crate::template::objective::{Mode, Objective};
use crate::xml::{diff_lines, XmlNode};

const SYSTEM_USER: &str = "SYSTEM";

pub(crate) struct Reconciler<'a> {
    system: Arc<DirectorySystem>,
    organization: &'a DirectoryObject,
    mode: Mode,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(organization: &'a DirectoryObject, mode: Mode) -> Result<Self> {
        organization.ensure_kind(&[ObjectKind::Organization], &mode.to_string())?;
        Ok(Self {
            system: organization.system()?,
            organization,
            mode,
        })
    }

    pub(crate) fn run(&self, document: &XmlNode) -> Objective {
        let mut report = Objective::new(format!("organization {}", self.organization.name()));
        let mut nodes: Vec<&XmlNode> = document.elements().collect();
        if self.mode == Mode::Purge {
            nodes.reverse();
        }
        log::info!(
            "Running {} of {} template elements on organization {} ...",
            self.mode,
            nodes.len(),
            self.organization.name()
        );
        for node in nodes {
            let objective = match Element::from_xml(node) {
                Ok(element) => self.element(&element),
                Err(e) => {
                    log::error!("Skipping invalid <{}>: {}", node.local_name(), e);
                    Objective::failed(format!("<{}>", node.local_name()), e.to_string())
                }
            };
            report.push(objective);
        }
        log::info!(
            "Running {} on organization {} ... {} ({} differences, {} errors)",
            self.mode,
            self.organization.name(),
            report.status(),
            report.differences(),
            report.errors()
        );
        report
    }

    fn element(&self, element: &Element) -> Objective {
        let label = element.label();
        let mut objective = Objective::new(label.clone());
        log::debug!("{} {} ...", self.mode, label);
        let result = match (self.mode, element) {
            (_, Element::Unknown(tag)) => {
                log::warn!("Unknown template element <{}>, skipping", tag);
                objective.note("unknown element, skipped");
                Ok(())
            }
            (Mode::Purge, element) => self.purge(element, &mut objective),
            (_, Element::Package(spec)) => self.package(spec, &mut objective),
            (_, Element::Dso(spec)) => self.dso(spec, &mut objective),
            (_, Element::XmlStore(spec)) => self.xml_store(spec, &mut objective),
            (_, Element::Role(spec)) => self.role(spec, &mut objective),
            (_, Element::User(spec)) => self.user(spec, &mut objective),
            (_, Element::ServiceGroup(spec)) => self.service_group(spec, &mut objective),
        };
        if let Err(e) = result {
            log::error!("{} {} ... FAILED: {}", self.mode, label, e);
            objective.fail(e.to_string());
        }
        objective
    }

    /// Record a difference. Returns `true` when it should be fixed now.
    fn drift(&self, objective: &mut Objective, message: String) -> bool {
        if self.mode == Mode::Configure {
            log::info!("{}, fixing", message);
            objective.note(format!("fixed: {}", message));
            true
        } else {
            log::warn!("{}", message);
            objective.needs(message);
            false
        }
    }

    /// Bring `target`'s entry in line with `edit`, updating only if needed.
    fn converge<F>(&self, objective: &mut Objective, target: &DirectoryObject, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Entry) -> Result<()>,
    {
        let current = target.entry()?;
        let mut desired = current.clone();
        edit(&mut desired)?;
        let changed = changed_attributes(&current, &desired);
        if changed.is_empty() {
            return Ok(());
        }
        if self.mode == Mode::Check {
            for attribute in changed.iter().filter(|name| name.ends_with("configuration")) {
                for line in configuration_diff(&current, &desired, attribute) {
                    log::warn!("  {}", line);
                    objective.note(line);
                }
            }
        }
        let message = format!(
            "{} {} differs in {}",
            target.kind(),
            target.name(),
            changed.join(", ")
        );
        if self.drift(objective, message) {
            target.update_ldap(&current, &desired)?;
        }
        Ok(())
    }

    fn package(&self, spec: &PackageSpec, objective: &mut Objective) -> Result<()> {
        if self.system.package(&spec.name)?.is_some() {
            objective.note("loaded");
            return Ok(());
        }
        let message = format!("package {} is not loaded; it must be loaded manually", spec.name);
        log::warn!("{}", message);
        objective.needs(message);
        Ok(())
    }

    fn dso(&self, spec: &DsoSpec, objective: &mut Objective) -> Result<()> {
        let organization = self.organization;
        let dso_type = match organization.dso_types()?.get_by_name(&spec.dso_type)? {
            Some(dso_type) => dso_type,
            None => {
                if !self.drift(objective, format!("dso type {} is missing", spec.dso_type)) {
                    self.drift(objective, format!("dso {} is missing", spec.name));
                    return Ok(());
                }
                organization.create_dso_type(&spec.dso_type)?
            }
        };
        match dso_type.dsos()?.get_by_name(&spec.name)? {
            Some(dso) => self.converge(objective, &dso, |entry| {
                set_text(entry, fields::DESCRIPTION, &spec.description)?;
                if let Some(configuration) = &spec.configuration {
                    fields::DSO_CONFIGURATION.write(entry, configuration)?;
                }
                Ok(())
            }),
            None => {
                if self.drift(objective, format!("dso {} is missing", spec.name)) {
                    dso_type.create_dso(&spec.name, &spec.description, spec.configuration.as_ref())?;
                }
                Ok(())
            }
        }
    }

    fn xml_store(&self, spec: &XmlStoreSpec, objective: &mut Objective) -> Result<()> {
        let object = self.system.xml_store_object(
            self.organization.dn(),
            &spec.key,
            ObjectKind::XmlStoreObject,
        )?;
        let current = object.content()?;
        let desired = match (spec.operation, &current) {
            (XmlStoreOperation::Append, Some(existing)) => append(existing, &spec.content),
            _ => spec.content.clone(),
        };
        let message = match &current {
            Some(current) if *current == desired => return Ok(()),
            Some(current) => {
                if self.mode == Mode::Check {
                    for line in diff_lines(&desired, current) {
                        log::warn!("  {}", line);
                        objective.note(line);
                    }
                }
                format!("content of {} differs", spec.key)
            }
            None => format!("xml store object {} is missing", spec.key),
        };
        if self.drift(objective, message) {
            object.write_content(&desired, &spec.version)?;
        }
        Ok(())
    }

    fn role(&self, spec: &RoleSpec, objective: &mut Objective) -> Result<()> {
        let organization = self.organization;
        let role = match organization.roles()?.get_by_name(&spec.name)? {
            Some(role) => {
                self.converge(objective, &role, |entry| {
                    set_text(entry, fields::DESCRIPTION, &spec.description)?;
                    set_text(entry, fields::ROLE_TYPE, &spec.role_type)
                })?;
                role
            }
            None => {
                if !self.drift(objective, format!("role {} is missing", spec.name)) {
                    return Ok(());
                }
                organization.create_role(&spec.name, &spec.description, &spec.role_type)?
            }
        };
        let wanted = self.resolve_all(&spec.roles, ObjectKind::Role)?;
        self.ensure_members(objective, &role, &*role.roles()?, &wanted, "sub-roles")
    }

    fn user(&self, spec: &UserSpec, objective: &mut Objective) -> Result<()> {
        if spec.name.eq_ignore_ascii_case(SYSTEM_USER) {
            log::error!("User {} must not be modified, skipping", spec.name);
            objective.fail(format!("user {} must not be modified", spec.name));
            return Ok(());
        }
        let organization = self.organization;
        let user = match organization.users()?.get_by_name(&spec.name)? {
            Some(user) => {
                self.converge(objective, &user, |entry| {
                    set_text(entry, fields::DESCRIPTION, &spec.description)
                })?;
                user
            }
            None => {
                if !self.drift(objective, format!("user {} is missing", spec.name)) {
                    return Ok(());
                }
                organization.create_user(&spec.name, &spec.description, &spec.os_identity)?
            }
        };
        let wanted = self.resolve_all(&spec.roles, ObjectKind::Role)?;
        self.ensure_members(objective, &user, &*user.roles()?, &wanted, "roles")?;
        for team in &spec.teams {
            self.team_assignment(objective, &user, team)?;
        }
        Ok(())
    }

    fn team_assignment(
        &self,
        objective: &mut Objective,
        user: &DirectoryObject,
        team_name: &str,
    ) -> Result<()> {
        let team = match self.organization.teams()?.get_by_name(team_name)? {
            Some(team) => team,
            None => {
                if !self.drift(objective, format!("team {} is missing", team_name)) {
                    return Ok(());
                }
                self.organization.create_team(team_name, "")?
            }
        };
        if team.assignments()?.get_by_name(user.name())?.is_none()
            && self.drift(
                objective,
                format!("user {} is not assigned to team {}", user.name(), team_name),
            )
        {
            team.assign_user(user)?;
        }
        Ok(())
    }

    fn service_group(&self, spec: &ServiceGroupSpec, objective: &mut Objective) -> Result<()> {
        let organization = self.organization;
        let method_sets = self.resolve_all(&spec.method_sets, ObjectKind::WebServiceInterface)?;
        let group = match organization.service_groups()?.get_by_name(&spec.name)? {
            Some(group) => {
                let current = group.method_sets()?.member_dns()?;
                let replace_interfaces =
                    !method_sets.is_empty() && !same_members(&current, &method_sets);
                let interfaces = if replace_interfaces { &method_sets } else { &current };
                // Namespaces follow the interfaces, which can change without the group changing.
                let namespaces = namespaces_of(&self.system, interfaces)?;
                let stored = group.get(fields::NAMESPACES)?.unwrap_or_default();
                let namespaces_differ = !same_set(&stored, &namespaces);
                self.converge(objective, &group, |entry| {
                    set_text(entry, fields::DESCRIPTION, &spec.description)?;
                    if let Some(configuration) = &spec.configuration {
                        fields::SERVICE_GROUP_CONFIGURATION.write(entry, configuration)?;
                    }
                    if replace_interfaces {
                        fields::METHOD_SETS.write(entry, &method_sets)?;
                    }
                    if namespaces_differ {
                        fields::NAMESPACES.write(entry, &namespaces)?;
                    }
                    Ok(())
                })?;
                group
            }
            None => {
                if !self.drift(objective, format!("service group {} is missing", spec.name)) {
                    return Ok(());
                }
                organization.create_service_group(
                    &spec.name,
                    &spec.description,
                    &method_sets,
                    spec.configuration.as_ref(),
                )?
            }
        };
        self.containers(spec, &group, objective)
    }

    fn containers(
        &self,
        spec: &ServiceGroupSpec,
        group: &DirectoryObject,
        objective: &mut Objective,
    ) -> Result<()> {
        if spec.containers.is_empty() {
            return Ok(());
        }
        // Listing order, so placement matches what the server reports.
        let machines: Vec<String> = self
            .system
            .machines()?
            .items()?
            .iter()
            .map(|machine| machine.name().to_string())
            .collect();
        if spec.containers.len() != machines.len() {
            let message = format!(
                "service group {} declares {} service containers but the system has {} machines",
                spec.name,
                spec.containers.len(),
                machines.len()
            );
            log::warn!("{}", message);
            objective.note(message);
        }
        for (position, container) in spec.containers.iter().enumerate() {
            let mut child = Objective::new(format!("service container {}", container.name));
            if let Err(e) = self.container(group, container, position, &machines, &mut child) {
                log::error!("{} service container {} ... FAILED: {}", self.mode, container.name, e);
                child.fail(e.to_string());
            }
            objective.push(child);
        }
        Ok(())
    }

    fn container(
        &self,
        group: &DirectoryObject,
        spec: &ServiceContainerSpec,
        position: usize,
        machines: &[String],
        objective: &mut Objective,
    ) -> Result<()> {
        let machine = resolve_machine(spec, position, machines)?;
        let container = match group.service_containers()?.get_by_name(&spec.name)? {
            Some(container) => {
                self.converge(objective, &container, |entry| {
                    fields::COMPUTER.write(entry, &machine)?;
                    fields::AUTOMATIC_START.write(entry, &spec.automatic_start)?;
                    set_text(entry, fields::DESCRIPTION, &spec.description)?;
                    if let Some(configuration) = &spec.configuration {
                        fields::SERVICE_CONTAINER_CONFIGURATION.write(entry, configuration)?;
                    }
                    Ok(())
                })?;
                container
            }
            None => {
                let message = format!(
                    "service container {} is missing (machine {})",
                    spec.name, machine
                );
                if !self.drift(objective, message) {
                    return Ok(());
                }
                group.create_service_container(
                    &spec.name,
                    &machine,
                    spec.automatic_start,
                    &spec.description,
                    spec.configuration.as_ref(),
                )?
            }
        };
        for point in &spec.connection_points {
            match container.connection_points()?.get_by_name(&point.name)? {
                Some(existing) => self.converge(objective, &existing, |entry| {
                    set_text(entry, fields::CONNECTION_POINT_TYPE, &point.cp_type)?;
                    set_text(entry, fields::CONNECTION_POINT_URI, &point.uri)
                })?,
                None => {
                    if self.drift(objective, format!("connection point {} is missing", point.name)) {
                        container.create_connection_point(&point.name, &point.cp_type, &point.uri)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn purge(&self, element: &Element, objective: &mut Objective) -> Result<()> {
        let organization = self.organization;
        let target = match element {
            Element::Package(spec) => {
                log::info!("Package {} is left in place; unload it explicitly", spec.name);
                objective.note("packages are never purged");
                return Ok(());
            }
            Element::User(spec) if spec.name.eq_ignore_ascii_case(SYSTEM_USER) => {
                log::error!("User {} must not be modified, skipping", spec.name);
                objective.fail(format!("user {} must not be modified", spec.name));
                return Ok(());
            }
            Element::User(spec) => organization.users()?.get_by_name(&spec.name)?,
            Element::Role(spec) => organization.roles()?.get_by_name(&spec.name)?,
            Element::ServiceGroup(spec) => organization.service_groups()?.get_by_name(&spec.name)?,
            Element::Dso(spec) => match organization.dso_types()?.get_by_name(&spec.dso_type)? {
                Some(dso_type) => dso_type.dsos()?.get_by_name(&spec.name)?,
                None => None,
            },
            Element::XmlStore(spec) => {
                let object = self.system.xml_store_object(
                    organization.dn(),
                    &spec.key,
                    ObjectKind::XmlStoreObject,
                )?;
                object.content()?.map(|_| object)
            }
            Element::Unknown(_) => None,
        };
        match target {
            Some(target) => {
                target.delete()?;
                objective.note("deleted");
            }
            None => objective.note("not present"),
        }
        Ok(())
    }

    /// Add the members of `wanted` that `list` lacks, in one update.
    fn ensure_members(
        &self,
        objective: &mut Objective,
        owner: &DirectoryObject,
        list: &LazyList,
        wanted: &[Dn],
        what: &str,
    ) -> Result<()> {
        let current = list.member_dns()?;
        let missing: Vec<Dn> = wanted
            .iter()
            .filter(|dn| !current.contains(dn))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = missing.iter().map(Dn::name).collect();
        let message = format!(
            "{} {} lacks {} {}",
            owner.kind(),
            owner.name(),
            what,
            names.join(", ")
        );
        if self.drift(objective, message) {
            list.add_dns(&missing)?;
        }
        Ok(())
    }

    fn resolve_all(&self, references: &[Reference], kind: ObjectKind) -> Result<Vec<Dn>> {
        references
            .iter()
            .map(|reference| self.resolve(reference, kind))
            .collect()
    }

    /// DN of a role or interface reference.
    ///
    /// Unresolvable references fall back to the DN the object would have,
    /// so the relation is recorded even while it dangles.
    fn resolve(&self, reference: &Reference, kind: ObjectKind) -> Result<Dn> {
        let found = match &reference.package {
            Some(package) => match self.system.package(package)? {
                Some(package) => listing(&package, kind)?.get_by_name(&reference.name)?,
                None => None,
            },
            None => listing(self.organization, kind)?.get_by_name(&reference.name)?,
        };
        if let Some(found) = found {
            return Ok(found.dn().clone());
        }
        let base = match &reference.package {
            Some(package) => self.system.root().child("cn", package),
            None => self.organization.dn().clone(),
        };
        let dn = match (kind, &reference.package) {
            (ObjectKind::Role, Some(_)) => base.child("cn", &reference.name),
            _ => base
                .child("cn", kind.container().unwrap_or_default())
                .child("cn", &reference.name),
        };
        log::debug!(
            "Cannot resolve {} {}, attaching it as {}",
            kind,
            reference.name,
            dn
        );
        Ok(dn)
    }
}

fn listing(owner: &DirectoryObject, kind: ObjectKind) -> Result<Arc<LazyList>> {
    match kind {
        ObjectKind::WebServiceInterface => owner.method_sets(),
        _ => owner.roles(),
    }
}

/// Pick the machine for the container at `position`: an explicit name, then
/// an explicit index, then round-robin over `machines`.
fn resolve_machine(
    spec: &ServiceContainerSpec,
    position: usize,
    machines: &[String],
) -> Result<String> {
    if let Some(name) = &spec.machine {
        if let Some(known) = machines.iter().find(|m| m.eq_ignore_ascii_case(name)) {
            return Ok(known.clone());
        }
        log::warn!("Machine {} is not known to the system, using it as given", name);
        return Ok(name.clone());
    }
    if let Some(index) = spec.machine_index {
        return machines.get(index).cloned().ok_or_else(|| Error::Template {
            message: format!(
                "machine-index {} of service container {} is out of range ({} machines)",
                index,
                spec.name,
                machines.len()
            ),
            variable: None,
        });
    }
    if machines.is_empty() {
        return Err(Error::precondition(
            "assign machine",
            format!("no machines available for service container {}", spec.name),
        ));
    }
    Ok(machines[position % machines.len()].clone())
}

fn set_text(entry: &mut Entry, field: Field<String>, value: &str) -> Result<()> {
    if value.is_empty() {
        entry.remove(field.name());
        Ok(())
    } else {
        field.write(entry, &value.to_string())
    }
}

fn same_set(left: &[String], right: &[String]) -> bool {
    left.iter().all(|value| right.contains(value)) && right.iter().all(|value| left.contains(value))
}

/// Existing content plus the top-level children of `addition` it lacks.
fn append(existing: &XmlNode, addition: &XmlNode) -> XmlNode {
    let mut merged = existing.clone();
    for child in addition.elements() {
        if !existing.elements().any(|present| present == child) {
            merged.push(child.clone());
        }
    }
    merged
}

fn changed_attributes(current: &Entry, desired: &Entry) -> Vec<String> {
    let mut names: Vec<&String> = current
        .attributes()
        .keys()
        .chain(desired.attributes().keys())
        .collect();
    names.sort();
    names.dedup();
    names
        .into_iter()
        .filter(|name| current.attributes().get(*name) != desired.attributes().get(*name))
        .cloned()
        .collect()
}

/// Line diff of an XML-valued attribute; `-` lines are wanted, `+` lines
/// are what the directory holds.
fn configuration_diff(current: &Entry, desired: &Entry, attribute: &str) -> Vec<String> {
    let parse = |entry: &Entry| {
        entry
            .value(attribute)
            .and_then(|text| XmlNode::parse(text).ok())
            .unwrap_or_else(|| XmlNode::new(attribute))
    };
    diff_lines(&parse(desired), &parse(current))
}
