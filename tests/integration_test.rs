//! Integration tests for the directory client and the template engine.
//!
//! Everything runs against `MemoryDirectory`, which records every request,
//! so the tests can assert both on the resulting directory state and on
//! exactly which remote operations were issued.

mod common;

use std::sync::Arc;

use serial_test::serial;

use caas::config::Properties;
use caas::dn::Dn;
use caas::error::Error;
use caas::object::DirectoryObject;
use caas::system::DirectorySystem;
use caas::template::{ExportOptions, Status, Template, Variables};

use common::*;

fn dn(relative: &str) -> String {
    format!("{},{}", relative, ROOT)
}

fn values(memory: &caas::remote::MemoryDirectory, entry_dn: &str, attribute: &str) -> Vec<String> {
    memory
        .entry(entry_dn)
        .unwrap()
        .unwrap_or_else(|| panic!("no entry {}", entry_dn))
        .values(attribute)
        .to_vec()
}

#[test]
fn test_objects_are_cached_by_identity() {
    let (_memory, system) = connect(directory());
    let acme = organization(&system);

    let by_dn = system.get_ldap_str(&dn("o=acme")).unwrap();
    let by_other_case = system.get_ldap_str(&dn("O=ACME")).unwrap();
    let by_name = system.organization("acme").unwrap();
    assert!(Arc::ptr_eq(&acme, &by_dn));
    assert!(Arc::ptr_eq(&by_dn, &by_other_case));
    assert!(Arc::ptr_eq(&by_dn, &by_name));

    let from_list = acme
        .roles()
        .unwrap()
        .get_by_name("everyoneInacme")
        .unwrap()
        .unwrap();
    let from_dn = system.get_ldap(from_list.dn()).unwrap();
    assert!(Arc::ptr_eq(&from_list, &from_dn));
}

#[test]
fn test_create_invalidates_dependent_lists() {
    let (_memory, system) = connect(directory());
    let acme = organization(&system);

    let roles = acme.roles().unwrap();
    let before = roles.size().unwrap();
    acme.create_role("Approver", "Approves orders", "").unwrap();

    assert_eq!(roles.size().unwrap(), before + 1);
    assert!(roles.get_by_name("Approver").unwrap().is_some());
    assert!(Arc::ptr_eq(&roles, &acme.roles().unwrap()));
}

#[test]
fn test_apply_creates_every_element() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);

    let template = Template::parse(FULL_TEMPLATE).unwrap();
    let report = template.apply(&acme, &Variables::new()).unwrap();
    assert_eq!(report.errors(), 0, "{:#?}", report);
    assert_eq!(report.status(), Status::Ok);

    let dso = dn("cn=orders-db,cn=Relational,cn=data sources,o=acme");
    assert_eq!(values(&memory, &dso, "description"), vec!["Orders database of acme"]);
    assert!(values(&memory, &dso, "busdatasourceconfiguration")[0].contains("jdbc:db://db1/acme"));

    let content = memory
        .xml_object(&dn("o=acme"), "/Cordys/WCP/Orders.xml")
        .unwrap()
        .unwrap();
    assert_eq!(content.path("limit").unwrap().text(), "$500");

    let approver = dn("cn=Approver,cn=organizational roles,o=acme");
    let sub_roles = values(&memory, &approver, "role");
    assert!(sub_roles.contains(&dn("cn=Reviewer,cn=organizational roles,o=acme")));
    assert!(sub_roles.contains(&dn("cn=OrderAdmin,cn=Orders")));

    let user = dn("cn=jdoe,cn=organizational users,o=acme");
    let roles = values(&memory, &user, "role");
    assert!(roles.contains(&dn("cn=everyoneInacme,cn=organizational roles,o=acme")));
    assert!(roles.contains(&approver));
    assert!(memory.entry(&dn("cn=jane,cn=authenticated users")).unwrap().is_none());
    assert_eq!(
        values(&memory, &dn("cn=jdoe,cn=authenticated users"), "osidentity"),
        vec!["jane"]
    );
    assert!(memory
        .entry(&dn("cn=jdoe,cn=Sales,cn=teams,o=acme"))
        .unwrap()
        .is_some());

    let group = dn("cn=OrderService,cn=soap nodes,o=acme");
    assert_eq!(values(&memory, &group, "labeleduri"), vec![ORDERS_NAMESPACE]);
    assert_eq!(
        values(&memory, &group, "busmethodsets"),
        vec![dn("cn=OrderMethods,cn=method sets,cn=Orders")]
    );
    let container = dn("cn=OrderService-1,cn=OrderService,cn=soap nodes,o=acme");
    assert_eq!(values(&memory, &container, "computer"), vec!["m0"]);
    assert_eq!(values(&memory, &container, "automaticstart"), vec!["true"]);
    let point = dn("cn=socket,cn=OrderService-1,cn=OrderService,cn=soap nodes,o=acme");
    assert_eq!(values(&memory, &point, "labeleduri"), vec!["socket://node:4000"]);
}

#[test]
fn test_second_apply_sends_no_updates() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let template = Template::parse(FULL_TEMPLATE).unwrap();
    template.apply(&acme, &Variables::new()).unwrap();

    memory.reset_calls().unwrap();
    let report = template.apply(&acme, &Variables::new()).unwrap();

    assert!(report.is_ok(), "{:#?}", report);
    assert_eq!(memory.count("Update").unwrap(), 0);
    assert_eq!(memory.count("UpdateXMLObject").unwrap(), 0);
    assert_eq!(memory.mutation_count().unwrap(), 0, "{:?}", methods(&memory));
}

#[test]
fn test_dangling_references_are_attached_once() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let template = Template::parse(
        r#"<template>
             <role name="Approver">
               <role name="Ghost"/>
               <role name="Phantom" package="Missing"/>
             </role>
           </template>"#,
    )
    .unwrap();
    template.apply(&acme, &Variables::new()).unwrap();

    let sub_roles = values(
        &memory,
        &dn("cn=Approver,cn=organizational roles,o=acme"),
        "role",
    );
    assert!(sub_roles.contains(&dn("cn=Ghost,cn=organizational roles,o=acme")));
    assert!(sub_roles.contains(&dn("cn=Phantom,cn=Missing")));

    memory.reset_calls().unwrap();
    template.apply(&acme, &Variables::new()).unwrap();
    assert_eq!(memory.mutation_count().unwrap(), 0);
}

#[test]
fn test_check_of_exported_template_reports_no_differences() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    Template::parse(FULL_TEMPLATE)
        .unwrap()
        .apply(&acme, &Variables::new())
        .unwrap();

    let exported = Template::export(&acme, &ExportOptions::default()).unwrap();
    let text = exported.to_xml_string().unwrap();
    assert!(text.contains("${dollar}500"), "{}", text);
    assert!(!text.contains("everyoneInacme"), "{}", text);

    memory.reset_calls().unwrap();
    let report = exported.check(&acme, &Variables::new()).unwrap();
    assert_eq!(report.differences(), 0, "{:#?}", report);
    assert!(report.is_ok(), "{:#?}", report);
    assert_eq!(memory.mutation_count().unwrap(), 0);
}

#[test]
fn test_check_reports_differences_without_changing_anything() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let template = Template::parse(FULL_TEMPLATE).unwrap();

    memory.reset_calls().unwrap();
    let report = template.check(&acme, &Variables::new()).unwrap();
    assert_eq!(report.status(), Status::NeedsConfigure);
    assert!(report.differences() >= 5);
    assert_eq!(memory.mutation_count().unwrap(), 0);
}

#[test]
fn test_check_shows_configuration_diff() {
    let (_memory, system) = connect(directory());
    let acme = organization(&system);
    Template::parse(FULL_TEMPLATE)
        .unwrap()
        .apply(&acme, &Variables::new())
        .unwrap();

    let changed = FULL_TEMPLATE.replace("<startup>fast</startup>", "<startup>slow</startup>");
    let report = Template::parse(&changed)
        .unwrap()
        .check(&acme, &Variables::new())
        .unwrap();
    assert_eq!(report.differences(), 1, "{:#?}", report);

    fn all_messages(objective: &caas::template::Objective, out: &mut Vec<String>) {
        out.extend(objective.messages().iter().cloned());
        for child in objective.children() {
            all_messages(child, out);
        }
    }
    let mut messages = Vec::new();
    all_messages(&report, &mut messages);
    assert!(messages.iter().any(|m| m.starts_with("- ") && m.contains("slow")), "{:?}", messages);
    assert!(messages.iter().any(|m| m.starts_with("+ ") && m.contains("fast")), "{:?}", messages);
}

#[test]
fn test_exported_template_applies_to_another_organization() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    Template::parse(FULL_TEMPLATE)
        .unwrap()
        .apply(&acme, &Variables::new())
        .unwrap();

    let options = ExportOptions {
        variables: [("org", "acme")].into_iter().collect(),
        ..ExportOptions::default()
    };
    let exported = Template::export(&acme, &options).unwrap();
    assert!(exported
        .to_xml_string()
        .unwrap()
        .contains("jdbc:db://db1/${org}"));

    let globex = system.create_organization("globex", "").unwrap();
    let report = exported.apply(&globex, &Variables::new()).unwrap();
    assert_eq!(report.errors(), 0, "{:#?}", report);
    let dso = dn("cn=orders-db,cn=Relational,cn=data sources,o=globex");
    assert!(values(&memory, &dso, "busdatasourceconfiguration")[0].contains("jdbc:db://db1/globex"));
}

#[test]
fn test_deleting_a_package_entry_is_refused() {
    let (memory, system) = connect(directory());
    let package = system.package("Orders").unwrap().unwrap();

    memory.reset_calls().unwrap();
    let error = package.delete().unwrap_err();
    assert!(matches!(error, Error::Precondition { .. }), "{:?}", error);
    assert_eq!(memory.mutation_count().unwrap(), 0);
    assert!(system.package("Orders").unwrap().is_some());
}

#[test]
fn test_dso_is_created_then_updated() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let dso_template = |server: &str| {
        Template::parse(&format!(
            r#"<template>
                 <dso name="orders-db" type="Relational">
                   <configuration><connection server="{}"/></configuration>
                 </dso>
               </template>"#,
            server
        ))
        .unwrap()
    };
    let dso = dn("cn=orders-db,cn=Relational,cn=data sources,o=acme");

    dso_template("db1").apply(&acme, &Variables::new()).unwrap();
    assert!(values(&memory, &dso, "busdatasourceconfiguration")[0].contains("db1"));

    memory.reset_calls().unwrap();
    dso_template("db2").apply(&acme, &Variables::new()).unwrap();
    assert!(values(&memory, &dso, "busdatasourceconfiguration")[0].contains("db2"));
    assert_eq!(memory.count("Update").unwrap(), 1);
    let update = memory
        .calls()
        .unwrap()
        .into_iter()
        .find(|call| call.method == "Update")
        .unwrap();
    let tuple = update.request.child("tuple").unwrap();
    assert!(tuple.child("old").is_some() && tuple.child("new").is_some());
}

#[test]
#[serial]
fn test_system_user_is_never_modified() {
    testing_logger::setup();
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let template =
        Template::parse(r#"<template><user name="SYSTEM" desc="hijacked"/></template>"#).unwrap();

    memory.reset_calls().unwrap();
    let report = template.apply(&acme, &Variables::new()).unwrap();

    assert_eq!(memory.mutation_count().unwrap(), 0);
    assert_eq!(report.errors(), 1);
    testing_logger::validate(|logs| {
        assert!(logs
            .iter()
            .any(|log| log.level == log::Level::Error && log.body.contains("SYSTEM")));
    });
}

#[test]
#[serial]
fn test_containers_are_spread_round_robin_over_machines() {
    testing_logger::setup();
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let template = Template::parse(
        r#"<template>
             <servicegroup name="Workers">
               <sc name="w1"/>
               <sc name="w2"/>
               <sc name="w3"/>
             </servicegroup>
           </template>"#,
    )
    .unwrap();

    let report = template.apply(&acme, &Variables::new()).unwrap();
    assert!(report.is_ok(), "{:#?}", report);

    let machines: Vec<String> = ["w1", "w2", "w3"]
        .iter()
        .map(|name| {
            values(
                &memory,
                &dn(&format!("cn={},cn=Workers,cn=soap nodes,o=acme", name)),
                "computer",
            )
            .remove(0)
        })
        .collect();
    assert_eq!(machines, vec!["m0", "m1", "m0"]);

    testing_logger::validate(|logs| {
        assert!(logs.iter().any(|log| log.level == log::Level::Warn
            && log.body.contains("3 service containers")
            && log.body.contains("2 machines")));
    });
}

#[test]
fn test_explicit_machine_index_wins_over_round_robin() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    Template::parse(
        r#"<template>
             <servicegroup name="Workers">
               <sc name="w1" machine-index="1"/>
               <sc name="w2" machine="m1"/>
             </servicegroup>
           </template>"#,
    )
    .unwrap()
    .apply(&acme, &Variables::new())
    .unwrap();

    for name in ["w1", "w2"] {
        let container = dn(&format!("cn={},cn=Workers,cn=soap nodes,o=acme", name));
        assert_eq!(values(&memory, &container, "computer"), vec!["m1"]);
    }
}

#[test]
fn test_one_failing_element_does_not_stop_the_run() {
    let (_memory, system) = connect(directory());
    let acme = organization(&system);
    let report = Template::parse(
        r#"<template>
             <servicegroup name="Workers"><sc name="w1" machine-index="7"/></servicegroup>
             <role/>
             <frobnicator/>
             <role name="Approver"/>
           </template>"#,
    )
    .unwrap()
    .apply(&acme, &Variables::new())
    .unwrap();

    assert_eq!(report.status(), Status::Error);
    assert_eq!(report.errors(), 2, "{:#?}", report);
    assert!(acme.roles().unwrap().get_by_name("Approver").unwrap().is_some());
}

#[test]
fn test_unbound_variable_fails_before_any_change() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    memory.reset_calls().unwrap();

    let error = Template::parse(r#"<template><role name="${team}-lead"/></template>"#)
        .unwrap()
        .apply(&acme, &Variables::new())
        .unwrap_err();
    match error {
        Error::Template { variable, .. } => assert_eq!(variable.as_deref(), Some("team")),
        other => panic!("expected template error, got {:?}", other),
    }
    assert_eq!(memory.mutation_count().unwrap(), 0);
}

#[test]
fn test_purge_removes_what_the_template_names() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let template = Template::parse(FULL_TEMPLATE).unwrap();
    template.apply(&acme, &Variables::new()).unwrap();

    let report = template.purge(&acme, &Variables::new()).unwrap();
    assert_eq!(report.errors(), 0, "{:#?}", report);

    for gone in [
        "cn=OrderService,cn=soap nodes,o=acme",
        "cn=jdoe,cn=organizational users,o=acme",
        "cn=Approver,cn=organizational roles,o=acme",
        "cn=Reviewer,cn=organizational roles,o=acme",
        "cn=orders-db,cn=Relational,cn=data sources,o=acme",
    ] {
        assert!(memory.entry(&dn(gone)).unwrap().is_none(), "{} survived", gone);
    }
    assert!(memory
        .xml_object(&dn("o=acme"), "/Cordys/WCP/Orders.xml")
        .unwrap()
        .is_none());
    assert!(system.package("Orders").unwrap().is_some());
    assert!(acme.users().unwrap().is_empty().unwrap());

    let again = template.purge(&acme, &Variables::new()).unwrap();
    assert!(again.is_ok(), "{:#?}", again);
}

fn applied() -> (Arc<caas::remote::MemoryDirectory>, Arc<DirectorySystem>, Arc<DirectoryObject>) {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let report = Template::parse(FULL_TEMPLATE)
        .unwrap()
        .apply(&acme, &Variables::new())
        .unwrap();
    assert_eq!(report.errors(), 0, "{:#?}", report);
    (memory, system, acme)
}

fn order_container(acme: &DirectoryObject) -> Arc<DirectoryObject> {
    acme.service_groups()
        .unwrap()
        .get_by_name("OrderService")
        .unwrap()
        .unwrap()
        .service_containers()
        .unwrap()
        .get_by_name("OrderService-1")
        .unwrap()
        .unwrap()
}

/// Index of the first request named `method`.
fn position(memory: &caas::remote::MemoryDirectory, method: &str) -> usize {
    methods(memory)
        .iter()
        .position(|called| called == method)
        .unwrap_or_else(|| panic!("no {} request", method))
}

#[test]
fn test_deleted_role_disappears_from_reference_lists() {
    let (_memory, system, acme) = applied();
    let jdoe = acme.users().unwrap().get_by_name("jdoe").unwrap().unwrap();
    let held = jdoe.roles().unwrap();
    let approver = held.get_by_name("Approver").unwrap().unwrap();

    approver.delete().unwrap();

    assert!(held.get_by_name("Approver").unwrap().is_none());
    assert!(!jdoe.roles().unwrap().contains(&approver).unwrap());
    assert!(system.seek_ldap(approver.dn()).unwrap().is_none());
    assert!(acme.roles().unwrap().get_by_name("Approver").unwrap().is_none());
}

#[test]
fn test_namespaces_follow_interface_changes() {
    let (memory, _system, _acme) = applied();
    let group = dn("cn=OrderService,cn=soap nodes,o=acme");
    let second = "http://schemas.acme.com/orders/2.0";
    let mut interface = memory
        .entry(&dn("cn=OrderMethods,cn=method sets,cn=Orders"))
        .unwrap()
        .unwrap();
    interface.set(
        "labeleduri",
        vec![ORDERS_NAMESPACE.to_string(), second.to_string()],
    );
    memory.insert_entry(interface).unwrap();

    let system = DirectorySystem::connect("test", memory.clone(), Properties::new()).unwrap();
    let acme = system.organization("acme").unwrap();
    let template = Template::parse(FULL_TEMPLATE).unwrap();

    memory.reset_calls().unwrap();
    let report = template.check(&acme, &Variables::new()).unwrap();
    assert_eq!(report.differences(), 1, "{:#?}", report);
    assert_eq!(memory.mutation_count().unwrap(), 0);

    template.apply(&acme, &Variables::new()).unwrap();
    assert_eq!(
        values(&memory, &group, "labeleduri"),
        vec![ORDERS_NAMESPACE.to_string(), second.to_string()]
    );
    assert!(template.check(&acme, &Variables::new()).unwrap().is_ok());
}

#[test]
fn test_deleting_an_organization_stops_its_running_containers() {
    let (memory, _system, acme) = applied();
    let container = order_container(&acme);
    container.start().unwrap();
    assert!(memory.is_running(&container.dn().to_string()).unwrap());

    memory.reset_calls().unwrap();
    acme.delete().unwrap();

    assert!(position(&memory, "Stop") < position(&memory, "Update"));
    assert!(!memory.is_running(&container.dn().to_string()).unwrap());
    assert!(memory.entry(&dn("o=acme")).unwrap().is_none());
}

#[test]
fn test_deleting_a_running_container_stops_it_first() {
    let (memory, _system, acme) = applied();
    let container = order_container(&acme);
    container.start().unwrap();

    memory.reset_calls().unwrap();
    container.delete().unwrap();

    assert_eq!(memory.count("Stop").unwrap(), 1);
    assert!(position(&memory, "Stop") < position(&memory, "Update"));
    assert!(memory.entry(&container.dn().to_string()).unwrap().is_none());
}

#[test]
fn test_stopped_container_is_deleted_without_control_requests() {
    let (memory, _system, acme) = applied();
    let container = order_container(&acme);

    memory.reset_calls().unwrap();
    container.delete().unwrap();

    assert_eq!(memory.count("Stop").unwrap(), 0);
    assert!(memory.entry(&container.dn().to_string()).unwrap().is_none());
}

#[test]
fn test_xml_store_append_keeps_existing_content() {
    let (memory, _system, acme) = applied();
    let append = Template::parse(
        r#"<template>
             <xmlstoreobject key="/Cordys/WCP/Orders.xml" version="organization" operation="append">
               <settings><audit>on</audit></settings>
             </xmlstoreobject>
           </template>"#,
    )
    .unwrap();

    let report = append.apply(&acme, &Variables::new()).unwrap();
    assert_eq!(report.errors(), 0, "{:#?}", report);
    let stored = memory
        .xml_object(&dn("o=acme"), "/Cordys/WCP/Orders.xml")
        .unwrap()
        .unwrap();
    let children: Vec<&str> = stored.elements().map(|child| child.local_name()).collect();
    assert_eq!(children, vec!["limit", "audit"]);

    memory.reset_calls().unwrap();
    append.apply(&acme, &Variables::new()).unwrap();
    assert_eq!(memory.mutation_count().unwrap(), 0);
}

#[test]
fn test_concurrent_lookups_share_one_object() {
    let (memory, system) = connect(directory());
    organization(&system);
    let fresh = DirectorySystem::connect("test", memory.clone(), Properties::new()).unwrap();
    let acme = Dn::parse(&dn("o=acme")).unwrap();

    let found: Vec<Arc<DirectoryObject>> = std::thread::scope(|scope| {
        let lookups: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| fresh.get_ldap(&acme).unwrap()))
            .collect();
        lookups.into_iter().map(|lookup| lookup.join().unwrap()).collect()
    });

    assert!(found.iter().all(|object| Arc::ptr_eq(object, &found[0])));
    assert!(Arc::ptr_eq(&found[0], &fresh.get_ldap(&acme).unwrap()));
}

#[test]
fn test_check_reports_dso_and_missing_type() {
    let (memory, system) = connect(directory());
    let acme = organization(&system);
    let template = Template::parse(
        r#"<template><dso name="orders-db" type="Relational"/></template>"#,
    )
    .unwrap();

    memory.reset_calls().unwrap();
    let report = template.check(&acme, &Variables::new()).unwrap();
    assert_eq!(report.differences(), 2, "{:#?}", report);
    assert_eq!(memory.mutation_count().unwrap(), 0);
}
