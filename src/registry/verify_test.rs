use super::*;
use crate::config::VersionGate;
use crate::support::fixtures::{self, edit_components, meta_mut};

fn ports() -> Ports {
    Ports::default()
}

fn check(spec: &AppSpec) -> Result<(), ValidationError> {
    verify(spec, 1_000, &Apps::default(), &ports())
}

fn field_of(spec: &AppSpec) -> String {
    check(spec).unwrap_err().field
}

#[test]
fn reference_specs_pass() {
    check(&fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0)).unwrap();
    check(&fixtures::composed_spec("shop", &["db", "api", "web"])).unwrap();
}

#[test]
fn names_are_alphanumeric_bounded_and_unreserved() {
    assert_eq!(field_of(&fixtures::flat_spec("my-app", 1.0, 1000.0, 10.0)), "name");
    assert_eq!(field_of(&fixtures::flat_spec(&"a".repeat(33), 1.0, 1000.0, 10.0)), "name");
    assert_eq!(field_of(&fixtures::flat_spec("FleetShop", 1.0, 1000.0, 10.0)), "name");
}

#[test]
fn owner_must_be_a_hex_key() {
    let mut spec = fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0);
    fixtures::set_owner(&mut spec, "not-a-key");
    assert_eq!(field_of(&spec), "owner");
}

#[test]
fn instances_are_bounded() {
    let mut spec = fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0);
    fixtures::set_instances(&mut spec, 2);
    assert_eq!(field_of(&spec), "instances");
    fixtures::set_instances(&mut spec, 101);
    assert_eq!(field_of(&spec), "instances");
    fixtures::set_instances(&mut spec, 100);
    check(&spec).unwrap();
}

#[test]
fn ports_stay_in_range_and_unique() {
    let mut spec = fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0);
    edit_components(&mut spec, |c| c.ports = vec![30_999]);
    assert_eq!(field_of(&spec), "ports");

    let mut spec = fixtures::composed_spec("shop", &["db", "api"]);
    edit_components(&mut spec, |c| c.ports = vec![31_000]);
    assert_eq!(field_of(&spec), "compose[1].ports");
}

#[test]
fn version_one_exposes_a_single_port() {
    let mut spec = fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0);
    meta_mut(&mut spec).version = 1;
    meta_mut(&mut spec).instances = 3;
    check(&spec).unwrap();
    edit_components(&mut spec, |c| {
        c.ports = vec![31_000, 31_001];
        c.container_ports = vec![80, 81];
    });
    assert_eq!(field_of(&spec), "port");
}

#[test]
fn hardware_steps_are_enforced() {
    assert_eq!(field_of(&fixtures::flat_spec("AppX", 0.15, 1000.0, 10.0)), "cpu");
    assert_eq!(field_of(&fixtures::flat_spec("AppX", 1.0, 150.0, 10.0)), "ram");
    assert_eq!(field_of(&fixtures::flat_spec("AppX", 1.0, 1000.0, 1.5)), "hdd");
    check(&fixtures::flat_spec("AppX", 0.3, 100.0, 1.0)).unwrap();
}

#[test]
fn totals_respect_every_tier_minus_reserve() {
    // cumulus usable cpu is 4 - 1
    assert_eq!(field_of(&fixtures::flat_spec("AppX", 3.1, 1000.0, 10.0)), "cpu");
    check(&fixtures::flat_spec("AppX", 3.0, 6000.0, 160.0)).unwrap();

    let mut spec = fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0);
    fixtures::set_tiered(&mut spec, [(3.0, 6000.0, 160.0), (7.0, 30000.0, 380.0), (15.0, 62000.0, 820.0)]);
    check(&spec).unwrap();
    fixtures::set_tiered(&mut spec, [(3.0, 6000.0, 160.0), (7.0, 30000.0, 380.0), (16.0, 62000.0, 820.0)]);
    let err = check(&spec).unwrap_err();
    assert_eq!(err.field, "cpu");
    assert!(err.reason.contains("stratus"), "{}", err.reason);
}

#[test]
fn composed_limits() {
    let six = fixtures::composed_spec("shop", &["a", "b", "c", "d", "e", "f"]);
    assert_eq!(field_of(&six), "compose");
    let dup = fixtures::composed_spec("shop", &["db", "db"]);
    assert_eq!(field_of(&dup), "compose[1].name");
}

#[test]
fn version_gates_follow_height() {
    let mut apps = Apps::default();
    apps.version_heights = vec![VersionGate { version: 3, height: 2_000 }];
    let spec = fixtures::flat_spec("AppX", 1.0, 1000.0, 10.0);
    assert_eq!(verify(&spec, 1_999, &apps, &ports()).unwrap_err().field, "version");
    verify(&spec, 2_000, &apps, &ports()).unwrap();
}

#[test]
fn geolocation_rules_must_parse() {
    let mut spec = fixtures::composed_spec("shop", &["db"]);
    meta_mut(&mut spec).version = 5;
    meta_mut(&mut spec).geolocation = vec!["acEU".to_string(), "a!cEU_CZ".to_string()];
    check(&spec).unwrap();
    meta_mut(&mut spec).geolocation = vec!["xx".to_string()];
    assert!(check(&spec).is_err());
}
