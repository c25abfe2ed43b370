use super::*;

fn v3_doc() -> Value {
    json!({
        "version": 3,
        "name": "AppX",
        "description": "demo",
        "owner": "ab".repeat(32),
        "repotag": "fleetapps/appx:latest",
        "ports": ["31000"],
        "containerPorts": [80],
        "domains": [""],
        "enviromentParameters": "[\"A=1\"]",
        "commands": [],
        "containerData": "/data",
        "cpu": 1,
        "ram": "1000",
        "hdd": 10,
        "tiered": false,
        "instances": 3,
    })
}

#[test]
fn coerces_strings_and_json_lists() {
    let spec = format(v3_doc()).unwrap();
    let c = &spec.components()[0];
    assert_eq!(c.ports, vec![31000]);
    assert_eq!(c.environment, vec!["A=1".to_string()]);
    assert_eq!(c.hardware.flat, Resources::new(1.0, 1000.0, 10.0));
    assert_eq!(spec.instances(), 3);
    assert!(!spec.is_composed());
}

#[test]
fn v1_uses_single_port_fields() {
    let doc = json!({
        "version": 1, "name": "old", "owner": "aa", "repotag": "a/b:c",
        "port": 31001, "containerPort": 8080,
        "cpu": 0.5, "ram": 500, "hdd": 5,
    });
    let spec = format(doc).unwrap();
    assert_eq!(spec.components()[0].ports, vec![31001]);
    assert_eq!(spec.instances(), DEFAULT_INSTANCES);
    let back = to_value(&spec);
    assert_eq!(back["port"], json!(31001));
    assert!(back.get("ports").is_none());
}

#[test]
fn tiered_requires_every_tier_field() {
    let mut doc = v3_doc();
    doc["tiered"] = json!(true);
    let err = format(doc.clone()).unwrap_err();
    assert_eq!(err.field, "cpubasic");

    for tier in Tier::ALL {
        doc[format!("cpu{}", tier.suffix())] = json!(2);
        doc[format!("ram{}", tier.suffix())] = json!(2000);
        doc[format!("hdd{}", tier.suffix())] = json!(20);
    }
    doc["cpubamf"] = json!(4);
    let spec = format(doc).unwrap();
    assert_eq!(spec.total_requirements(Tier::Stratus).cpu, 4.0);
    assert_eq!(spec.total_requirements(Tier::Cumulus).cpu, 2.0);
}

#[test]
fn composed_errors_carry_component_path() {
    let doc = json!({
        "version": 4, "name": "shop", "owner": "aa", "instances": 3,
        "compose": [
            {"name": "db", "repotag": "a/db:1", "ports": [31000], "containerPorts": [5432], "domains": [""],
             "cpu": 1, "ram": 1000, "hdd": 10},
            {"name": "api", "repotag": "a/api:1", "ports": [31001], "containerPorts": [80], "domains": [""],
             "cpu": "lots", "ram": 1000, "hdd": 10},
        ],
    });
    let err = format(doc).unwrap_err();
    assert_eq!(err.field, "compose[1].cpu");
}

#[test]
fn rejects_unknown_versions_and_empty_compose() {
    assert_eq!(format(json!({"version": 9})).unwrap_err().field, "version");
    let doc = json!({"version": 4, "name": "x", "owner": "aa", "instances": 3, "compose": []});
    assert_eq!(format(doc).unwrap_err().field, "compose");
}

#[test]
fn canonical_json_is_stable_across_input_shapes() {
    let a = format(v3_doc()).unwrap();
    let mut doc = v3_doc();
    doc["ram"] = json!(1000);
    doc["ports"] = json!([31000]);
    let b = format(doc).unwrap();
    assert_eq!(a.canonical_json(), b.canonical_json());
    assert_eq!(format(to_value(&a)).unwrap(), a);
}

#[test]
fn serde_goes_through_format() {
    let spec: AppSpec = serde_json::from_value(v3_doc()).unwrap();
    let text = serde_json::to_string(&spec).unwrap();
    let again: AppSpec = serde_json::from_str(&text).unwrap();
    assert_eq!(spec, again);
    assert!(serde_json::from_value::<AppSpec>(json!({"version": 3})).is_err());
}
