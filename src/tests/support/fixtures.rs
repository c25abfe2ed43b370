// Specification, message and record builders shared by unit and scenario tests.

use crate::crypto::NodeKey;
use crate::model::hardware::TieredResources;
use crate::model::{
    AppSpec, Component, ComponentRecord, ComposedSpec, FlatSpec, GlobalSpecRecord, Hardware,
    LocalAppRecord, MessageType, NodeInfo, Resources, SpecMessage, SpecMeta, Tier,
};

pub const CONTAINER_PREFIX: &str = "fleet";

/// Key whose public half owns every fixture spec.
pub fn owner_key() -> NodeKey {
    NodeKey::from_seed([7; 32])
}

fn component(name: &str, port: u16, cpu: f64, ram: f64, hdd: f64) -> Component {
    Component {
        name: name.to_string(),
        description: format!("{name} component"),
        repotag: format!("fleetapps/{}:latest", name.to_ascii_lowercase()),
        ports: vec![port],
        container_ports: vec![80],
        domains: vec![String::new()],
        environment: vec![],
        commands: vec![],
        container_data: "/data".to_string(),
        hardware: Hardware::flat(cpu, ram, hdd),
    }
}

fn meta(name: &str, version: u8) -> SpecMeta {
    SpecMeta {
        version,
        name: name.to_string(),
        description: format!("{name} test app"),
        owner: owner_key().public_hex(),
        instances: 3,
        contacts: vec![],
        geolocation: vec![],
    }
}

/// A v3 single-container spec exposing port 31000.
pub fn flat_spec(name: &str, cpu: f64, ram: f64, hdd: f64) -> AppSpec {
    AppSpec::Flat(FlatSpec {
        meta: meta(name, 3),
        app: component(name, 31_000, cpu, ram, hdd),
    })
}

/// A v4 spec with one `{1 cpu, 1000 ram, 10 hdd}` component per name on ports 31000, 31001...
pub fn composed_spec(name: &str, components: &[&str]) -> AppSpec {
    AppSpec::Composed(ComposedSpec {
        meta: meta(name, 4),
        components: components
            .iter()
            .enumerate()
            .map(|(i, c)| component(c, 31_000 + i as u16, 1.0, 1000.0, 10.0))
            .collect(),
    })
}

pub fn meta_mut(spec: &mut AppSpec) -> &mut SpecMeta {
    match spec {
        AppSpec::Flat(s) => &mut s.meta,
        AppSpec::Composed(s) => &mut s.meta,
    }
}

/// Applies `f` to every component; the last component sees the change last.
pub fn edit_components(spec: &mut AppSpec, mut f: impl FnMut(&mut Component)) {
    match spec {
        AppSpec::Flat(s) => f(&mut s.app),
        AppSpec::Composed(s) => {
            if let Some(last) = s.components.last_mut() {
                f(last)
            }
        }
    }
}

pub fn set_instances(spec: &mut AppSpec, instances: u32) {
    meta_mut(spec).instances = instances;
}

pub fn set_owner(spec: &mut AppSpec, owner: &str) {
    meta_mut(spec).owner = owner.to_string();
}

pub fn set_repotag(spec: &mut AppSpec, repotag: &str) {
    edit_components(spec, |c| c.repotag = repotag.to_string());
}

pub fn set_ports(spec: &mut AppSpec, ports: &[u16]) {
    edit_components(spec, |c| {
        c.ports = ports.to_vec();
        c.container_ports = ports.iter().map(|_| 80).collect();
        c.domains = ports.iter().map(|_| String::new()).collect();
    });
}

/// Per-tier values in cumulus, nimbus, stratus order.
pub fn set_tiered(spec: &mut AppSpec, tiers: [(f64, f64, f64); 3]) {
    let [c, n, s] = tiers;
    edit_components(spec, |comp| {
        comp.hardware.tiered = Some(TieredResources {
            cumulus: Resources::new(c.0, c.1, c.2),
            nimbus: Resources::new(n.0, n.1, n.2),
            stratus: Resources::new(s.0, s.1, s.2),
        })
    });
}

fn signed(kind: MessageType, spec: AppSpec, key: &NodeKey, timestamp: i64) -> SpecMessage {
    let payload = SpecMessage::signing_payload(kind, spec.version(), &spec, timestamp);
    let signature = key.sign(&payload);
    SpecMessage::new(kind, spec, timestamp, signature)
}

pub fn signed_register(spec: AppSpec, key: &NodeKey, timestamp: i64) -> SpecMessage {
    signed(MessageType::Register, spec, key, timestamp)
}

pub fn signed_update(spec: AppSpec, key: &NodeKey, timestamp: i64) -> SpecMessage {
    signed(MessageType::Update, spec, key, timestamp)
}

/// Record of `spec` installed on a cumulus node, one container per component.
pub fn local_record(spec: AppSpec) -> LocalAppRecord {
    let tier = Tier::Cumulus;
    let components = spec
        .components()
        .iter()
        .map(|c| ComponentRecord {
            name: c.name.clone(),
            container_name: spec.container_name(CONTAINER_PREFIX, c),
            container_id: format!("id-{}", spec.container_name(CONTAINER_PREFIX, c)),
            applied: c.hardware.for_tier(tier),
        })
        .collect();
    LocalAppRecord {
        name: spec.name().to_string(),
        hash: format!("hash-{}", spec.name()),
        height: 100,
        tier,
        spec,
        components,
        installed_at: 0,
    }
}

/// Current fleet-wide record for `spec`, registered and last changed at `height`.
pub fn global_record(spec: AppSpec, height: u64) -> GlobalSpecRecord {
    GlobalSpecRecord {
        name: spec.name().to_string(),
        hash: format!("hash-{}-{height}", spec.name()),
        txid: format!("tx-{}-{height}", spec.name()),
        height,
        registered_height: height,
        kind: MessageType::Register,
        spec,
        value: 10.0,
    }
}

pub fn node_info(ip: &str, key: &NodeKey, tier: Tier) -> NodeInfo {
    NodeInfo {
        collateral: format!("collateral-{ip}"),
        tier,
        pubkey: key.public_hex(),
        activation_height: 1,
        ip: ip.to_string(),
    }
}
