// Structural restrictions on specifications: lengths, charsets, port ranges and per-tier
// hardware caps. Image checks that need the network live in `images`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::config::{Apps, Ports};
use crate::model::geo;
use crate::model::hardware::{Resources, Tier};
use crate::model::spec::{Component, INSTANCES_SINCE};
use crate::model::{AppSpec, ValidationError};

const MAX_DESCRIPTION: usize = 256;
const MAX_COMPONENT_NAME: usize = 32;
const MAX_LIST_ENTRIES: usize = 100;
const MAX_ENTRY_LEN: usize = 1000;
const MAX_CONTAINER_DATA: usize = 300;
const MAX_CONTACTS: usize = 10;
const MAX_GEO_RULES: usize = 10;

static REPOTAG: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9.\-]+(?::[0-9]+)?/)?[a-z0-9]+(?:[._\-/][a-z0-9]+)*:[A-Za-z0-9_][A-Za-z0-9_.\-]{0,127}$").ok()
});

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::new(field, reason)
}

fn is_alnum(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_hex_key(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_step(v: f64, step: f64) -> bool {
    let q = v / step;
    (q - q.round()).abs() < 1e-6
}

fn check_name(spec: &AppSpec, apps: &Apps) -> Result<(), ValidationError> {
    let name = spec.name();
    if !is_alnum(name) {
        return Err(invalid("name", "must be non-empty and alphanumeric"));
    }
    if name.len() > apps.max_name_len {
        return Err(invalid("name", format!("must be at most {} characters", apps.max_name_len)));
    }
    let lower = name.to_ascii_lowercase();
    if let Some(p) = apps
        .reserved_prefixes
        .iter()
        .find(|p| lower.starts_with(&p.to_ascii_lowercase()))
    {
        return Err(invalid("name", format!("must not start with reserved prefix {p:?}")));
    }
    Ok(())
}

fn check_list(field: &str, items: &[String]) -> Result<(), ValidationError> {
    if items.len() > MAX_LIST_ENTRIES {
        return Err(invalid(field, format!("at most {MAX_LIST_ENTRIES} entries")));
    }
    if items.iter().any(|i| i.len() > MAX_ENTRY_LEN) {
        return Err(invalid(field, format!("entries must be at most {MAX_ENTRY_LEN} characters")));
    }
    Ok(())
}

fn check_resources(field: &str, r: &Resources) -> Result<(), ValidationError> {
    if r.cpu < 0.1 || !is_step(r.cpu, 0.1) {
        return Err(invalid(format!("{field}cpu"), "must be at least 0.1 in steps of 0.1"));
    }
    if r.ram < 100.0 || !is_step(r.ram, 100.0) {
        return Err(invalid(format!("{field}ram"), "must be at least 100 in steps of 100"));
    }
    if r.hdd < 1.0 || r.hdd.fract() != 0.0 {
        return Err(invalid(format!("{field}hdd"), "must be a whole number of at least 1"));
    }
    Ok(())
}

fn check_component(
    c: &Component,
    field: &str,
    version: u8,
    ports: &Ports,
    seen_ports: &mut HashSet<u16>,
) -> Result<(), ValidationError> {
    if !REPOTAG.as_ref().map_or(false, |re| re.is_match(&c.repotag)) {
        return Err(invalid(format!("{field}repotag"), "must be repository:tag"));
    }

    if version == 1 && (c.ports.len() != 1 || c.container_ports.len() != 1) {
        return Err(invalid(format!("{field}port"), "version 1 exposes exactly one port"));
    }
    if c.ports.len() != c.container_ports.len() {
        return Err(invalid(format!("{field}containerPorts"), "must pair with ports"));
    }
    if version > 1 && c.domains.len() != c.ports.len() {
        return Err(invalid(format!("{field}domains"), "must pair with ports"));
    }
    for p in &c.ports {
        if !ports.contains(*p) {
            return Err(invalid(
                format!("{field}ports"),
                format!("port {p} outside {}-{}", ports.min, ports.max),
            ));
        }
        if !seen_ports.insert(*p) {
            return Err(invalid(format!("{field}ports"), format!("port {p} declared twice")));
        }
    }

    if c.description.len() > MAX_DESCRIPTION {
        return Err(invalid(format!("{field}description"), "too long"));
    }
    check_list(&format!("{field}environmentParameters"), &c.environment)?;
    check_list(&format!("{field}commands"), &c.commands)?;
    check_list(&format!("{field}domains"), &c.domains)?;
    if c.container_data.len() > MAX_CONTAINER_DATA {
        return Err(invalid(format!("{field}containerData"), "too long"));
    }

    check_resources(field, &c.hardware.flat)?;
    if let Some(t) = &c.hardware.tiered {
        for tier in Tier::ALL {
            check_resources(&format!("{field}{tier}."), &t.get(tier))?;
        }
    }
    Ok(())
}

/// Type, restriction and hardware-cap checks at `height`.
pub fn verify(spec: &AppSpec, height: u64, apps: &Apps, ports: &Ports) -> Result<(), ValidationError> {
    let meta = spec.meta();
    if !apps.version_active(meta.version, height) {
        return Err(invalid("version", format!("version {} not active at height {height}", meta.version)));
    }
    check_name(spec, apps)?;
    if meta.description.len() > MAX_DESCRIPTION {
        return Err(invalid("description", format!("must be at most {MAX_DESCRIPTION} characters")));
    }
    if !is_hex_key(&meta.owner) {
        return Err(invalid("owner", "must be a hex ed25519 public key"));
    }
    if meta.version >= INSTANCES_SINCE && !(apps.min_instances..=apps.max_instances).contains(&meta.instances) {
        return Err(invalid(
            "instances",
            format!("must be between {} and {}", apps.min_instances, apps.max_instances),
        ));
    }

    let components = spec.components();
    if spec.is_composed() {
        if components.len() > apps.max_components {
            return Err(invalid("compose", format!("at most {} components", apps.max_components)));
        }
        let mut names = HashSet::new();
        for (i, c) in components.iter().enumerate() {
            if !is_alnum(&c.name) || c.name.len() > MAX_COMPONENT_NAME {
                return Err(invalid(format!("compose[{i}].name"), "must be alphanumeric, at most 32 characters"));
            }
            if !names.insert(c.name.as_str()) {
                return Err(invalid(format!("compose[{i}].name"), format!("duplicate component {}", c.name)));
            }
        }
    }

    let mut seen_ports = HashSet::new();
    for (i, c) in components.iter().enumerate() {
        let field = if spec.is_composed() { format!("compose[{i}].") } else { String::new() };
        check_component(c, &field, meta.version, ports, &mut seen_ports)?;
    }

    for tier in Tier::ALL {
        let total = spec.total_requirements(tier);
        let usable = apps.usable(tier);
        if let Some(d) = total.first_exceeding(&usable) {
            return Err(invalid(
                d.to_string(),
                format!(
                    "{} exceeds the {tier} limit of {}",
                    total.get(d),
                    usable.get(d)
                ),
            ));
        }
    }
    if meta.contacts.len() > MAX_CONTACTS {
        return Err(invalid("contacts", format!("at most {MAX_CONTACTS} entries")));
    }
    check_list("contacts", &meta.contacts)?;
    if meta.geolocation.len() > MAX_GEO_RULES {
        return Err(invalid("geolocation", format!("at most {MAX_GEO_RULES} rules")));
    }
    geo::parse_rules(&meta.geolocation)?;
    Ok(())
}

#[cfg(test)]
#[path = "verify_test.rs"]
mod verify_test;
