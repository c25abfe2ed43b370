// Tiered resource accounting and the geolocation gate.

use crate::config::Apps;
use crate::model::geo::{self, NodeLocation};
use crate::model::{AppSpec, Component, FleetError, LocalAppRecord, Resources, Tier};

/// Resources still free on a `tier` node once the reserve and every installed app except
/// `except` are accounted.
pub fn available(apps: &Apps, tier: Tier, installed: &[LocalAppRecord], except: Option<&str>) -> Resources {
    let used: Resources = installed
        .iter()
        .filter(|r| Some(r.name.as_str()) != except)
        .map(|r| r.applied_total())
        .sum();
    apps.usable(tier).saturating_sub(&used)
}

fn compare(requested: Resources, free: Resources) -> Result<(), FleetError> {
    match requested.first_exceeding(&free) {
        Some(dimension) => Err(FleetError::ResourceExhausted {
            dimension,
            requested: requested.get(dimension),
            available: free.get(dimension),
        }),
        None => Ok(()),
    }
}

/// Checks that `spec` fits next to the other installed apps.
pub fn check_requirements(
    spec: &AppSpec,
    tier: Tier,
    apps: &Apps,
    installed: &[LocalAppRecord],
) -> Result<(), FleetError> {
    let free = available(apps, tier, installed, Some(spec.name()));
    compare(spec.total_requirements(tier), free)
}

/// Checks that one more `component` fits next to what is installed, its own app included.
pub fn check_component(
    component: &Component,
    tier: Tier,
    apps: &Apps,
    installed: &[LocalAppRecord],
) -> Result<(), FleetError> {
    let free = available(apps, tier, installed, None);
    compare(component.hardware.for_tier(tier), free)
}

/// Rejects apps whose geolocation rules exclude this node. A node without a declared location
/// only takes apps without rules.
pub fn check_geolocation(spec: &AppSpec, node: Option<&NodeLocation>) -> Result<(), FleetError> {
    let rules = geo::parse_rules(spec.geolocation())?;
    if rules.is_empty() {
        return Ok(());
    }
    match node {
        Some(location) if geo::is_allowed(&rules, location) => Ok(()),
        Some(location) => Err(FleetError::conflict(format!(
            "{} is geolocation restricted and excludes {location}",
            spec.name()
        ))),
        None => Err(FleetError::conflict(format!(
            "{} is geolocation restricted and this node declares no location",
            spec.name()
        ))),
    }
}
