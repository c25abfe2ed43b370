// Pure parts of a scheduling cycle: sampling, the throttling draw and the pre-install checks.

use rand::Rng;
use std::fmt;
use std::time::Duration;

use crate::model::geo::{self, NodeLocation};
use crate::model::location::host_of;
use crate::model::{AppLocation, AppSpec, GlobalSpecRecord, LocalAppRecord};
use crate::rand::{below_with, pick_with};
use crate::runtime::ContainerSummary;

/// Why a cycle ended without an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    NotEligible,
    NoApps,
    RecentlyEvaluated,
    AlreadyHosted,
    LocalContainer,
    TargetMet,
    ImageInUse(String),
    ImageRejected(String),
    PortCollision(u16),
    LostDraw,
    Busy,
}

impl Skip {
    /// Metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Skip::NotEligible => "not_eligible",
            Skip::NoApps => "no_apps",
            Skip::RecentlyEvaluated => "recently_evaluated",
            Skip::AlreadyHosted => "already_hosted",
            Skip::LocalContainer => "local_container",
            Skip::TargetMet => "target_met",
            Skip::ImageInUse(_) => "image_in_use",
            Skip::ImageRejected(_) => "image_rejected",
            Skip::PortCollision(_) => "port_collision",
            Skip::LostDraw => "lost_draw",
            Skip::Busy => "busy",
        }
    }

    /// Whether the app is remembered as evaluated so it is not sampled again soon.
    pub fn is_cached(&self) -> bool {
        matches!(
            self,
            Skip::AlreadyHosted
                | Skip::LocalContainer
                | Skip::TargetMet
                | Skip::ImageInUse(_)
                | Skip::ImageRejected(_)
                | Skip::PortCollision(_)
        )
    }
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skip::ImageInUse(image) => write!(f, "image {image} runs under another app"),
            Skip::ImageRejected(reason) => write!(f, "image rejected: {reason}"),
            Skip::PortCollision(port) => write!(f, "port {port} is used by a running app"),
            other => f.write_str(other.as_str()),
        }
    }
}

fn ln_apps(total_apps: usize) -> f64 {
    (2.0 + total_apps as f64).ln()
}

/// Upper bound of the throttling draw. Only a draw of zero installs.
pub fn draw_bound(probability: f64, total_apps: usize) -> u64 {
    (probability / ln_apps(total_apps)).ceil().max(1.0) as u64
}

/// Idle time between cycles, shorter as the fleet knows more apps.
pub fn idle_delay(base: Duration, total_apps: usize) -> Duration {
    base.div_f64(ln_apps(total_apps))
}

/// True when `spec` carries geolocation rules that admit `node`.
pub fn geo_matches(spec: &AppSpec, node: Option<&NodeLocation>) -> bool {
    let Some(node) = node else {
        return false;
    };
    match geo::parse_rules(spec.geolocation()) {
        Ok(rules) => !rules.is_empty() && geo::is_allowed(&rules, node),
        Err(_) => false,
    }
}

/// Samples one record uniformly. One cycle in `geo_override` samples among the geo-restricted
/// apps this node may host, when there are any.
pub fn sample<'a, R: Rng + ?Sized>(
    rng: &mut R,
    specs: &'a [GlobalSpecRecord],
    node: Option<&NodeLocation>,
    geo_override: u32,
) -> Option<&'a GlobalSpecRecord> {
    if geo_override > 0 && below_with(rng, geo_override as u64) == 0 {
        let restricted: Vec<&GlobalSpecRecord> =
            specs.iter().filter(|r| geo_matches(&r.spec, node)).collect();
        if let Some(record) = pick_with(rng, &restricted) {
            return Some(*record);
        }
    }
    pick_with(rng, specs)
}

/// What the node knows about itself and the fleet at the start of a cycle.
pub struct View<'a> {
    /// This node's endpoint.
    pub own: &'a str,
    /// Every location reported for the sampled app.
    pub locations: &'a [AppLocation],
    pub containers: &'a [ContainerSummary],
    pub installed: &'a [LocalAppRecord],
}

/// Checks that need no network access, in the order they are cheapest to evaluate.
pub fn precheck(record: &GlobalSpecRecord, view: &View<'_>) -> Result<(), Skip> {
    let name = record.name.as_str();
    let own = host_of(view.own);
    if view.locations.iter().any(|l| l.host() == own) {
        return Err(Skip::AlreadyHosted);
    }
    if view.installed.iter().any(|r| r.name == name) || view.containers.iter().any(|c| c.app() == Some(name)) {
        return Err(Skip::LocalContainer);
    }
    if view.locations.len() >= record.spec.instances() as usize {
        return Err(Skip::TargetMet);
    }
    let repotags = record.spec.repotags();
    if let Some(c) = view
        .containers
        .iter()
        .find(|c| c.app().map_or(true, |a| a != name) && repotags.contains(&c.image.as_str()))
    {
        return Err(Skip::ImageInUse(c.image.clone()));
    }
    for port in record.spec.ports() {
        if view
            .installed
            .iter()
            .any(|r| r.name != name && r.spec.ports().contains(&port))
        {
            return Err(Skip::PortCollision(port));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "eligibility_test.rs"]
mod eligibility_test;
