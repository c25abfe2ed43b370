// Application specification: a tagged variant over the flat (v1-v3) and composed (v4+) shapes.
//
// JSON conversion lives in `registry::format`; this module only holds the typed shape and the
// queries every subsystem shares (components, ports, resource totals, container names).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::hardware::{Hardware, Resources, Tier};

pub const MIN_VERSION: u8 = 1;
pub const MAX_VERSION: u8 = 5;
/// First version carrying `instances`.
pub const INSTANCES_SINCE: u8 = 3;
/// First version carrying `compose`.
pub const COMPOSE_SINCE: u8 = 4;
/// First version carrying `contacts` and `geolocation`.
pub const GEO_SINCE: u8 = 5;
/// Replica target assumed for specifications older than `INSTANCES_SINCE`.
pub const DEFAULT_INSTANCES: u32 = 3;

/// One container of an application.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub description: String,
    pub repotag: String,
    pub ports: Vec<u16>,
    pub container_ports: Vec<u16>,
    pub domains: Vec<String>,
    pub environment: Vec<String>,
    pub commands: Vec<String>,
    pub container_data: String,
    pub hardware: Hardware,
}

/// Fields shared by both specification shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecMeta {
    pub version: u8,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub instances: u32,
    pub contacts: Vec<String>,
    pub geolocation: Vec<String>,
}

/// v1-v3: a single container whose fields sit at the top level of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatSpec {
    pub meta: SpecMeta,
    /// The single container; its `name` equals the application name.
    pub app: Component,
}

/// v4+: an ordered list of named components.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedSpec {
    pub meta: SpecMeta,
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum AppSpec {
    Flat(FlatSpec),
    Composed(ComposedSpec),
}

impl AppSpec {
    pub fn meta(&self) -> &SpecMeta {
        match self {
            AppSpec::Flat(s) => &s.meta,
            AppSpec::Composed(s) => &s.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn version(&self) -> u8 {
        self.meta().version
    }

    pub fn owner(&self) -> &str {
        &self.meta().owner
    }

    pub fn instances(&self) -> u32 {
        self.meta().instances
    }

    pub fn geolocation(&self) -> &[String] {
        &self.meta().geolocation
    }

    pub fn is_composed(&self) -> bool {
        matches!(self, AppSpec::Composed(_))
    }

    /// Components in declared order. A flat spec yields its single container.
    pub fn components(&self) -> &[Component] {
        match self {
            AppSpec::Flat(s) => std::slice::from_ref(&s.app),
            AppSpec::Composed(s) => &s.components,
        }
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components().iter().find(|c| c.name == name)
    }

    /// Sum over components of the tier-specific value when tiered, the flat value otherwise.
    pub fn total_requirements(&self, tier: Tier) -> Resources {
        self.components()
            .iter()
            .map(|c| c.hardware.for_tier(tier))
            .sum()
    }

    /// Every externally exposed port across components.
    pub fn ports(&self) -> Vec<u16> {
        self.components()
            .iter()
            .flat_map(|c| c.ports.iter().copied())
            .collect()
    }

    pub fn repotags(&self) -> Vec<&str> {
        self.components().iter().map(|c| c.repotag.as_str()).collect()
    }

    /// Docker container name of `component` (ignored for flat specs).
    pub fn container_name(&self, prefix: &str, component: &Component) -> String {
        match self {
            AppSpec::Flat(s) => format!("{prefix}{}", s.meta.name),
            AppSpec::Composed(s) => format!("{prefix}{}_{}", component.name, s.meta.name),
        }
    }

    /// Sorted-key compact JSON. This is the byte string that owners sign.
    pub fn canonical_json(&self) -> String {
        serde_json::Value::from(self.clone()).to_string()
    }
}

/// Addresses an application or one of its components: `app` or `component_app`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub app: String,
    pub component: Option<String>,
}

impl Target {
    pub fn parse(raw: &str) -> Target {
        // App and component names are alphanumeric, so the first underscore splits them.
        match raw.split_once('_') {
            Some((component, app)) if !component.is_empty() && !app.is_empty() => Target {
                app: app.to_string(),
                component: Some(component.to_string()),
            },
            _ => Target {
                app: raw.to_string(),
                component: None,
            },
        }
    }

    pub fn app(name: impl Into<String>) -> Target {
        Target {
            app: name.into(),
            component: None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.component {
            Some(c) => write!(f, "{c}_{}", self.app),
            None => write!(f, "{}", self.app),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, cpu: f64) -> Component {
        Component {
            name: name.to_string(),
            description: String::new(),
            repotag: format!("fleetapps/{name}:latest"),
            ports: vec![31000],
            container_ports: vec![80],
            domains: vec![String::new()],
            environment: vec![],
            commands: vec![],
            container_data: "/data".to_string(),
            hardware: Hardware::flat(cpu, 1000.0, 10.0),
        }
    }

    fn meta(name: &str, version: u8) -> SpecMeta {
        SpecMeta {
            version,
            name: name.to_string(),
            description: String::new(),
            owner: "aa".to_string(),
            instances: 3,
            contacts: vec![],
            geolocation: vec![],
        }
    }

    #[test]
    fn flat_container_name_has_no_component() {
        let spec = AppSpec::Flat(FlatSpec {
            meta: meta("web", 3),
            app: component("web", 1.0),
        });
        assert_eq!(spec.container_name("fleet", &spec.components()[0]), "fleetweb");
    }

    #[test]
    fn composed_totals_sum_components() {
        let spec = AppSpec::Composed(ComposedSpec {
            meta: meta("shop", 4),
            components: vec![component("db", 1.5), component("api", 0.5)],
        });
        let total = spec.total_requirements(Tier::Nimbus);
        assert_eq!(total, Resources::new(2.0, 2000.0, 20.0));
        assert_eq!(spec.container_name("fleet", &spec.components()[1]), "fleetapi_shop");
    }

    #[test]
    fn target_parses_component_prefix() {
        assert_eq!(Target::parse("db_shop").component.as_deref(), Some("db"));
        assert_eq!(Target::parse("db_shop").app, "shop");
        assert_eq!(Target::parse("shop"), Target::app("shop"));
        assert_eq!(Target::parse("db_shop").to_string(), "db_shop");
    }
}
