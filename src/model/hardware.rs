// Hardware tiers and resource vectors (cpu cores, ram MB, hdd GB).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Node hardware class. Tiered resource fields use its suffixes (`cpubasic`, `ramsuper`, `hddbamf`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Cumulus,
    Nimbus,
    Stratus,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Cumulus, Tier::Nimbus, Tier::Stratus];

    /// Field suffix used by tiered specifications.
    pub fn suffix(&self) -> &'static str {
        match self {
            Tier::Cumulus => "basic",
            Tier::Nimbus => "super",
            Tier::Stratus => "bamf",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s.to_ascii_lowercase().as_str() {
            "cumulus" | "basic" => Some(Tier::Cumulus),
            "nimbus" | "super" => Some(Tier::Nimbus),
            "stratus" | "bamf" => Some(Tier::Stratus),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Cumulus => write!(f, "cumulus"),
            Tier::Nimbus => write!(f, "nimbus"),
            Tier::Stratus => write!(f, "stratus"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Cpu,
    Ram,
    Hdd,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Cpu => write!(f, "cpu"),
            Dimension::Ram => write!(f, "ram"),
            Dimension::Hdd => write!(f, "hdd"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: f64,
    pub ram: f64,
    pub hdd: f64,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        cpu: 0.0,
        ram: 0.0,
        hdd: 0.0,
    };

    pub fn new(cpu: f64, ram: f64, hdd: f64) -> Self {
        Self { cpu, ram, hdd }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Cpu => self.cpu,
            Dimension::Ram => self.ram,
            Dimension::Hdd => self.hdd,
        }
    }

    /// First dimension in which `self` exceeds `available`, checked cpu, ram, hdd.
    pub fn first_exceeding(&self, available: &Resources) -> Option<Dimension> {
        // Tolerance absorbs float noise from summing tenths of a core.
        const EPS: f64 = 1e-9;
        [Dimension::Cpu, Dimension::Ram, Dimension::Hdd]
            .into_iter()
            .find(|d| self.get(*d) > available.get(*d) + EPS)
    }

    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu: (self.cpu - other.cpu).max(0.0),
            ram: (self.ram - other.ram).max(0.0),
            hdd: (self.hdd - other.hdd).max(0.0),
        }
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            cpu: self.cpu + rhs.cpu,
            ram: self.ram + rhs.ram,
            hdd: self.hdd + rhs.hdd,
        }
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        *self = *self + rhs;
    }
}

impl Sub for Resources {
    type Output = Resources;

    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            cpu: self.cpu - rhs.cpu,
            ram: self.ram - rhs.ram,
            hdd: self.hdd - rhs.hdd,
        }
    }
}

impl std::iter::Sum for Resources {
    fn sum<I: Iterator<Item = Resources>>(iter: I) -> Resources {
        iter.fold(Resources::ZERO, |acc, r| acc + r)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TieredResources {
    pub cumulus: Resources,
    pub nimbus: Resources,
    pub stratus: Resources,
}

impl TieredResources {
    pub fn get(&self, tier: Tier) -> Resources {
        match tier {
            Tier::Cumulus => self.cumulus,
            Tier::Nimbus => self.nimbus,
            Tier::Stratus => self.stratus,
        }
    }
}

/// Declared hardware of one component: flat values, optionally overridden per tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hardware {
    pub flat: Resources,
    pub tiered: Option<TieredResources>,
}

impl Hardware {
    pub fn flat(cpu: f64, ram: f64, hdd: f64) -> Self {
        Self {
            flat: Resources::new(cpu, ram, hdd),
            tiered: None,
        }
    }

    /// Tier-specific value when tiered, the flat value otherwise.
    pub fn for_tier(&self, tier: Tier) -> Resources {
        match &self.tiered {
            Some(t) => t.get(tier),
            None => self.flat,
        }
    }
}
