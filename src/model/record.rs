// Persisted records: what this node runs, and what the fleet agreed on.

use serde::{Deserialize, Serialize};

use super::hardware::{Resources, Tier};
use super::message::{MessageType, SpecMessage};
use super::spec::AppSpec;

/// One container instantiated for a local application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub name: String,
    pub container_name: String,
    pub container_id: String,
    /// Resources accounted for this component at install time.
    pub applied: Resources,
}

/// A locally installed application. One per top-level name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalAppRecord {
    pub name: String,
    pub hash: String,
    pub height: u64,
    pub tier: Tier,
    pub spec: AppSpec,
    pub components: Vec<ComponentRecord>,
    pub installed_at: i64,
}

impl LocalAppRecord {
    pub fn applied_total(&self) -> Resources {
        self.components.iter().map(|c| c.applied).sum()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentRecord> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Declared hdd of the running spec, used to choose soft vs hard redeploy.
    pub fn declared_hdd(&self) -> f64 {
        self.spec.total_requirements(self.tier).hdd
    }
}

/// Fleet-wide current specification for a name, derived from its newest permanent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSpecRecord {
    pub name: String,
    pub hash: String,
    pub txid: String,
    /// Height of the message that produced this record. Last-height-wins.
    pub height: u64,
    /// Height of the original registration, kept across updates.
    pub registered_height: u64,
    pub kind: MessageType,
    pub spec: AppSpec,
    pub value: f64,
}

impl GlobalSpecRecord {
    /// Builds a record from an anchored message. `previous` carries registration history.
    pub fn from_message(msg: &SpecMessage, previous: Option<&GlobalSpecRecord>) -> Option<Self> {
        let height = msg.height?;
        let txid = msg.txid.clone()?;
        Some(GlobalSpecRecord {
            name: msg.name().to_string(),
            hash: msg.hash.clone(),
            txid,
            height,
            registered_height: previous.map(|p| p.registered_height).unwrap_or(height),
            kind: msg.kind,
            spec: msg.specification.clone(),
            value: msg.value.unwrap_or_default(),
        })
    }

    pub fn owner(&self) -> &str {
        self.spec.owner()
    }
}

/// Last ledger height the watcher fully processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeightCheckpoint {
    pub height: u64,
}
