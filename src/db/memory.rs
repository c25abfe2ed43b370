// In-process store backed by concurrent maps, snapshot to disk by the dumper.

use anyhow::Result;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::store::Store;
use crate::model::{
    AppLocation, GlobalSpecRecord, HeightCheckpoint, LocalAppRecord, ProvisionalMessage, SpecMessage,
};

#[derive(Default)]
pub struct MemoryStore {
    local: DashMap<String, LocalAppRecord>,
    global: DashMap<String, GlobalSpecRecord>,
    provisional: DashMap<String, ProvisionalMessage>,
    permanent: DashMap<String, SpecMessage>,
    locations: DashMap<(String, String), AppLocation>,
    checkpoint: RwLock<Option<HeightCheckpoint>>,
}

/// Serializable image of every collection.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub local: Vec<LocalAppRecord>,
    pub global: Vec<GlobalSpecRecord>,
    pub provisional: Vec<ProvisionalMessage>,
    pub permanent: Vec<SpecMessage>,
    pub locations: Vec<AppLocation>,
    pub checkpoint: Option<HeightCheckpoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            local: self.local.iter().map(|e| e.value().clone()).collect(),
            global: self.global.iter().map(|e| e.value().clone()).collect(),
            provisional: self.provisional.iter().map(|e| e.value().clone()).collect(),
            permanent: self.permanent.iter().map(|e| e.value().clone()).collect(),
            locations: self.locations.iter().map(|e| e.value().clone()).collect(),
            checkpoint: *self.checkpoint.read(),
        }
    }

    /// Replaces every collection with the snapshot content.
    pub fn restore(&self, snap: Snapshot) {
        self.local.clear();
        self.global.clear();
        self.provisional.clear();
        self.permanent.clear();
        self.locations.clear();
        for r in snap.local {
            self.local.insert(r.name.clone(), r);
        }
        for r in snap.global {
            self.global.insert(r.name.clone(), r);
        }
        for m in snap.provisional {
            self.provisional.insert(m.message.hash.clone(), m);
        }
        for m in snap.permanent {
            self.permanent.insert(m.hash.clone(), m);
        }
        for l in snap.locations {
            self.locations.insert(l.key(), l);
        }
        *self.checkpoint.write() = snap.checkpoint;
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn local_apps(&self) -> Result<Vec<LocalAppRecord>> {
        let mut apps: Vec<_> = self.local.iter().map(|e| e.value().clone()).collect();
        apps.sort_by_key(|a| a.installed_at);
        Ok(apps)
    }

    async fn local_app(&self, name: &str) -> Result<Option<LocalAppRecord>> {
        Ok(self.local.get(name).map(|e| e.value().clone()))
    }

    async fn put_local_app(&self, record: LocalAppRecord) -> Result<()> {
        self.local.insert(record.name.clone(), record);
        Ok(())
    }

    async fn delete_local_app(&self, name: &str) -> Result<bool> {
        Ok(self.local.remove(name).is_some())
    }

    async fn global_specs(&self) -> Result<Vec<GlobalSpecRecord>> {
        let mut specs: Vec<_> = self.global.iter().map(|e| e.value().clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    async fn global_spec(&self, name: &str) -> Result<Option<GlobalSpecRecord>> {
        Ok(self.global.get(name).map(|e| e.value().clone()))
    }

    async fn put_global_spec(&self, record: GlobalSpecRecord) -> Result<()> {
        self.global.insert(record.name.clone(), record);
        Ok(())
    }

    async fn delete_global_spec(&self, name: &str) -> Result<bool> {
        Ok(self.global.remove(name).is_some())
    }

    async fn provisional(&self, hash: &str) -> Result<Option<ProvisionalMessage>> {
        Ok(self.provisional.get(hash).map(|e| e.value().clone()))
    }

    async fn provisional_messages(&self) -> Result<Vec<ProvisionalMessage>> {
        Ok(self.provisional.iter().map(|e| e.value().clone()).collect())
    }

    async fn put_provisional(&self, message: ProvisionalMessage) -> Result<()> {
        self.provisional.insert(message.message.hash.clone(), message);
        Ok(())
    }

    async fn delete_provisional(&self, hash: &str) -> Result<bool> {
        Ok(self.provisional.remove(hash).is_some())
    }

    async fn purge_provisional(&self, now_ms: i64) -> Result<usize> {
        let before = self.provisional.len();
        self.provisional.retain(|_, m| m.expires_at > now_ms);
        Ok(before.saturating_sub(self.provisional.len()))
    }

    async fn permanent(&self, hash: &str) -> Result<Option<SpecMessage>> {
        Ok(self.permanent.get(hash).map(|e| e.value().clone()))
    }

    async fn put_permanent(&self, message: SpecMessage) -> Result<()> {
        self.permanent.insert(message.hash.clone(), message);
        Ok(())
    }

    async fn permanent_for(&self, name: &str) -> Result<Vec<SpecMessage>> {
        let mut history: Vec<_> = self
            .permanent
            .iter()
            .filter(|e| e.value().name() == name)
            .map(|e| e.value().clone())
            .collect();
        history.sort_by_key(|m| m.height.unwrap_or_default());
        Ok(history)
    }

    async fn permanent_messages(&self) -> Result<Vec<SpecMessage>> {
        let mut all: Vec<_> = self.permanent.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|m| m.height.unwrap_or_default());
        Ok(all)
    }

    async fn locations(&self, name: Option<&str>) -> Result<Vec<AppLocation>> {
        Ok(self
            .locations
            .iter()
            .filter(|e| name.map_or(true, |n| e.value().name == n))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn put_location(&self, location: AppLocation) -> Result<()> {
        self.locations.insert(location.key(), location);
        Ok(())
    }

    async fn delete_location(&self, name: &str, ip: &str) -> Result<bool> {
        Ok(self
            .locations
            .remove(&(name.to_string(), ip.to_string()))
            .is_some())
    }

    async fn delete_locations_of(&self, name: &str) -> Result<usize> {
        let before = self.locations.len();
        self.locations.retain(|(n, _), _| n != name);
        Ok(before.saturating_sub(self.locations.len()))
    }

    async fn purge_locations(&self, older_than_ms: i64) -> Result<usize> {
        let before = self.locations.len();
        self.locations.retain(|_, l| l.broadcasted_at >= older_than_ms);
        Ok(before.saturating_sub(self.locations.len()))
    }

    async fn checkpoint(&self) -> Result<Option<HeightCheckpoint>> {
        Ok(*self.checkpoint.read())
    }

    async fn set_checkpoint(&self, checkpoint: HeightCheckpoint) -> Result<()> {
        *self.checkpoint.write() = Some(checkpoint);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
