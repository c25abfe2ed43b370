use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigTrait};
use crate::crypto;
use crate::db::Store;
use crate::metrics;
use crate::model::spec::COMPOSE_SINCE;
use crate::model::{
    AppSpec, FleetError, GlobalSpecRecord, MessageType, ProvisionalMessage, SpecMessage,
    ValidationError,
};
use crate::time;
use crate::ttl::TtlCache;

use super::images::ImagePolicy;
use super::{format, price, verify};

const DEDUP_CAPACITY: usize = 10_000;

/// What `promote` did with an anchored message.
#[derive(Debug, Clone, PartialEq)]
pub enum PromoteOutcome {
    Promoted { price: f64 },
    Underpaid { required: f64, paid: f64 },
    /// A record at the same or a newer height already exists.
    Stale,
    /// Registration of a name another owner already holds.
    Ignored(String),
}

/// Two-phase specification store: provisional messages wait for payment, permanent ones form
/// the global specification state.
pub struct Registry {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    images: Arc<ImagePolicy>,
    seen: TtlCache<String>,
}

impl Registry {
    pub fn new(cfg: Arc<Config>, store: Arc<dyn Store>, images: Arc<ImagePolicy>) -> Self {
        let ttl = cfg.locations().dedup_ttl.unwrap_or(Duration::from_secs(60 * 60));
        Self {
            cfg,
            store,
            images,
            seen: TtlCache::new(ttl, DEDUP_CAPACITY),
        }
    }

    pub fn images(&self) -> &Arc<ImagePolicy> {
        &self.images
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn format(&self, raw: serde_json::Value) -> Result<AppSpec, ValidationError> {
        format::format(raw)
    }

    pub fn verify(&self, spec: &AppSpec, height: u64) -> Result<(), ValidationError> {
        verify::verify(spec, height, self.cfg.apps(), self.cfg.ports())?;
        for repotag in spec.repotags() {
            self.images.check_lists(repotag)?;
        }
        Ok(())
    }

    /// Current global record of `name`.
    pub async fn current(&self, name: &str) -> Result<Option<GlobalSpecRecord>, FleetError> {
        Ok(self.store.global_spec(name).await?)
    }

    pub async fn specs(&self) -> Result<Vec<GlobalSpecRecord>, FleetError> {
        Ok(self.store.global_specs().await?)
    }

    /// Price `msg` must pay when anchored at `height`.
    pub async fn required_price(&self, msg: &SpecMessage, height: u64) -> Result<f64, FleetError> {
        let apps = self.cfg.apps();
        match msg.kind {
            MessageType::Register => Ok(price::price(&msg.specification, height, apps)),
            MessageType::Update => match self.current(msg.name()).await? {
                Some(prev) => Ok(price::update_price(
                    &msg.specification,
                    height,
                    &prev.spec,
                    prev.height,
                    apps,
                )),
                None => Ok(price::price(&msg.specification, height, apps)),
            },
        }
    }

    /// Case-insensitive lookup, names collide regardless of case.
    async fn holder_of(&self, name: &str) -> Result<Option<GlobalSpecRecord>, FleetError> {
        let lower = name.to_ascii_lowercase();
        Ok(self
            .store
            .global_specs()
            .await?
            .into_iter()
            .find(|r| r.name.to_ascii_lowercase() == lower))
    }

    /// Owner key an update must be signed with: the owner of the newest permanent message.
    async fn previous_owner(&self, name: &str) -> Result<Option<(String, AppSpec)>, FleetError> {
        let history = self.store.permanent_for(name).await?;
        Ok(history
            .last()
            .map(|m| (m.specification.owner().to_string(), m.specification.clone())))
    }

    fn check_immutable(prev: &AppSpec, next: &AppSpec) -> Result<(), FleetError> {
        if prev.name() != next.name() {
            return Err(FleetError::conflict("application name cannot change"));
        }
        if prev.is_composed() != next.is_composed() {
            return Err(FleetError::conflict("application shape cannot change between flat and composed"));
        }
        let prev_names: Vec<&str> = prev.components().iter().map(|c| c.name.as_str()).collect();
        let next_names: Vec<&str> = next.components().iter().map(|c| c.name.as_str()).collect();
        if prev.is_composed() && prev_names != next_names {
            return Err(FleetError::conflict(format!(
                "components cannot change: expected {}",
                prev_names.join(",")
            )));
        }
        if prev.version() < COMPOSE_SINCE && prev.repotags() != next.repotags() {
            return Err(FleetError::conflict("image cannot change for this specification version"));
        }
        Ok(())
    }

    /// Validates and stores `msg` as provisional. Returns false when it was already known.
    pub async fn register_provisional(&self, msg: SpecMessage, height: u64) -> Result<bool, FleetError> {
        if self.seen.contains(&msg.hash)
            || self.store.provisional(&msg.hash).await?.is_some()
            || self.store.permanent(&msg.hash).await?.is_some()
        {
            return Ok(false);
        }

        let result = self.accept(&msg, height).await;
        metrics::add_provisional(result.is_ok());
        if let Err(err) = result {
            debug!(
                component = "registry",
                event = "provisional_rejected",
                app = %msg.name(),
                kind = err.kind(),
                error = %err,
                "Provisional message rejected"
            );
            return Err(err);
        }

        let now = time::unix_millis();
        let ttl = self.cfg.apps().provisional_ttl.unwrap_or(Duration::from_secs(60 * 60));
        self.store
            .put_provisional(ProvisionalMessage {
                message: msg.clone(),
                received_at: now,
                expires_at: now + ttl.as_millis() as i64,
            })
            .await?;
        self.seen.mark(msg.hash.clone());

        info!(
            component = "registry",
            event = "provisional_stored",
            app = %msg.name(),
            kind = %msg.kind,
            hash = %msg.hash,
            "Provisional message stored"
        );
        Ok(true)
    }

    async fn accept(&self, msg: &SpecMessage, height: u64) -> Result<(), FleetError> {
        if !msg.hash_matches() {
            return Err(FleetError::Signature("hash does not match content".to_string()));
        }
        if msg.version != msg.specification.version() {
            return Err(ValidationError::new("version", "envelope and specification versions differ").into());
        }
        self.verify(&msg.specification, height)?;

        let signer = match msg.kind {
            MessageType::Register => {
                if let Some(holder) = self.holder_of(msg.name()).await? {
                    return Err(FleetError::conflict(format!("application {} already registered", holder.name)));
                }
                msg.specification.owner().to_string()
            }
            MessageType::Update => {
                let (owner, prev) = self
                    .previous_owner(msg.name())
                    .await?
                    .ok_or_else(|| FleetError::NotFound(msg.name().to_string()))?;
                Self::check_immutable(&prev, &msg.specification)?;
                owner
            }
        };
        crypto::verify(&signer, &msg.payload(), &msg.signature)
    }

    /// Applies an anchored payment for `msg`. Idempotent: the same hash and height twice is a
    /// no-op, and an older height never replaces a newer record.
    pub async fn promote(
        &self,
        msg: &SpecMessage,
        txid: &str,
        height: u64,
        value: f64,
    ) -> Result<PromoteOutcome, FleetError> {
        let name = msg.name();
        let current = self.current(name).await?;

        if let Some(cur) = &current {
            if cur.height >= height {
                return Ok(PromoteOutcome::Stale);
            }
            if msg.kind == MessageType::Register && cur.owner() != msg.specification.owner() {
                warn!(
                    component = "registry",
                    event = "register_conflict",
                    app = %name,
                    height,
                    "Registration for an already owned name ignored"
                );
                return Ok(PromoteOutcome::Ignored(format!("{name} already registered")));
            }
        }

        let required = self.required_price(msg, height).await?;
        if value + 1e-9 < required {
            metrics::add_underpaid();
            warn!(
                component = "registry",
                event = "underpaid",
                app = %name,
                required,
                paid = value,
                "Payment below required price"
            );
            return Ok(PromoteOutcome::Underpaid { required, paid: value });
        }

        let anchored = msg.anchored(txid, height, value);
        let record = GlobalSpecRecord::from_message(&anchored, current.as_ref())
            .ok_or_else(|| FleetError::Infrastructure(anyhow::anyhow!("anchored message lacks txid")))?;
        self.store.put_permanent(anchored).await?;
        self.store.put_global_spec(record).await?;
        self.store.delete_provisional(&msg.hash).await?;
        self.seen.mark(msg.hash.clone());
        metrics::add_promotion();

        info!(
            component = "registry",
            event = "promoted",
            app = %name,
            height,
            price = required,
            paid = value,
            "Specification promoted"
        );
        Ok(PromoteOutcome::Promoted { price: required })
    }

    /// Drops global specifications whose last anchoring is `blocks_lasting` or more blocks
    /// behind `height`. Returns the expired names so callers can remove local instances.
    pub async fn expire(&self, height: u64) -> Result<Vec<String>, FleetError> {
        let lasting = self.cfg.apps().blocks_lasting;
        let mut expired = Vec::new();
        for record in self.store.global_specs().await? {
            if height.saturating_sub(record.height) < lasting {
                continue;
            }
            self.store.delete_global_spec(&record.name).await?;
            self.store.delete_locations_of(&record.name).await?;
            info!(
                component = "registry",
                event = "expired",
                app = %record.name,
                anchored_at = record.height,
                height,
                "Specification expired"
            );
            expired.push(record.name);
        }
        if !expired.is_empty() {
            metrics::add_expired(expired.len() as u64);
        }
        Ok(expired)
    }

    /// Drops provisional messages past their TTL.
    pub async fn purge_provisional(&self) -> Result<usize, FleetError> {
        self.seen.purge();
        Ok(self.store.purge_provisional(time::unix_millis()).await?)
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
