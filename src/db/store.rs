// Persistent document store seam.

use anyhow::Result;

use crate::model::{
    AppLocation, GlobalSpecRecord, HeightCheckpoint, LocalAppRecord, ProvisionalMessage, SpecMessage,
};

/// Collections the node persists. Implementations must be safe for concurrent use by every loop.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn local_apps(&self) -> Result<Vec<LocalAppRecord>>;
    async fn local_app(&self, name: &str) -> Result<Option<LocalAppRecord>>;
    async fn put_local_app(&self, record: LocalAppRecord) -> Result<()>;
    /// Returns whether a record was deleted.
    async fn delete_local_app(&self, name: &str) -> Result<bool>;

    async fn global_specs(&self) -> Result<Vec<GlobalSpecRecord>>;
    async fn global_spec(&self, name: &str) -> Result<Option<GlobalSpecRecord>>;
    async fn put_global_spec(&self, record: GlobalSpecRecord) -> Result<()>;
    async fn delete_global_spec(&self, name: &str) -> Result<bool>;

    async fn provisional(&self, hash: &str) -> Result<Option<ProvisionalMessage>>;
    async fn provisional_messages(&self) -> Result<Vec<ProvisionalMessage>>;
    async fn put_provisional(&self, message: ProvisionalMessage) -> Result<()>;
    async fn delete_provisional(&self, hash: &str) -> Result<bool>;
    /// Drops provisional messages whose expiry is at or before `now_ms`.
    async fn purge_provisional(&self, now_ms: i64) -> Result<usize>;

    async fn permanent(&self, hash: &str) -> Result<Option<SpecMessage>>;
    async fn put_permanent(&self, message: SpecMessage) -> Result<()>;
    /// Every permanent message of `name`, oldest height first.
    async fn permanent_for(&self, name: &str) -> Result<Vec<SpecMessage>>;
    async fn permanent_messages(&self) -> Result<Vec<SpecMessage>>;

    /// Locations of `name`, or of every app.
    async fn locations(&self, name: Option<&str>) -> Result<Vec<AppLocation>>;
    async fn put_location(&self, location: AppLocation) -> Result<()>;
    async fn delete_location(&self, name: &str, ip: &str) -> Result<bool>;
    async fn delete_locations_of(&self, name: &str) -> Result<usize>;
    /// Drops locations broadcast before `older_than_ms`.
    async fn purge_locations(&self, older_than_ms: i64) -> Result<usize>;

    async fn checkpoint(&self) -> Result<Option<HeightCheckpoint>>;
    async fn set_checkpoint(&self, checkpoint: HeightCheckpoint) -> Result<()>;
}
