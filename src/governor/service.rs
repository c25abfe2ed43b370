// Package governor: the unit of work it drives.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A background loop body. The governor calls `tick` repeatedly, sleeping for the returned delay
/// in between, and falls back to `retry_delay` when a tick fails.
#[async_trait]
pub trait Service: Send + Sync {
    /// Gets the service name, also used on the loops API.
    fn name(&self) -> &'static str;

    /// Whether the loop runs right after registration.
    fn enabled(&self) -> bool {
        true
    }

    /// Runs one cycle and returns the delay before the next one. A tick is never cancelled
    /// midway.
    async fn tick(&self) -> Result<Duration>;

    /// Delay after a failed tick.
    fn retry_delay(&self) -> Duration;

    /// Called once when the loop exits.
    async fn shutdown(&self) {}
}
