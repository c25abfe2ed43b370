// Image policy: operator white/blacklists, registry reachability, architecture and size.

use std::sync::Arc;

use crate::config::Images;
use crate::model::{AppSpec, FleetError, ValidationError};
use crate::runtime::ContainerRuntime;

pub struct ImagePolicy {
    cfg: Images,
    runtime: Arc<dyn ContainerRuntime>,
}

fn repository(repotag: &str) -> &str {
    repotag.rsplit_once(':').map(|(r, _)| r).unwrap_or(repotag)
}

/// `entry` matches a whole repotag, a repository, or a namespace prefix ending with `/`.
fn matches(entry: &str, repotag: &str) -> bool {
    if entry.ends_with('/') {
        return repotag.starts_with(entry);
    }
    entry == repotag || entry == repository(repotag)
}

impl ImagePolicy {
    pub fn new(cfg: Images, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { cfg, runtime }
    }

    /// Static list checks. No network access.
    pub fn check_lists(&self, repotag: &str) -> Result<(), ValidationError> {
        if self.cfg.blacklist.iter().any(|e| matches(e, repotag)) {
            return Err(ValidationError::new("repotag", format!("{repotag} is blocked")));
        }
        if !self.cfg.whitelist.is_empty() && !self.cfg.whitelist.iter().any(|e| matches(e, repotag)) {
            return Err(ValidationError::new("repotag", format!("{repotag} is not whitelisted")));
        }
        Ok(())
    }

    /// Lists, then registry reachability and architecture when registry checks are enabled.
    pub async fn check(&self, repotag: &str, architecture: &str) -> Result<(), FleetError> {
        self.check_lists(repotag)?;
        if !self.cfg.check_registry {
            return Ok(());
        }
        let remote = self.runtime.inspect_remote(repotag).await.map_err(|e| {
            FleetError::Validation(ValidationError::new(
                "repotag",
                format!("{repotag} not reachable in registry: {e}"),
            ))
        })?;
        if !remote.architectures.is_empty() && !remote.architectures.iter().any(|a| a == architecture) {
            return Err(FleetError::conflict(format!(
                "{repotag} has no {architecture} build (available: {})",
                remote.architectures.join(",")
            )));
        }
        Ok(())
    }

    pub async fn check_spec(&self, spec: &AppSpec, architecture: &str) -> Result<(), FleetError> {
        for repotag in spec.repotags() {
            self.check(repotag, architecture).await?;
        }
        Ok(())
    }

    /// Rejects a pulled image above the configured size.
    pub async fn check_size(&self, repotag: &str) -> Result<(), FleetError> {
        let size = self.runtime.image_size(repotag).await?;
        if size > self.cfg.max_size {
            return Err(FleetError::Validation(ValidationError::new(
                "repotag",
                format!("{repotag} is {size} bytes, above the {} byte limit", self.cfg.max_size),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_entries_match_namespaces_repositories_and_tags() {
        assert!(matches("fleetapps/", "fleetapps/web:1"));
        assert!(matches("fleetapps/web", "fleetapps/web:1"));
        assert!(matches("fleetapps/web:1", "fleetapps/web:1"));
        assert!(!matches("fleetapps/web:2", "fleetapps/web:1"));
        assert!(!matches("runon", "fleetapps/web:1"));
        assert!(matches("localhost:5000/", "localhost:5000/app:latest"));
        assert_eq!(repository("localhost:5000/app:latest"), "localhost:5000/app");
    }
}
