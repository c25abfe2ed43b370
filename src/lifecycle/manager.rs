use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::guard::OperationFlags;
use super::monitor::{Monitor, MonitorSnapshot};
use super::resources;
use super::rollback::{Host, Rollback, Undo};
use crate::config::{Config, ConfigTrait};
use crate::daemon::{self, Daemon};
use crate::db::Store;
use crate::metrics;
use crate::model::geo::NodeLocation;
use crate::model::location::host_of;
use crate::model::{
    AppSpec, Component, ComponentRecord, FleetError, GlobalSpecRecord, LocalAppRecord, Operation,
    Target, Tier,
};
use crate::network::{Firewall, PortBlocklist};
use crate::peers::Broadcaster;
use crate::registry::ImagePolicy;
use crate::runtime::{
    ContainerAction, ContainerRuntime, ContainerSpec, ContainerSummary, PortBinding, LABEL_APP,
    LABEL_COMPONENT,
};
use crate::time;
use crate::volumes::Volumes;

const COMPONENT: &str = "lifecycle";
const DEFAULT_DATA_DIR: &str = "/appdata";

/// Soft keeps the data volume and its mount job; hard allocates or destroys them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Hard,
    Soft,
}

impl Mode {
    pub fn parse(raw: &str) -> Option<Mode> {
        match raw {
            "hard" => Some(Mode::Hard),
            "soft" => Some(Mode::Soft),
            _ => None,
        }
    }
}

/// Soft when the declared storage of the next spec equals the running one.
pub fn redeploy_mode(local: &LocalAppRecord, next: &AppSpec) -> Mode {
    if (local.declared_hdd() - next.total_requirements(local.tier).hdd).abs() < 1e-9 {
        Mode::Soft
    } else {
        Mode::Hard
    }
}

/// External collaborators the manager drives.
pub struct Deps {
    pub store: Arc<dyn Store>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub volumes: Arc<dyn Volumes>,
    pub firewall: Arc<dyn Firewall>,
    pub daemon: Arc<dyn Daemon>,
    pub images: Arc<ImagePolicy>,
    pub broadcaster: Arc<Broadcaster>,
    pub flags: Arc<OperationFlags>,
    pub blocklist: Arc<PortBlocklist>,
}

/// Owns local application state: install, remove, redeploy and container actions.
pub struct LifecycleManager {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    daemon: Arc<dyn Daemon>,
    images: Arc<ImagePolicy>,
    broadcaster: Arc<Broadcaster>,
    flags: Arc<OperationFlags>,
    blocklist: Arc<PortBlocklist>,
    location: Option<NodeLocation>,
    host: Host,
}

impl LifecycleManager {
    pub fn new(cfg: Arc<Config>, deps: Deps) -> Self {
        let monitor = Monitor::new(cfg.lifecycle(), deps.runtime.clone(), deps.volumes.clone());
        let location = cfg
            .identity()
            .geolocation
            .as_deref()
            .and_then(NodeLocation::parse);
        Self {
            store: deps.store,
            daemon: deps.daemon,
            images: deps.images,
            broadcaster: deps.broadcaster,
            flags: deps.flags,
            blocklist: deps.blocklist,
            location,
            host: Host {
                runtime: deps.runtime,
                volumes: deps.volumes,
                firewall: deps.firewall,
                monitor,
            },
            cfg,
        }
    }

    pub fn flags(&self) -> &Arc<OperationFlags> {
        &self.flags
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.host.runtime
    }

    pub fn location(&self) -> Option<&NodeLocation> {
        self.location.as_ref()
    }

    fn prefix(&self) -> &str {
        &self.cfg.runtime().container_prefix
    }

    fn settle_delay(&self) -> Duration {
        self.cfg.lifecycle().settle_delay.unwrap_or(Duration::from_secs(5))
    }

    /// Configured tier, or the one the node list reports for this node.
    pub async fn tier(&self) -> Result<Tier, FleetError> {
        if let Some(tier) = self.cfg.identity().tier {
            return Ok(tier);
        }
        let nodes = self.daemon.node_list().await?;
        let key = self.broadcaster.key().public_hex();
        daemon::find_node(&nodes, self.broadcaster.endpoint(), &key)
            .map(|n| n.tier)
            .ok_or_else(|| FleetError::Infrastructure(anyhow::anyhow!("node is not in the node list")))
    }

    pub async fn installed(&self) -> Result<Vec<LocalAppRecord>, FleetError> {
        Ok(self.store.local_apps().await?)
    }

    /// Containers under the reserved prefix, running or not.
    pub async fn containers(&self) -> Result<Vec<ContainerSummary>, FleetError> {
        Ok(self.host.runtime.list(true).await?)
    }

    fn check_ports(&self, spec: &AppSpec, ports: &[u16], installed: &[LocalAppRecord]) -> Result<(), FleetError> {
        for port in ports {
            if let Some(other) = installed
                .iter()
                .find(|r| r.name != spec.name() && r.spec.ports().contains(port))
            {
                return Err(FleetError::conflict(format!("port {port} already used by {}", other.name)));
            }
            if self.host.firewall.is_blocked(*port) {
                return Err(FleetError::conflict(format!("port {port} is blocked on this node")));
            }
            if self.blocklist.contains(*port) {
                return Err(FleetError::conflict(format!("port {port} is not reachable from outside")));
            }
        }
        Ok(())
    }

    /// Installs `record`, or just `component` of it. Every check runs before the first mutation;
    /// a failure after that undoes what was done.
    pub async fn install(
        &self,
        record: &GlobalSpecRecord,
        component: Option<&str>,
        mode: Mode,
        force: bool,
    ) -> Result<LocalAppRecord, FleetError> {
        let _guard = self.flags.acquire(Operation::Install, force)?;
        let spec = &record.spec;
        let apps = self.cfg.apps();

        let tier = self.tier().await?;
        let installed = self.store.local_apps().await?;
        let existing = installed.iter().find(|r| r.name == spec.name()).cloned();

        let targets: Vec<&Component> = match component {
            None => {
                if existing.is_some() {
                    return Err(FleetError::conflict(format!("{} is already installed", spec.name())));
                }
                resources::check_requirements(spec, tier, apps, &installed)?;
                spec.components().iter().collect()
            }
            Some(name) => {
                let target = Target { app: spec.name().to_string(), component: Some(name.to_string()) };
                let c = spec.component(name).ok_or_else(|| FleetError::NotFound(target.to_string()))?;
                if existing.as_ref().map_or(false, |r| r.component(name).is_some()) {
                    return Err(FleetError::conflict(format!("{target} is already installed")));
                }
                resources::check_component(c, tier, apps, &installed)?;
                vec![c]
            }
        };
        resources::check_geolocation(spec, self.location.as_ref())?;
        let ports: Vec<u16> = targets.iter().flat_map(|c| c.ports.iter().copied()).collect();
        self.check_ports(spec, &ports, &installed)?;

        let names: Vec<String> = targets.iter().map(|c| spec.container_name(self.prefix(), c)).collect();
        if let Some(clash) = self
            .host
            .runtime
            .list(true)
            .await?
            .into_iter()
            .find(|c| names.contains(&c.name))
        {
            return Err(FleetError::conflict(format!("container {} already exists", clash.name)));
        }
        let architecture = self.host.runtime.architecture().await?;
        for c in &targets {
            self.images.check(&c.repotag, &architecture).await?;
        }

        info!(
            component = COMPONENT,
            event = "install_started",
            app = %spec.name(),
            mode = ?mode,
            components = targets.len(),
            "installing application"
        );

        let mut rollback = Rollback::default();
        let mut created = Vec::with_capacity(targets.len());
        for c in &targets {
            match self.install_component(spec, c, tier, mode, &mut rollback).await {
                Ok(rec) => created.push(rec),
                Err(err) => return Err(self.fail_install(spec, rollback, err).await),
            }
        }

        let fresh = existing.is_none();
        let mut local = existing.unwrap_or_else(|| LocalAppRecord {
            name: spec.name().to_string(),
            hash: record.hash.clone(),
            height: record.height,
            tier,
            spec: spec.clone(),
            components: Vec::new(),
            installed_at: time::unix_millis(),
        });
        local.hash = record.hash.clone();
        local.height = record.height;
        local.spec = spec.clone();
        local.components.extend(created);
        let order: Vec<&str> = spec.components().iter().map(|c| c.name.as_str()).collect();
        local
            .components
            .sort_by_key(|c| order.iter().position(|n| *n == c.name).unwrap_or(usize::MAX));

        if let Err(err) = self.store.put_local_app(local.clone()).await {
            return Err(self.fail_install(spec, rollback, err.into()).await);
        }

        metrics::add_install();
        metrics::set_local_apps(installed.len() + usize::from(fresh));
        info!(
            component = COMPONENT,
            event = "installed",
            app = %spec.name(),
            tier = %tier,
            "application installed"
        );
        Ok(local)
    }

    async fn fail_install(&self, spec: &AppSpec, rollback: Rollback, err: FleetError) -> FleetError {
        metrics::add_lifecycle_failure("install");
        warn!(
            component = COMPONENT,
            event = "install_failed",
            app = %spec.name(),
            steps = rollback.steps().len(),
            error = %err,
            "install failed, rolling back"
        );
        rollback.run(&self.host).await;
        err
    }

    async fn install_component(
        &self,
        spec: &AppSpec,
        c: &Component,
        tier: Tier,
        mode: Mode,
        rollback: &mut Rollback,
    ) -> Result<ComponentRecord, FleetError> {
        let container = spec.container_name(self.prefix(), c);
        let applied = c.hardware.for_tier(tier);
        let runtime = &self.host.runtime;
        let volumes = &self.host.volumes;

        runtime
            .pull(&c.repotag, None)
            .await
            .with_context(|| format!("pull {}", c.repotag))?;
        rollback.push(Undo::Image(c.repotag.clone()));
        self.images.check_size(&c.repotag).await?;

        let reuse = mode == Mode::Soft && volumes.exists(&container).await;
        let volume = if reuse {
            volumes.path(&container)
        } else {
            if mode == Mode::Soft {
                debug!(component = COMPONENT, event = "volume_missing", container = %container, "soft install allocates a missing volume");
            }
            let path = volumes.create(&container, applied.hdd).await?;
            rollback.push(Undo::Volume(container.clone()));
            volumes.register_mount_job(&container).await?;
            rollback.push(Undo::MountJob(container.clone()));
            path
        };

        let data_dir = if c.container_data.is_empty() {
            DEFAULT_DATA_DIR.to_string()
        } else {
            c.container_data.clone()
        };
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), spec.name().to_string());
        labels.insert(LABEL_COMPONENT.to_string(), c.name.clone());
        let container_spec = ContainerSpec {
            name: container.clone(),
            image: c.repotag.clone(),
            env: c.environment.clone(),
            cmd: c.commands.clone(),
            ports: c
                .ports
                .iter()
                .zip(&c.container_ports)
                .map(|(host, container)| PortBinding { host: *host, container: *container })
                .collect(),
            volume: Some((volume, data_dir)),
            cpu: applied.cpu,
            ram_mb: applied.ram,
            labels,
        };
        let id = runtime.create(&container_spec).await?;
        rollback.push(Undo::Container(id.clone()));
        runtime.act(&id, ContainerAction::Start).await?;

        let firewall = &self.host.firewall;
        let rules = firewall.is_active().await.unwrap_or(false);
        for port in &c.ports {
            if rules {
                firewall.allow(*port).await?;
                rollback.push(Undo::Rule(*port));
            }
            if firewall.upnp_enabled() {
                firewall.map_upnp(*port, &container).await?;
                rollback.push(Undo::Upnp(*port, container.clone()));
            }
        }

        self.host.monitor.start(&container, &id, &container);
        rollback.push(Undo::Monitor(container.clone()));

        Ok(ComponentRecord {
            name: c.name.clone(),
            container_name: container,
            container_id: id,
            applied,
        })
    }

    /// Tears down `name` in reverse component order, then deletes its record. With `force`
    /// an unknown app is not an error and leftover containers are cleaned up.
    pub async fn remove(&self, name: &str, mode: Mode, force: bool) -> Result<(), FleetError> {
        let _guard = self.flags.acquire(Operation::Removal, force)?;
        let record = match self.store.local_app(name).await? {
            Some(record) => record,
            None if force => {
                self.remove_strays(name, mode).await;
                return Ok(());
            }
            None => return Err(FleetError::NotFound(name.to_string())),
        };

        info!(component = COMPONENT, event = "remove_started", app = %name, mode = ?mode, "removing application");
        for comp in record.components.iter().rev() {
            let declared = record.spec.component(&comp.name);
            let ports = declared.map(|c| c.ports.clone()).unwrap_or_default();
            let image = declared.map(|c| c.repotag.as_str());
            self.teardown(&comp.container_name, Some(&comp.container_id), image, &ports, mode)
                .await;
        }

        self.store.delete_local_app(name).await?;
        self.store.delete_location(name, self.broadcaster.endpoint()).await?;
        metrics::add_removal();
        info!(component = COMPONENT, event = "removed", app = %name, "application removed");
        Ok(())
    }

    /// Best-effort teardown of one container and what was set up around it.
    async fn teardown(&self, container: &str, id: Option<&str>, image: Option<&str>, ports: &[u16], mode: Mode) {
        let mut steps = Rollback::default();
        if mode == Mode::Hard {
            steps.push(Undo::Volume(container.to_string()));
            steps.push(Undo::MountJob(container.to_string()));
        }
        let rules = self.host.firewall.is_active().await.unwrap_or(false);
        for port in ports {
            if rules {
                steps.push(Undo::Rule(*port));
            }
            if self.host.firewall.upnp_enabled() {
                steps.push(Undo::Upnp(*port, container.to_string()));
            }
        }
        if let Some(image) = image {
            steps.push(Undo::Image(image.to_string()));
        }
        if let Some(id) = id {
            steps.push(Undo::Container(id.to_string()));
        }
        steps.push(Undo::Monitor(container.to_string()));
        steps.run(&self.host).await;
    }

    async fn remove_strays(&self, name: &str, mode: Mode) {
        let containers = match self.host.runtime.list(true).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(component = COMPONENT, event = "list_failed", app = %name, error = %format!("{e:#}"), "cannot list containers for cleanup");
                return;
            }
        };
        for c in containers.iter().filter(|c| c.app() == Some(name)) {
            self.teardown(&c.name, Some(&c.id), Some(&c.image), &[], mode).await;
        }
        debug!(component = COMPONENT, event = "forced_remove", app = %name, "unknown application cleaned up");
    }

    /// Removes and reinstalls `record` after the settle delay. The mode defaults to soft when
    /// declared storage is unchanged.
    pub async fn redeploy(
        &self,
        record: &GlobalSpecRecord,
        mode: Option<Mode>,
        force: bool,
    ) -> Result<LocalAppRecord, FleetError> {
        let local = self
            .store
            .local_app(&record.name)
            .await?
            .ok_or_else(|| FleetError::NotFound(record.name.clone()))?;
        let mode = mode.unwrap_or_else(|| redeploy_mode(&local, &record.spec));

        info!(
            component = COMPONENT,
            event = "redeploy",
            app = %record.name,
            mode = ?mode,
            from = %local.hash,
            to = %record.hash,
            "redeploying application"
        );
        self.remove(&record.name, mode, force).await?;
        tokio::time::sleep(self.settle_delay()).await;
        self.install(record, None, mode, force).await
    }

    async fn local_target(&self, target: &Target) -> Result<(LocalAppRecord, Vec<ComponentRecord>), FleetError> {
        let record = self
            .store
            .local_app(&target.app)
            .await?
            .ok_or_else(|| FleetError::NotFound(target.app.clone()))?;
        let comps = match &target.component {
            Some(name) => vec![record
                .component(name)
                .cloned()
                .ok_or_else(|| FleetError::NotFound(target.to_string()))?],
            None => record.components.clone(),
        };
        Ok((record, comps))
    }

    /// Runs `action` on the local containers of `target`, or on every host of the app when
    /// `global`.
    pub async fn act(&self, target: &Target, action: ContainerAction, global: bool) -> Result<(), FleetError> {
        if global {
            self.act_global(target, action).await
        } else {
            self.act_local(target, action).await
        }
    }

    async fn act_local(&self, target: &Target, action: ContainerAction) -> Result<(), FleetError> {
        let (_, mut comps) = self.local_target(target).await?;
        if !action.is_constructive() {
            comps.reverse();
        }
        for comp in &comps {
            self.host.runtime.act(&comp.container_id, action).await?;
            match action {
                ContainerAction::Start | ContainerAction::Restart | ContainerAction::Unpause => {
                    self.host
                        .monitor
                        .start(&comp.container_name, &comp.container_id, &comp.container_name)
                }
                ContainerAction::Stop | ContainerAction::Kill => self.host.monitor.stop(&comp.container_name),
                ContainerAction::Pause => {}
            }
        }
        info!(component = COMPONENT, event = "action", target = %target, action = %action, "container action applied");
        Ok(())
    }

    async fn act_global(&self, target: &Target, action: ContainerAction) -> Result<(), FleetError> {
        let hosts: Vec<String> = self
            .store
            .locations(Some(&target.app))
            .await?
            .iter()
            .map(|l| l.host().to_string())
            .collect();
        let nodes: Vec<_> = self
            .broadcaster
            .other_nodes()
            .await?
            .into_iter()
            .filter(|n| hosts.iter().any(|h| h == host_of(&n.ip)))
            .collect();
        info!(
            component = COMPONENT,
            event = "global_action",
            target = %target,
            action = %action,
            hosts = nodes.len(),
            "fanning out action"
        );
        self.broadcaster.fan_out_action(nodes, target.to_string(), action.as_str());

        if self.store.local_app(&target.app).await?.is_some() {
            if let Err(err) = self.act_local(target, action).await {
                warn!(component = COMPONENT, event = "local_action_failed", target = %target, error = %err, "local part of global action failed");
            }
        }
        Ok(())
    }

    fn single_component(target: &Target, comps: Vec<ComponentRecord>) -> Result<ComponentRecord, FleetError> {
        if comps.len() != 1 {
            return Err(FleetError::conflict(format!(
                "{target} has {} components, name one as component_app",
                comps.len()
            )));
        }
        comps
            .into_iter()
            .next()
            .ok_or_else(|| FleetError::NotFound(target.to_string()))
    }

    pub async fn exec(&self, target: &Target, cmd: &[String], env: &[String]) -> Result<String, FleetError> {
        let (_, comps) = self.local_target(target).await?;
        let comp = Self::single_component(target, comps)?;
        Ok(self.host.runtime.exec(&comp.container_id, cmd, env).await?)
    }

    pub async fn monitor_snapshot(&self, target: &Target) -> Result<MonitorSnapshot, FleetError> {
        let (_, comps) = self.local_target(target).await?;
        let comp = Self::single_component(target, comps)?;
        self.host
            .monitor
            .snapshot(&comp.container_name)
            .ok_or_else(|| FleetError::NotFound(format!("monitoring of {target}")))
    }

    pub fn is_monitored(&self, container: &str) -> bool {
        self.host.monitor.is_monitored(container)
    }

    /// Re-arms monitoring for every installed component, used at startup.
    pub async fn resume_monitoring(&self) -> Result<usize, FleetError> {
        let mut count = 0;
        for record in self.store.local_apps().await? {
            for comp in &record.components {
                self.host
                    .monitor
                    .start(&comp.container_name, &comp.container_id, &comp.container_name);
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn stop_monitoring(&self) {
        self.host.monitor.stop_all();
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod manager_test;
