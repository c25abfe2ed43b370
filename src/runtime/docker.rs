// Docker Engine HTTP API adapter.

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ContainerAction, ContainerRuntime, ContainerSpec, ContainerStats, ContainerSummary, RemoteImage};
use crate::http::client::{self, HyperClient};

const API_VERSION: &str = "v1.41";
const PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct DockerRuntime {
    client: HyperClient,
    base: String,
    prefix: String,
    timeout: Duration,
}

impl DockerRuntime {
    pub fn new(client: HyperClient, endpoint: &str, prefix: &str, timeout: Duration) -> Self {
        Self {
            client,
            base: format!("{}/{}", endpoint.trim_end_matches('/'), API_VERSION),
            prefix: prefix.to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<client::Response> {
        let url = self.url(path);
        let resp = match body {
            Some(v) => {
                let bytes = Bytes::from(serde_json::to_vec(&v)?);
                client::send(
                    &self.client,
                    method,
                    &url,
                    &[("content-type", "application/json")],
                    Some(bytes),
                    self.timeout,
                )
                .await?
            }
            None => client::send(&self.client, method, &url, &[], None, self.timeout).await?,
        };
        Ok(resp)
    }

    /// Docker answers 304 when a container already is in the requested state.
    fn accept(resp: client::Response, what: &str) -> Result<client::Response> {
        if resp.status == 304 {
            return Ok(resp);
        }
        resp.error_for_status().with_context(|| what.to_string())
    }
}

/// Splits `repo[:tag]`, keeping registry ports inside the repo part.
pub fn split_repotag(repotag: &str) -> (&str, &str) {
    match repotag.rfind(':') {
        Some(pos) if !repotag[pos + 1..].contains('/') => (&repotag[..pos], &repotag[pos + 1..]),
        _ => (repotag, "latest"),
    }
}

fn normalize_arch(raw: &str) -> String {
    match raw {
        "x86_64" | "amd64" => "amd64".to_string(),
        "aarch64" | "arm64" => "arm64".to_string(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedContainer {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

fn stats_from(v: &Value) -> ContainerStats {
    let u = |p: &str| v.pointer(p).and_then(Value::as_u64).unwrap_or(0);
    let cpu_delta = u("/cpu_stats/cpu_usage/total_usage").saturating_sub(u("/precpu_stats/cpu_usage/total_usage"));
    let sys_delta = u("/cpu_stats/system_cpu_usage").saturating_sub(u("/precpu_stats/system_cpu_usage"));
    let online = u("/cpu_stats/online_cpus").max(1);
    let cpu_percent = if sys_delta > 0 {
        cpu_delta as f64 / sys_delta as f64 * online as f64 * 100.0
    } else {
        0.0
    };

    let (mut rx, mut tx) = (0, 0);
    if let Some(nets) = v.get("networks").and_then(Value::as_object) {
        for n in nets.values() {
            rx += n.get("rx_bytes").and_then(Value::as_u64).unwrap_or(0);
            tx += n.get("tx_bytes").and_then(Value::as_u64).unwrap_or(0);
        }
    }
    let (mut read, mut write) = (0, 0);
    if let Some(entries) = v.pointer("/blkio_stats/io_service_bytes_recursive").and_then(Value::as_array) {
        for e in entries {
            let value = e.get("value").and_then(Value::as_u64).unwrap_or(0);
            match e.get("op").and_then(Value::as_str) {
                Some(op) if op.eq_ignore_ascii_case("read") => read += value,
                Some(op) if op.eq_ignore_ascii_case("write") => write += value,
                _ => {}
            }
        }
    }

    ContainerStats {
        cpu_percent,
        memory_bytes: u("/memory_stats/usage"),
        memory_limit: u("/memory_stats/limit"),
        net_rx: rx,
        net_tx: tx,
        block_read: read,
        block_write: write,
    }
}

fn create_body(spec: &ContainerSpec) -> Value {
    let mut exposed = serde_json::Map::new();
    let mut bindings = serde_json::Map::new();
    for p in &spec.ports {
        for proto in ["tcp", "udp"] {
            let key = format!("{}/{}", p.container, proto);
            exposed.insert(key.clone(), json!({}));
            bindings.insert(key, json!([{ "HostPort": p.host.to_string() }]));
        }
    }
    let binds: Vec<String> = spec
        .volume
        .iter()
        .map(|(host, target)| format!("{}:{}", host.display(), target))
        .collect();

    json!({
        "Image": spec.image,
        "Env": spec.env,
        "Cmd": if spec.cmd.is_empty() { Value::Null } else { json!(spec.cmd) },
        "Labels": spec.labels,
        "ExposedPorts": exposed,
        "HostConfig": {
            "PortBindings": bindings,
            "Binds": binds,
            "NanoCpus": (spec.cpu * 1e9) as u64,
            "Memory": (spec.ram_mb * 1024.0 * 1024.0) as u64,
            "RestartPolicy": { "Name": "unless-stopped" },
        },
    })
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn architecture(&self) -> Result<String> {
        let info: Value = self
            .call(Method::GET, "/info", None)
            .await?
            .error_for_status()
            .context("docker info")?
            .json()?;
        let arch = info
            .get("Architecture")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("docker info carries no architecture"))?;
        Ok(normalize_arch(arch))
    }

    async fn pull(&self, image: &str, progress: Option<mpsc::UnboundedSender<String>>) -> Result<()> {
        let (repo, tag) = split_repotag(image);
        let url = self.url(&format!("/images/create?fromImage={repo}&tag={tag}"));
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let forward = async {
            let mut failure = None;
            while let Some(line) = rx.recv().await {
                if let Ok(v) = serde_json::from_str::<Value>(&line) {
                    if let Some(err) = v.get("error").and_then(Value::as_str) {
                        failure = Some(err.to_string());
                    }
                }
                if let Some(sink) = &progress {
                    let _ = sink.send(line);
                }
            }
            failure
        };
        let (status, failure) = tokio::join!(
            client::send_streaming(&self.client, Method::POST, &url, tx, PULL_TIMEOUT),
            forward
        );
        let status = status.with_context(|| format!("pull {image}"))?;
        if !(200..300).contains(&status) {
            anyhow::bail!("pull {image}: status {status}");
        }
        if let Some(err) = failure {
            anyhow::bail!("pull {image}: {err}");
        }
        debug!(component = "runtime", event = "image_pulled", image, "image pulled");
        Ok(())
    }

    async fn inspect_remote(&self, image: &str) -> Result<RemoteImage> {
        let v: Value = self
            .call(Method::GET, &format!("/distribution/{image}/json"), None)
            .await?
            .error_for_status()
            .with_context(|| format!("image {image} not reachable in its registry"))?
            .json()?;
        let architectures = v
            .get("Platforms")
            .and_then(Value::as_array)
            .map(|ps| {
                ps.iter()
                    .filter_map(|p| p.get("architecture").and_then(Value::as_str))
                    .map(normalize_arch)
                    .collect()
            })
            .unwrap_or_default();
        Ok(RemoteImage { architectures })
    }

    async fn image_size(&self, image: &str) -> Result<u64> {
        let v: Value = self
            .call(Method::GET, &format!("/images/{image}/json"), None)
            .await?
            .error_for_status()
            .with_context(|| format!("inspect image {image}"))?
            .json()?;
        Ok(v.get("Size").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        let resp = self
            .call(Method::DELETE, &format!("/images/{image}?force=true"), None)
            .await?;
        if resp.status == 404 {
            return Ok(());
        }
        resp.error_for_status()
            .with_context(|| format!("remove image {image}"))?;
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let v: Value = self
            .call(
                Method::POST,
                &format!("/containers/create?name={}", spec.name),
                Some(create_body(spec)),
            )
            .await?
            .error_for_status()
            .with_context(|| format!("create container {}", spec.name))?
            .json()?;
        v.get("Id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("create container {}: no id returned", spec.name))
    }

    async fn act(&self, id: &str, action: ContainerAction) -> Result<()> {
        let resp = self
            .call(Method::POST, &format!("/containers/{id}/{}", action.as_str()), None)
            .await?;
        Self::accept(resp, &format!("{action} container {id}"))?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let resp = self
            .call(Method::DELETE, &format!("/containers/{id}?force=true&v=true"), None)
            .await?;
        if resp.status == 404 {
            return Ok(());
        }
        resp.error_for_status()
            .with_context(|| format!("remove container {id}"))?;
        Ok(())
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats> {
        let v: Value = self
            .call(Method::GET, &format!("/containers/{id}/stats?stream=false"), None)
            .await?
            .error_for_status()
            .with_context(|| format!("stats of {id}"))?
            .json()?;
        Ok(stats_from(&v))
    }

    async fn exec(&self, id: &str, cmd: &[String], env: &[String]) -> Result<String> {
        let created: Value = self
            .call(
                Method::POST,
                &format!("/containers/{id}/exec"),
                Some(json!({
                    "AttachStdout": true,
                    "AttachStderr": true,
                    "Tty": true,
                    "Cmd": cmd,
                    "Env": env,
                })),
            )
            .await?
            .error_for_status()
            .with_context(|| format!("create exec in {id}"))?
            .json()?;
        let exec_id = created
            .get("Id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("exec in {id}: no id returned"))?;
        let out = self
            .call(
                Method::POST,
                &format!("/exec/{exec_id}/start"),
                Some(json!({ "Detach": false, "Tty": true })),
            )
            .await?
            .error_for_status()
            .with_context(|| format!("start exec in {id}"))?;
        Ok(String::from_utf8_lossy(&out.body).into_owned())
    }

    async fn list(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let path = if all { "/containers/json?all=1" } else { "/containers/json" };
        let listed: Vec<ListedContainer> = self
            .call(Method::GET, path, None)
            .await?
            .error_for_status()
            .context("list containers")?
            .json()?;
        Ok(listed
            .into_iter()
            .filter_map(|c| {
                let name = c.names.first()?.trim_start_matches('/').to_string();
                if !name.starts_with(&self.prefix) {
                    return None;
                }
                Some(ContainerSummary {
                    id: c.id,
                    name,
                    image: c.image,
                    state: c.state,
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }
}
