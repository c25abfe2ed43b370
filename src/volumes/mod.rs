//! Per-application data volumes: loop-mounted ext4 images sized to the declared hdd.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::network::host::run;

#[async_trait::async_trait]
pub trait Volumes: Send + Sync {
    /// Mount point of the volume for `name`.
    fn path(&self, name: &str) -> PathBuf;

    async fn exists(&self, name: &str) -> bool;

    /// Allocates, formats and mounts a volume of `size_gb`.
    async fn create(&self, name: &str, size_gb: f64) -> Result<PathBuf>;

    /// Unmounts and deletes the volume and its image.
    async fn destroy(&self, name: &str) -> Result<()>;

    /// Registers a job that remounts the volume after reboot.
    async fn register_mount_job(&self, name: &str) -> Result<()>;

    async fn unregister_mount_job(&self, name: &str) -> Result<()>;

    /// Bytes used under the mount point.
    async fn usage(&self, name: &str) -> Result<u64>;
}

pub struct LoopVolumes {
    dir: PathBuf,
    mount_jobs: bool,
}

impl LoopVolumes {
    pub fn new(dir: PathBuf, mount_jobs: bool) -> Self {
        Self { dir, mount_jobs }
    }

    fn image(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.img"))
    }

    fn job_marker(name: &str) -> String {
        format!("# fleetd:{name}")
    }

    fn job_line(&self, name: &str) -> String {
        format!(
            "@reboot sudo mount -o loop {} {} {}",
            self.image(name).display(),
            self.path(name).display(),
            Self::job_marker(name)
        )
    }

    async fn crontab(&self) -> Result<String> {
        // An empty crontab makes `crontab -l` exit non-zero.
        Ok(run("crontab", &["-l"]).await.unwrap_or_default())
    }

    async fn write_crontab(&self, content: &str) -> Result<()> {
        let file = self.dir.join(".crontab");
        tokio::fs::write(&file, content)
            .await
            .with_context(|| format!("write {}", file.display()))?;
        let path = file.to_string_lossy().into_owned();
        run("crontab", &[&path]).await?;
        let _ = tokio::fs::remove_file(&file).await;
        Ok(())
    }
}

/// Recursive size of everything under `root`.
pub fn dir_size(root: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

#[async_trait::async_trait]
impl Volumes for LoopVolumes {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn exists(&self, name: &str) -> bool {
        tokio::fs::metadata(self.image(name)).await.is_ok()
    }

    async fn create(&self, name: &str, size_gb: f64) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create volume dir {}", self.dir.display()))?;
        let image = self.image(name).to_string_lossy().into_owned();
        let mount = self.path(name);
        let mount_str = mount.to_string_lossy().into_owned();
        let size = format!("{}G", size_gb.ceil().max(1.0) as u64);

        run("sudo", &["fallocate", "-l", &size, &image]).await?;
        run("sudo", &["mkfs.ext4", "-F", &image]).await?;
        run("sudo", &["mkdir", "-p", &mount_str]).await?;
        run("sudo", &["mount", "-o", "loop", &image, &mount_str]).await?;

        info!(component = "volumes", event = "volume_created", name, size = %size, "volume mounted");
        Ok(mount)
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let image = self.image(name).to_string_lossy().into_owned();
        let mount = self.path(name).to_string_lossy().into_owned();
        // Not mounted is fine: removal must be repeatable.
        let _ = run("sudo", &["umount", &mount]).await;
        run("sudo", &["rm", "-rf", &mount]).await?;
        run("sudo", &["rm", "-f", &image]).await?;
        info!(component = "volumes", event = "volume_destroyed", name, "volume removed");
        Ok(())
    }

    async fn register_mount_job(&self, name: &str) -> Result<()> {
        if !self.mount_jobs {
            return Ok(());
        }
        let current = self.crontab().await?;
        if current.contains(&Self::job_marker(name)) {
            return Ok(());
        }
        let mut next = current.trim_end().to_string();
        if !next.is_empty() {
            next.push('\n');
        }
        next.push_str(&self.job_line(name));
        next.push('\n');
        self.write_crontab(&next).await
    }

    async fn unregister_mount_job(&self, name: &str) -> Result<()> {
        if !self.mount_jobs {
            return Ok(());
        }
        let current = self.crontab().await?;
        let marker = Self::job_marker(name);
        if !current.contains(&marker) {
            return Ok(());
        }
        let next: String = current
            .lines()
            .filter(|l| !l.ends_with(&marker))
            .map(|l| format!("{l}\n"))
            .collect();
        self.write_crontab(&next).await
    }

    async fn usage(&self, name: &str) -> Result<u64> {
        let path = self.path(name);
        tokio::task::spawn_blocking(move || dir_size(&path))
            .await
            .context("disk usage task")?
            .context("measure volume usage")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_size_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b"), vec![0u8; 50]).unwrap();
        assert_eq!(dir_size(dir.path()).unwrap(), 150);
    }

    #[test]
    fn mount_job_line_is_tagged() {
        let v = LoopVolumes::new(PathBuf::from("/v"), true);
        assert_eq!(
            v.job_line("web"),
            "@reboot sudo mount -o loop /v/web.img /v/web # fleetd:web"
        );
    }
}
