/// NFS 快照驱动
///
/// 卷以 qcow2 镜像形式存放在 NFS 共享目录中，快照使用 qcow2 内部快照

use async_trait::async_trait;
use common::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::driver::{DriverOptions, SnapshotDriver};

/// `qemu-img info --output=json` 输出中需要的部分
#[derive(Debug, Deserialize)]
struct ImageInfo {
    #[serde(default)]
    snapshots: Vec<ImageSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ImageSnapshot {
    name: String,
    #[serde(rename = "date-sec")]
    date_sec: i64,
    #[serde(rename = "date-nsec", default)]
    date_nsec: i64,
}

/// 解析镜像信息中的快照列表，按创建时间从旧到新排序
fn parse_snapshot_list(output: &[u8]) -> Result<Vec<String>> {
    let info: ImageInfo = serde_json::from_slice(output)
        .map_err(|e| Error::Storage(format!("Failed to parse qemu-img output: {}", e)))?;

    let mut snapshots = info.snapshots;
    snapshots.sort_by_key(|s| (s.date_sec, s.date_nsec));

    Ok(snapshots.into_iter().map(|s| s.name).collect())
}

/// NFS 快照驱动
pub struct NfsSnapshotDriver {
    /// NFS 挂载点路径
    mount_path: PathBuf,
}

impl NfsSnapshotDriver {
    pub fn new(mount_path: impl Into<PathBuf>) -> Self {
        Self {
            mount_path: mount_path.into(),
        }
    }

    /// 卷镜像路径: `<mount>/<pool>/<policy>.<volume>.qcow2`
    fn image_path(&self, opts: &DriverOptions) -> PathBuf {
        let file_name = format!("{}.qcow2", opts.volume.name.replace('/', "."));
        match opts.pool() {
            "" => self.mount_path.join(file_name),
            pool => self.mount_path.join(pool).join(file_name),
        }
    }

    fn existing_image(&self, opts: &DriverOptions) -> Result<PathBuf> {
        let path = self.image_path(opts);
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Volume {} image not found at {:?}",
                opts.volume.name, path
            )));
        }
        Ok(path)
    }

    async fn qemu_img(&self, command: &mut Command, action: &str) -> Result<Vec<u8>> {
        let output = command
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Storage(format!("Failed to run qemu-img {}: {}", action, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("qemu-img {} failed: {}", action, stderr);
            return Err(Error::Storage(format!("qemu-img {} failed: {}", action, stderr)));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl SnapshotDriver for NfsSnapshotDriver {
    async fn create_snapshot(&self, snapshot: &str, opts: &DriverOptions) -> Result<()> {
        let path = self.existing_image(opts)?;
        info!("Creating snapshot {} for volume {}", snapshot, opts.volume.name);

        self.qemu_img(
            Command::new("qemu-img")
                .arg("snapshot")
                .arg("-c")
                .arg(snapshot)
                .arg(&path),
            "snapshot -c",
        )
        .await?;

        info!("Successfully created snapshot {} for volume {}", snapshot, opts.volume.name);
        Ok(())
    }

    async fn list_snapshots(&self, opts: &DriverOptions) -> Result<Vec<String>> {
        let path = self.existing_image(opts)?;
        debug!("Listing snapshots of {:?}", path);

        // 卷处于挂载状态，需要共享读取
        let stdout = self
            .qemu_img(
                Command::new("qemu-img")
                    .arg("info")
                    .arg("--force-share")
                    .arg("--output=json")
                    .arg(&path),
                "info",
            )
            .await?;

        parse_snapshot_list(&stdout)
    }

    async fn remove_snapshot(&self, snapshot: &str, opts: &DriverOptions) -> Result<()> {
        let path = self.existing_image(opts)?;
        info!("Deleting snapshot {} of volume {}", snapshot, opts.volume.name);

        self.qemu_img(
            Command::new("qemu-img")
                .arg("snapshot")
                .arg("-d")
                .arg(snapshot)
                .arg(&path),
            "snapshot -d",
        )
        .await?;

        Ok(())
    }

    fn driver_type(&self) -> &str {
        "nfs"
    }
}
