/// 快照编排
///
/// 对单个卷执行一次"创建快照 + 清理旧快照"，每一步都在对应的卷锁内完成

use chrono::{DateTime, Utc};
use common::{Error, LockReason, LockRequest, Result, Volume};
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::lock::LockCoordinator;
use crate::storage::{DriverOptions, SnapshotBackends};

/// 一次清理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    /// 已删除的快照
    pub removed: Vec<String>,
    /// 删除失败的快照
    pub failed: Vec<String>,
}

pub struct SnapshotOrchestrator {
    locks: Arc<dyn LockCoordinator>,
    backends: Arc<SnapshotBackends>,
    /// 每次后端调用的超时时间
    timeout: Duration,
    /// 上一个快照名称使用的时间戳（纳秒），保证名称单调递增
    last_stamp: AtomicI64,
}

impl SnapshotOrchestrator {
    pub fn new(
        locks: Arc<dyn LockCoordinator>,
        backends: Arc<SnapshotBackends>,
        timeout: Duration,
    ) -> Self {
        Self {
            locks,
            backends,
            timeout,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    /// 生成快照名称，同一编排器内不会重复
    fn next_snapshot_name(&self) -> String {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        let stamp = now.max(previous.saturating_add(1));

        common::utils::snapshot_name(DateTime::from_timestamp_nanos(stamp))
    }

    async fn bounded<T, F>(&self, action: &str, volume: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{} for volume {} exceeded {:?}",
                    action, volume, self.timeout
                ))
            })?
    }

    /// 创建快照
    pub async fn create_snapshot(&self, volume: &Volume) -> Result<()> {
        if !volume.snapshots_enabled() {
            debug!("Snapshots disabled for volume {}, not snapshotting", volume);
            return Ok(());
        }

        info!("Snapshotting {}", volume);
        let request = LockRequest::new(volume.full_name(), LockReason::Snapshot);

        let work = async {
            let driver_name = &volume.backends.snapshot;
            let driver = self.backends.resolve(driver_name).await.map_err(|e| {
                error!("Error establishing driver backend {}; cannot snapshot: {}", driver_name, e);
                e
            })?;

            let opts = DriverOptions::for_volume(volume, self.timeout);
            let snapshot = self.next_snapshot_name();

            self.bounded(
                "create snapshot",
                &opts.volume.name,
                driver.create_snapshot(&snapshot, &opts),
            )
            .await?;

            info!("Created snapshot {} for volume {}", snapshot, volume);
            Ok::<_, Error>(())
        };

        let result = self.locks.execute_with_use_lock(&request, work.boxed()).await;
        if let Err(e) = &result {
            error!("Error creating snapshot for volume {}: {}", volume, e);
        }
        result
    }

    /// 清理超出保留数量的旧快照
    ///
    /// 逐个删除最旧的快照，单个删除失败只记录日志，不影响其余快照
    pub async fn prune_snapshots(&self, volume: &Volume) -> Result<PruneOutcome> {
        info!("Starting snapshot prune for {}", volume);

        if volume.backends.snapshot.is_empty() {
            debug!("Snapshot driver for volume {} was empty, not pruning", volume);
            return Ok(PruneOutcome::default());
        }

        let request = LockRequest::new(volume.full_name(), LockReason::SnapshotPrune);
        let mut outcome = PruneOutcome::default();

        let work = async {
            let driver_name = &volume.backends.snapshot;
            let driver = self.backends.resolve(driver_name).await.map_err(|e| {
                error!("Failed to get snapshot driver {}: {}", driver_name, e);
                e
            })?;

            let opts = DriverOptions::for_volume(volume, self.timeout);

            let list = self
                .bounded("list snapshots", &opts.volume.name, driver.list_snapshots(&opts))
                .await
                .map_err(|e| {
                    error!("Could not list snapshots for volume {}: {}", volume, e);
                    e
                })?;

            let keep = volume.runtime_options.snapshot.keep as usize;
            debug!("Volume {}: keeping {} of {} snapshots", volume, keep, list.len());

            let overflow = list.len().saturating_sub(keep);
            for snapshot in list.into_iter().take(overflow) {
                info!("Removing snapshot {} for volume {}", snapshot, volume);

                let removal = self
                    .bounded(
                        "remove snapshot",
                        &opts.volume.name,
                        driver.remove_snapshot(&snapshot, &opts),
                    )
                    .await;

                match removal {
                    Ok(()) => outcome.removed.push(snapshot),
                    Err(e) => {
                        error!("Removing snapshot {} for volume {} failed: {}", snapshot, volume, e);
                        outcome.failed.push(snapshot);
                    }
                }
            }

            Ok::<_, Error>(())
        };

        let result = self.locks.execute_with_use_lock(&request, work.boxed()).await;
        match result {
            Ok(()) => Ok(outcome),
            Err(e) => {
                error!("Error pruning snapshots for volume {}: {}", volume, e);
                Err(e)
            }
        }
    }

    /// 先创建再清理，创建失败时仍执行清理
    pub async fn create_then_prune(&self, volume: &Volume) {
        if self.create_snapshot(volume).await.is_err() {
            warn!("Snapshot of volume {} failed, continuing with prune", volume);
        }

        if let Ok(outcome) = self.prune_snapshots(volume).await {
            if !outcome.failed.is_empty() {
                warn!(
                    "Prune of volume {} left {} snapshot(s) behind: {:?}",
                    volume,
                    outcome.failed.len(),
                    outcome.failed
                );
            }
        }
    }
}
