/// 快照调度器
///
/// 按固定间隔唤醒，复制卷注册表，逐个判断是否到达快照时间，
/// 到期的卷派发独立任务执行"创建 + 清理"。
///
/// 到期判断是无状态的：当前 Unix 秒数能被快照频率（秒）整除即到期，
/// 不需要持久化上次执行时间，多个调度实例同时触发时由卷锁保证互斥。
/// 精度受调度间隔限制，调度间隔应不大于 1 秒。

use chrono::Utc;
use common::{utils, Error, Result, Volume};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::config::{Config, UsageErrorPolicy};
use crate::orchestrator::SnapshotOrchestrator;
use crate::registry::VolumeRegistry;
use crate::usage::UsageOracle;

/// 调度参数
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub tick_interval: Duration,
    pub max_concurrent_jobs: usize,
    pub usage_error_policy: UsageErrorPolicy,
}

impl From<&Config> for SupervisorSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            tick_interval: cfg.tick_interval,
            max_concurrent_jobs: cfg.max_concurrent_jobs,
            usage_error_policy: cfg.usage_error_policy,
        }
    }
}

/// 解析快照频率，返回整秒数，不足 1 秒视为无效
pub fn parse_frequency(frequency: &str) -> Result<u64> {
    let duration = utils::parse_duration(frequency)?;
    match duration.as_secs() {
        0 => Err(Error::InvalidArgument(format!(
            "snapshot frequency {:?} is shorter than one second",
            frequency
        ))),
        secs => Ok(secs),
    }
}

/// 当前时间是否对齐到快照频率
pub fn is_aligned(now_unix: i64, frequency_secs: u64) -> bool {
    frequency_secs > 0 && now_unix.rem_euclid(frequency_secs as i64) == 0
}

/// 正在执行快照任务的卷
#[derive(Default)]
struct InFlight {
    volumes: Mutex<HashSet<String>>,
}

impl InFlight {
    fn try_claim(self: &Arc<Self>, name: &str) -> Option<InFlightGuard> {
        let mut volumes = self.volumes.lock().unwrap_or_else(PoisonError::into_inner);
        if !volumes.insert(name.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: self.clone(),
            name: name.to_string(),
        })
    }

    fn len(&self) -> usize {
        self.volumes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 任务结束（包括 panic）时释放卷的执行标记
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .volumes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// 快照调度器
#[derive(Clone)]
pub struct Supervisor {
    registry: Arc<VolumeRegistry>,
    usage: Arc<dyn UsageOracle>,
    orchestrator: Arc<SnapshotOrchestrator>,
    settings: SupervisorSettings,
    /// 并发任务许可
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        registry: Arc<VolumeRegistry>,
        usage: Arc<dyn UsageOracle>,
        orchestrator: Arc<SnapshotOrchestrator>,
        settings: SupervisorSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));

        Self {
            registry,
            usage,
            orchestrator,
            settings,
            permits,
            in_flight: Arc::new(InFlight::default()),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// 运行调度循环，直到调用 `shutdown`
    pub async fn run(&self) {
        info!(
            "Snapshot supervisor started (tick {:?}, max {} concurrent jobs)",
            self.settings.tick_interval, self.settings.max_concurrent_jobs
        );

        // 同一秒内只评估一次
        let mut last_evaluated = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.tick_interval) => {}
            }

            let now = Utc::now().timestamp();
            if last_evaluated == Some(now) {
                continue;
            }
            last_evaluated = Some(now);

            let dispatched = self.tick_at(now).await;
            if dispatched > 0 {
                debug!("Dispatched {} snapshot job(s)", dispatched);
            }
        }

        info!("Snapshot supervisor loop stopped");
    }

    /// 停止调度并等待已派发的任务结束
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();

        info!("Waiting for {} snapshot job(s) to finish", self.tracker.len());
        self.tracker.wait().await;
    }

    /// 执行一次调度，返回派发的任务数
    pub async fn tick_at(&self, now_unix: i64) -> usize {
        let volumes = self.registry.snapshot().await;

        let mut dispatched = 0;
        for (name, volume) in volumes {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.is_due(&name, &volume, now_unix).await && self.dispatch(name, volume) {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// 正在执行快照任务的卷数量
    pub fn jobs_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    async fn is_due(&self, name: &str, volume: &Volume, now_unix: i64) -> bool {
        match self.usage.is_volume_in_use(volume).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                error!("Could not determine whether volume {} is in use: {}", name, e);
                if self.settings.usage_error_policy == UsageErrorPolicy::FailClosed {
                    return false;
                }
            }
        }

        if !volume.snapshots_enabled() {
            return false;
        }

        // 每个周期重新解析，配置修正后下一周期即生效
        let frequency = match parse_frequency(&volume.runtime_options.snapshot.frequency) {
            Ok(secs) => secs,
            Err(e) => {
                error!("Volume {} has an invalid frequency, skipping snapshot: {}", name, e);
                return false;
            }
        };

        is_aligned(now_unix, frequency)
    }

    fn dispatch(&self, name: String, volume: Arc<Volume>) -> bool {
        let Some(guard) = self.in_flight.try_claim(&name) else {
            debug!("Snapshot job for volume {} is still running, skipping", name);
            return false;
        };

        let orchestrator = self.orchestrator.clone();
        let permits = self.permits.clone();
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let _guard = guard;

            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = cancel.cancelled() => {
                    debug!("Supervisor stopping, dropping queued job for volume {}", name);
                    return;
                }
            };

            orchestrator.create_then_prune(&volume).await;
        });

        true
    }

    #[cfg(test)]
    async fn wait_for_jobs(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
