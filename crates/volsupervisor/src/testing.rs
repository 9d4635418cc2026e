/// 测试辅助：记录锁请求、模拟失败的使用状态查询、统计并发的快照驱动

use async_trait::async_trait;
use common::{Error, LockRequest, Result, Volume};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::lock::{LocalLockCoordinator, LockCoordinator};
use crate::storage::{DriverOptions, SnapshotDriver};
use crate::usage::UsageOracle;

/// 构造一个启用快照的卷
pub fn snapshot_volume(name: &str, driver: &str, frequency: &str, keep: u32) -> Volume {
    let mut volume = Volume::new("policy", name);
    volume.backends.snapshot = driver.to_string();
    volume.runtime_options.use_snapshots = true;
    volume.runtime_options.snapshot.frequency = frequency.to_string();
    volume.runtime_options.snapshot.keep = keep;
    volume
}

/// 记录所有锁请求的锁协调器
pub struct RecordingLocks {
    inner: LocalLockCoordinator,
    requests: Mutex<Vec<LockRequest>>,
}

impl RecordingLocks {
    pub fn new() -> Self {
        Self {
            inner: LocalLockCoordinator::new("test-node"),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<LockRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LockCoordinator for RecordingLocks {
    async fn execute_with_use_lock<'a>(
        &self,
        request: &LockRequest,
        work: BoxFuture<'a, Result<()>>,
    ) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        self.inner.execute_with_use_lock(request, work).await
    }
}

/// 总是返回错误的使用状态查询
#[derive(Default)]
pub struct FailingUsage {
    calls: AtomicUsize,
}

impl FailingUsage {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageOracle for FailingUsage {
    async fn is_volume_in_use(&self, volume: &Volume) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Usage(format!("usage store unavailable for {}", volume)))
    }
}

/// 统计同时进行中的创建调用数
pub struct ProbeDriver {
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    created: AtomicUsize,
}

impl ProbeDriver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotDriver for ProbeDriver {
    async fn create_snapshot(&self, _snapshot: &str, _opts: &DriverOptions) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_snapshots(&self, _opts: &DriverOptions) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn remove_snapshot(&self, _snapshot: &str, _opts: &DriverOptions) -> Result<()> {
        Ok(())
    }

    fn driver_type(&self) -> &str {
        "probe"
    }
}
