/// 内存快照驱动
///
/// 快照只保存在内存中，用于演练和测试，可注入失败

use async_trait::async_trait;
use common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::driver::{DriverOptions, SnapshotDriver};

/// 驱动调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Create { volume: String, snapshot: String },
    List { volume: String },
    Remove { volume: String, snapshot: String },
}

#[derive(Default)]
struct MemoryState {
    /// 快照映射: volume -> 按创建顺序排列的快照
    snapshots: HashMap<String, Vec<String>>,
    calls: Vec<DriverCall>,
    fail_create: bool,
    fail_list: bool,
    failing_removals: HashSet<String>,
}

#[derive(Default)]
pub struct MemorySnapshotDriver {
    state: Mutex<MemoryState>,
    /// 每次调用的模拟耗时
    latency: Option<Duration>,
}

impl MemorySnapshotDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            latency: Some(latency),
        }
    }

    /// 预置快照列表
    pub async fn seed(&self, volume: &str, snapshots: &[&str]) {
        let mut state = self.state.lock().await;
        state.snapshots.insert(
            volume.to_string(),
            snapshots.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub async fn snapshots(&self, volume: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state.snapshots.get(volume).cloned().unwrap_or_default()
    }

    pub async fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn set_fail_create(&self, fail: bool) {
        self.state.lock().await.fail_create = fail;
    }

    pub async fn set_fail_list(&self, fail: bool) {
        self.state.lock().await.fail_list = fail;
    }

    /// 指定快照的删除操作将失败
    pub async fn fail_removal_of(&self, snapshot: &str) {
        self.state
            .lock()
            .await
            .failing_removals
            .insert(snapshot.to_string());
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SnapshotDriver for MemorySnapshotDriver {
    async fn create_snapshot(&self, snapshot: &str, opts: &DriverOptions) -> Result<()> {
        self.simulate_latency().await;

        let volume = &opts.volume.name;
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::Create {
            volume: volume.clone(),
            snapshot: snapshot.to_string(),
        });

        if state.fail_create {
            return Err(Error::Storage(format!(
                "injected create failure for volume {}",
                volume
            )));
        }

        let list = state.snapshots.entry(volume.clone()).or_default();
        if list.iter().any(|s| s == snapshot) {
            return Err(Error::Storage(format!(
                "snapshot {} already exists for volume {}",
                snapshot, volume
            )));
        }
        list.push(snapshot.to_string());

        info!("Created in-memory snapshot {} for volume {}", snapshot, volume);
        Ok(())
    }

    async fn list_snapshots(&self, opts: &DriverOptions) -> Result<Vec<String>> {
        self.simulate_latency().await;

        let volume = &opts.volume.name;
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::List {
            volume: volume.clone(),
        });

        if state.fail_list {
            return Err(Error::Storage(format!(
                "injected list failure for volume {}",
                volume
            )));
        }

        Ok(state.snapshots.get(volume).cloned().unwrap_or_default())
    }

    async fn remove_snapshot(&self, snapshot: &str, opts: &DriverOptions) -> Result<()> {
        self.simulate_latency().await;

        let volume = &opts.volume.name;
        let mut state = self.state.lock().await;
        state.calls.push(DriverCall::Remove {
            volume: volume.clone(),
            snapshot: snapshot.to_string(),
        });

        if state.failing_removals.contains(snapshot) {
            return Err(Error::Storage(format!(
                "injected remove failure for snapshot {}",
                snapshot
            )));
        }

        let list = state
            .snapshots
            .get_mut(volume)
            .ok_or_else(|| Error::NotFound(format!("Volume {} has no snapshots", volume)))?;
        let index = list
            .iter()
            .position(|s| s == snapshot)
            .ok_or_else(|| Error::NotFound(format!("Snapshot {} not found", snapshot)))?;
        list.remove(index);

        debug!("Removed in-memory snapshot {} for volume {}", snapshot, volume);
        Ok(())
    }

    fn driver_type(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Volume;

    fn opts() -> DriverOptions {
        DriverOptions::for_volume(&Volume::new("gold", "db"), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_create_list_remove() {
        let driver = MemorySnapshotDriver::new();
        let opts = opts();

        driver.create_snapshot("s1", &opts).await.unwrap();
        driver.create_snapshot("s2", &opts).await.unwrap();
        assert!(driver.create_snapshot("s2", &opts).await.is_err());
        assert_eq!(driver.list_snapshots(&opts).await.unwrap(), vec!["s1", "s2"]);

        driver.remove_snapshot("s1", &opts).await.unwrap();
        assert_eq!(driver.snapshots("gold/db").await, vec!["s2"]);
        assert!(matches!(
            driver.remove_snapshot("s1", &opts).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let driver = MemorySnapshotDriver::new();
        let opts = opts();
        driver.seed("gold/db", &["s1", "s2"]).await;

        driver.set_fail_create(true).await;
        assert!(driver.create_snapshot("s3", &opts).await.is_err());

        driver.set_fail_list(true).await;
        assert!(driver.list_snapshots(&opts).await.is_err());

        driver.fail_removal_of("s1").await;
        assert!(driver.remove_snapshot("s1", &opts).await.is_err());
        assert_eq!(driver.snapshots("gold/db").await, vec!["s1", "s2"]);

        assert_eq!(driver.calls().await.len(), 3);
    }
}
