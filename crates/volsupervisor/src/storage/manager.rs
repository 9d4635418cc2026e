/// 快照后端管理器
///
/// 按驱动名称注册和查找快照驱动

use common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::driver::SnapshotDriver;

pub struct SnapshotBackends {
    /// 驱动映射: driver name -> driver
    drivers: Arc<RwLock<HashMap<String, Arc<dyn SnapshotDriver>>>>,
}

impl SnapshotBackends {
    pub fn new() -> Self {
        Self {
            drivers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册快照驱动，同名驱动会被替换
    pub async fn register(&self, name: impl Into<String>, driver: Arc<dyn SnapshotDriver>) {
        let name = name.into();
        info!("Registering snapshot driver: {} (type: {})", name, driver.driver_type());

        let mut drivers = self.drivers.write().await;
        drivers.insert(name, driver);
    }

    /// 根据名称获取快照驱动
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn SnapshotDriver>> {
        let drivers = self.drivers.read().await;
        drivers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Snapshot driver {} not found", name)))
    }

    /// 获取已注册的驱动列表
    pub async fn registered(&self) -> Vec<String> {
        let drivers = self.drivers.read().await;
        let mut names: Vec<String> = drivers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for SnapshotBackends {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemorySnapshotDriver;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let backends = SnapshotBackends::new();
        backends
            .register("mock", Arc::new(MemorySnapshotDriver::new()))
            .await;

        let driver = backends.resolve("mock").await.unwrap();
        assert_eq!(driver.driver_type(), "mock");
        assert_eq!(backends.registered().await, vec!["mock".to_string()]);

        let missing = backends.resolve("ceph").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }
}
