/// 卷使用状态查询
///
/// 调度器只为正在挂载使用的卷创建快照

use async_trait::async_trait;
use common::{Result, Volume};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// 卷使用状态查询 Trait
#[async_trait]
pub trait UsageOracle: Send + Sync + 'static {
    /// 卷当前是否被挂载使用
    async fn is_volume_in_use(&self, volume: &Volume) -> Result<bool>;
}

/// 内存中的卷使用状态表
///
/// 按卷完整名称记录状态，未记录的卷返回默认值
pub struct UsageTable {
    default_in_use: bool,
    states: RwLock<HashMap<String, bool>>,
}

impl UsageTable {
    pub fn new(default_in_use: bool) -> Self {
        Self {
            default_in_use,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_in_use(&self, volume: &Volume, in_use: bool) {
        let mut states = self.states.write().await;
        states.insert(volume.full_name(), in_use);
    }

    pub async fn clear(&self, volume: &Volume) {
        let mut states = self.states.write().await;
        states.remove(&volume.full_name());
    }
}

#[async_trait]
impl UsageOracle for UsageTable {
    async fn is_volume_in_use(&self, volume: &Volume) -> Result<bool> {
        let states = self.states.read().await;
        Ok(states
            .get(&volume.full_name())
            .copied()
            .unwrap_or(self.default_in_use))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_usage_table() {
        let table = UsageTable::new(false);
        let db = Volume::new("gold", "db");
        let logs = Volume::new("silver", "logs");

        assert!(!table.is_volume_in_use(&db).await.unwrap());

        table.set_in_use(&db, true).await;
        assert!(table.is_volume_in_use(&db).await.unwrap());
        assert!(!table.is_volume_in_use(&logs).await.unwrap());

        table.clear(&db).await;
        assert!(!table.is_volume_in_use(&db).await.unwrap());
    }

    #[tokio::test]
    async fn test_default_in_use() {
        let table = UsageTable::new(true);
        let db = Volume::new("gold", "db");
        assert!(table.is_volume_in_use(&db).await.unwrap());

        table.set_in_use(&db, false).await;
        assert!(!table.is_volume_in_use(&db).await.unwrap());
    }
}
