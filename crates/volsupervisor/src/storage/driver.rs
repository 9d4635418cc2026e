/// 快照驱动抽象层
///
/// 定义统一的快照驱动接口，支持多种存储后端

use async_trait::async_trait;
use common::models::constants::POOL_PARAM;
use common::{Result, Volume};
use std::collections::HashMap;
use std::time::Duration;

/// 驱动操作的目标卷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverVolume {
    /// 卷完整名称 `policy/volume`
    pub name: String,
    /// 后端参数，例如 pool
    pub params: HashMap<String, String>,
}

/// 驱动调用参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    pub volume: DriverVolume,
    /// 单次操作超时
    pub timeout: Duration,
}

impl DriverOptions {
    pub fn for_volume(volume: &Volume, timeout: Duration) -> Self {
        let mut params = HashMap::new();
        params.insert(POOL_PARAM.to_string(), volume.pool().to_string());

        Self {
            volume: DriverVolume {
                name: volume.full_name(),
                params,
            },
            timeout,
        }
    }

    pub fn pool(&self) -> &str {
        self.volume
            .params
            .get(POOL_PARAM)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// 快照驱动 Trait
#[async_trait]
pub trait SnapshotDriver: Send + Sync + 'static {
    /// 创建快照
    async fn create_snapshot(&self, snapshot: &str, opts: &DriverOptions) -> Result<()>;

    /// 列出快照，按创建时间从旧到新排列
    async fn list_snapshots(&self, opts: &DriverOptions) -> Result<Vec<String>>;

    /// 删除快照
    async fn remove_snapshot(&self, snapshot: &str, opts: &DriverOptions) -> Result<()>;

    /// 获取驱动类型
    fn driver_type(&self) -> &str;
}
