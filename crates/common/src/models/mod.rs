/// 共享数据模型
///
/// 定义卷、快照策略以及锁请求等数据结构

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 受管存储卷
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    /// 卷所属策略
    pub policy: String,
    /// 卷名（注册表内唯一）
    #[serde(rename = "name")]
    pub volume_name: String,
    /// 后端驱动配置
    #[serde(default)]
    pub backends: BackendDrivers,
    /// 驱动参数，例如 pool
    #[serde(default, rename = "driver")]
    pub driver_options: HashMap<String, String>,
    /// 运行时选项
    #[serde(default, rename = "runtime")]
    pub runtime_options: RuntimeOptions,
}

impl Volume {
    pub fn new(policy: impl Into<String>, volume_name: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            volume_name: volume_name.into(),
            ..Default::default()
        }
    }

    /// 完整名称 `policy/volume`，作为锁与存储驱动的目标标识
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.policy, self.volume_name)
    }

    /// 存储池参数
    pub fn pool(&self) -> &str {
        self.driver_options
            .get(constants::POOL_PARAM)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// 是否启用了快照：开关打开且配置了快照驱动
    pub fn snapshots_enabled(&self) -> bool {
        self.runtime_options.use_snapshots && !self.backends.snapshot.is_empty()
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.policy, self.volume_name)
    }
}

/// 后端驱动名称
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendDrivers {
    /// 快照驱动，为空表示不做快照
    #[serde(default)]
    pub snapshot: String,
}

/// 运行时选项
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeOptions {
    #[serde(default, rename = "snapshots")]
    pub use_snapshots: bool,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

/// 快照策略
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// 快照频率，例如 "30m"、"1h30m"
    #[serde(default)]
    pub frequency: String,
    /// 保留的快照数量
    #[serde(default)]
    pub keep: u32,
}

/// 加锁原因
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LockReason {
    Snapshot,
    SnapshotPrune,
}

impl LockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::SnapshotPrune => "snapshotPrune",
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 锁请求，按 (volume, reason) 划分互斥范围
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockRequest {
    pub volume: String,
    pub reason: LockReason,
}

impl LockRequest {
    pub fn new(volume: impl Into<String>, reason: LockReason) -> Self {
        Self {
            volume: volume.into(),
            reason,
        }
    }

    /// 锁键
    pub fn key(&self) -> String {
        format!("{}/{}", self.volume, self.reason)
    }
}

impl fmt::Display for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// 常量定义
pub mod constants {
    /// 存储池参数名
    pub const POOL_PARAM: &str = "pool";

    /// 默认调度间隔（毫秒）
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

    /// 默认后端操作超时（秒）
    pub const DEFAULT_GLOBAL_TIMEOUT_SECS: u64 = 300;

    /// 默认并发快照任务上限
    pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 16;
}
