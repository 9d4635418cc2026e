/// 配置管理

use common::models::{constants, Volume};
use common::{Error, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// 卷使用状态查询失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageErrorPolicy {
    /// 视为正在使用，照常调度
    FailOpen,
    /// 视为未使用，跳过本次调度
    FailClosed,
}

impl FromStr for UsageErrorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail-open" => Ok(Self::FailOpen),
            "fail-closed" => Ok(Self::FailClosed),
            other => Err(Error::Config(format!(
                "unknown usage error policy {:?}, expected fail-open or fail-closed",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: String,
    pub node_name: String,
    /// 调度间隔
    pub tick_interval: Duration,
    /// 每次后端调用的超时时间
    pub global_timeout: Duration,
    /// 同时执行的快照任务上限
    pub max_concurrent_jobs: usize,
    pub usage_error_policy: UsageErrorPolicy,
    /// 未知卷默认视为正在使用
    pub assume_in_use: bool,
    /// 启动时注册的卷定义文件（JSON 数组）
    pub volumes_file: Option<PathBuf>,
    /// 配置后注册 nfs 快照驱动
    pub nfs_mount_path: Option<PathBuf>,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let node_id = lookup("NODE_ID").unwrap_or_else(common::utils::generate_id);

        let node_name = lookup("NODE_NAME").unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        });

        let tick_interval_ms: u64 = parse_var(
            &lookup,
            "TICK_INTERVAL_MS",
            constants::DEFAULT_TICK_INTERVAL_MS,
        )?;
        if tick_interval_ms == 0 {
            return Err(Error::Config("TICK_INTERVAL_MS must be positive".to_string()));
        }

        let global_timeout_secs: u64 = parse_var(
            &lookup,
            "GLOBAL_TIMEOUT_SECS",
            constants::DEFAULT_GLOBAL_TIMEOUT_SECS,
        )?;

        let max_concurrent_jobs: usize = parse_var(
            &lookup,
            "MAX_CONCURRENT_JOBS",
            constants::DEFAULT_MAX_CONCURRENT_JOBS,
        )?;
        if max_concurrent_jobs == 0 {
            return Err(Error::Config("MAX_CONCURRENT_JOBS must be at least 1".to_string()));
        }

        let usage_error_policy = lookup("USAGE_ERROR_POLICY")
            .map(|v| v.parse::<UsageErrorPolicy>())
            .transpose()?
            .unwrap_or(UsageErrorPolicy::FailOpen);

        let assume_in_use = parse_var(&lookup, "ASSUME_IN_USE", true)?;

        let volumes_file = lookup("VOLUMES_FILE").map(PathBuf::from);
        let nfs_mount_path = lookup("NFS_MOUNT_PATH").map(PathBuf::from);

        Ok(Self {
            node_id,
            node_name,
            tick_interval: Duration::from_millis(tick_interval_ms),
            global_timeout: Duration::from_secs(global_timeout_secs),
            max_concurrent_jobs,
            usage_error_policy,
            assume_in_use,
            volumes_file,
            nfs_mount_path,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

/// 读取卷定义文件
pub async fn load_volumes(path: &Path) -> Result<Vec<Volume>> {
    let content = tokio::fs::read(path).await.map_err(|e| {
        Error::Config(format!("failed to read volumes file {:?}: {}", path, e))
    })?;

    let volumes: Vec<Volume> = serde_json::from_slice(&content)?;
    Ok(volumes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup_from(&[("NODE_NAME", "node-1")])).unwrap();

        assert_eq!(cfg.node_name, "node-1");
        assert_eq!(cfg.node_id.len(), 36);
        assert_eq!(cfg.tick_interval, Duration::from_secs(1));
        assert_eq!(cfg.global_timeout, Duration::from_secs(300));
        assert_eq!(cfg.max_concurrent_jobs, 16);
        assert_eq!(cfg.usage_error_policy, UsageErrorPolicy::FailOpen);
        assert!(cfg.assume_in_use);
        assert!(cfg.volumes_file.is_none());
        assert!(cfg.nfs_mount_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("NODE_ID", "n1"),
            ("NODE_NAME", "node-1"),
            ("TICK_INTERVAL_MS", "250"),
            ("GLOBAL_TIMEOUT_SECS", "30"),
            ("MAX_CONCURRENT_JOBS", "4"),
            ("USAGE_ERROR_POLICY", "fail-closed"),
            ("ASSUME_IN_USE", "false"),
            ("NFS_MOUNT_PATH", "/mnt/nfs"),
        ]))
        .unwrap();

        assert_eq!(cfg.node_id, "n1");
        assert_eq!(cfg.tick_interval, Duration::from_millis(250));
        assert_eq!(cfg.global_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_concurrent_jobs, 4);
        assert_eq!(cfg.usage_error_policy, UsageErrorPolicy::FailClosed);
        assert!(!cfg.assume_in_use);
        assert_eq!(cfg.nfs_mount_path, Some(PathBuf::from("/mnt/nfs")));
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup_from(&[("NODE_NAME", "n"), ("MAX_CONCURRENT_JOBS", "0")]));
        assert!(matches!(err, Err(Error::Config(_))));

        let err = Config::from_lookup(lookup_from(&[("NODE_NAME", "n"), ("TICK_INTERVAL_MS", "abc")]));
        assert!(matches!(err, Err(Error::Config(_))));

        let err = Config::from_lookup(lookup_from(&[("NODE_NAME", "n"), ("USAGE_ERROR_POLICY", "maybe")]));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_load_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumes.json");
        tokio::fs::write(
            &path,
            r#"[
                {"policy": "gold", "name": "db", "backends": {"snapshot": "mock"},
                 "runtime": {"snapshots": true, "snapshot": {"frequency": "1h", "keep": 3}}},
                {"policy": "silver", "name": "logs"}
            ]"#,
        )
        .await
        .unwrap();

        let volumes = load_volumes(&path).await.unwrap();
        assert_eq!(volumes.len(), 2);
        assert!(volumes[0].snapshots_enabled());
        assert!(!volumes[1].snapshots_enabled());

        let missing = load_volumes(&dir.path().join("missing.json")).await;
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
