/// 卷操作互斥锁
///
/// 同一 (volume, reason) 键同一时刻只允许一个持有者执行

use async_trait::async_trait;
use common::{Error, LockRequest, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::debug;

/// 锁协调器 Trait
#[async_trait]
pub trait LockCoordinator: Send + Sync + 'static {
    /// 获取锁后执行 `work`，无论成功失败都释放锁，返回 `work` 的结果
    async fn execute_with_use_lock<'a>(
        &self,
        request: &LockRequest,
        work: BoxFuture<'a, Result<()>>,
    ) -> Result<()>;
}

/// 进程内锁协调器
///
/// 每个锁键对应一个异步互斥量，没有持有者和等待者时从表中移除。
/// 只保证本进程内互斥，跨节点部署需要替换为集群锁实现。
pub struct LocalLockCoordinator {
    /// 持有者标识（节点 ID）
    holder: String,
    /// 锁表: key -> mutex
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LocalLockCoordinator {
    pub fn new(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn entry(&self, key: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Lock("lock table poisoned".to_string()))?;

        Ok(locks.entry(key.to_string()).or_default().clone())
    }

    fn release(&self, key: &str, lock: &Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            // 只剩锁表和当前调用方引用时清理
            if Arc::strong_count(lock) == 2 {
                locks.remove(key);
            }
        }
    }

    /// 当前锁表中的键数量
    pub fn active_keys(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LockCoordinator for LocalLockCoordinator {
    async fn execute_with_use_lock<'a>(
        &self,
        request: &LockRequest,
        work: BoxFuture<'a, Result<()>>,
    ) -> Result<()> {
        let key = request.key();
        let lock = self.entry(&key)?;

        let result = {
            let _guard = lock.lock().await;
            debug!("Acquired lock {} (holder {})", key, self.holder);
            work.await
        };

        self.release(&key, &lock);
        debug!("Released lock {} (holder {})", key, self.holder);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::LockReason;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(LocalLockCoordinator::new("node-1"));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            handles.push(tokio::spawn(async move {
                let request = LockRequest::new("gold/db", LockReason::Snapshot);
                let work = async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                };
                locks.execute_with_use_lock(&request, work.boxed()).await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_reasons_do_not_block() {
        let locks = Arc::new(LocalLockCoordinator::new("node-1"));
        let snap = LockRequest::new("gold/db", LockReason::Snapshot);
        let prune = LockRequest::new("gold/db", LockReason::SnapshotPrune);

        let inner_locks = locks.clone();
        let result = locks
            .execute_with_use_lock(
                &snap,
                async move {
                    // 持有 snapshot 锁时仍可获取 prune 锁
                    inner_locks
                        .execute_with_use_lock(&prune, async { Ok(()) }.boxed())
                        .await
                }
                .boxed(),
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_error_releases_lock() {
        let locks = LocalLockCoordinator::new("node-1");
        let request = LockRequest::new("gold/db", LockReason::SnapshotPrune);

        let result = locks
            .execute_with_use_lock(
                &request,
                async { Err(Error::Storage("boom".to_string())) }.boxed(),
            )
            .await;
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(locks.active_keys(), 0);

        // 锁已释放，可以再次获取
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            locks.execute_with_use_lock(&request, async { Ok(()) }.boxed()),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
