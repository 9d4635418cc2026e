/// 卷注册表
///
/// 保存当前受管的卷，由外部注册接口增删，调度器每个周期复制一份使用

use common::Volume;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
pub struct VolumeRegistry {
    /// 卷映射: volume_name -> volume
    volumes: Mutex<HashMap<String, Arc<Volume>>>,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册卷，同名卷会被替换
    pub async fn add(&self, name: impl Into<String>, volume: Volume) {
        let name = name.into();
        debug!("Registering volume {} ({})", name, volume);

        let mut volumes = self.volumes.lock().await;
        volumes.insert(name, Arc::new(volume));
    }

    /// 移除卷
    pub async fn remove(&self, name: &str) -> Option<Arc<Volume>> {
        debug!("Removing volume {}", name);

        let mut volumes = self.volumes.lock().await;
        volumes.remove(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Volume>> {
        let volumes = self.volumes.lock().await;
        volumes.get(name).cloned()
    }

    /// 复制当前注册表，锁只在复制期间持有
    pub async fn snapshot(&self) -> HashMap<String, Arc<Volume>> {
        let volumes = self.volumes.lock().await;
        volumes.clone()
    }

    pub async fn len(&self) -> usize {
        self.volumes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.volumes.lock().await.is_empty()
    }
}
