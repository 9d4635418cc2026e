/// Volume Supervisor
///
/// 卷快照调度程序，按卷的快照策略定期创建快照并清理超出保留数量的旧快照

use std::sync::Arc;
use tracing::{info, warn};

use volsupervisor::config;
use volsupervisor::lock::LocalLockCoordinator;
use volsupervisor::orchestrator::SnapshotOrchestrator;
use volsupervisor::registry::VolumeRegistry;
use volsupervisor::storage::memory::MemorySnapshotDriver;
use volsupervisor::storage::nfs::NfsSnapshotDriver;
use volsupervisor::storage::SnapshotBackends;
use volsupervisor::supervisor::{Supervisor, SupervisorSettings};
use volsupervisor::usage::UsageTable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    // 可以通过环境变量 RUST_LOG 设置日志级别，例如：
    // RUST_LOG=volsupervisor=info cargo run
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
        )
        .init();

    info!("🚀 启动 Volume Supervisor...");

    // 加载配置
    dotenvy::dotenv().ok();
    let cfg = config::Config::from_env()?;
    info!("✅ 配置加载成功 (node: {} / {})", cfg.node_name, cfg.node_id);

    // 注册快照驱动
    info!("💾 初始化快照驱动...");
    let backends = Arc::new(SnapshotBackends::new());
    backends
        .register("mock", Arc::new(MemorySnapshotDriver::new()))
        .await;
    if let Some(mount_path) = &cfg.nfs_mount_path {
        backends
            .register("nfs", Arc::new(NfsSnapshotDriver::new(mount_path)))
            .await;
    }

    // 初始化卷注册表
    let registry = Arc::new(VolumeRegistry::new());
    if let Some(path) = &cfg.volumes_file {
        let volumes = config::load_volumes(path).await?;
        let registered = backends.registered().await;
        for volume in volumes {
            if !volume.backends.snapshot.is_empty() && !registered.contains(&volume.backends.snapshot) {
                warn!(
                    "Volume {} uses unregistered snapshot driver {}",
                    volume, volume.backends.snapshot
                );
            }
            registry.add(volume.volume_name.clone(), volume).await;
        }
        info!("✅ 已从 {:?} 注册 {} 个卷", path, registry.len().await);
    }

    let locks = Arc::new(LocalLockCoordinator::new(cfg.node_id.clone()));
    let usage = Arc::new(UsageTable::new(cfg.assume_in_use));
    let orchestrator = Arc::new(SnapshotOrchestrator::new(
        locks,
        backends,
        cfg.global_timeout,
    ));

    let supervisor = Supervisor::new(
        registry,
        usage,
        orchestrator,
        SupervisorSettings::from(&cfg),
    );

    let runner = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run().await })
    };
    info!("🎯 快照调度已启动");

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，等待快照任务结束...");

    supervisor.shutdown().await;
    runner.await?;

    info!("👋 Volume Supervisor 已退出");
    Ok(())
}
