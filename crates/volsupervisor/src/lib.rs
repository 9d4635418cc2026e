/// Volume Supervisor 核心库
///
/// 卷注册表、快照调度器、快照编排以及锁、存储、使用状态等协作接口

pub mod config;
pub mod lock;
pub mod orchestrator;
pub mod registry;
pub mod storage;
pub mod supervisor;
pub mod usage;

#[cfg(test)]
mod testing;
