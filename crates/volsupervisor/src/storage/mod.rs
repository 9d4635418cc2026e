/// 快照存储
///
/// 支持多种快照后端：NFS（qcow2 内部快照）、内存

pub mod driver;
pub mod manager;
pub mod memory;
pub mod nfs;

pub use driver::{DriverOptions, SnapshotDriver};
pub use manager::SnapshotBackends;
