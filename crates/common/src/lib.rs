/// Volume Supervisor - 公共库
///
/// 提供卷模型、锁请求、错误处理、工具函数等共享类型

pub mod errors;
pub mod models;
pub mod utils;

// 重新导出常用类型
pub use errors::{Error, Result};
pub use models::{LockReason, LockRequest, Volume};
