//! 核心错误类型
//!
//! 所有核心操作失败时都不产生副作用：失败的 `put` 不会留下记录，
//! 失败的下载/删除不会改变文件状态。

/// 协调服务错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// 未知 ID 或已被消费/删除的记录
    #[error("Not found")]
    NotFound,

    /// 存储预算不足，上传未被接纳
    #[error("Storage exhausted: requested {requested} bytes, {available} bytes available")]
    StorageExhausted { requested: u64, available: u64 },

    /// 输入格式错误，在任何修改之前被拒绝
    #[error("{0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
