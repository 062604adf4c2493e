//! 同步过程中的错误类型

use std::path::PathBuf;

use thiserror::Error;

/// 同步运行中可能出现的所有错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 配置无效（缺少必填项、格式错误等）
    #[error("配置错误: {0}")]
    Config(String),

    /// glob 模式无法编译
    #[error("无效的 glob 模式 '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// 列出远程对象失败，此时尚未做任何修改
    #[error("列出远程文件失败 ({location}): {source}")]
    Listing {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 本地文件枚举、stat 或读取失败
    #[error("本地 I/O 错误 {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 至少一个上传失败，删除阶段会被跳过
    #[error("{failed}/{total} 个文件上传失败: {}", keys.join(", "))]
    Upload {
        failed: usize,
        total: usize,
        keys: Vec<String>,
    },

    /// 批量删除失败或部分对象未被确认删除
    #[error("删除失败 (已删除 {deleted}/{requested}): {reason}")]
    Delete {
        requested: usize,
        deleted: usize,
        reason: String,
    },

    /// 后台任务 panic 或被取消
    #[error("后台任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// 构造 [`SyncError::LocalIo`]
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::LocalIo {
        path: path.into(),
        source,
    }
}
