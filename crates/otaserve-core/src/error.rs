//! 错误类型

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 通过 `--firmware` 显式指定的文件不存在
    #[error("firmware file not found: {}", .0.display())]
    FirmwareNotFound(PathBuf),

    /// 版本号无法放入 HTTP 响应头
    #[error("invalid firmware version {0:?}: must be a printable ASCII header value")]
    InvalidVersion(String),

    #[error("failed to load settings from {}: {reason}", path.display())]
    Settings { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
