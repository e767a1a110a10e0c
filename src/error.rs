//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义进程级的 `AppError` 枚举，CLI 各子命令统一返回 `Result<T, AppError>`，
//! 出错时打印可读信息并以非零状态码退出。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` / `ErrorReport` / `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，满足 `--json` 输出要求。

use serde::Serialize;

use crate::image_pipeline::{ErrorReport, ImageError};

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片流水线错误（加载 / 解码 / 方向 / 编码 / 上传）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 命令层返回的结构化错误
    #[error("[{}] {}", .0.code, .0.message)]
    Command(ErrorReport),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件缺失或非法
    #[error("配置错误: {0}")]
    Settings(String),
}

impl AppError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Image(err) => err.code(),
            Self::Command(report) => report.code,
            Self::Io(_) => "E_IO",
            Self::Settings(_) => "E_SETTINGS",
        }
    }
}

impl From<ErrorReport> for AppError {
    fn from(report: ErrorReport) -> Self {
        Self::Command(report)
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
