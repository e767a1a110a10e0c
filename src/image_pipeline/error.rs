//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载“选图 → 解码 → 方向校正 → 降采样 → 编码 → 上传”链路中的所有错误来源，
//! 避免字符串拼接式错误处理。通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! `code()` / `stage()` 提供稳定的机器可读字段，控制器的 `failed` 状态与命令层输出都依赖它们。

/// 图片流水线统一错误类型。
///
/// 该类型会在 CLI 层被上转为 `AppError`，或经命令层转换为 `ErrorReport`。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("无效的 EXIF 方向值：{0}（仅支持 1~8）")]
    InvalidOrientation(u32),

    #[error("EXIF 方向字段格式错误：{0}")]
    MalformedOrientation(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl ImageError {
    /// 稳定错误码，供命令层与快照输出。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidOrientation(_) | Self::MalformedOrientation(_) => "E_ORIENTATION",
            Self::Encode(_) => "E_ENCODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::FileSystem(_) => "E_FILE",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
        }
    }

    /// 出错所在阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Timeout(_) => "upload",
            Self::Decode(_) => "decode",
            Self::InvalidOrientation(_) | Self::MalformedOrientation(_) => "orientation",
            Self::Encode(_) => "encode",
            Self::InvalidFormat(_) | Self::FileSystem(_) => "load",
            Self::ResourceLimit(_) => "limits",
        }
    }

    /// 是否属于上传传输层失败（控制器据此保留可上传状态）。
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// 可序列化的错误摘要，用于状态快照与命令层返回值。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub stage: &'static str,
    pub message: String,
}

impl From<&ImageError> for ErrorReport {
    fn from(error: &ImageError) -> Self {
        Self {
            code: error.code(),
            stage: error.stage(),
            message: error.to_string(),
        }
    }
}

impl From<ImageError> for ErrorReport {
    fn from(error: ImageError) -> Self {
        Self::from(&error)
    }
}
