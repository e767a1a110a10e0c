//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `PipelineConfig` 与 `UploadConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中重采样档位（quality / balanced / speed）作为高层语义，映射到底层滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供小部件的默认参数（600x600 目标框、3 秒自动复位、JPEG 质量 92）。
//! - `ResizeProfile` 负责档位字符串解析与反向输出。
//! - `apply_resize_profile` 将档位转换为具体滤镜。
//! - `infer_resize_profile` 用于从当前配置反推档位（给调用方展示状态）。
//! - 目标框（TargetBox）只在构造处理器时读取一次，之后不可变。

use std::time::Duration;

use image::imageops::FilterType;

use super::ImageError;
use super::geometry::Dimensions;

/// 默认目标框边长（像素）。
pub const DEFAULT_TARGET_EDGE: u32 = 600;
/// 上传成功后自动复位的默认延迟。
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(3_000);
/// 上传表单中承载图片的字段名。
pub const UPLOAD_FIELD_NAME: &str = "image";

/// 图片流水线配置。
///
/// 字段覆盖了读取、解码、降采样与编码四个阶段。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 最终预览画布宽度（像素）。
    pub target_width: u32,
    /// 最终预览画布高度（像素）。
    pub target_height: u32,
    /// 读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 降采样滤镜策略。
    pub resize_filter: FilterType,
    /// 重新编码为 JPEG 时使用的质量（1~100）。
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_EDGE,
            target_height: DEFAULT_TARGET_EDGE,
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            resize_filter: FilterType::Lanczos3,
            jpeg_quality: 92,
        }
    }
}

impl PipelineConfig {
    /// 目标框尺寸。
    pub fn target_box(&self) -> Dimensions {
        Dimensions::new(self.target_width, self.target_height)
    }

    /// 校验配置取值范围。
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(ImageError::InvalidFormat("目标框宽高必须大于 0".to_string()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ImageError::InvalidFormat("jpeg_quality 必须在 1~100 之间".to_string()));
        }
        if self.max_file_size == 0 {
            return Err(ImageError::InvalidFormat("max_file_size 不能为 0".to_string()));
        }
        Ok(())
    }

    /// 基于当前滤镜反推重采样档位。
    pub(crate) fn infer_resize_profile(&self) -> ResizeProfile {
        match self.resize_filter {
            FilterType::Lanczos3 | FilterType::Gaussian => ResizeProfile::Quality,
            FilterType::CatmullRom => ResizeProfile::Balanced,
            FilterType::Triangle | FilterType::Nearest => ResizeProfile::Speed,
        }
    }

    /// 应用指定档位到实际滤镜参数。
    pub(crate) fn apply_resize_profile(&mut self, profile: ResizeProfile) {
        self.resize_filter = match profile {
            ResizeProfile::Quality => FilterType::Lanczos3,
            ResizeProfile::Balanced => FilterType::CatmullRom,
            ResizeProfile::Speed => FilterType::Triangle,
        };
    }
}

/// 上传配置。
///
/// 上传地址由构造方显式传入，不依赖任何进程级全局状态。
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// 上传端点地址。
    pub upload_url: String,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 单次上传请求总超时时间（秒）。
    pub upload_timeout: u64,
}

impl UploadConfig {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            upload_url: upload_url.into(),
            connect_timeout: 8,
            upload_timeout: 30,
        }
    }
}

/// 重采样档位（面向用户语义）。
///
/// - `Quality`：Lanczos3，尽量保真
/// - `Balanced`：CatmullRom，质量与速度平衡
/// - `Speed`：双线性，优先速度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeProfile {
    Quality,
    Balanced,
    Speed,
}

impl ResizeProfile {
    /// 从外部字符串解析档位。
    pub fn parse(profile: &str) -> Result<Self, ImageError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ImageError::InvalidFormat(format!(
                "未知重采样档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    /// 将档位输出为稳定字符串。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}
