//! # 图片缩放上传模块（image_pipeline）
//!
//! ## 设计思路
//!
//! 该模块将“选图 → 加载校验 → 解码 → 方向校正 → 填充缩放 → 居中合成 → 上传”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `commands`：仅做入参/出参适配（薄封装）
//! - `controller`：小部件状态机、run 令牌与自动复位
//! - `handler`：编排图片流水线 + 阶段耗时日志
//! - `loader`：本地文件 / Data URL 加载与签名校验
//! - `pipeline`：解码、资源限制、重采样、方向变换、合成与编码
//! - `geometry`：填充缩放、方向表等纯函数
//! - `metadata`：EXIF 读取
//! - `uploader`：multipart 上传
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! main.rs（CLI 子命令）
//!    ↓
//! commands.rs（参数适配）
//!    ↓
//! controller.rs（状态机 + RunToken）
//!    ├─ loader.rs（读取 + 体积 / 签名校验）
//!    ├─ handler.rs（统一编排）
//!    │    ├─ pipeline.rs（解码 / 重采样 / 方向 / 合成）
//!    │    ├─ metadata.rs（EXIF 方向）
//!    │    └─ geometry.rs（填充尺寸 / 方向表）
//!    └─ uploader.rs（编码后 multipart POST）
//!    ↓
//! 返回 WidgetSnapshot / ErrorReport
//! ```
//!
//! ## 分层职责建议
//!
//! - 调用入口变更优先改 `commands.rs`
//! - 配置与策略变更优先改 `config.rs`
//! - 状态流转变更优先改 `controller.rs`
//! - 处理顺序变更优先改 `handler.rs`

pub mod commands;
mod config;
mod controller;
mod error;
pub mod geometry;
mod handler;
mod loader;
mod metadata;
mod pipeline;
mod source;
mod uploader;

#[cfg(test)]
mod test_support;

pub use config::{
    DEFAULT_RESET_DELAY, DEFAULT_TARGET_EDGE, PipelineConfig, ResizeProfile, UPLOAD_FIELD_NAME, UploadConfig,
};
pub use controller::{
    PreviewInfo, RunToken, UploadOutcome, UploadReceipt, WidgetController, WidgetSnapshot, WidgetState,
};
pub use error::{ErrorReport, ImageError};
pub use geometry::{Dimensions, Orientation};
pub use handler::ImagePipeline;
pub use loader::load_selected_file;
pub use metadata::{ExifMetadata, OrientationTag};
pub use pipeline::FALLBACK_MIME;
pub use source::{ProcessedImage, SelectedFile, UploadArtifact};
pub use uploader::{UploadResponse, Uploader};
