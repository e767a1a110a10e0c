//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线中间结果”解耦：
//! - `SelectedFile` 表示用户选中的文件（文件名 + MIME + 原始字节）
//! - `FileHandleGuard` 表示流水线对原始字节的临时占用，离开作用域即释放
//! - `ProcessedImage` 表示处理完成、可预览的画布
//! - `UploadArtifact` 表示一次上传所需的编码结果，按需生成、不缓存

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use image::RgbaImage;

use super::geometry::{Dimensions, Orientation};
use super::{ImageError, PipelineConfig, pipeline};

/// 用户选中的图片文件。
#[derive(Debug, Clone)]
pub struct SelectedFile {
    /// 原始文件名（上传时原样带回）。
    pub name: String,
    /// 声明或探测得到的 MIME 类型。
    pub mime_type: String,
    /// 文件原始字节。
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// 原始字节的临时句柄。
///
/// 构造时活跃计数加一，`Drop` 时减一。
/// 无论解码成功、失败还是任务 panic，句柄都会随作用域结束释放。
pub(crate) struct FileHandleGuard {
    id: u64,
    bytes: Bytes,
    live: Arc<AtomicUsize>,
}

impl FileHandleGuard {
    pub(crate) fn acquire(bytes: Bytes, live: Arc<AtomicUsize>) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        let outstanding = live.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("📎 获取文件句柄 #{} - {} bytes（活跃: {}）", id, bytes.len(), outstanding);
        Self { id, bytes, live }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for FileHandleGuard {
    fn drop(&mut self) {
        let remaining = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        log::debug!("🧹 释放文件句柄 #{}（剩余: {}）", self.id, remaining);
    }
}

/// 流水线输出：已完成方向校正与居中合成的预览画布。
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub name: String,
    pub mime_type: String,
    /// 源图自然尺寸。
    pub natural: Dimensions,
    /// 填充缩放后的尺寸（方向校正前）。
    pub scaled: Dimensions,
    /// 方向校正后的尺寸。
    pub oriented: Dimensions,
    pub orientation: Orientation,
    /// 与目标框等大的 RGBA 画布。
    pub canvas: RgbaImage,
    /// 画布是否已完整绘制；只有完成的画布才允许上传。
    pub complete: bool,
}

impl ProcessedImage {
    pub fn canvas_size(&self) -> Dimensions {
        Dimensions::new(self.canvas.width(), self.canvas.height())
    }

    /// 把画布编码为上传载荷。
    ///
    /// 每次调用都重新编码，结果不缓存。
    pub fn to_upload_artifact(&self, config: &PipelineConfig) -> Result<UploadArtifact, ImageError> {
        if !self.complete {
            return Err(ImageError::Encode("画布尚未完成，无法编码".to_string()));
        }

        let (bytes, mime_type) = pipeline::encode_canvas(&self.canvas, &self.mime_type, config.jpeg_quality)?;

        Ok(UploadArtifact {
            file_name: self.name.clone(),
            mime_type: mime_type.to_string(),
            bytes: Bytes::from(bytes),
        })
    }
}

/// 一次上传的载荷。
#[derive(Debug, Clone)]
pub struct UploadArtifact {
    pub file_name: String,
    /// 实际使用的编码类型（可能因回退与原始类型不同）。
    pub mime_type: String,
    pub bytes: Bytes,
}
