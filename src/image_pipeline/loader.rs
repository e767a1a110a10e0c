//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理两种选图来源（本地文件路径 / Data URL）的原始字节加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 文件：存在性 + metadata 体积限制 + 读取 + 签名校验。
//! - Data URL：格式解析 + 解码前体积估算 + 解码 + 签名校验。
//! - MIME 类型以文件签名（`infer`）为准，与声明不一致时记录警告。

use base64::{Engine as _, engine::general_purpose};
use std::path::Path;

use super::source::SelectedFile;
use super::{ImageError, PipelineConfig};

/// 从本地路径读取选中的图片。
pub fn load_selected_file(path: impl AsRef<Path>, config: &PipelineConfig) -> Result<SelectedFile, ImageError> {
    let file_path = path.as_ref();
    log::info!("📁 开始读取本地图片 - 路径: {}", file_path.display());

    if !file_path.exists() {
        return Err(ImageError::FileSystem(format!("文件不存在：{}", file_path.display())));
    }

    let metadata = std::fs::metadata(file_path)
        .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;

    check_file_size(metadata.len(), config.max_file_size)?;

    let bytes = std::fs::read(file_path)
        .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
    let mime_type = detect_image_mime(&bytes)?;

    let name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    Ok(SelectedFile::new(name, mime_type, bytes))
}

impl SelectedFile {
    /// 从 Data URL（或纯 Base64）构造选中文件。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use scaled_upload::image_pipeline::{PipelineConfig, SelectedFile};
    ///
    /// let file = SelectedFile::from_data_url("dot.png", "data:image/png;base64,iVBOR...", &PipelineConfig::default())?;
    /// # Ok::<(), scaled_upload::image_pipeline::ImageError>(())
    /// ```
    pub fn from_data_url(
        name: impl Into<String>,
        data: &str,
        config: &PipelineConfig,
    ) -> Result<Self, ImageError> {
        let (declared, bytes) = parse_data_url_with_limit(data, config.max_file_size)?;
        let mime_type = detect_image_mime(&bytes)?;

        if let Some(declared) = declared.filter(|d| !d.eq_ignore_ascii_case(mime_type)) {
            log::warn!("⚠️ Data URL 声明类型 {} 与文件签名 {} 不一致，以签名为准", declared, mime_type);
        }

        Ok(Self::new(name, mime_type, bytes))
    }
}

fn check_file_size(len: u64, max_file_size: u64) -> Result<(), ImageError> {
    if len > max_file_size {
        return Err(ImageError::ResourceLimit(format!(
            "文件过大：{:.2} MB（限制：{:.2} MB）",
            len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }
    Ok(())
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

/// 解析 Data URL，返回声明的 MIME（若有）与解码后的字节。
fn parse_data_url_with_limit(data: &str, max_file_size: u64) -> Result<(Option<&str>, Vec<u8>), ImageError> {
    let normalized = data.trim();

    let (declared, payload) = match normalized.strip_prefix("data:") {
        Some(rest) => {
            let marker = rest
                .find(";base64,")
                .ok_or_else(|| ImageError::InvalidFormat("缺少 base64 标记".to_string()))?;
            let declared = &rest[..marker];
            if !declared.starts_with("image/") {
                return Err(ImageError::InvalidFormat(format!("Data URL 不是图片类型：{}", declared)));
            }
            (Some(declared), &rest[marker + 8..])
        }
        None => (None, normalized),
    };

    let estimated_len = estimate_base64_decoded_upper_bound_len(payload)?;
    if estimated_len > max_file_size {
        return Err(ImageError::ResourceLimit(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))?;

    Ok((declared, bytes))
}

/// 校验文件签名并返回探测到的 MIME 类型。
fn detect_image_mime(bytes: &[u8]) -> Result<&'static str, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ImageError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(kind.mime_type())
}
