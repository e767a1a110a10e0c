//! 静态配置读取
//!
//! `config.json` 只有 `upload_url` 必填，其余字段缺省时取与小部件一致的默认值。

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::image_pipeline::{DEFAULT_RESET_DELAY, DEFAULT_TARGET_EDGE, PipelineConfig, ResizeProfile, UploadConfig};

/// 默认配置文件名。
pub const DEFAULT_SETTINGS_FILE: &str = "config.json";

fn default_edge() -> u32 {
    DEFAULT_TARGET_EDGE
}

fn default_reset_delay_ms() -> u64 {
    DEFAULT_RESET_DELAY.as_millis() as u64
}

fn default_resize_profile() -> String {
    ResizeProfile::Quality.as_str().to_string()
}

fn default_jpeg_quality() -> u8 {
    PipelineConfig::default().jpeg_quality
}

fn default_connect_timeout() -> u64 {
    8
}

fn default_upload_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub upload_url: String,
    #[serde(default = "default_edge")]
    pub target_width: u32,
    #[serde(default = "default_edge")]
    pub target_height: u32,
    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,
    #[serde(default = "default_resize_profile")]
    pub resize_profile: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

impl AppSettings {
    /// 读取并校验配置文件。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::Settings(format!("配置文件不存在: {}", path.display())));
        }

        let content = fs::read_to_string(path)?;
        let settings = Self::from_json(&content)?;
        log::info!("⚙️ 已加载配置: {}", path.display());
        Ok(settings)
    }

    pub fn from_json(content: &str) -> Result<Self, AppError> {
        let settings = serde_json::from_str::<Self>(content)
            .map_err(|e| AppError::Settings(format!("解析配置文件失败: {}", e)))?;

        if settings.upload_url.trim().is_empty() {
            return Err(AppError::Settings("upload_url 不能为空".to_string()));
        }

        // 档位与尺寸在加载时校验
        settings.pipeline_config()?;
        Ok(settings)
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig, AppError> {
        let mut config = PipelineConfig {
            target_width: self.target_width,
            target_height: self.target_height,
            jpeg_quality: self.jpeg_quality,
            ..PipelineConfig::default()
        };
        config.apply_resize_profile(ResizeProfile::parse(&self.resize_profile)?);
        config.validate()?;
        Ok(config)
    }

    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            upload_url: self.upload_url.clone(),
            connect_timeout: self.connect_timeout_secs,
            upload_timeout: self.upload_timeout_secs,
        }
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}
