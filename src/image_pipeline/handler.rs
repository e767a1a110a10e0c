//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ImagePipeline` 只负责流程编排与配置管理，不关心状态机与上传。
//! 处理链路固定为：
//! 1. 读取配置快照，获取原始字节句柄并解码
//! 2. 读取 EXIF 方向（越界值立即失败，不做无用的重采样）
//! 3. 按填充规则计算尺寸，超出像素 / 内存上限即失败，否则重采样
//! 4. 方向校正 + 居中合成
//! 5. 标记完成
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<PipelineConfig>>` 支持运行时切换重采样档位。
//! - 目标框在构造时固定，之后切档不会改变画布尺寸。
//! - 单次处理使用“同一配置快照”，避免处理中途配置漂移。
//! - CPU 密集阶段放到 `spawn_blocking`，每个阶段结束都是一次让出点。
//! - 记录 `decode/exif/resize/compose/total` 阶段耗时，便于性能诊断。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::geometry::{self, Dimensions};
use super::metadata::ExifMetadata;
use super::source::{FileHandleGuard, ProcessedImage, SelectedFile};
use super::{ImageError, PipelineConfig, ResizeProfile, pipeline};

/// 图片处理流水线。
pub struct ImagePipeline {
    config: Arc<RwLock<PipelineConfig>>,
    target: Dimensions,
    live_handles: Arc<AtomicUsize>,
}

impl ImagePipeline {
    /// 根据初始配置创建流水线。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use scaled_upload::image_pipeline::{ImagePipeline, PipelineConfig};
    ///
    /// let pipeline = ImagePipeline::new(PipelineConfig::default())?;
    /// assert_eq!(pipeline.target_box().width, 600);
    /// # Ok::<(), scaled_upload::image_pipeline::ImageError>(())
    /// ```
    pub fn new(config: PipelineConfig) -> Result<Self, ImageError> {
        config.validate()?;
        let target = config.target_box();

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            target,
            live_handles: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<PipelineConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    pub fn target_box(&self) -> Dimensions {
        self.target
    }

    /// 尚未释放的原始字节句柄数；每次处理结束后应回到 0。
    pub fn live_file_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    /// 切换重采样档位。
    pub fn set_resize_profile(&self, profile: ResizeProfile) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_resize_profile(profile);

        log::info!("⚙️ 已切换重采样档位：{:?}（filter={:?}）", profile, config.resize_filter);
        Ok(())
    }

    pub fn get_resize_profile(&self) -> Result<ResizeProfile, ImageError> {
        let config = self
            .config
            .read()
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_resize_profile())
    }

    /// 处理主入口：把选中的文件变成与目标框等大的预览画布。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use scaled_upload::image_pipeline::{load_selected_file, ImagePipeline, PipelineConfig};
    ///
    /// # async fn demo() -> Result<(), scaled_upload::image_pipeline::ImageError> {
    /// let pipeline = ImagePipeline::new(PipelineConfig::default())?;
    /// let file = load_selected_file("photo.jpg", &PipelineConfig::default())?;
    /// let processed = pipeline.process(file).await?;
    /// assert!(processed.complete);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn process(&self, file: SelectedFile) -> Result<ProcessedImage, ImageError> {
        let config = self.config_snapshot()?;
        let target = self.target;
        let total_start = Instant::now();

        let decode_start = Instant::now();
        let guard = FileHandleGuard::acquire(file.bytes.clone(), Arc::clone(&self.live_handles));
        let decode_config = config.clone();
        let decoded = run_blocking("decode", move || {
            // 句柄在任务内部随作用域释放（含 panic 展开）
            let guard = guard;
            pipeline::decode_with_limits(guard.bytes(), &decode_config)
        })
        .await?;
        let natural = Dimensions::new(decoded.width(), decoded.height());
        let decode_elapsed = decode_start.elapsed();

        let exif_start = Instant::now();
        let raw = file.bytes.clone();
        let metadata = run_blocking("exif", move || Ok(ExifMetadata::read(&raw))).await?;
        let orientation = metadata.orientation()?;
        let exif_elapsed = exif_start.elapsed();

        let resize_start = Instant::now();
        let scaled = geometry::fill(target, natural);
        pipeline::validate_fill_limits(&config, scaled)?;
        let filter = config.resize_filter;
        let resampled = run_blocking("resize", move || Ok(pipeline::resample_to(decoded, scaled, filter))).await?;
        let resize_elapsed = resize_start.elapsed();

        let compose_start = Instant::now();
        let canvas = run_blocking("compose", move || {
            let oriented = pipeline::apply_orientation(resampled, orientation);
            Ok(pipeline::composite_centered(target, &oriented))
        })
        .await?;
        let oriented = geometry::oriented_size(scaled, orientation);
        let compose_elapsed = compose_start.elapsed();

        log::info!(
            "✅ 图片处理完成 - {} {} -> {} (orientation={}) -> {} decode={}ms exif={}ms resize={}ms compose={}ms total={}ms",
            file.name,
            natural,
            scaled,
            orientation.code(),
            target,
            decode_elapsed.as_millis(),
            exif_elapsed.as_millis(),
            resize_elapsed.as_millis(),
            compose_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(ProcessedImage {
            name: file.name,
            mime_type: file.mime_type,
            natural,
            scaled,
            oriented,
            orientation,
            canvas,
            complete: true,
        })
    }
}

/// 在阻塞线程池执行单个阶段。
async fn run_blocking<T, F>(stage: &'static str, task: F) -> Result<T, ImageError>
where
    F: FnOnce() -> Result<T, ImageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ImageError::Decode(format!("{} 阶段任务异常终止：{}", stage, e)))?
}
