//! # 小部件状态机（可注入状态）
//!
//! ## 设计思路
//!
//! `WidgetController` 是无界面的“选图 → 预览 → 上传”小部件：
//! 持有流水线与上传客户端，对外暴露少量稳定操作，内部维护一个显式状态机。
//!
//! ```text
//! empty ──选图──▶ scaling ──完成──▶ uploadable ──上传成功──▶ uploaded ──延时──▶ empty
//!                    │                  ▲  │
//!                    └──失败──▶ failed  └──┘ 上传传输失败（保持可上传，记录 last_error）
//! uploadable ──编码失败──▶ failed
//! 任意状态 ──cancel──▶ empty；任意状态 ──选图──▶ scaling
//! ```
//!
//! ## 实现思路
//!
//! - 每次选图生成递增的 `RunToken`；流水线完成时令牌不匹配即丢弃结果，
//!   从而消除“旧回调覆盖新状态”的竞争。取消不会中断正在运行的阶段，只让其结果作废。
//! - 自动复位是一个 `tokio::spawn` 的延时任务，同样以令牌守卫。
//! - 上传请求发出前在锁内置 `uploading` 标记，请求结束前的重复上传直接返回 `Skipped`。
//! - 状态放在 `Arc<Mutex<_>>` 中；锁中毒映射为 `ImageError::ResourceLimit`，不 panic。

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::loader::load_selected_file;
use super::source::{ProcessedImage, SelectedFile, UploadArtifact};
use super::uploader::{UploadResponse, Uploader};
use super::{
    DEFAULT_RESET_DELAY, Dimensions, ErrorReport, ImageError, ImagePipeline, PipelineConfig, UploadConfig,
};

/// 小部件状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetState {
    Empty,
    Scaling,
    Uploadable,
    Uploaded,
    Failed,
}

/// 单次处理的身份标识，单调递增。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct RunToken(u64);

impl RunToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct ControllerInner {
    state: WidgetState,
    generation: u64,
    file_name: Option<String>,
    image: Option<Arc<ProcessedImage>>,
    last_error: Option<ErrorReport>,
    uploading: bool,
}

impl ControllerInner {
    fn new() -> Self {
        Self {
            state: WidgetState::Empty,
            generation: 0,
            file_name: None,
            image: None,
            last_error: None,
            uploading: false,
        }
    }

    /// 清空并作废当前 run。
    fn clear(&mut self) {
        self.generation += 1;
        self.state = WidgetState::Empty;
        self.file_name = None;
        self.image = None;
        self.last_error = None;
        self.uploading = false;
    }
}

/// 预览画布的尺寸信息。
#[derive(Debug, Clone, serde::Serialize)]
pub struct PreviewInfo {
    pub mime_type: String,
    pub natural: Dimensions,
    pub scaled: Dimensions,
    pub oriented: Dimensions,
    pub canvas: Dimensions,
    pub orientation: u32,
}

/// 对外状态快照。
#[derive(Debug, Clone, serde::Serialize)]
pub struct WidgetSnapshot {
    pub state: WidgetState,
    pub run: u64,
    pub file_name: Option<String>,
    pub preview: Option<PreviewInfo>,
    pub last_error: Option<ErrorReport>,
    /// 上传请求是否在途。
    pub uploading: bool,
}

/// 上传回执。
#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadReceipt {
    pub status: u16,
    pub body: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes_sent: usize,
    /// 毫秒时间戳（UTC）。
    pub uploaded_at: i64,
}

/// 上传调用的结果。
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// 当前状态不允许上传，未发起任何网络请求。
    Skipped { state: WidgetState },
    Uploaded(UploadReceipt),
}

fn lock_inner(inner: &Mutex<ControllerInner>) -> Result<MutexGuard<'_, ControllerInner>, ImageError> {
    inner
        .lock()
        .map_err(|_| ImageError::ResourceLimit("小部件状态锁已中毒".to_string()))
}

/// 小部件控制器。
pub struct WidgetController {
    pipeline: ImagePipeline,
    uploader: Uploader,
    reset_delay: Duration,
    inner: Arc<Mutex<ControllerInner>>,
}

impl WidgetController {
    pub fn new(pipeline: ImagePipeline, uploader: Uploader, reset_delay: Duration) -> Self {
        Self {
            pipeline,
            uploader,
            reset_delay,
            inner: Arc::new(Mutex::new(ControllerInner::new())),
        }
    }

    /// 使用给定配置与默认复位延迟创建控制器。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use scaled_upload::image_pipeline::{PipelineConfig, UploadConfig, WidgetController};
    ///
    /// let controller = WidgetController::with_config(
    ///     PipelineConfig::default(),
    ///     &UploadConfig::new("http://localhost:8080/upload"),
    /// )?;
    /// # Ok::<(), scaled_upload::image_pipeline::ImageError>(())
    /// ```
    pub fn with_config(pipeline: PipelineConfig, upload: &UploadConfig) -> Result<Self, ImageError> {
        Ok(Self::new(
            ImagePipeline::new(pipeline)?,
            Uploader::new(upload)?,
            DEFAULT_RESET_DELAY,
        ))
    }

    pub fn pipeline(&self) -> &ImagePipeline {
        &self.pipeline
    }

    pub fn reset_delay(&self) -> Duration {
        self.reset_delay
    }

    /// 开始新的 run：进入 `scaling`，丢弃旧图片。
    pub fn begin_selection(&self, file_name: &str) -> Result<RunToken, ImageError> {
        let mut inner = lock_inner(&self.inner)?;
        let previous = inner.state;

        inner.generation += 1;
        inner.state = WidgetState::Scaling;
        inner.file_name = Some(file_name.to_string());
        inner.image = None;
        inner.last_error = None;
        inner.uploading = false;

        log::info!("🖼️ 开始处理 {} - run #{}（{:?} -> Scaling）", file_name, inner.generation, previous);
        Ok(RunToken(inner.generation))
    }

    /// 提交 run 的结果；令牌过期或已不在 `scaling` 时忽略并返回 `false`。
    pub fn finish_selection(
        &self,
        token: RunToken,
        result: Result<ProcessedImage, ErrorReport>,
    ) -> Result<bool, ImageError> {
        let mut inner = lock_inner(&self.inner)?;

        if inner.generation != token.0 || inner.state != WidgetState::Scaling {
            log::debug!(
                "⏭️ 丢弃过期结果 - run #{}（当前 run #{}，状态 {:?}）",
                token.0,
                inner.generation,
                inner.state
            );
            return Ok(false);
        }

        match result {
            Ok(image) => {
                inner.state = WidgetState::Uploadable;
                inner.image = Some(Arc::new(image));
            }
            Err(report) => {
                log::warn!("❌ 处理失败 - run #{} [{}] {}", token.0, report.code, report.message);
                inner.state = WidgetState::Failed;
                inner.last_error = Some(report);
            }
        }

        Ok(true)
    }

    /// 处理已读入内存的文件。
    ///
    /// 流水线失败时状态进入 `failed`，同时把错误返回给调用方。
    pub async fn select_file(&self, file: SelectedFile) -> Result<WidgetSnapshot, ImageError> {
        let token = self.begin_selection(&file.name)?;
        let result = self.pipeline.process(file).await;
        self.complete_run(token, result)
    }

    /// 从本地路径选图；读取失败同样计入本次 run。
    pub async fn select_path(&self, path: impl AsRef<Path>) -> Result<WidgetSnapshot, ImageError> {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.run_selection(name, move |config| load_selected_file(&path, &config))
            .await
    }

    /// 从 Data URL 选图。
    pub async fn select_data_url(&self, name: &str, data: String) -> Result<WidgetSnapshot, ImageError> {
        let file_name = name.to_string();
        self.run_selection(name.to_string(), move |config| {
            SelectedFile::from_data_url(file_name, &data, &config)
        })
        .await
    }

    async fn run_selection<L>(&self, name: String, load: L) -> Result<WidgetSnapshot, ImageError>
    where
        L: FnOnce(PipelineConfig) -> Result<SelectedFile, ImageError> + Send + 'static,
    {
        let token = self.begin_selection(&name)?;

        let result = async {
            let config = self.pipeline.config_snapshot()?;
            let file = tokio::task::spawn_blocking(move || load(config))
                .await
                .map_err(|e| ImageError::FileSystem(format!("读取任务异常终止：{}", e)))??;
            self.pipeline.process(file).await
        }
        .await;

        self.complete_run(token, result)
    }

    fn complete_run(
        &self,
        token: RunToken,
        result: Result<ProcessedImage, ImageError>,
    ) -> Result<WidgetSnapshot, ImageError> {
        match result {
            Ok(image) => {
                self.finish_selection(token, Ok(image))?;
                self.snapshot()
            }
            Err(err) => {
                self.finish_selection(token, Err(ErrorReport::from(&err)))?;
                Err(err)
            }
        }
    }

    /// 清空小部件；正在进行的 run 结果将被丢弃。
    pub fn cancel(&self) -> Result<(), ImageError> {
        let mut inner = lock_inner(&self.inner)?;
        let previous = inner.state;
        inner.clear();

        log::info!("🗑️ 已清空小部件（{:?} -> Empty，run #{}）", previous, inner.generation);
        Ok(())
    }

    /// 上传当前画布。
    ///
    /// 只有 `uploadable`、画布已完成且没有在途请求时才发起上传，否则返回 `Skipped`。
    /// 传输失败时保持 `uploadable` 并记录 `last_error`，不自动重试；编码失败进入 `failed`。
    pub async fn upload(&self) -> Result<UploadOutcome, ImageError> {
        let (token, image) = {
            let mut inner = lock_inner(&self.inner)?;
            let ready = match &inner.image {
                Some(image) if inner.state == WidgetState::Uploadable && image.complete && !inner.uploading => {
                    Some(Arc::clone(image))
                }
                _ => None,
            };

            let Some(image) = ready else {
                if inner.uploading {
                    log::info!("⏸️ 上传进行中，忽略重复请求");
                } else {
                    log::info!("⏸️ 当前状态 {:?} 不可上传，已忽略", inner.state);
                }
                return Ok(UploadOutcome::Skipped { state: inner.state });
            };

            inner.uploading = true;
            (RunToken(inner.generation), image)
        };

        match self.encode_and_send(image).await {
            Ok((artifact, response)) => {
                let receipt = UploadReceipt {
                    status: response.status,
                    body: response.body,
                    file_name: artifact.file_name,
                    mime_type: artifact.mime_type,
                    bytes_sent: artifact.bytes.len(),
                    uploaded_at: chrono::Utc::now().timestamp_millis(),
                };

                let applied = {
                    let mut inner = lock_inner(&self.inner)?;
                    if inner.generation == token.0 {
                        inner.uploading = false;
                    }
                    if inner.generation == token.0 && inner.state == WidgetState::Uploadable {
                        inner.state = WidgetState::Uploaded;
                        inner.last_error = None;
                        true
                    } else {
                        log::debug!("⏭️ 上传完成时 run #{} 已被替换，不切换状态", token.0);
                        false
                    }
                };

                if applied {
                    self.schedule_reset(token);
                }

                Ok(UploadOutcome::Uploaded(receipt))
            }
            Err(err) => {
                let mut inner = lock_inner(&self.inner)?;
                if inner.generation == token.0 {
                    inner.uploading = false;
                    inner.last_error = Some(ErrorReport::from(&err));
                    if err.is_transport() {
                        log::warn!("⚠️ 上传失败，保持可上传状态：{}", err);
                    } else {
                        log::warn!("❌ 上传前处理失败 - run #{} [{}] {}", token.0, err.code(), err);
                        inner.state = WidgetState::Failed;
                    }
                }
                Err(err)
            }
        }
    }

    async fn encode_and_send(
        &self,
        image: Arc<ProcessedImage>,
    ) -> Result<(UploadArtifact, UploadResponse), ImageError> {
        let config = self.pipeline.config_snapshot()?;
        let artifact = tokio::task::spawn_blocking(move || image.to_upload_artifact(&config))
            .await
            .map_err(|e| ImageError::Encode(format!("编码任务异常终止：{}", e)))??;

        let response = self.uploader.upload(&artifact).await?;
        Ok((artifact, response))
    }

    /// 延时复位：到期时若仍是同一 run 且处于 `uploaded`，则回到 `empty`。
    pub(crate) fn schedule_reset(&self, token: RunToken) -> tokio::task::JoinHandle<bool> {
        let inner = Arc::clone(&self.inner);
        let delay = self.reset_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Ok(mut guard) = inner.lock() else {
                log::warn!("⚠️ 自动复位时状态锁已中毒，跳过");
                return false;
            };

            if guard.generation != token.0 || guard.state != WidgetState::Uploaded {
                log::debug!("⏭️ 自动复位已过期 - run #{}", token.0);
                return false;
            }

            guard.clear();
            log::info!("🔄 上传完成 {}ms 后已自动复位", delay.as_millis());
            true
        })
    }

    pub fn state(&self) -> Result<WidgetState, ImageError> {
        Ok(lock_inner(&self.inner)?.state)
    }

    pub fn current_token(&self) -> Result<RunToken, ImageError> {
        Ok(RunToken(lock_inner(&self.inner)?.generation))
    }

    /// 当前持有的预览画布。
    pub fn image(&self) -> Result<Option<Arc<ProcessedImage>>, ImageError> {
        Ok(lock_inner(&self.inner)?.image.clone())
    }

    pub fn snapshot(&self) -> Result<WidgetSnapshot, ImageError> {
        let inner = lock_inner(&self.inner)?;

        let preview = inner.image.as_ref().map(|image| PreviewInfo {
            mime_type: image.mime_type.clone(),
            natural: image.natural,
            scaled: image.scaled,
            oriented: image.oriented,
            canvas: image.canvas_size(),
            orientation: image.orientation.code(),
        });

        Ok(WidgetSnapshot {
            state: inner.state,
            run: inner.generation,
            file_name: inner.file_name.clone(),
            preview,
            last_error: inner.last_error.clone(),
            uploading: inner.uploading,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::test_support::{
        jpeg_bytes, one_shot_server, png_bytes, processed_fixture, with_orientation,
    };
    use std::io::ErrorKind;
    use std::net::TcpListener;

    fn small_pipeline() -> ImagePipeline {
        let mut config = PipelineConfig::default();
        config.target_width = 16;
        config.target_height = 16;
        ImagePipeline::new(config).expect("pipeline init failed")
    }

    fn controller(url: &str, reset_delay: Duration) -> WidgetController {
        let uploader = Uploader::new(&UploadConfig::new(url)).expect("uploader init failed");
        WidgetController::new(small_pipeline(), uploader, reset_delay)
    }

    fn ready(controller: &WidgetController) -> RunToken {
        let token = controller.begin_selection("fixture.png").expect("begin failed");
        assert!(
            controller
                .finish_selection(token, Ok(processed_fixture("fixture.png")))
                .expect("finish failed")
        );
        token
    }

    #[tokio::test]
    async fn upload_before_completion_opens_no_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        listener.set_nonblocking(true).expect("set nonblocking failed");
        let url = format!("http://127.0.0.1:{}/upload", listener.local_addr().expect("addr failed").port());
        let controller = controller(&url, Duration::from_secs(3));

        let empty = controller.upload().await.expect("upload should not error");
        assert!(matches!(empty, UploadOutcome::Skipped { state: WidgetState::Empty }));

        controller.begin_selection("slow.png").expect("begin failed");
        let scaling = controller.upload().await.expect("upload should not error");
        assert!(matches!(scaling, UploadOutcome::Skipped { state: WidgetState::Scaling }));

        let accepted = listener.accept();
        assert!(matches!(accepted, Err(ref e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn cancel_then_late_completion_stays_empty() {
        let controller = controller("http://127.0.0.1:9/", Duration::from_secs(3));
        let token = controller.begin_selection("a.png").expect("begin failed");

        controller.cancel().expect("cancel failed");
        let accepted = controller
            .finish_selection(token, Ok(processed_fixture("a.png")))
            .expect("finish failed");

        assert!(!accepted);
        assert_eq!(controller.state().expect("state failed"), WidgetState::Empty);
        assert!(controller.image().expect("image failed").is_none());
    }

    #[test]
    fn newer_selection_wins_over_stale_completion() {
        let controller = controller("http://127.0.0.1:9/", Duration::from_secs(3));
        let first = controller.begin_selection("first.png").expect("begin failed");
        let second = controller.begin_selection("second.png").expect("begin failed");
        assert!(second > first);

        assert!(!controller.finish_selection(first, Ok(processed_fixture("first.png"))).expect("finish failed"));
        assert_eq!(controller.state().expect("state failed"), WidgetState::Scaling);

        assert!(controller.finish_selection(second, Ok(processed_fixture("second.png"))).expect("finish failed"));
        let snapshot = controller.snapshot().expect("snapshot failed");
        assert_eq!(snapshot.state, WidgetState::Uploadable);
        assert_eq!(snapshot.file_name.as_deref(), Some("second.png"));
    }

    #[tokio::test]
    async fn pipeline_failure_moves_to_failed_with_report() {
        let controller = controller("http://127.0.0.1:9/", Duration::from_secs(3));
        let bytes = with_orientation(&jpeg_bytes(20, 10), 9);

        let result = controller
            .select_file(SelectedFile::new("bad.jpg", "image/jpeg", bytes))
            .await;

        assert!(matches!(result, Err(ImageError::InvalidOrientation(9))));
        let snapshot = controller.snapshot().expect("snapshot failed");
        assert_eq!(snapshot.state, WidgetState::Failed);
        assert_eq!(snapshot.last_error.map(|e| e.code), Some("E_ORIENTATION"));
        assert_eq!(controller.pipeline().live_file_handles(), 0);
    }

    #[tokio::test]
    async fn select_path_reports_missing_file_as_failed() {
        let controller = controller("http://127.0.0.1:9/", Duration::from_secs(3));
        let dir = tempfile::tempdir().expect("tempdir failed");

        let result = controller.select_path(dir.path().join("gone.png")).await;

        assert!(matches!(result, Err(ImageError::FileSystem(_))));
        assert_eq!(controller.state().expect("state failed"), WidgetState::Failed);
    }

    #[tokio::test]
    async fn select_file_reaches_uploadable_with_preview() {
        let controller = controller("http://127.0.0.1:9/", Duration::from_secs(3));

        let snapshot = controller
            .select_file(SelectedFile::new("wide.png", "image/png", png_bytes(48, 32)))
            .await
            .expect("select failed");

        assert_eq!(snapshot.state, WidgetState::Uploadable);
        let preview = snapshot.preview.expect("preview missing");
        assert_eq!(preview.scaled, Dimensions::new(24, 16));
        assert_eq!(preview.canvas, Dimensions::new(16, 16));
    }

    #[tokio::test]
    async fn upload_then_auto_reset() {
        let (url, server) = one_shot_server("200 OK", "ok");
        let controller = controller(&url, Duration::from_millis(50));
        ready(&controller);

        let outcome = controller.upload().await.expect("upload failed");
        server.join().expect("server thread failed");

        let UploadOutcome::Uploaded(receipt) = outcome else {
            panic!("expected an upload");
        };
        assert_eq!(receipt.status, 200);
        assert_eq!(receipt.file_name, "fixture.png");
        assert_eq!(controller.state().expect("state failed"), WidgetState::Uploaded);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = controller.snapshot().expect("snapshot failed");
        assert_eq!(snapshot.state, WidgetState::Empty);
        assert!(snapshot.preview.is_none());
    }

    #[tokio::test]
    async fn stale_reset_does_not_clobber_new_selection() {
        let (url, server) = one_shot_server("200 OK", "ok");
        let controller = controller(&url, Duration::from_millis(50));
        ready(&controller);

        controller.upload().await.expect("upload failed");
        server.join().expect("server thread failed");

        let newer = controller.begin_selection("newer.png").expect("begin failed");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(controller.state().expect("state failed"), WidgetState::Scaling);
        assert_eq!(controller.current_token().expect("token failed"), newer);
    }

    #[tokio::test]
    async fn server_error_status_still_counts_as_uploaded() {
        let (url, server) = one_shot_server("500 Internal Server Error", "nope");
        let controller = controller(&url, Duration::from_secs(3));
        ready(&controller);

        let outcome = controller.upload().await.expect("upload should complete");
        server.join().expect("server thread failed");

        assert!(matches!(outcome, UploadOutcome::Uploaded(ref r) if r.status == 500 && r.body == "nope"));
        assert_eq!(controller.state().expect("state failed"), WidgetState::Uploaded);
    }

    #[tokio::test]
    async fn overlapping_upload_is_skipped_while_in_flight() {
        let (url, server) = one_shot_server("200 OK", "ok");
        let controller = controller(&url, Duration::from_secs(3));
        ready(&controller);

        let (first, second) = tokio::join!(controller.upload(), controller.upload());
        server.join().expect("server thread failed");

        assert!(matches!(first.expect("first upload failed"), UploadOutcome::Uploaded(_)));
        assert!(matches!(
            second.expect("second upload should not error"),
            UploadOutcome::Skipped { state: WidgetState::Uploadable }
        ));
        let snapshot = controller.snapshot().expect("snapshot failed");
        assert_eq!(snapshot.state, WidgetState::Uploaded);
        assert!(!snapshot.uploading);
    }

    #[tokio::test]
    async fn encode_failure_moves_to_failed() {
        let controller = controller("http://127.0.0.1:9/", Duration::from_secs(3));
        let mut broken = processed_fixture("empty.png");
        broken.canvas = image::RgbaImage::new(0, 0);

        let token = controller.begin_selection("empty.png").expect("begin failed");
        assert!(controller.finish_selection(token, Ok(broken)).expect("finish failed"));

        let result = controller.upload().await;

        assert!(matches!(result, Err(ImageError::Encode(_))));
        let snapshot = controller.snapshot().expect("snapshot failed");
        assert_eq!(snapshot.state, WidgetState::Failed);
        assert!(!snapshot.uploading);
        assert_eq!(snapshot.last_error.map(|e| e.code), Some("E_ENCODE"));
    }

    #[tokio::test]
    async fn transport_failure_keeps_uploadable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
            listener.local_addr().expect("addr failed").port()
        };
        let controller = controller(&format!("http://127.0.0.1:{}/", port), Duration::from_secs(3));
        ready(&controller);

        let result = controller.upload().await;

        assert!(matches!(result, Err(ImageError::Network(_))));
        let snapshot = controller.snapshot().expect("snapshot failed");
        assert_eq!(snapshot.state, WidgetState::Uploadable);
        assert!(!snapshot.uploading);
        assert_eq!(snapshot.last_error.map(|e| e.code), Some("E_NETWORK"));
    }
}
