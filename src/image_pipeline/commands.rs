//! # 命令层
//!
//! ## 设计思路
//!
//! 命令层仅做参数接收与结果返回，不承载业务逻辑。
//! 所有实际处理交由 `WidgetController`，错误统一转换为可序列化的 `ErrorReport`，
//! 便于 CLI 以 JSON 输出或后续接入其他前端。

use std::path::Path;

use super::{ErrorReport, ResizeProfile, UploadOutcome, WidgetController, WidgetSnapshot};

/// 从本地路径选图并等待处理完成。
pub async fn select_image(controller: &WidgetController, path: impl AsRef<Path>) -> Result<WidgetSnapshot, ErrorReport> {
    controller.select_path(path).await.map_err(ErrorReport::from)
}

/// 从 Data URL 选图并等待处理完成。
pub async fn select_image_data_url(
    controller: &WidgetController,
    name: &str,
    data: String,
) -> Result<WidgetSnapshot, ErrorReport> {
    controller
        .select_data_url(name, data)
        .await
        .map_err(ErrorReport::from)
}

/// 上传当前画布。
pub async fn upload_image(controller: &WidgetController) -> Result<UploadOutcome, ErrorReport> {
    controller.upload().await.map_err(ErrorReport::from)
}

pub fn clear_image(controller: &WidgetController) -> Result<WidgetSnapshot, ErrorReport> {
    controller.cancel()?;
    Ok(controller.snapshot()?)
}

pub fn widget_snapshot(controller: &WidgetController) -> Result<WidgetSnapshot, ErrorReport> {
    Ok(controller.snapshot()?)
}

/// 切换重采样档位。
pub fn set_resize_profile(controller: &WidgetController, profile: &str) -> Result<(), ErrorReport> {
    let profile = ResizeProfile::parse(profile)?;
    controller.pipeline().set_resize_profile(profile)?;
    Ok(())
}

/// 查询当前生效档位。
pub fn get_resize_profile(controller: &WidgetController) -> Result<String, ErrorReport> {
    Ok(controller.pipeline().get_resize_profile()?.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::test_support::png_bytes;
    use crate::image_pipeline::{PipelineConfig, UploadConfig, WidgetState};
    use base64::{Engine as _, engine::general_purpose};

    fn controller() -> WidgetController {
        let mut config = PipelineConfig::default();
        config.target_width = 12;
        config.target_height = 12;
        WidgetController::with_config(config, &UploadConfig::new("http://127.0.0.1:9/"))
            .expect("controller init failed")
    }

    #[tokio::test]
    async fn data_url_selection_then_clear() {
        let controller = controller();
        let data = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png_bytes(6, 3)));

        let snapshot = select_image_data_url(&controller, "dot.png", data)
            .await
            .expect("selection failed");
        assert_eq!(snapshot.state, WidgetState::Uploadable);

        let cleared = clear_image(&controller).expect("clear failed");
        assert_eq!(cleared.state, WidgetState::Empty);
        assert!(cleared.file_name.is_none());
    }

    #[tokio::test]
    async fn invalid_data_url_reports_load_stage() {
        let controller = controller();

        let err = select_image_data_url(&controller, "x", "data:image/png,nope".to_string())
            .await
            .expect_err("selection should fail");

        assert_eq!(err.code, "E_INVALID_FORMAT");
        assert_eq!(err.stage, "load");
        assert_eq!(
            widget_snapshot(&controller).expect("snapshot failed").state,
            WidgetState::Failed
        );
    }

    #[test]
    fn profile_commands_roundtrip() {
        let controller = controller();

        set_resize_profile(&controller, "balanced").expect("set profile failed");
        assert_eq!(get_resize_profile(&controller).expect("get profile failed"), "balanced");

        let err = set_resize_profile(&controller, "turbo").expect_err("unknown profile should fail");
        assert_eq!(err.code, "E_INVALID_FORMAT");
    }
}
