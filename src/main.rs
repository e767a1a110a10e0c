//! # 图片缩放上传工具 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与子命令分发。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use scaled_upload::error::AppError;
use scaled_upload::image_pipeline::geometry::ORIENTATION_TABLE;
use scaled_upload::image_pipeline::{
    ImageError, ImagePipeline, UploadOutcome, Uploader, WidgetController, WidgetSnapshot, commands,
};
use scaled_upload::settings::{AppSettings, DEFAULT_SETTINGS_FILE};

#[derive(Parser)]
#[command(name = "scaled-upload")]
#[command(about = "Downscale, orient and upload a picked image")]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE, global = true)]
    config: PathBuf,

    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 处理图片并输出预览画布
    Preview {
        file: PathBuf,
        /// 预览图保存路径（PNG）
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// 处理并上传图片
    Upload {
        file: PathBuf,
        /// 等待自动复位后再退出
        #[arg(long)]
        wait_reset: bool,
    },
    /// 打印 EXIF 方向对照表
    Orientations,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ [{}] {}", err.code(), err);
            if cli.json {
                print_json(&serde_json::json!({ "code": err.code(), "error": err }));
            } else {
                eprintln!("错误: {}", err);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    match &cli.command {
        Command::Orientations => {
            print_orientations(cli.json);
            Ok(())
        }
        Command::Preview { file, output } => {
            let controller = build_controller(&cli.config)?;
            let snapshot = commands::select_image(&controller, file).await?;

            if let Some(output) = output {
                if let Some(image) = controller.image()? {
                    image.canvas.save(output).map_err(|e| {
                        ImageError::Encode(format!("无法写入预览图 {}：{}", output.display(), e))
                    })?;
                    log::info!("💾 预览图已保存: {}", output.display());
                }
            }

            report_snapshot(&snapshot, cli.json);
            Ok(())
        }
        Command::Upload { file, wait_reset } => {
            let controller = build_controller(&cli.config)?;
            commands::select_image(&controller, file).await?;

            let outcome = commands::upload_image(&controller).await?;
            report_outcome(&outcome, cli.json);

            if *wait_reset {
                tokio::time::sleep(controller.reset_delay() + std::time::Duration::from_millis(50)).await;
                report_snapshot(&controller.snapshot()?, cli.json);
            }
            Ok(())
        }
    }
}

fn build_controller(config_path: &Path) -> Result<WidgetController, AppError> {
    let settings = AppSettings::load(config_path)?;
    let pipeline = ImagePipeline::new(settings.pipeline_config()?)?;
    let uploader = Uploader::new(&settings.upload_config())?;
    Ok(WidgetController::new(pipeline, uploader, settings.reset_delay()))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => log::error!("序列化输出失败: {}", e),
    }
}

fn report_snapshot(snapshot: &WidgetSnapshot, json: bool) {
    if json {
        print_json(snapshot);
        return;
    }

    println!("状态: {:?} (run #{})", snapshot.state, snapshot.run);
    if let Some(preview) = &snapshot.preview {
        println!(
            "{}: {} -> {} -> {} (orientation {}) -> 画布 {}",
            snapshot.file_name.as_deref().unwrap_or("-"),
            preview.natural,
            preview.scaled,
            preview.oriented,
            preview.orientation,
            preview.canvas
        );
    }
    if let Some(error) = &snapshot.last_error {
        println!("最近错误: [{}] {}", error.code, error.message);
    }
}

fn report_outcome(outcome: &UploadOutcome, json: bool) {
    if json {
        print_json(outcome);
        return;
    }

    match outcome {
        UploadOutcome::Skipped { state } => println!("未上传：当前状态 {:?}", state),
        UploadOutcome::Uploaded(receipt) => {
            println!(
                "已上传 {} ({}，{} bytes) -> HTTP {}",
                receipt.file_name, receipt.mime_type, receipt.bytes_sent, receipt.status
            );
            if !receipt.body.is_empty() {
                println!("{}", receipt.body);
            }
        }
    }
}

fn print_orientations(json: bool) {
    if json {
        let rows = ORIENTATION_TABLE
            .iter()
            .map(|(orientation, transform)| {
                serde_json::json!({
                    "code": orientation.code(),
                    "rotation": transform.rotation.degrees(),
                    "flip": transform.flip.map(|axis| format!("{:?}", axis).to_lowercase()),
                    "swaps_axes": transform.rotation.swaps_axes(),
                })
            })
            .collect::<Vec<_>>();
        print_json(&rows);
        return;
    }

    for (orientation, transform) in ORIENTATION_TABLE.iter() {
        let flip = transform
            .flip
            .map(|axis| format!("{:?}", axis).to_lowercase())
            .unwrap_or_else(|| "-".to_string());
        println!("{}  rotate {:>3}°  flip {}", orientation.code(), transform.rotation.degrees(), flip);
    }
}
