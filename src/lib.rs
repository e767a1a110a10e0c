//! # 图片缩放上传工具 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  CLI (clap 子命令)                        │
//! │   preview <FILE>   upload <FILE>   orientations          │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError> / ErrorReport (JSON)
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            库 (Rust)                              │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ settings ─── config.json (serde) → 流水线 / 上传配置  │
//! │  │                                                       │
//! │  └─ image_pipeline                                       │
//! │      ├─ controller   状态机 + RunToken + 自动复位          │
//! │      ├─ handler      解码 → EXIF → 填充缩放 → 合成        │
//! │      ├─ geometry     填充尺寸 · 方向表                    │
//! │      └─ uploader     multipart 上传                       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，CLI 的返回类型 |
//! | [`settings`] | 读取 `config.json`，生成流水线与上传配置 |
//! | [`image_pipeline`] | 选图、缩放、方向校正、预览画布与上传 |

pub mod error;
pub mod image_pipeline;
pub mod settings;
