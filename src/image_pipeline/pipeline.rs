//! # 解码与变换流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → 填充缩放 → 方向校正 → 居中合成 → 编码”的每一步拆成独立函数，
//! 由 `handler` 负责编排和切换到阻塞线程池。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸，零尺寸直接拒绝
//! 2. 按像素 / 内存上限快速拒绝（填充尺寸在重采样前再检查一次）
//! 3. 完整解码
//! 4. `fast_image_resize` 重采样到填充尺寸，失败时回退 `image::resize_exact`
//! 5. 先旋转再翻转
//! 6. 居中写入与目标框等大的透明画布（溢出部分被裁掉）
//! 7. 编码：png / jpeg / webp 按原类型输出，其余类型回退 png

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use super::geometry::{self, Dimensions, FlipAxis, Orientation, Rotation};
use super::{ImageError, PipelineConfig};

/// 回退编码类型。
pub const FALLBACK_MIME: &str = "image/png";

/// 解码原始字节，并在解码前后各做一次资源上限检查。
pub(crate) fn decode_with_limits(bytes: &[u8], config: &PipelineConfig) -> Result<DynamicImage, ImageError> {
    let (header_width, header_height) = inspect_dimensions_from_memory(bytes)?;
    reject_zero_size(header_width, header_height)?;
    validate_pixel_limits(config, header_width, header_height)?;
    validate_decoded_memory_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

    let (width, height) = decoded.dimensions();
    reject_zero_size(width, height)?;
    validate_pixel_limits(config, width, height)?;
    validate_decoded_memory_limits(config, width, height)?;

    Ok(decoded)
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?;

    if reader.format().is_none() {
        return Err(ImageError::Decode("无法识别图片格式".to_string()));
    }

    reader
        .into_dimensions()
        .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
}

/// 填充后的尺寸同样受像素与内存上限约束，超限时不进入重采样。
pub(crate) fn validate_fill_limits(config: &PipelineConfig, scaled: Dimensions) -> Result<(), ImageError> {
    validate_pixel_limits(config, scaled.width, scaled.height)
        .and_then(|_| validate_decoded_memory_limits(config, scaled.width, scaled.height))
        .inspect_err(|err| log::warn!("⚠️ 填充尺寸 {} 超出上限：{}", scaled, err))
}

fn reject_zero_size(width: u32, height: u32) -> Result<(), ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::Decode(format!("图片尺寸为零：{}x{}", width, height)));
    }
    Ok(())
}

/// 校验像素数量是否超过配置上限。
fn validate_pixel_limits(config: &PipelineConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn validate_decoded_memory_limits(config: &PipelineConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let estimated = (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(ImageError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

/// 把解码结果重采样到填充尺寸。
///
/// 尺寸已一致时直接转换为 RGBA，不做重采样。
pub(crate) fn resample_to(image: DynamicImage, size: Dimensions, filter: FilterType) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width == size.width && height == size.height {
        return image.into_rgba8();
    }

    log::debug!("🧩 重采样：{}x{} -> {}（filter={:?}）", width, height, size, filter);

    match resize_with_fast_image_resize(&image, size.width, size.height, filter) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 重采样失败，回退 image::resize_exact：{}", err);
            image.resize_exact(size.width, size.height, filter).into_rgba8()
        }
    }
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<RgbaImage, ImageError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image = fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
        .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

/// 按方向表变换像素：先旋转，再翻转。
pub(crate) fn apply_orientation(image: RgbaImage, orientation: Orientation) -> RgbaImage {
    let transform = orientation.transform();

    let rotated = match transform.rotation {
        Rotation::None => image,
        Rotation::Cw90 => imageops::rotate90(&image),
        Rotation::Cw180 => imageops::rotate180(&image),
        Rotation::Cw270 => imageops::rotate270(&image),
    };

    match transform.flip {
        None => rotated,
        Some(FlipAxis::Horizontal) => imageops::flip_horizontal(&rotated),
        Some(FlipAxis::Vertical) => imageops::flip_vertical(&rotated),
    }
}

/// 把 `oriented` 居中写入目标框大小的透明画布。
///
/// 像素直接覆盖（不做 alpha 混合），超出画布的部分被裁掉。
pub(crate) fn composite_centered(target: Dimensions, oriented: &RgbaImage) -> RgbaImage {
    let mut canvas = RgbaImage::new(target.width, target.height);
    let inner = Dimensions::new(oriented.width(), oriented.height());
    let (x, y) = geometry::center_offset(target, inner);

    imageops::replace(&mut canvas, oriented, x, y);
    canvas
}

/// 编码画布，返回字节与实际使用的 MIME 类型。
pub(crate) fn encode_canvas(
    canvas: &RgbaImage,
    mime_type: &str,
    jpeg_quality: u8,
) -> Result<(Vec<u8>, &'static str), ImageError> {
    let format = output_format(mime_type);
    let mut cursor = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(canvas.clone()).into_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut cursor, jpeg_quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| ImageError::Encode(format!("JPEG 编码失败：{}", e)))?;
        }
        other => {
            canvas
                .write_to(&mut cursor, other)
                .map_err(|e| ImageError::Encode(format!("{:?} 编码失败：{}", other, e)))?;
        }
    }

    Ok((cursor.into_inner(), format.to_mime_type()))
}

/// 画布可输出的格式：仅 png / jpeg / webp，其余回退 png。
fn output_format(mime_type: &str) -> ImageFormat {
    match ImageFormat::from_mime_type(mime_type.trim().to_ascii_lowercase()) {
        Some(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)) => format,
        _ => {
            if mime_type != FALLBACK_MIME {
                log::debug!("ℹ️ 类型 {} 不支持画布输出，回退 {}", mime_type, FALLBACK_MIME);
            }
            ImageFormat::Png
        }
    }
}
