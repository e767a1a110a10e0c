//! # EXIF 元数据读取
//!
//! 把图片内嵌的 EXIF 字段整理成“标签名 → 显示值”的映射，并单独提供方向值查询。
//! 没有元数据（或元数据无法解析）时返回空映射，方向视为缺省。
//! `Orientation` 字段存在但不是无符号整数时记为格式错误，而不是当作缺省。

use std::collections::BTreeMap;
use std::io::Cursor;

use super::ImageError;
use super::geometry::Orientation;

/// `Orientation` 字段的读取结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OrientationTag {
    #[default]
    Absent,
    /// 原始数值，范围未校验。
    Value(u32),
    /// 字段存在，但类型不是 BYTE / SHORT / LONG 或没有值。
    Malformed(String),
}

/// 已解析的 EXIF 标签集合。
#[derive(Debug, Clone, Default)]
pub struct ExifMetadata {
    tags: BTreeMap<String, String>,
    orientation: OrientationTag,
}

impl ExifMetadata {
    /// 从原始文件字节读取 EXIF。
    ///
    /// 支持 JPEG / PNG / WebP / TIFF / HEIF 容器；读取失败不算错误。
    pub fn read(bytes: &[u8]) -> Self {
        let mut cursor = Cursor::new(bytes);
        let exif = match exif::Reader::new().read_from_container(&mut cursor) {
            Ok(exif) => exif,
            Err(e) => {
                log::debug!("ℹ️ 未读取到 EXIF 元数据：{}", e);
                return Self::default();
            }
        };

        let orientation = match exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
            None => OrientationTag::Absent,
            Some(field) => match field.value.get_uint(0) {
                Some(code) => OrientationTag::Value(code),
                None => OrientationTag::Malformed(format!("{:?}", field.value)),
            },
        };

        let tags = exif
            .fields()
            .filter(|field| field.ifd_num == exif::In::PRIMARY)
            .map(|field| {
                (
                    field.tag.to_string(),
                    field.display_value().with_unit(&exif).to_string(),
                )
            })
            .collect::<BTreeMap<_, _>>();

        log::debug!("📷 EXIF 读取完成 - 字段数: {} orientation: {:?}", tags.len(), orientation);

        Self { tags, orientation }
    }

    pub fn orientation_tag(&self) -> &OrientationTag {
        &self.orientation
    }

    /// 解析为方向：缺省为 1，越界值与格式错误的字段都会失败。
    pub fn orientation(&self) -> Result<Orientation, ImageError> {
        match &self.orientation {
            OrientationTag::Absent => Orientation::from_exif(None),
            OrientationTag::Value(code) => Orientation::from_exif(Some(*code)),
            OrientationTag::Malformed(raw) => Err(ImageError::MalformedOrientation(raw.clone())),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}
