//! 画布几何计算模块
//!
//! 该模块实现流水线中唯一带算法含量的部分，全部为纯函数：
//!
//! 1. **填充缩放** (`fill`)：把源图等比缩放到“刚好铺满”目标框的最小尺寸，
//!    允许在一个轴上溢出（之后居中裁剪），不留黑边。
//! 2. **方向表** (`ORIENTATION_TABLE`)：EXIF 方向值 → 旋转角度 + 翻转轴，
//!    以数据表而非分支逻辑表达，方便直接对表做测试。
//! 3. **旋转后尺寸** (`oriented_size`) 与 **居中偏移** (`center_offset`)。
//!
//! # 设计思路
//!
//! - 输入输出都是整数像素尺寸，浮点只出现在缩放比例内部。
//! - 决定缩放比例的那条轴直接取目标框边长，另一条轴四舍五入且不小于目标边长，
//!   从而保证“覆盖”不变量不受浮点误差影响。
//! - 零尺寸属于调用方必须提前拦截的非法输入（见 `pipeline` 的解码阶段）。

use super::ImageError;

/// 像素尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// 宽高互换。
    pub fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 填充缩放比例：`max(容器宽/子宽, 容器高/子高)`。
pub fn fill_scale(container: Dimensions, child: Dimensions) -> f64 {
    let sw = container.width as f64 / child.width as f64;
    let sh = container.height as f64 / child.height as f64;
    sw.max(sh)
}

/// 计算子图铺满容器所需的尺寸。
///
/// # 不变量
/// - 结果在两个轴上都不小于容器
/// - 宽高比相同时结果恰好等于容器
/// - 宽高比不同时，决定比例的轴等于容器，另一轴溢出
///
/// # 参数
/// * `container` - 目标框尺寸
/// * `child`     - 源图自然尺寸（宽高必须为正）
pub fn fill(container: Dimensions, child: Dimensions) -> Dimensions {
    debug_assert!(!child.is_empty(), "fill 不接受零尺寸源图");

    let sw = container.width as f64 / child.width as f64;
    let sh = container.height as f64 / child.height as f64;

    if sw >= sh {
        // 宽度决定比例：宽度对齐，高度溢出
        let height = (child.height as f64 * sw).round() as u32;
        Dimensions::new(container.width, height.max(container.height))
    } else {
        // 高度决定比例：高度对齐，宽度溢出
        let width = (child.width as f64 * sh).round() as u32;
        Dimensions::new(width.max(container.width), container.height)
    }
}

/// 顺时针旋转角度（图像坐标系，y 轴向下）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// 90°/270° 会交换宽高。
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

/// 翻转轴。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    /// 水平翻转：沿竖直轴镜像，左右互换。
    Horizontal,
    /// 垂直翻转：沿水平轴镜像，上下互换。
    Vertical,
}

/// 单个方向值对应的像素变换：先旋转，再翻转。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationTransform {
    pub rotation: Rotation,
    pub flip: Option<FlipAxis>,
}

/// EXIF 方向值（1~8）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Rotate90FlipHorizontal,
    Rotate90,
    Rotate90FlipVertical,
    Rotate270,
}

const fn transform(rotation: Rotation, flip: Option<FlipAxis>) -> OrientationTransform {
    OrientationTransform { rotation, flip }
}

/// 方向值 → 像素变换对照表。
///
/// 表顺序即 EXIF 编码顺序（下标 + 1 = 方向值）。
pub const ORIENTATION_TABLE: [(Orientation, OrientationTransform); 8] = [
    (Orientation::Normal, transform(Rotation::None, None)),
    (Orientation::FlipHorizontal, transform(Rotation::None, Some(FlipAxis::Horizontal))),
    (Orientation::Rotate180, transform(Rotation::Cw180, None)),
    (Orientation::FlipVertical, transform(Rotation::None, Some(FlipAxis::Vertical))),
    (Orientation::Rotate90FlipHorizontal, transform(Rotation::Cw90, Some(FlipAxis::Horizontal))),
    (Orientation::Rotate90, transform(Rotation::Cw90, None)),
    (Orientation::Rotate90FlipVertical, transform(Rotation::Cw90, Some(FlipAxis::Vertical))),
    (Orientation::Rotate270, transform(Rotation::Cw270, None)),
];

impl Orientation {
    /// 由 EXIF 原始值构造方向；缺省视为 1（不变换）。
    ///
    /// 1~8 之外的任何值都返回 `InvalidOrientation`。
    pub fn from_exif(code: Option<u32>) -> Result<Self, ImageError> {
        let Some(code) = code else {
            return Ok(Self::Normal);
        };

        match code {
            1..=8 => Ok(ORIENTATION_TABLE[(code - 1) as usize].0),
            other => Err(ImageError::InvalidOrientation(other)),
        }
    }

    /// EXIF 编码值。
    pub fn code(self) -> u32 {
        ORIENTATION_TABLE
            .iter()
            .position(|(orientation, _)| *orientation == self)
            .map(|idx| idx as u32 + 1)
            .unwrap_or(1)
    }

    /// 查表得到像素变换。
    pub fn transform(self) -> OrientationTransform {
        ORIENTATION_TABLE
            .iter()
            .find(|(orientation, _)| *orientation == self)
            .map(|(_, transform)| *transform)
            .unwrap_or(transform(Rotation::None, None))
    }
}

/// 应用方向变换后的画布尺寸。
pub fn oriented_size(size: Dimensions, orientation: Orientation) -> Dimensions {
    if orientation.transform().rotation.swaps_axes() {
        size.transposed()
    } else {
        size
    }
}

/// 将 `inner` 居中放入 `outer` 时左上角的偏移。
///
/// `inner` 大于 `outer` 时偏移为负，即两侧各裁掉一半溢出。
pub fn center_offset(outer: Dimensions, inner: Dimensions) -> (i64, i64) {
    let x = (outer.width as i64 - inner.width as i64) / 2;
    let y = (outer.height as i64 - inner.height as i64) / 2;
    (x, y)
}
