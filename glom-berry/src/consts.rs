//! 通用常量.

/// 单通道颜色与二值掩膜像素值.
pub mod gray {
    /// 二值掩膜中, 背景的像素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 二值掩膜中, 前景 (组织或肾小球) 的像素值.
    pub const MASK_FOREGROUND: u8 = 255;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 掩膜像素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        p > MASK_BACKGROUND
    }

    /// 掩膜像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        p == MASK_BACKGROUND
    }
}

/// 标签体素值.
pub mod label {
    /// 3D 标签中, 背景的体素值.
    pub const LABEL_BACKGROUND: u32 = 0;

    /// 标签体素是否属于某个对象?
    #[inline]
    pub const fn is_object(l: u32) -> bool {
        l > LABEL_BACKGROUND
    }

    /// 标签体素是否是背景?
    #[inline]
    pub const fn is_label_background(l: u32) -> bool {
        l == LABEL_BACKGROUND
    }
}

/// 离散化直方图的 bin 个数. 强度平面在统计前会被规范化到
/// `0..HISTOGRAM_BINS` 的整数区间.
pub const HISTOGRAM_BINS: usize = 256;
