//! 平面的持久化存储.

use super::{LabelSlice, LabelSliceMut, MaskSlice, MaskSliceMut, ScanSlice, ScanSliceMut};
use crate::consts::gray::*;
use crate::data::window::SignalWindow;
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的平面对象.
///
/// `ImgWriteVis` trait 的意图是, 平面将以 "可视化友好" 的方式保存,
/// 而不是 "as is" 的方式. 对于 `ScanSlice` 这类以 `f32` 强度存储的平面,
/// 保存时会用强度窗口规范化; 对于 `LabelSlice` 这类标签平面,
/// 不同对象标识会被映射到肉眼较易区分的灰度.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将平面保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的平面对象.
pub trait ImgWriteRaw {
    /// 按原样将平面保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 将对象标识映射到可视化灰度. 保证非背景标识不会映射到纯黑.
#[inline]
pub(crate) fn pretty(label: u32) -> u8 {
    if label == 0 {
        BLACK
    } else {
        // 把标识打散到 [64, 255] 区间, 相邻标识色差明显.
        (64 + (label.wrapping_mul(73) % 192)) as u8
    }
}

macro_rules! impl_mask_raw {
    ($($slice: ty),+) => {
        $(
            /// 按原样存储 (0/255 掩膜).
            impl ImgWriteRaw for $slice {
                fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &pix) in self.indexed_iter() {
                        buf.put_pixel(w as u32, h as u32, image::Luma([pix]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

macro_rules! impl_label_vis {
    ($($slice: ty),+) => {
        $(
            /// 背景为黑色, 对象标识映射到打散后的灰度.
            impl ImgWriteVis for $slice {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &pix) in self.indexed_iter() {
                        buf.put_pixel(w as u32, h as u32, image::Luma([pretty(pix)]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

macro_rules! impl_scan_vis {
    ($($scan: ty),+) => {
        $(
            /// 以平面自身最大强度为窗口上限规范化. 全背景平面保存为全黑.
            impl ImgWriteVis for $scan {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    let window = SignalWindow::from_scan(&self.shallow_copy());
                    for ((h, w), &v) in self.indexed_iter() {
                        // 全背景平面无窗口, NaN 像素无灰度: 都落到黑色.
                        let gray = window.and_then(|win| win.eval(v)).unwrap_or(BLACK);
                        buf.put_pixel(w as u32, h as u32, image::Luma([gray]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

impl_mask_raw!(MaskSlice<'_>, MaskSliceMut<'_>);
impl_label_vis!(LabelSlice<'_>, LabelSliceMut<'_>);
impl_scan_vis!(ScanSlice<'_>, ScanSliceMut<'_>);

#[cfg(test)]
mod tests {
    use super::pretty;

    #[test]
    fn test_pretty_background_is_black() {
        assert_eq!(pretty(0), 0);
        for label in 1..2000u32 {
            assert!(pretty(label) >= 64);
        }
    }
}
