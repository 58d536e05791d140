use crate::consts::gray::*;
use crate::consts::label::*;
use crate::Idx2d;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::iter::{Iter, IterMut};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Ix2};
use std::io::{Read, Write};
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 所有平面类型的共用不可变方法集合.
///
/// 这里有意把底层数据写死为 `ArrayView`/`ArrayViewMut` 降低灵活性,
/// 但使结构的意图更加明确.
macro_rules! impl_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty, $elem: ty, $owned: ty, $immut: ident) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<$elem> {
                self.data.view()
            }

            /// 获取可以迭代平面像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, $elem, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&$elem> {
                self.data.get(pos)
            }

            /// 平面的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 平面的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 获得平面的高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得平面的宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 以行优先规则, 获取能迭代平面所有索引的迭代器.
            #[inline]
            pub fn pos_iter(&self) -> impl Iterator<Item = Idx2d> {
                super::iter::PosIter::new(self.shape())
            }

            /// 以行优先规则, 获取能迭代平面所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &$elem)> {
                self.data.indexed_iter()
            }

            /// 获得一份不可变的 **本体** shallow copy.
            #[inline]
            pub fn shallow_copy(&self) -> $immut<'_> {
                $immut::new(self.array_view())
            }

            /// 克隆自己, 获得一个拥有所有权的平面对象.
            pub fn to_owned(&self) -> $owned {
                <$owned>::from_raw(self.data.to_owned())
            }
        }

        impl<$life> Index<Idx2d> for $slice {
            type Output = $elem;

            #[inline]
            fn index(&self, index: Idx2d) -> &Self::Output {
                &self.data[index]
            }
        }
    };
}

/// 所有平面类型的共用可变方法集合.
macro_rules! impl_slice_mut {
    ($slice: ty, $elem: ty) => {
        /// 可变方法集合.
        impl $slice {
            /// 获得 **底层** 数据的一份可变 shallow copy.
            #[inline]
            pub fn array_view_mut(&mut self) -> ArrayViewMut2<$elem> {
                self.data.view_mut()
            }

            /// 获取可以迭代并修改平面像素的迭代器.
            #[inline]
            pub fn iter_mut(&mut self) -> IterMut<'_, $elem, Ix2> {
                self.data.iter_mut()
            }

            /// 获取给定位置 (高, 宽) 的像素值, 并可就地修改. 越界时返回 `None`.
            #[inline]
            pub fn get_mut(&mut self, pos: Idx2d) -> Option<&mut $elem> {
                self.data.get_mut(pos)
            }

            /// 将平面所有像素填充为 `value`.
            #[inline]
            pub fn fill(&mut self, value: $elem) {
                self.data.fill(value);
            }
        }

        impl IndexMut<Idx2d> for $slice {
            #[inline]
            fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
                &mut self.data[index]
            }
        }
    };
}

/// 拥有所有权的平面类型的共用方法集合.
macro_rules! impl_slice_owned {
    ($owned: ty, $immut: ident, $mutable: ident, $elem: ty) => {
        impl $owned {
            /// 从裸 `Array2` 数据直接创建实体.
            #[inline]
            pub fn from_raw(data: Array2<$elem>) -> Self {
                Self { data }
            }

            /// 创建给定形状的全背景平面.
            #[inline]
            pub fn zeros((h, w): Idx2d) -> Self {
                Self {
                    data: Array2::default((h, w)),
                }
            }

            /// 获得不可变平面引用.
            #[inline]
            pub fn as_immut(&self) -> $immut<'_> {
                $immut::new(self.data.view())
            }

            /// 获得可变平面引用.
            #[inline]
            pub fn as_mutable(&mut self) -> $mutable<'_> {
                $mutable::new(self.data.view_mut())
            }

            /// 直接获得底层数据.
            #[inline]
            pub fn into_raw(self) -> Array2<$elem> {
                self.data
            }
        }
    };
}

/// 不可变、借用的二维荧光强度平面. 像素以 `f32` 保存.
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayView2<'a, f32>,
}

/// 可变、借用的二维荧光强度平面.
pub struct ScanSliceMut<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayViewMut2<'a, f32>,
}

/// 拥有所有权的二维荧光强度平面.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OwnedScanSlice {
    data: Array2<f32>,
}

impl_slice_immut!('a, ScanSlice<'a>, ArrayView2<'a, f32>, f32, OwnedScanSlice, ScanSlice);
impl_slice_immut!('a, ScanSliceMut<'a>, ArrayViewMut2<'a, f32>, f32, OwnedScanSlice, ScanSlice);
impl_slice_mut!(ScanSliceMut<'_>, f32);
impl_slice_owned!(OwnedScanSlice, ScanSlice, ScanSliceMut, f32);

/// 不可变、借用的二维单通道 8-bit 灰度平面.
///
/// 该类型同时承担离散化灰度平面和 0/255 二值掩膜两种角色
/// (二者的存储与邻域操作完全一致); 掩膜角色以 [`MaskSlice`] 等别名出现.
pub struct GraySlice<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayView2<'a, u8>,
}

/// 可变、借用的二维单通道 8-bit 灰度平面.
pub struct GraySliceMut<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayViewMut2<'a, u8>,
}

/// 拥有所有权的二维单通道 8-bit 灰度平面.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OwnedGraySlice {
    data: Array2<u8>,
}

/// 扮演二值掩膜角色的灰度平面. 像素为 0 或 255.
pub type MaskSlice<'a> = GraySlice<'a>;

/// 扮演二值掩膜角色的可变灰度平面.
pub type MaskSliceMut<'a> = GraySliceMut<'a>;

/// 扮演二值掩膜角色的、拥有所有权的灰度平面.
pub type OwnedMaskSlice = OwnedGraySlice;

impl_slice_immut!('a, GraySlice<'a>, ArrayView2<'a, u8>, u8, OwnedGraySlice, GraySlice);
impl_slice_immut!('a, GraySliceMut<'a>, ArrayViewMut2<'a, u8>, u8, OwnedGraySlice, GraySlice);
impl_slice_mut!(GraySliceMut<'_>, u8);
impl_slice_owned!(OwnedGraySlice, GraySlice, GraySliceMut, u8);

/// 灰度/掩膜特有的不可变方法集合.
macro_rules! impl_gray_slice_immut {
    ($($slice: ty),+) => {
        $(
            impl $slice {
                /// 该平面是否为全背景?
                #[inline]
                pub fn is_background(&self) -> bool {
                    self.data.iter().copied().all(is_background)
                }

                /// 统计平面中非零 (前景) 像素的总个数.
                #[inline]
                pub fn count_foreground(&self) -> usize {
                    self.data.iter().copied().filter(|p| is_foreground(*p)).count()
                }
            }
        )+
    };
}

impl_gray_slice_immut!(GraySlice<'_>, GraySliceMut<'_>);

/// 不可变、借用的二维标签平面. 体素值 0 为背景, 正数为对象标识.
pub struct LabelSlice<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayView2<'a, u32>,
}

/// 可变、借用的二维标签平面.
pub struct LabelSliceMut<'a> {
    /// 底层数据的轻量级视图.
    data: ArrayViewMut2<'a, u32>,
}

/// 拥有所有权的二维标签平面.
///
/// 滑动窗口内的平面以该形式持有; 被 flush 后交由 plane store 存储.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OwnedLabelSlice {
    data: Array2<u32>,
}

impl_slice_immut!('a, LabelSlice<'a>, ArrayView2<'a, u32>, u32, OwnedLabelSlice, LabelSlice);
impl_slice_immut!('a, LabelSliceMut<'a>, ArrayViewMut2<'a, u32>, u32, OwnedLabelSlice, LabelSlice);
impl_slice_mut!(LabelSliceMut<'_>, u32);
impl_slice_owned!(OwnedLabelSlice, LabelSlice, LabelSliceMut, u32);

/// 标签特有的不可变方法集合.
macro_rules! impl_label_slice_immut {
    ($($slice: ty),+) => {
        $(
            impl $slice {
                /// 统计平面中值为 `label` 的体素总个数.
                #[inline]
                pub fn count(&self, label: u32) -> usize {
                    self.data.iter().filter(|&p| *p == label).count()
                }

                /// 该平面是否不含任何对象体素?
                #[inline]
                pub fn is_background(&self) -> bool {
                    self.data.iter().copied().all(is_label_background)
                }

                /// 将平面转化为行优先的序列化存储.
                pub fn as_row_major_vec(&self) -> Vec<u32> {
                    let mut buf = Vec::with_capacity(self.size());
                    buf.extend(self.iter());
                    buf
                }
            }
        )+
    };
}

impl_label_slice_immut!(LabelSlice<'_>, LabelSliceMut<'_>);

/// 标签特有的可变方法集合.
impl LabelSliceMut<'_> {
    /// 将平面中值为 `old` 的体素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn replace(&mut self, old: u32, new: u32) -> usize {
        let mut cnt = 0usize;
        self.data
            .iter_mut()
            .filter(|pix| **pix == old)
            .for_each(|p| {
                cnt += 1;
                *p = new;
            });
        cnt
    }
}

impl OwnedLabelSlice {
    /// 压缩数据.
    pub fn compress(&self) -> CompactLabelSlice {
        let slice = self.as_immut();
        let mut e = ZlibEncoder::new(Vec::with_capacity(8), Compression::best());
        for pix in slice.iter() {
            e.write_all(&pix.to_le_bytes()).expect("Compression error");
        }
        CompactLabelSlice {
            buf: e.finish().expect("Compression error"),
            sh: slice.shape(),
        }
    }
}

/// 压缩存储的 `OwnedLabelSlice`; 不透明类型.
///
/// 被 flush 出滑动窗口的标签平面不再可变, 可以以该形式廉价驻留内存.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompactLabelSlice {
    /// 压缩的不透明字节流.
    buf: Vec<u8>,

    /// 形状.
    sh: Idx2d,
}

impl CompactLabelSlice {
    /// 解压缩数据.
    pub fn decompress(self) -> OwnedLabelSlice {
        let Self { buf, sh: (h, w) } = self;
        let mut d = ZlibDecoder::new(buf.as_slice());
        let mut bytes = Vec::with_capacity(h * w * 4);
        d.read_to_end(&mut bytes).expect("Decompression error");
        debug_assert_eq!(bytes.len(), h * w * 4);
        let data = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let data = Array2::<u32>::from_shape_vec((h, w), data).unwrap();
        OwnedLabelSlice { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mask_slice_basic() {
        let mask = OwnedMaskSlice::from_raw(array![[0, 255, 0], [0, 0, 255]]);
        let v = mask.as_immut();
        assert_eq!(v.shape(), (2, 3));
        assert_eq!(v.size(), 6);
        assert_eq!(v.count_foreground(), 2);
        assert!(!v.is_background());
        assert!(v.check((1, 2)));
        assert!(!v.check((2, 0)));

        let empty = OwnedMaskSlice::zeros((4, 4));
        assert!(empty.as_immut().is_background());
    }

    #[test]
    fn test_label_replace_and_count() {
        let mut label = OwnedLabelSlice::from_raw(array![[0, 1, 1], [2, 0, 1]]);
        assert_eq!(label.as_immut().count(1), 3);
        let replaced = label.as_mutable().replace(1, 2);
        assert_eq!(replaced, 3);
        assert_eq!(label.as_immut().count(2), 4);
        assert_eq!(label.as_immut().count(1), 0);
    }

    #[test]
    fn test_compact_label_roundtrip() {
        let label = OwnedLabelSlice::from_raw(array![[0, 70000], [123456, 3]]);
        let compact = label.clone().compress();
        let restored = compact.decompress();
        assert_eq!(restored.as_immut().shape(), (2, 2));
        assert_eq!(restored.as_immut()[(0, 1)], 70000);
        assert_eq!(restored.as_immut().count(3), 1);
        assert_eq!(restored.into_raw(), label.into_raw());
    }
}
