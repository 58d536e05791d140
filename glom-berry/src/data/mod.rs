use ndarray::{Array3, ArrayView, ArrayViewMut, Axis, Ix3};

use crate::{Idx2d, Idx3d};

pub mod slice;
pub mod window;

pub use slice::{
    CompactLabelSlice, GraySlice, GraySliceMut, ImgWriteRaw, ImgWriteVis, LabelSlice,
    LabelSliceMut, MaskSlice, MaskSliceMut, OwnedGraySlice, OwnedLabelSlice, OwnedMaskSlice,
    OwnedScanSlice, ScanSlice, ScanSliceMut,
};

pub use window::SignalWindow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 体素的物理尺寸, 以微米为单位.
///
/// 显微镜 z-stack 的体素在水平方向 (XY) 上各向同性, 在 z 方向
/// (相邻平面方向) 上通常有独立的分辨率.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelSize {
    xy: f64,
    z: f64,
}

impl VoxelSize {
    /// 构建体素尺寸. 两个分量都必须是正的有限值, 否则返回 `None`.
    pub fn new(xy: f64, z: f64) -> Option<VoxelSize> {
        (xy.is_finite() && xy > 0.0 && z.is_finite() && z > 0.0).then_some(Self { xy, z })
    }

    /// 各向同性体素, 三个方向均为 1 微米. 便于实验和测试.
    #[inline]
    pub const fn isotropic_unit() -> VoxelSize {
        Self { xy: 1.0, z: 1.0 }
    }

    /// 获取水平方向 (自然 2D 图像平面内) 体素分辨率, 以微米为单位.
    #[inline]
    pub fn xy(&self) -> f64 {
        self.xy
    }

    /// 获取空间方向 (相邻 2D 平面的方向) 体素分辨率, 以微米为单位.
    #[inline]
    pub fn z(&self) -> f64 {
        self.z
    }

    /// 获取体素的实际体积值, 以立方微米为单位.
    #[inline]
    pub fn voxel(&self) -> f64 {
        self.xy * self.xy * self.z
    }

    /// 获取水平平面方向的像素实际面积值, 以平方微米为单位.
    #[inline]
    pub fn slice_pixel(&self) -> f64 {
        self.xy * self.xy
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    pub fn is_isotropic(&self) -> bool {
        self.xy == self.z
    }
}

/// 3D 体数据的几何信息: 形状与体素尺寸.
///
/// 形状按照 `(z, 高, 宽)` 组织, 对整个体数据固定.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StackGeometry {
    shape: Idx3d,
    voxel: VoxelSize,
}

impl StackGeometry {
    /// 直接初始化.
    #[inline]
    pub fn new(shape: Idx3d, voxel: VoxelSize) -> StackGeometry {
        Self { shape, voxel }
    }

    /// 获取数据形状大小.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 获取体素尺寸.
    #[inline]
    pub fn voxel(&self) -> VoxelSize {
        self.voxel
    }
}

/// 3D 体数据几何信息的共用属性和部分通用操作.
pub trait GeometryAttr {
    /// 获取几何信息.
    fn geometry(&self) -> StackGeometry;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        self.geometry().shape()
    }

    /// 获取数据水平平面形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平平面个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取平面宽度 (自然 2D 图像的水平方向).
    #[inline]
    fn x_size(&self) -> usize {
        self.shape().2
    }

    /// 获取平面高度 (自然 2D 图像的垂直方向).
    #[inline]
    fn y_size(&self) -> usize {
        self.shape().1
    }

    /// 获取水平平面个数. 与 [`Self::len_z`] 等价.
    #[inline]
    fn z_size(&self) -> usize {
        self.len_z()
    }

    /// 获取体素尺寸.
    #[inline]
    fn voxel_size(&self) -> VoxelSize {
        self.geometry().voxel()
    }
}

impl GeometryAttr for StackGeometry {
    #[inline]
    fn geometry(&self) -> StackGeometry {
        *self
    }
}

/// 体数据栈的共用方法集合.
macro_rules! impl_stack {
    ($stack: ty, $elem: ty, $immut: ident, $mutable: ident, $owned: ty) => {
        impl GeometryAttr for $stack {
            #[inline]
            fn geometry(&self) -> StackGeometry {
                self.geometry
            }
        }

        impl $stack {
            /// 根据裸数据和体素尺寸直接创建实体.
            pub fn from_array(data: Array3<$elem>, voxel: VoxelSize) -> Self {
                let &[z, h, w] = data.shape() else {
                    unreachable!()
                };
                Self {
                    geometry: StackGeometry::new((z, h, w), voxel),
                    data,
                }
            }

            /// 创建给定形状的全背景体数据.
            pub fn zeros(shape: Idx3d, voxel: VoxelSize) -> Self {
                Self {
                    geometry: StackGeometry::new(shape, voxel),
                    data: Array3::default(shape),
                }
            }

            /// 获取 z 空间的第 `z_index` 层不可变平面视图.
            ///
            /// 当 `z_index` 越界时 panic.
            #[inline]
            pub fn slice_at(&self, z_index: usize) -> $immut<'_> {
                $immut::new(self.data.index_axis(Axis(0), z_index))
            }

            /// 获取 z 空间的第 `z_index` 层可变平面视图.
            ///
            /// 当 `z_index` 越界时 panic.
            #[inline]
            pub fn slice_at_mut(&mut self, z_index: usize) -> $mutable<'_> {
                $mutable::new(self.data.index_axis_mut(Axis(0), z_index))
            }

            /// 将第 `z_index` 层整体替换为 `plane` 的内容.
            ///
            /// 当 `z_index` 越界或形状不符时 panic.
            pub fn set_slice(&mut self, z_index: usize, plane: &$owned) {
                self.data
                    .index_axis_mut(Axis(0), z_index)
                    .assign(&plane.as_immut().array_view());
            }

            /// 获取能按升序迭代水平不可变平面的迭代器.
            #[inline]
            pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = $immut<'_>> {
                self.data.axis_iter(Axis(0)).map($immut::new)
            }

            /// 获取能按升序迭代水平可变平面的迭代器.
            #[inline]
            pub fn slice_iter_mut(&mut self) -> impl ExactSizeIterator<Item = $mutable<'_>> {
                self.data.axis_iter_mut(Axis(0)).map($mutable::new)
            }

            /// 获得数据的一份不可变 shallow copy.
            #[inline]
            pub fn data(&self) -> ArrayView<'_, $elem, Ix3> {
                self.data.view()
            }

            /// 获得数据的一份可变 shallow copy.
            #[inline]
            pub fn data_mut(&mut self) -> ArrayViewMut<'_, $elem, Ix3> {
                self.data.view_mut()
            }
        }
    };
}

/// 内存驻留的 3D 荧光强度体数据. 强度值以 `f32` 保存.
///
/// 流式管线面向的是无法整体驻留内存的大型体数据; 该结构只服务于小型体数据、
/// 合成数据与测试场景.
#[derive(Debug, Clone)]
pub struct ScanStack {
    geometry: StackGeometry,
    data: Array3<f32>,
}

/// 内存驻留的 3D 二值掩膜体数据.
#[derive(Debug, Clone)]
pub struct MaskStack {
    geometry: StackGeometry,
    data: Array3<u8>,
}

/// 内存驻留的 3D 对象标签体数据. 标签值以 `u32` 保存.
#[derive(Debug, Clone)]
pub struct LabelStack {
    geometry: StackGeometry,
    data: Array3<u32>,
}

impl_stack!(ScanStack, f32, ScanSlice, ScanSliceMut, OwnedScanSlice);
impl_stack!(MaskStack, u8, MaskSlice, MaskSliceMut, OwnedMaskSlice);
impl_stack!(LabelStack, u32, LabelSlice, LabelSliceMut, OwnedLabelSlice);

impl LabelStack {
    /// 获取 3D 标签中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u32) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 将 3D 标签中值为 `old` 的体素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn replace(&mut self, old: u32, new: u32) -> usize {
        let mut cnt = 0usize;
        self.data_mut()
            .iter_mut()
            .filter(|pix| **pix == old)
            .for_each(|p| {
                cnt += 1;
                *p = new;
            });
        cnt
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl ScanStack {
    /// 借助 `rayon`, 并行地对每个水平不可变平面实施 `op` 操作.
    /// 该操作会同时携带 z 方向索引信息.
    pub fn par_for_each_indexed_slice<F>(&self, op: F)
    where
        F: Fn(usize, ScanSlice) + Sync + Send,
    {
        self.data()
            .axis_iter(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, v)| {
                op(i, ScanSlice::new(v));
            });
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl MaskStack {
    /// 借助 `rayon`, 并行地对每个水平可变平面实施 `op` 操作.
    /// 该操作会同时携带 z 方向索引信息.
    pub fn par_for_each_indexed_slice_mut<F>(&mut self, op: F)
    where
        F: Fn(usize, MaskSliceMut) + Sync + Send,
    {
        self.data_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, v)| {
                op(i, MaskSliceMut::new(v));
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_voxel_size() {
        assert!(VoxelSize::new(0.0, 1.0).is_none());
        assert!(VoxelSize::new(1.0, -2.0).is_none());
        assert!(VoxelSize::new(f64::NAN, 1.0).is_none());

        let v = VoxelSize::new(0.5, 2.0).unwrap();
        assert!((v.voxel() - 0.5).abs() < 1e-12);
        assert!((v.slice_pixel() - 0.25).abs() < 1e-12);
        assert!(!v.is_isotropic());
        assert!(VoxelSize::isotropic_unit().is_isotropic());
    }

    #[test]
    fn test_stack_geometry_attr() {
        let stack = MaskStack::zeros((4, 3, 2), VoxelSize::isotropic_unit());
        assert_eq!(stack.shape(), (4, 3, 2));
        assert_eq!(stack.slice_shape(), (3, 2));
        assert_eq!(stack.len_z(), 4);
        assert_eq!(stack.size(), 24);
        assert!(stack.check(&(3, 2, 1)));
        assert!(!stack.check(&(4, 0, 0)));

        // 体数据的宽高在整个处理过程中只查询一次, 接口按约定命名.
        assert_eq!(stack.x_size(), 2);
        assert_eq!(stack.y_size(), 3);
        assert_eq!(stack.z_size(), 4);
    }

    #[test]
    fn test_stack_slice_iter() {
        let mut scan = ScanStack::zeros((3, 2, 2), VoxelSize::isotropic_unit());
        for (z, mut sli) in scan.slice_iter_mut().enumerate() {
            sli.fill(z as f32);
        }
        let sums: Vec<f32> = scan
            .slice_iter()
            .map(|sli| sli.iter().sum::<f32>())
            .collect();
        assert_eq!(sums, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn test_stack_set_slice() {
        let mut labels = LabelStack::zeros((2, 2, 2), VoxelSize::isotropic_unit());
        let plane = OwnedLabelSlice::from_raw(array![[1, 0], [0, 2]]);
        labels.set_slice(1, &plane);
        assert_eq!(labels.count(1), 1);
        assert_eq!(labels.count(2), 1);
        assert_eq!(labels.slice_at(0).count(1), 0);
        assert_eq!(labels.replace(2, 9), 1);
        assert_eq!(labels.slice_at(1)[(1, 1)], 9);
    }
}
