//! 平面存储.
//!
//! 核心算法不直接接触文件系统; 它们只通过这里的 trait 按 z 索引读写平面.
//! 任何读写失败都会带着肇事 z 与通道上浮, 内部不做重试
//! (重试策略属于外部调度器).

use crate::{GeometryAttr, Idx2d, OwnedLabelSlice, OwnedMaskSlice, OwnedScanSlice};

mod directory;
mod memory;

pub use directory::{DirectoryStore, OpenStoreError};
pub use memory::MemoryStore;

/// 存储通道. 一个样本体数据由四个平面序列构成.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Channel {
    /// 原始荧光强度.
    Scan,

    /// 组织掩膜.
    Tissue,

    /// 逐平面肾小球掩膜.
    Glomeruli2d,

    /// 全局标签.
    Labels3d,
}

/// 平面读写错误的具体种类.
#[derive(Debug)]
pub enum StoreErrorKind {
    /// 请求的平面不存在.
    NotFound,

    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// 图像编解码错误.
    Image(image::ImageError),

    /// npy 读取错误.
    NpyRead(ndarray_npy::ReadNpyError),

    /// npy 写出错误.
    NpyWrite(ndarray_npy::WriteNpyError),

    /// 平面形状与体数据的固定形状不一致.
    BadShape { expected: Idx2d, actual: Idx2d },
}

/// 平面读写错误, 携带肇事 z 与通道.
#[derive(Debug)]
pub struct StoreError {
    /// 肇事平面的 z 索引.
    pub z: usize,

    /// 肇事通道.
    pub channel: Channel,

    /// 具体错误.
    pub kind: StoreErrorKind,
}

impl StoreError {
    /// 直接初始化.
    #[inline]
    pub(crate) fn new(z: usize, channel: Channel, kind: StoreErrorKind) -> StoreError {
        Self { z, channel, kind }
    }
}

/// 标签平面写出口.
///
/// 跨平面解析器 flush 平面时只依赖该出口; 写失败对该体数据是致命的
/// (跳过平面会使全局标识空间失去同步).
pub trait LabelSink {
    /// 将第 `z` 层全局标签平面写入存储. 幂等覆写.
    fn write_labels(&mut self, z: usize, plane: &OwnedLabelSlice) -> Result<(), StoreError>;
}

/// 一个样本体数据的平面存储.
///
/// 宽高对整个体数据固定, 通过 [`GeometryAttr`] 查询一次即可.
pub trait PlaneStore: GeometryAttr + LabelSink {
    /// 读取第 `z` 层原始强度平面.
    fn read_scan(&self, z: usize) -> Result<OwnedScanSlice, StoreError>;

    /// 读取第 `z` 层组织掩膜.
    fn read_tissue(&self, z: usize) -> Result<OwnedMaskSlice, StoreError>;

    /// 写入第 `z` 层组织掩膜. 幂等覆写.
    fn write_tissue(&mut self, z: usize, plane: &OwnedMaskSlice) -> Result<(), StoreError>;

    /// 读取第 `z` 层肾小球掩膜.
    fn read_glomeruli2d(&self, z: usize) -> Result<OwnedMaskSlice, StoreError>;

    /// 写入第 `z` 层肾小球掩膜. 幂等覆写.
    fn write_glomeruli2d(&mut self, z: usize, plane: &OwnedMaskSlice) -> Result<(), StoreError>;

    /// 读取第 `z` 层全局标签平面.
    fn read_labels(&self, z: usize) -> Result<OwnedLabelSlice, StoreError>;
}
