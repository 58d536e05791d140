//! 二维平面类型.
//!
//! 每种平面 (荧光强度 scan, 二值掩膜 mask, 对象标签 label) 都提供三种形式:
//! 不可变借用、可变借用和拥有所有权. 借用形式是 `ndarray` 视图的轻量包装,
//! 所有权形式负责在流式管线中跨阶段传递平面.

mod core;
pub(crate) mod iter;
mod save;

pub use self::core::{
    CompactLabelSlice, GraySlice, GraySliceMut, LabelSlice, LabelSliceMut, MaskSlice, MaskSliceMut,
    OwnedGraySlice, OwnedLabelSlice, OwnedMaskSlice, OwnedScanSlice, ScanSlice, ScanSliceMut,
};

pub use save::{ImgWriteRaw, ImgWriteVis};
