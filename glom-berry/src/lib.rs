#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 针对无法整体驻留内存的大型 z-stack 荧光显微镜体数据,
//! 提供肾脏组织与肾小球的逐平面自适应分割、跨平面标识解析与量化.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 平面文件 I/O 由 [`store`] 模块的两个后端提供; 跨样本/跨线程的任务
//!    调度、参数的外部加载 (JSON 等) 与报告格式不属于本 crate 的职责.
//! 2. 前置条件违例 (配置非法, 平面形状不一致) 以错误或 panic 暴露,
//!    不会被静默吞掉; 退化输入 (空平面, 无有效对象) 是有定义的
//!    非致命结果.
//!
//! # 管线结构
//!
//! ### 逐平面自适应分割 ✅
//!
//! Otsu 与百分位阈值, 圆盘形态学, 边界种子洪泛空洞闭合.
//! 每个平面无状态, 可跨平面并行.
//!
//! 实现位于 `glom-berry/src/segment`.
//!
//! ### 跨平面标识解析 ✅
//!
//! 有界滑动窗口内的流式全局标识分配与合并回写. 严格按 z 升序串行,
//! 这是整条管线唯一不可并行的部分.
//!
//! 实现位于 `glom-berry/src/label`.
//!
//! ### 量化与有效性过滤 ✅
//!
//! 逐平面流式统计体素数, 换算物理体积与等效球直径,
//! 按体积范围分类有效性并清零无效对象.
//!
//! 实现位于 `glom-berry/src/quant`.
//!
//! ### 平面存储 ✅
//!
//! 内存后端与目录后端 (掩膜 PNG, 标签 npy), 错误携带肇事 z 与通道.
//!
//! 实现位于 `glom-berry/src/store`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 平面与体数据基础数据结构.
mod data;

pub use data::{
    CompactLabelSlice, GeometryAttr, GraySlice, GraySliceMut, ImgWriteRaw, ImgWriteVis,
    LabelSlice, LabelSliceMut, LabelStack, MaskSlice, MaskSliceMut, MaskStack, OwnedGraySlice,
    OwnedLabelSlice, OwnedMaskSlice, OwnedScanSlice, ScanSlice, ScanSliceMut, ScanStack,
    SignalWindow, StackGeometry, VoxelSize,
};

pub mod consts;

pub mod config;

pub use config::{ConfigError, GlomeruliParams, PipelineConfig, TissueParams};

pub mod segment;

pub mod label;

pub mod quant;

pub mod store;

pub mod pipeline;

pub mod dataset;
pub mod prelude;
