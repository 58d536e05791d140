//! 🫐欢迎光临🫐
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::slice::{
    GraySlice, GraySliceMut, ImgWriteRaw, ImgWriteVis, LabelSlice, LabelSliceMut, MaskSlice,
    MaskSliceMut, OwnedGraySlice, OwnedLabelSlice, OwnedMaskSlice, OwnedScanSlice, ScanSlice,
    ScanSliceMut,
};
pub use crate::data::window::SignalWindow;
pub use crate::data::{GeometryAttr, LabelStack, MaskStack, ScanStack, StackGeometry, VoxelSize};

pub use crate::config::{GlomeruliParams, PipelineConfig, TissueParams};

pub use crate::consts::gray::{MASK_BACKGROUND, MASK_FOREGROUND};
pub use crate::consts::label::LABEL_BACKGROUND;

pub use crate::label::{label_components, SliceResolver};
pub use crate::pipeline::run_volume;
pub use crate::quant::{filter_invalid, quantify, Quantification};
pub use crate::segment::{segment_glomeruli_plane, segment_tissue_plane};
pub use crate::store::{DirectoryStore, MemoryStore, PlaneStore};

pub use crate::dataset::{self, home_dataset_dir_with, sample_dirs};
