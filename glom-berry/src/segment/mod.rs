//! 逐平面自适应分割.
//!
//! 每个 z 平面的分割是无状态的, 可以乱序或并行地跨平面执行;
//! 与之相对, 跨平面标识解析 ([`crate::label`]) 必须严格按 z 升序运行.

use crate::data::window::SignalWindow;
use crate::{GraySliceMut, OwnedGraySlice, OwnedScanSlice, ScanSlice};

pub mod morph;
pub mod threshold;

mod glomeruli;
mod tissue;

pub use glomeruli::segment_glomeruli_plane;
pub use morph::Disk;
pub use tissue::segment_tissue_plane;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use crate::config::PipelineConfig;
        use crate::config::TissueParams;
        use crate::{MaskStack, ScanStack, GeometryAttr};
    }
}

/// 预处理实现块.
impl ScanSlice<'_> {
    /// 中值滤波, 返回新平面. `size` 为邻域边长, 必须为正奇数.
    ///
    /// 边界处的邻域被裁剪到平面内部, 不做填充.
    pub fn median_filtered(&self, size: usize) -> OwnedScanSlice {
        assert!(size % 2 == 1, "中值滤波邻域边长必须为正奇数");
        let border = (size / 2) as isize;

        let mut out = OwnedScanSlice::zeros(self.shape());
        let mut buffer = Vec::with_capacity(size * size);
        {
            let mut view = out.as_mutable();
            for (h, w) in self.pos_iter() {
                buffer.clear();
                for dh in -border..=border {
                    for dw in -border..=border {
                        let Some(nh) = h.checked_add_signed(dh) else {
                            continue;
                        };
                        let Some(nw) = w.checked_add_signed(dw) else {
                            continue;
                        };
                        if let Some(&v) = self.get((nh, nw)) {
                            buffer.push(v);
                        }
                    }
                }
                buffer.sort_unstable_by(f32::total_cmp);
                view[(h, w)] = buffer[buffer.len() / 2];
            }
        }
        out
    }

    /// 以平面最大强度为上限, 将强度平面离散化为 0..=255 的灰度平面.
    ///
    /// 全背景平面 (不存在正强度) 返回 `None`,
    /// 调用方应将其短路处理为空掩膜.
    pub fn discretized(&self) -> Option<OwnedGraySlice> {
        let window = SignalWindow::from_scan(self)?;
        let mut out = OwnedGraySlice::zeros(self.shape());
        {
            let mut view = out.as_mutable();
            for (pos, &v) in self.indexed_iter() {
                // NaN 像素视为背景.
                view[pos] = window.eval(v).unwrap_or(0);
            }
        }
        Some(out)
    }
}

/// 预处理实现块.
impl GraySliceMut<'_> {
    /// 就地以最大像素值将灰度平面重新拉伸到 0..=255.
    ///
    /// 全零平面保持不变.
    pub fn normalize_by_max(&mut self) {
        let Some(max) = self.iter().copied().max().filter(|&m| m > 0) else {
            return;
        };
        for p in self.iter_mut() {
            *p = (*p as f64 * 255.0 / max as f64) as u8;
        }
    }
}

/// 共用预处理: 中值滤波 + 最大值规范化离散.
///
/// 全背景平面返回 `None`.
pub(crate) fn preprocess(scan: &ScanSlice, median_size: usize) -> Option<OwnedGraySlice> {
    scan.median_filtered(median_size).as_immut().discretized()
}

/// 并发操作部分
#[cfg(feature = "rayon")]
pub mod par {
    use super::*;

    /// 借助 `rayon`, 并行地对体数据的每个平面运行组织分割.
    pub fn segment_tissue_stack(scan: &ScanStack, params: &TissueParams) -> MaskStack {
        let mut out = MaskStack::zeros(scan.shape(), scan.voxel_size());
        out.par_for_each_indexed_slice_mut(|z, mut mask| {
            let plane = segment_tissue_plane(&scan.slice_at(z), params);
            mask.array_view_mut().assign(&plane.as_immut().array_view());
        });
        out
    }

    /// 借助 `rayon`, 并行地对体数据的每个平面运行肾小球分割.
    ///
    /// `tissue` 必须是同形状体数据的组织掩膜.
    pub fn segment_glomeruli_stack(
        scan: &ScanStack,
        tissue: &MaskStack,
        cfg: &PipelineConfig,
    ) -> MaskStack {
        assert_eq!(scan.shape(), tissue.shape(), "组织掩膜与扫描形状不一致");
        let mut out = MaskStack::zeros(scan.shape(), scan.voxel_size());
        out.par_for_each_indexed_slice_mut(|z, mut mask| {
            let plane = segment_glomeruli_plane(&scan.slice_at(z), &tissue.slice_at(z), cfg);
            mask.array_view_mut().assign(&plane.as_immut().array_view());
        });
        out
    }
}
