//! 肾小球 (glomeruli) 平面分割.

use super::morph::Disk;
use super::preprocess;
use super::threshold::{binarized, histogram, otsu, percentile, sorted_pixels};
use crate::config::PipelineConfig;
use crate::consts::gray::is_background;
use crate::{MaskSlice, OwnedMaskSlice, ScanSlice};
use itertools::izip;

/// 对一个荧光强度平面做肾小球分割, 产出二值对象掩膜.
///
/// `tissue` 是同平面的组织掩膜; 肾小球只会在组织内部被接受.
///
/// 流程: 预处理后先用最大半径圆盘做顶帽变换压平不均匀背景,
/// 然后在全平面上求 Otsu 阈值. 只有当该阈值超过 "组织内像素的
/// `threshold_percentile` 百分位 × `threshold_factor`" 时, 平面才被认为
/// 含有肾小球; 否则 Otsu 阈值只是在切割背景噪声, 平面被判定为空.
/// 接受阈值后, 去除组织外像素并以最小半径圆盘做开运算.
///
/// 组织掩膜为空或平面全背景时直接短路返回空掩膜.
pub fn segment_glomeruli_plane(
    scan: &ScanSlice,
    tissue: &MaskSlice,
    cfg: &PipelineConfig,
) -> OwnedMaskSlice {
    let shape = scan.shape();
    assert_eq!(shape, tissue.shape(), "组织掩膜与扫描形状不一致");

    if tissue.is_background() {
        return OwnedMaskSlice::zeros(shape);
    }
    let Some(img) = preprocess(scan, cfg.glomeruli.median_filter_size) else {
        return OwnedMaskSlice::zeros(shape);
    };

    // 顶帽变换: 去除所有比最大肾小球半径更大尺度的强度起伏.
    let mut img = img
        .as_immut()
        .tophat(&Disk::new(cfg.max_morph_disk_radius()));
    img.as_mutable().normalize_by_max();
    let img_v = img.as_immut();

    // 组织内像素的百分位, 作为 Otsu 阈值的可信门限.
    let kidney_pixels = sorted_pixels(&img_v, Some(tissue));
    let Some(tissue_only_percentile) = percentile(&kidney_pixels, cfg.glomeruli.threshold_percentile)
    else {
        return OwnedMaskSlice::zeros(shape);
    };

    let otsu_threshold = otsu(&histogram(&img_v));

    if otsu_threshold as f64 > tissue_only_percentile * cfg.glomeruli.threshold_factor {
        let mut mask = binarized(&img_v, otsu_threshold as f64);

        // 去除组织外的像素.
        {
            let mut view = mask.as_mutable();
            for (&t, m) in izip!(tissue.iter(), view.iter_mut()) {
                if is_background(t) {
                    *m = 0;
                }
            }
        }

        // 对象至少要有最小期望半径.
        mask.as_immut().opened(&Disk::new(cfg.min_morph_disk_radius()))
    } else {
        OwnedMaskSlice::zeros(shape)
    }
}
