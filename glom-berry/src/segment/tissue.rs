//! 组织 (tissue) 平面分割.

use super::morph::Disk;
use super::preprocess;
use super::threshold::{binarized, percentile, sorted_pixels};
use crate::config::TissueParams;
use crate::consts::label::is_object;
use crate::label::label_components;
use crate::{GraySlice, OwnedMaskSlice, ScanSlice};
use itertools::izip;
use std::collections::HashMap;

/// 对一个荧光强度平面做组织分割, 产出二值组织掩膜.
///
/// 流程: 中值滤波与离散化预处理, 百分位阈值二值化,
/// 膨胀 + 空洞闭合 + 腐蚀的形态学清理, 最后去除平均强度过低的对象
/// (通常是插值或噪声残留).
///
/// 全背景平面直接短路返回空掩膜, 不触发任何假定非空输入的算法.
pub fn segment_tissue_plane(scan: &ScanSlice, params: &TissueParams) -> OwnedMaskSlice {
    let shape = scan.shape();
    let Some(img) = preprocess(scan, params.median_filter_size) else {
        return OwnedMaskSlice::zeros(shape);
    };
    let img_v = img.as_immut();

    // 百分位阈值.
    let pixels = sorted_pixels(&img_v, None);
    let Some(tissue_percentile) = percentile(&pixels, params.thresholding_percentile) else {
        return OwnedMaskSlice::zeros(shape);
    };
    let mask = binarized(&img_v, tissue_percentile * params.percentile_factor);

    // 形态学清理 (膨胀, 空洞闭合, 腐蚀).
    let disk = Disk::new(params.morph_disk_radius);
    let mut mask = mask.as_immut().dilated(&disk);
    mask.as_mutable().close_holes();
    let mut mask = mask.as_immut().eroded(&disk);

    remove_low_mean_objects(
        &mut mask,
        &img_v,
        tissue_percentile * params.label_min_factor,
    );
    mask
}

/// 从掩膜中去除平均灰度低于 `min_mean` 的连通对象.
fn remove_low_mean_objects(mask: &mut OwnedMaskSlice, img: &GraySlice, min_mean: f64) {
    let (labels, n) = label_components(&mask.as_immut());
    if n == 0 {
        return;
    }

    let mut counts: HashMap<u32, u64> = HashMap::with_capacity(n as usize);
    let mut sums: HashMap<u32, f64> = HashMap::with_capacity(n as usize);
    for (&l, &pix) in izip!(labels.as_immut().iter(), img.iter()) {
        if is_object(l) {
            *counts.entry(l).or_default() += 1;
            *sums.entry(l).or_default() += pix as f64;
        }
    }

    let mut view = mask.as_mutable();
    for (pos, &l) in labels.as_immut().indexed_iter() {
        if !is_object(l) {
            continue;
        }
        let mean = sums[&l] / counts[&l] as f64;
        if mean < min_mean {
            view[pos] = 0;
        }
    }
}
