//! 直方图阈值算法.

use crate::consts::gray::is_foreground;
use crate::consts::HISTOGRAM_BINS;
use crate::{GraySlice, MaskSlice};
use either::Either;
use itertools::izip;
use num::ToPrimitive;

/// 256-bin 灰度直方图.
pub type Histogram = [usize; HISTOGRAM_BINS];

/// 统计灰度平面的直方图.
pub fn histogram(img: &GraySlice) -> Histogram {
    let mut hist = [0usize; HISTOGRAM_BINS];
    for &pix in img.iter() {
        hist[pix as usize] += 1;
    }
    hist
}

/// 在直方图上计算 Otsu 阈值 (类间方差最大化).
///
/// 算法在扫描候选阈值 t 时维护累积的 0 类权重 `w0` 与均值 `mu0`,
/// 由总量导出 1 类权重与均值, 并以 `w0·w1·(mu0-mu1)²` 为类间方差.
/// 只有方差 **严格大于** 历史最优时才更新, 因此并列时保留最先 (最小)
/// 的 t; 该决定性行为是跨平面结果可复现的前提, 不可更改.
///
/// 退化输入 (空直方图, 或所有像素集中于一个 bin) 固定返回 0.
pub fn otsu(hist: &Histogram) -> u8 {
    let histogram_sum: usize = hist.iter().sum();
    if histogram_sum == 0 {
        return 0;
    }

    // i 对 p 的累积和, 用于均值推导.
    let mut cumulative_i_p_sum = 0.0;
    for (t, &cnt) in hist.iter().enumerate() {
        cumulative_i_p_sum += t as f64 * cnt as f64;
    }
    cumulative_i_p_sum /= histogram_sum as f64;

    // t < 0 时的初始值.
    let mut t_best = 0usize;
    let mut var_best = 0.0f64;
    let mut w0 = 0.0f64;
    let mut mu0 = 0.0f64;

    for (t, &cnt) in hist.iter().enumerate() {
        // 空 bin 不可能改变阈值.
        if cnt == 0 {
            continue;
        }

        let p_i = cnt as f64 / histogram_sum as f64;
        mu0 *= w0;
        w0 += p_i;
        let w1 = 1.0 - w0;

        mu0 = (mu0 + t as f64 * p_i) / w0;
        let mu1 = (cumulative_i_p_sum - w0 * mu0) / w1;
        let var = w0 * w1 * (mu0 - mu1).powi(2);

        if var > var_best {
            var_best = var;
            t_best = t;
        }
    }

    t_best as u8
}

/// 收集平面的所有像素值并按升序排序.
///
/// 当给定 `within` 掩膜时, 只收集掩膜前景覆盖的像素
/// (如 "仅组织内" 的统计). 掩膜与平面的形状必须一致, 否则 panic.
pub fn sorted_pixels(img: &GraySlice, within: Option<&MaskSlice>) -> Vec<u8> {
    let it = match within {
        Some(mask) => {
            assert_eq!(img.shape(), mask.shape(), "掩膜与平面形状不一致");
            Either::Left(
                izip!(img.iter(), mask.iter())
                    .filter_map(|(&pix, &m)| is_foreground(m).then_some(pix)),
            )
        }
        None => Either::Right(img.iter().copied()),
    };

    let mut pixels: Vec<u8> = it.collect();
    pixels.sort_unstable();
    pixels
}

/// 以 `threshold` 为界二值化灰度平面. 像素值 **严格大于** 阈值的记为前景 255.
pub fn binarized(img: &GraySlice, threshold: f64) -> crate::OwnedMaskSlice {
    let mut out = crate::OwnedMaskSlice::zeros(img.shape());
    {
        let mut view = out.as_mutable();
        for (pos, &pix) in img.indexed_iter() {
            if pix as f64 > threshold {
                view[pos] = crate::consts::gray::MASK_FOREGROUND;
            }
        }
    }
    out
}

/// 计算升序序列 `sorted` 的第 `percentile` 百分位数 (线性插值).
///
/// 即在 `rank = percentile/100 · (n-1)` 处于相邻两个次序统计量之间
/// 线性插值. 空序列返回 `None`.
pub fn percentile<T: ToPrimitive + Copy>(sorted: &[T], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = percentile / 100.0 * (sorted.len() - 1) as f64;
    let lower_rank = rank.floor() as usize;
    let higher_rank = rank.ceil() as usize;
    let frac = rank - lower_rank as f64; // 小数部分

    let lo = sorted[lower_rank].to_f64()?;
    let hi = sorted[higher_rank].to_f64()?;
    Some(lo + (hi - lo) * frac)
}
