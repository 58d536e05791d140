//! 管线参数配置.
//!
//! 参数的外部加载 (JSON 等) 不属于本 crate 的职责; 这里只定义参数本体、
//! 默认值与合法性校验. 默认值沿用 Klingberg 分割流程的惯用配置.

use crate::VoxelSize;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 组织 (tissue) 平面分割参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TissueParams {
    /// 预处理中值滤波的邻域边长. 必须为正奇数.
    pub median_filter_size: usize,

    /// 二值化所用的强度百分位.
    pub thresholding_percentile: f64,

    /// 百分位阈值的放大系数.
    pub percentile_factor: f64,

    /// 膨胀/腐蚀所用圆盘结构元的半径, 以像素为单位.
    pub morph_disk_radius: usize,

    /// 对象平均强度下限系数. 平均强度低于
    /// `百分位值 × 该系数` 的连通对象会被从掩膜中去除.
    pub label_min_factor: f64,
}

impl Default for TissueParams {
    fn default() -> Self {
        Self {
            median_filter_size: 3,
            thresholding_percentile: 40.0,
            percentile_factor: 1.5,
            morph_disk_radius: 5,
            label_min_factor: 2.0,
        }
    }
}

/// 肾小球 (glomeruli) 平面分割与量化参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlomeruliParams {
    /// 预处理中值滤波的邻域边长. 必须为正奇数.
    pub median_filter_size: usize,

    /// 肾小球的最小期望半径, 以微米为单位.
    pub min_rad: f64,

    /// 肾小球的最大期望半径, 以微米为单位.
    pub max_rad: f64,

    /// 组织内强度百分位. Otsu 阈值只有超过
    /// `百分位值 × threshold_factor` 才被接受.
    pub threshold_percentile: f64,

    /// 百分位门限的放大系数.
    pub threshold_factor: f64,
}

impl Default for GlomeruliParams {
    fn default() -> Self {
        Self {
            median_filter_size: 3,
            min_rad: 15.0,
            max_rad: 65.0,
            threshold_percentile: 75.0,
            threshold_factor: 1.5,
        }
    }
}

impl GlomeruliParams {
    /// 合法肾小球的物理体积范围 \[min, max\], 以立方微米为单位.
    ///
    /// 由最小/最大期望半径按照球体积公式导出.
    pub fn volume_range(&self) -> (f64, f64) {
        let ball = |r: f64| 4.0 / 3.0 * std::f64::consts::PI * r.powi(3);
        (ball(self.min_rad), ball(self.max_rad))
    }
}

/// 配置校验错误. 属于致命的前置条件违例, 不可恢复.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 中值滤波邻域边长必须为正奇数.
    BadMedianSize(usize),

    /// 半径必须为正的有限值.
    NonPositiveRadius(f64),

    /// 最大半径必须不小于最小半径.
    RadiusOrder { min: f64, max: f64 },

    /// 百分位必须落在 `[0, 100]` 区间内.
    PercentileOutOfRange(f64),

    /// 放大系数必须为正的有限值.
    NonPositiveFactor(f64),
}

/// 整条管线的参数配置.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// 体素的物理尺寸.
    pub voxel: VoxelSize,

    /// 组织平面分割参数.
    pub tissue: TissueParams,

    /// 肾小球平面分割与量化参数.
    pub glomeruli: GlomeruliParams,
}

impl PipelineConfig {
    /// 以给定体素尺寸和默认算法参数构建配置.
    pub fn with_voxel(voxel: VoxelSize) -> PipelineConfig {
        Self {
            voxel,
            tissue: TissueParams::default(),
            glomeruli: GlomeruliParams::default(),
        }
    }

    /// 跨平面标识解析所用滑动窗口的平面数 W.
    ///
    /// 取 `ceil(max_rad / voxel_z)` 且不小于 1: 一个合法对象的 z 跨度不会
    /// 超过其最大期望半径所覆盖的平面数. 当 `voxel_z` 为 1 时退化为
    /// "半径即平面数" 的传统行为.
    ///
    /// # 注意
    ///
    /// z 跨度超过 W 的对象会被静默地拆成两个全局标识.
    /// 这是该算法已知的正确性边界, 参见 [`crate::label::SliceResolver`].
    pub fn window_len(&self) -> usize {
        let planes = (self.glomeruli.max_rad / self.voxel.z()).ceil();
        (planes as usize).max(1)
    }

    /// 去除不均匀背景所用的最大圆盘半径, 以像素为单位.
    #[inline]
    pub fn max_morph_disk_radius(&self) -> usize {
        (self.glomeruli.max_rad / self.voxel.xy()) as usize
    }

    /// 保留最小对象所用的圆盘半径, 以像素为单位.
    #[inline]
    pub fn min_morph_disk_radius(&self) -> usize {
        (self.glomeruli.min_rad / 2.0 / self.voxel.xy()) as usize
    }

    /// 校验所有参数. 任何一项不合法都会使整个体数据的处理中止.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Self {
            voxel: _,
            tissue,
            glomeruli,
        } = self;

        check_median(tissue.median_filter_size)?;
        check_median(glomeruli.median_filter_size)?;
        check_percentile(tissue.thresholding_percentile)?;
        check_percentile(glomeruli.threshold_percentile)?;
        check_factor(tissue.percentile_factor)?;
        check_factor(tissue.label_min_factor)?;
        check_factor(glomeruli.threshold_factor)?;

        for r in [glomeruli.min_rad, glomeruli.max_rad] {
            if !r.is_finite() || r <= 0.0 {
                return Err(ConfigError::NonPositiveRadius(r));
            }
        }
        if glomeruli.max_rad < glomeruli.min_rad {
            return Err(ConfigError::RadiusOrder {
                min: glomeruli.min_rad,
                max: glomeruli.max_rad,
            });
        }
        Ok(())
    }
}

fn check_median(sz: usize) -> Result<(), ConfigError> {
    if sz == 0 || sz % 2 == 0 {
        return Err(ConfigError::BadMedianSize(sz));
    }
    Ok(())
}

fn check_percentile(p: f64) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&p) {
        return Err(ConfigError::PercentileOutOfRange(p));
    }
    Ok(())
}

fn check_factor(f: f64) -> Result<(), ConfigError> {
    if !f.is_finite() || f <= 0.0 {
        return Err(ConfigError::NonPositiveFactor(f));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let cfg = PipelineConfig::with_voxel(VoxelSize::isotropic_unit());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_window_len_derivation() {
        // voxel_z = 1: 传统 "半径即平面数" 行为.
        let cfg = PipelineConfig::with_voxel(VoxelSize::isotropic_unit());
        assert_eq!(cfg.window_len(), 65);

        // 较厚的平面覆盖同样的物理跨度需要更少的平面.
        let cfg = PipelineConfig::with_voxel(VoxelSize::new(1.0, 10.0).unwrap());
        assert_eq!(cfg.window_len(), 7);

        // 极厚平面也保证 W >= 1.
        let mut cfg = PipelineConfig::with_voxel(VoxelSize::new(1.0, 1e6).unwrap());
        cfg.glomeruli.max_rad = 1.0;
        assert_eq!(cfg.window_len(), 1);
    }

    #[test]
    fn test_morph_disk_radii() {
        let cfg = PipelineConfig::with_voxel(VoxelSize::new(2.0, 1.0).unwrap());
        // 65 / 2 = 32.5 -> 32; (15 / 2) / 2 = 3.75 -> 3.
        assert_eq!(cfg.max_morph_disk_radius(), 32);
        assert_eq!(cfg.min_morph_disk_radius(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        let mut cfg = PipelineConfig::with_voxel(VoxelSize::isotropic_unit());
        cfg.tissue.median_filter_size = 4;
        assert_eq!(cfg.validate(), Err(ConfigError::BadMedianSize(4)));

        let mut cfg = PipelineConfig::with_voxel(VoxelSize::isotropic_unit());
        cfg.glomeruli.threshold_percentile = 101.0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::PercentileOutOfRange(101.0))
        );

        let mut cfg = PipelineConfig::with_voxel(VoxelSize::isotropic_unit());
        cfg.glomeruli.min_rad = 70.0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::RadiusOrder {
                min: 70.0,
                max: 65.0
            })
        );
    }

    #[test]
    fn test_volume_range() {
        let params = GlomeruliParams::default();
        let (lo, hi) = params.volume_range();
        // 4/3 * pi * 15^3 与 4/3 * pi * 65^3.
        assert!((lo - 14137.166941).abs() < 1e-3);
        assert!((hi - 1150346.536260).abs() < 1e-3);
    }
}
