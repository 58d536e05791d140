//! 整卷处理管线.
//!
//! 把逐平面分割、跨平面标识解析和量化过滤串成一条流水线.
//! 逐平面分割无状态, 允许外部调度器乱序或并行推进;
//! 标识解析与量化严格按 z 升序串行.

use crate::config::{ConfigError, PipelineConfig};
use crate::label::{ResolveError, SliceResolver};
use crate::quant::{filter_invalid, quantify, Quantification};
use crate::segment::{segment_glomeruli_plane, segment_tissue_plane};
use crate::store::{PlaneStore, StoreError};
use log::info;

/// 管线错误. 报告失败发生的阶段; 平面级错误内部携带肇事 z.
#[derive(Debug)]
pub enum PipelineError {
    /// 配置校验失败.
    Config(ConfigError),

    /// 逐平面分割阶段的存储读写失败.
    Segmentation(StoreError),

    /// 跨平面标识解析阶段失败.
    Resolution(ResolveError),

    /// 量化/过滤阶段的存储读写失败.
    Quantification(StoreError),
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// 阶段 1: 对每个平面依次运行组织分割与肾小球分割, 结果写回存储.
///
/// 每个平面的处理相互独立; 这里按 z 升序逐一执行. 需要并行时,
/// 外部调度器可以按平面拆分任务, 或对内存体数据使用
/// [`crate::segment::par`] (`rayon` feature).
pub fn run_segmentation<S: PlaneStore>(
    store: &mut S,
    cfg: &PipelineConfig,
) -> Result<(), PipelineError> {
    for z in 0..store.len_z() {
        let scan = store.read_scan(z).map_err(PipelineError::Segmentation)?;
        let tissue = segment_tissue_plane(&scan.as_immut(), &cfg.tissue);
        store
            .write_tissue(z, &tissue)
            .map_err(PipelineError::Segmentation)?;

        let glomeruli = segment_glomeruli_plane(&scan.as_immut(), &tissue.as_immut(), cfg);
        store
            .write_glomeruli2d(z, &glomeruli)
            .map_err(PipelineError::Segmentation)?;
    }
    Ok(())
}

/// 阶段 2: 跨平面标识解析. **必须** 串行且按 z 升序.
pub fn run_resolution<S: PlaneStore>(
    store: &mut S,
    cfg: &PipelineConfig,
) -> Result<(), PipelineError> {
    let mut resolver = SliceResolver::new(store.slice_shape(), cfg.window_len())
        .map_err(PipelineError::Resolution)?;

    for z in 0..store.len_z() {
        let mask = store
            .read_glomeruli2d(z)
            .map_err(|e| PipelineError::Resolution(ResolveError::Store(e)))?;
        resolver
            .push_plane(&mask.as_immut(), store)
            .map_err(PipelineError::Resolution)?;
    }
    resolver.finish(store).map_err(PipelineError::Resolution)?;
    info!(
        "标识解析完成, 共分配 {} 个全局标识",
        resolver.global_label_count()
    );
    Ok(())
}

/// 阶段 3: 量化全体对象并清零无效对象.
pub fn run_quantification<S: PlaneStore>(
    store: &mut S,
    cfg: &PipelineConfig,
) -> Result<Quantification, PipelineError> {
    let quant = quantify(store, &cfg.glomeruli).map_err(PipelineError::Quantification)?;
    filter_invalid(store, &quant).map_err(PipelineError::Quantification)?;
    info!(
        "量化完成: {} 个有效对象, {} 个无效对象",
        quant.valid_count, quant.invalid_count
    );
    Ok(quant)
}

/// 对一个体数据运行完整管线, 返回最终量化结果.
pub fn run_volume<S: PlaneStore>(
    store: &mut S,
    cfg: &PipelineConfig,
) -> Result<Quantification, PipelineError> {
    cfg.validate()?;
    info!("开始处理体数据: {} 个平面", store.len_z());
    run_segmentation(store, cfg)?;
    run_resolution(store, cfg)?;
    run_quantification(store, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PlaneStore};
    use crate::{OwnedMaskSlice, ScanStack, VoxelSize};
    use ndarray::{Array2, Array3};

    /// 5×5×3 合成体数据: 每个平面同一个 3×3 前景方块,
    /// 直接写入肾小球掩膜通道, 只走解析与量化两个阶段.
    #[test]
    fn test_resolution_and_quantification_end_to_end() {
        let mut store = MemoryStore::from_scan(ScanStack::zeros(
            (3, 5, 5),
            VoxelSize::isotropic_unit(),
        ));
        let mut mask = Array2::<u8>::zeros((5, 5));
        for h in 1..4 {
            for w in 1..4 {
                mask[(h, w)] = 255;
            }
        }
        let mask = OwnedMaskSlice::from_raw(mask);
        for z in 0..3 {
            store.write_glomeruli2d(z, &mask).unwrap();
        }

        let mut cfg = PipelineConfig::with_voxel(VoxelSize::isotropic_unit());
        cfg.glomeruli.min_rad = 1.0; // 体积 27 µm³ 的对象也算有效

        run_resolution(&mut store, &cfg).unwrap();
        let quant = run_quantification(&mut store, &cfg).unwrap();

        // 恰好一个全局标签, 27 体素, 物理体积 27 µm³.
        assert_eq!(quant.data.len(), 1);
        let record = &quant.data[&1];
        assert_eq!(record.pixels, 27);
        assert!((record.volume - 27.0).abs() < 1e-9);
        assert!(record.valid);
        assert_eq!(quant.valid_count, 1);
        assert_eq!(store.labels3d().count(1), 27);
        assert_eq!(
            store.labels3d().count(0),
            75 - 27,
            "背景体素不应被标记"
        );
    }

    /// 从原始强度平面出发的全管线冒烟测试.
    ///
    /// 平面构成 (32×32, 强度经最大值 2040 离散化到 0..=255 的灰度):
    /// 背景 0; 组织块 (16×16) 内大部分像素为暗自发荧光 (灰度 2),
    /// 一小撮较亮的纹理 (灰度 30, 远少于组织的 25%), 以及一个明亮的
    /// 肾小球 (灰度 255). 组织内 75 百分位落在灰度 2,
    /// Otsu 阈值落在灰度 30, 门限 30 > 2×1.5 被接受, 只有亮球被保留.
    #[test]
    fn test_full_volume_smoke() {
        // 观察各阶段的 info/debug 输出; 多个测试并发时允许重复初始化失败.
        let _ = simple_logger::init_with_level(log::Level::Debug);

        let mut plane = Array2::<f32>::zeros((32, 32));
        // 组织块: 行 8..24, 列 8..24, 暗自发荧光.
        for h in 8..24 {
            for w in 8..24 {
                plane[(h, w)] = 16.0; // 灰度 2
            }
        }
        // 较亮的组织纹理: 3×5 矩形.
        for h in 9..12 {
            for w in 17..22 {
                plane[(h, w)] = 240.0; // 灰度 30
            }
        }
        // 肾小球: 7×7 亮块.
        for h in 15..22 {
            for w in 9..16 {
                plane[(h, w)] = 2040.0; // 灰度 255
            }
        }

        let mut data = Array3::<f32>::zeros((3, 32, 32));
        for z in 0..3 {
            data.index_axis_mut(ndarray::Axis(0), z).assign(&plane);
        }
        let voxel = VoxelSize::new(5.0, 5.0).unwrap();
        let mut store = MemoryStore::from_scan(ScanStack::from_array(data, voxel));

        let cfg = PipelineConfig::with_voxel(voxel);
        let quant = run_volume(&mut store, &cfg).unwrap();

        // 三个平面的亮球合成一个有效对象.
        assert_eq!(quant.data.len(), 1, "应只检出一个对象: {quant:?}");
        assert_eq!(quant.valid_count, 1);
        assert_eq!(quant.invalid_count, 0);

        let record = quant.data.values().next().unwrap();
        // 中值滤波会磨掉亮球的四角: 每平面 45 体素, 共 135.
        assert!(
            (126..=147).contains(&(record.pixels as usize)),
            "非预期体素数: {}",
            record.pixels
        );
        assert_eq!(
            store.labels3d().count(record.label),
            record.pixels as usize
        );

        // 组织通道覆盖整个组织块.
        assert!(store.tissue().slice_at(0).count_foreground() >= 16 * 16 - 8);
    }
}
