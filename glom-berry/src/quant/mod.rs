//! 对象量化与有效性过滤.
//!
//! 在解析器 flush 出完整的全局标签体数据之后, 逐平面流式统计每个对象的
//! 体素数, 换算物理体积与等效球直径, 按物理体积范围分类有效性,
//! 并在第二次流式遍历中将无效对象清零.

use crate::config::GlomeruliParams;
use crate::consts::label::is_object;
use crate::store::{PlaneStore, StoreError};
use std::collections::{BTreeMap, HashSet};
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 单个对象 (肾小球) 的量化记录.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectRecord {
    /// 全局标签.
    pub label: u32,

    /// 体素总数.
    pub pixels: u64,

    /// 物理体积, 以立方微米为单位.
    pub volume: f64,

    /// 等效球直径, 以微米为单位.
    pub diameter: f64,

    /// 物理体积是否落在配置的合法范围内.
    pub valid: bool,
}

/// 全体对象的量化结果, 即交给报告出口持久化的最终产物.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Quantification {
    /// 全局标签 → 量化记录. 有序存储保证报告可复现.
    pub data: BTreeMap<u32, ObjectRecord>,

    /// 有效对象个数.
    pub valid_count: u32,

    /// 无效对象个数.
    pub invalid_count: u32,

    /// 有效对象直径均值. 无有效对象时为 NaN.
    pub diameter_average: f64,

    /// 有效对象直径方差. 无有效对象时为 NaN.
    pub diameter_variance: f64,
}

impl Quantification {
    /// 迭代所有无效对象的标签.
    pub fn invalid_labels(&self) -> impl Iterator<Item = u32> + '_ {
        self.data.values().filter(|r| !r.valid).map(|r| r.label)
    }
}

/// 序列化部分
#[cfg(feature = "serde")]
impl Quantification {
    /// 将量化结果以 bincode 格式写入 `path`.
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        bincode::serialize_into(std::io::BufWriter::new(file), self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// 从 `path` 读回 bincode 格式的量化结果.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Quantification> {
        let file = std::fs::File::open(path)?;
        bincode::deserialize_from(std::io::BufReader::new(file))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// 由体素数换算等效球直径: `2·(3·volume/4π)^(1/3)`.
#[inline]
fn equivalent_diameter(volume: f64) -> f64 {
    2.0 * (3.0 / 4.0 * volume / PI).powf(1.0 / 3.0)
}

/// 以 "和与平方和" 单遍计算直径均值与方差.
///
/// 空迭代器产生 `(NaN, NaN)`, 不 panic.
fn diameter_statistics<I: IntoIterator<Item = f64>>(diameters: I) -> (f64, f64) {
    let mut count = 0u32;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for d in diameters {
        count += 1;
        sum += d;
        sum_sq += d * d;
    }
    let average = sum / count as f64;
    let variance = sum_sq / count as f64 - average * average;
    (average, variance)
}

/// 流式统计标签通道, 产出全体对象的量化结果.
///
/// 逐平面读取全局标签, 累计每个标签的体素数; 全程只驻留一个平面.
pub fn quantify<S: PlaneStore>(
    store: &S,
    params: &GlomeruliParams,
) -> Result<Quantification, StoreError> {
    let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
    for z in 0..store.len_z() {
        let plane = store.read_labels(z)?;
        for &l in plane.as_immut().iter() {
            if is_object(l) {
                *counts.entry(l).or_default() += 1;
            }
        }
    }

    let voxel = store.voxel_size().voxel();
    let (min_volume, max_volume) = params.volume_range();

    let mut data = BTreeMap::new();
    let mut valid_count = 0u32;
    let mut invalid_count = 0u32;
    for (label, pixels) in counts {
        let volume = pixels as f64 * voxel;
        let diameter = equivalent_diameter(volume);
        let valid = volume >= min_volume && volume <= max_volume;
        if valid {
            valid_count += 1;
        } else {
            invalid_count += 1;
        }
        data.insert(
            label,
            ObjectRecord {
                label,
                pixels,
                volume,
                diameter,
                valid,
            },
        );
    }

    let (diameter_average, diameter_variance) =
        diameter_statistics(data.values().filter(|r| r.valid).map(|r| r.diameter));

    Ok(Quantification {
        data,
        valid_count,
        invalid_count,
        diameter_average,
        diameter_variance,
    })
}

/// 第二次流式遍历: 将所有无效对象的体素清零.
pub fn filter_invalid<S: PlaneStore>(
    store: &mut S,
    quant: &Quantification,
) -> Result<(), StoreError> {
    let invalid: HashSet<u32> = quant.invalid_labels().collect();
    if invalid.is_empty() {
        return Ok(());
    }

    for z in 0..store.len_z() {
        let mut plane = store.read_labels(z)?;
        {
            let mut view = plane.as_mutable();
            for pix in view.iter_mut() {
                if invalid.contains(pix) {
                    *pix = 0;
                }
            }
        }
        store.write_labels(z, &plane)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LabelSink, MemoryStore};
    use crate::{OwnedLabelSlice, ScanStack, VoxelSize};
    use ndarray::Array2;

    fn store_with_labels(planes: Vec<Array2<u32>>, voxel: VoxelSize) -> MemoryStore {
        let (h, w) = {
            let &[h, w] = planes[0].shape() else {
                unreachable!()
            };
            (h, w)
        };
        let mut store = MemoryStore::from_scan(ScanStack::zeros((planes.len(), h, w), voxel));
        for (z, data) in planes.into_iter().enumerate() {
            store
                .write_labels(z, &OwnedLabelSlice::from_raw(data))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_diameter_statistics_exact() {
        // 直径 10 与 20: 均值 15, 方差 (100+400)/2 - 225 = 25.
        let (mean, var) = diameter_statistics([10.0, 20.0]);
        assert!((mean - 15.0).abs() < 1e-12);
        assert!((var - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_diameter_statistics_empty_is_nan() {
        let (mean, var) = diameter_statistics([]);
        assert!(mean.is_nan());
        assert!(var.is_nan());
    }

    #[test]
    fn test_quantify_physical_conversion() {
        // 一个对象 10 体素, 体素 2×2×3 µm → 体积 120 µm³.
        let mut plane = Array2::<u32>::zeros((4, 4));
        for w in 0..4 {
            plane[(0, w)] = 1;
            plane[(1, w)] = 1;
        }
        plane[(2, 0)] = 1;
        plane[(2, 1)] = 1;
        let store = store_with_labels(vec![plane], VoxelSize::new(2.0, 3.0).unwrap());

        let mut params = GlomeruliParams::default();
        params.min_rad = 1.0;
        let quant = quantify(&store, &params).unwrap();
        assert_eq!(quant.data.len(), 1);
        let record = &quant.data[&1];
        assert_eq!(record.pixels, 10);
        assert!((record.volume - 120.0).abs() < 1e-9);
        assert!((record.diameter - equivalent_diameter(120.0)).abs() < 1e-12);
        assert!(record.valid);
        assert_eq!(quant.valid_count, 1);
        assert_eq!(quant.invalid_count, 0);
    }

    /// 量化报告的持久化往返.
    #[cfg(feature = "serde")]
    #[test]
    fn test_quantification_save_load_roundtrip() {
        let mut plane = Array2::<u32>::zeros((4, 4));
        plane[(1, 1)] = 1;
        plane[(1, 2)] = 1;
        let store = store_with_labels(vec![plane], VoxelSize::new(10.0, 10.0).unwrap());
        let quant = quantify(&store, &GlomeruliParams::default()).unwrap();

        let path = std::env::temp_dir().join(format!(
            "glom-berry-quant-{}.bin",
            std::process::id()
        ));
        quant.save(&path).unwrap();
        let back = Quantification::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back.data, quant.data);
        assert_eq!(back.valid_count, quant.valid_count);
        assert_eq!(back.invalid_count, quant.invalid_count);
    }

    #[test]
    fn test_filter_invalid_zeroes_objects() {
        // 对象 1 体积过小 (1 体素), 对象 2 足够大.
        let mut plane0 = Array2::<u32>::zeros((8, 8));
        plane0[(0, 0)] = 1;
        let mut plane1 = Array2::<u32>::zeros((8, 8));
        for h in 0..8 {
            for w in 0..8 {
                plane1[(h, w)] = 2;
            }
        }
        let mut store =
            store_with_labels(vec![plane0, plane1], VoxelSize::new(5.0, 5.0).unwrap());

        let mut params = GlomeruliParams::default();
        params.min_rad = 10.0;
        params.max_rad = 65.0;
        let quant = quantify(&store, &params).unwrap();
        assert!(!quant.data[&1].valid);
        assert!(quant.data[&2].valid);
        assert_eq!(quant.invalid_labels().collect::<Vec<_>>(), vec![1]);

        filter_invalid(&mut store, &quant).unwrap();
        assert_eq!(store.labels3d().count(1), 0);
        assert_eq!(store.labels3d().count(2), 64);
    }
}
