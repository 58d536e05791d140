//! 肾脏样本批处理入口.
//!
//! 对数据集目录下的每个样本目录运行完整管线 (组织分割 → 肾小球分割 →
//! 跨平面标识解析 → 量化过滤), 样本之间用线程池并行;
//! 单个样本内部的标识解析保持串行.
//!
//! 用法:
//!
//! ```text
//! kidney [dataset_dir] [voxel_xy] [voxel_z]
//! ```
//!
//! `dataset_dir` 缺省为 `{用户主目录}/dataset`; 体素尺寸以微米为单位,
//! 缺省为 1.0.

use glom_berry::prelude::*;
use log::{error, info};
use std::path::PathBuf;
use std::sync::mpsc::channel;
use threadpool::ThreadPool;

/// 获取并行工作线程数.
fn thread_num() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 处理单个样本. 返回有效对象个数.
fn process_sample(dir: &PathBuf, cfg: &PipelineConfig) -> Result<u32, String> {
    let mut store = DirectoryStore::open(dir, cfg.voxel)
        .map_err(|e| format!("打开样本失败: {e:?}"))?;

    let quant = run_volume(&mut store, cfg).map_err(|e| format!("管线失败: {e:?}"))?;

    let report = dir.join("quantified.bin");
    quant
        .save(&report)
        .map_err(|e| format!("写出量化报告失败: {e:?}"))?;

    info!(
        "{}: {} 个有效对象, 直径均值 {:.2} µm",
        dir.display(),
        quant.valid_count,
        quant.diameter_average
    );
    Ok(quant.valid_count)
}

fn main() {
    simple_logger::init_with_level(log::Level::Info).expect("日志初始化失败");

    let mut args = std::env::args().skip(1);
    let dataset_dir = args
        .next()
        .map(PathBuf::from)
        .or_else(dataset::home_dataset_dir)
        .expect("无法确定数据集目录");
    let voxel_xy: f64 = args.next().map_or(1.0, |s| s.parse().expect("voxel_xy 非法"));
    let voxel_z: f64 = args.next().map_or(1.0, |s| s.parse().expect("voxel_z 非法"));

    let voxel = VoxelSize::new(voxel_xy, voxel_z).expect("体素尺寸必须为正");
    let cfg = PipelineConfig::with_voxel(voxel);
    cfg.validate().expect("配置非法");

    let samples = sample_dirs(&dataset_dir).expect("枚举样本目录失败");
    assert!(!samples.is_empty(), "数据集目录下没有样本: {dataset_dir:?}");
    info!(
        "发现 {} 个样本, 窗口长度 W = {}",
        samples.len(),
        cfg.window_len()
    );

    let pool = ThreadPool::new(thread_num());
    let (tx, rx) = channel();
    let total = samples.len();

    for dir in samples {
        let tx = tx.clone();
        pool.execute(move || {
            let outcome = process_sample(&dir, &cfg);
            tx.send((dir, outcome)).expect("结果通道关闭");
        });
    }
    drop(tx);

    let mut failed = 0usize;
    for (dir, outcome) in rx.iter() {
        if let Err(msg) = outcome {
            failed += 1;
            error!("{}: {msg}", dir.display());
        }
    }
    pool.join();

    if failed > 0 {
        error!("{failed}/{total} 个样本处理失败");
        std::process::exit(1);
    }
    info!("全部 {total} 个样本处理完成");
}
