//! 数据集操作.
//!
//! 约定: 一个数据集目录下, 每个样本是一个含 `scan/` 子目录的子目录
//! (参见 [`crate::store::DirectoryStore`] 的目录布局).

use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

/// 懒解析的 `{用户主目录}/dataset` 目录. 主目录在进程生命周期内不变,
/// 解析一次即可.
static HOME_DATASET_DIR: Lazy<Option<PathBuf>> = Lazy::new(|| {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
});

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    HOME_DATASET_DIR.clone()
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 枚举数据集目录下的所有样本目录 (含 `scan/` 子目录的子目录),
/// 按路径升序返回.
pub fn sample_dirs<P: AsRef<Path>>(dataset: P) -> std::io::Result<Vec<PathBuf>> {
    let mut ans: Vec<PathBuf> = std::fs::read_dir(dataset.as_ref())?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            (path.is_dir() && path.join("scan").is_dir()).then_some(path)
        })
        .collect();
    ans.sort();
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::{home_dataset_dir, home_dataset_dir_with, sample_dirs};

    #[test]
    fn test_home_dataset_dir_layout() {
        // 无主目录的环境 (部分 CI) 下两者都应是 None.
        let Some(base) = home_dataset_dir() else {
            assert!(home_dataset_dir_with(["x"]).is_none());
            return;
        };
        assert!(base.ends_with("dataset"));
        let sub = home_dataset_dir_with(["sample-1", "scan"]).unwrap();
        assert!(sub.starts_with(&base));
        assert!(sub.ends_with("sample-1/scan"));
    }

    #[test]
    fn test_sample_dirs_filters_and_sorts() {
        let root = std::env::temp_dir()
            .join("glom-berry-tests")
            .join(format!("dataset-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(root.join("b-sample").join("scan")).unwrap();
        std::fs::create_dir_all(root.join("a-sample").join("scan")).unwrap();
        std::fs::create_dir_all(root.join("not-a-sample")).unwrap();

        let samples = sample_dirs(&root).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(samples[0].ends_with("a-sample"));
        assert!(samples[1].ends_with("b-sample"));
    }
}
