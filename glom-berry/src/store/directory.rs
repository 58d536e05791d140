//! 目录后端的平面存储.
//!
//! 一个样本即一个目录, 每个平面一个文件:
//!
//! ```text
//! <sample>/
//!   scan/          输入强度平面 (任意 `image` crate 可解码的灰度格式,
//!                  按文件名升序对应 z = 0, 1, ...)
//!   tissue/        组织掩膜, z0000.png ...
//!   glomeruli2d/   肾小球掩膜, z0000.png ...
//!   labels3d/      全局标签平面, z0000.npy ... (u32)
//! ```
//!
//! 掩膜以 8-bit 灰度 PNG 存储; 标签是 32-bit 整数, 超出常见灰度图像
//! 格式的位深, 故存为 npy.

use super::{Channel, LabelSink, PlaneStore, StoreError, StoreErrorKind};
use crate::{
    GeometryAttr, Idx2d, ImgWriteRaw, OwnedLabelSlice, OwnedMaskSlice, OwnedScanSlice,
    StackGeometry, VoxelSize,
};
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::fs::File;
use std::path::{Path, PathBuf};

/// 打开 `DirectoryStore` 错误.
#[derive(Debug)]
pub enum OpenStoreError {
    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// `scan/` 子目录不存在或不含任何平面文件.
    NoScanPlanes(PathBuf),

    /// 首个平面解码失败, 无法确定体数据形状.
    Image(image::ImageError),
}

/// 以样本目录为后端的平面存储.
pub struct DirectoryStore {
    root: PathBuf,
    scan_files: Vec<PathBuf>,
    geometry: StackGeometry,
}

impl DirectoryStore {
    /// 打开样本目录.
    ///
    /// 扫描 `<root>/scan/` 下的所有普通文件并按文件名升序确定 z 顺序,
    /// 解码第一个平面以确定固定的平面形状, 同时确保三个输出子目录存在.
    pub fn open<P: AsRef<Path>>(root: P, voxel: VoxelSize) -> Result<DirectoryStore, OpenStoreError> {
        let root = root.as_ref().to_path_buf();
        let scan_dir = root.join("scan");

        let mut scan_files: Vec<PathBuf> = std::fs::read_dir(&scan_dir)
            .map_err(OpenStoreError::Io)?
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                path.is_file().then_some(path)
            })
            .collect();
        scan_files.sort();
        if scan_files.is_empty() {
            return Err(OpenStoreError::NoScanPlanes(scan_dir));
        }

        let first = image::open(&scan_files[0])
            .map_err(OpenStoreError::Image)?
            .into_luma16();
        let (w, h) = (first.width() as usize, first.height() as usize);
        let geometry = StackGeometry::new((scan_files.len(), h, w), voxel);

        for sub in ["tissue", "glomeruli2d", "labels3d"] {
            std::fs::create_dir_all(root.join(sub)).map_err(OpenStoreError::Io)?;
        }

        Ok(Self {
            root,
            scan_files,
            geometry,
        })
    }

    /// 样本目录路径.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn plane_path(&self, sub: &str, z: usize, ext: &str) -> PathBuf {
        self.root.join(sub).join(format!("z{z:04}.{ext}"))
    }

    fn check_z(&self, z: usize, channel: Channel) -> Result<(), StoreError> {
        if z >= self.len_z() {
            return Err(StoreError::new(z, channel, StoreErrorKind::NotFound));
        }
        Ok(())
    }

    fn check_shape(&self, z: usize, channel: Channel, actual: Idx2d) -> Result<(), StoreError> {
        let expected = self.slice_shape();
        if actual != expected {
            return Err(StoreError::new(
                z,
                channel,
                StoreErrorKind::BadShape { expected, actual },
            ));
        }
        Ok(())
    }

    /// 读取一个 8-bit 灰度掩膜平面.
    fn read_mask_plane(&self, path: &Path, z: usize, channel: Channel) -> Result<OwnedMaskSlice, StoreError> {
        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                StoreError::new(z, channel, StoreErrorKind::NotFound)
            }
            other => StoreError::new(z, channel, StoreErrorKind::Image(other)),
        })?;
        let gray = img.into_luma8();
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        self.check_shape(z, channel, (h, w))?;

        let data = Array2::from_shape_fn((h, w), |(ph, pw)| gray.get_pixel(pw as u32, ph as u32)[0]);
        Ok(OwnedMaskSlice::from_raw(data))
    }

    /// 写出一个 8-bit 灰度掩膜平面.
    fn write_mask_plane(
        &self,
        path: &Path,
        z: usize,
        channel: Channel,
        plane: &OwnedMaskSlice,
    ) -> Result<(), StoreError> {
        self.check_z(z, channel)?;
        self.check_shape(z, channel, plane.as_immut().shape())?;
        plane
            .as_immut()
            .save_raw(path)
            .map_err(|e| StoreError::new(z, channel, StoreErrorKind::Image(e)))
    }
}

impl GeometryAttr for DirectoryStore {
    #[inline]
    fn geometry(&self) -> StackGeometry {
        self.geometry
    }
}

impl LabelSink for DirectoryStore {
    fn write_labels(&mut self, z: usize, plane: &OwnedLabelSlice) -> Result<(), StoreError> {
        self.check_z(z, Channel::Labels3d)?;
        self.check_shape(z, Channel::Labels3d, plane.as_immut().shape())?;

        let path = self.plane_path("labels3d", z, "npy");
        let file = File::create(path)
            .map_err(|e| StoreError::new(z, Channel::Labels3d, StoreErrorKind::Io(e)))?;
        plane
            .as_immut()
            .array_view()
            .write_npy(file)
            .map_err(|e| StoreError::new(z, Channel::Labels3d, StoreErrorKind::NpyWrite(e)))
    }
}

impl PlaneStore for DirectoryStore {
    fn read_scan(&self, z: usize) -> Result<OwnedScanSlice, StoreError> {
        self.check_z(z, Channel::Scan)?;
        let img = image::open(&self.scan_files[z])
            .map_err(|e| StoreError::new(z, Channel::Scan, StoreErrorKind::Image(e)))?;
        let gray = img.into_luma16();
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        self.check_shape(z, Channel::Scan, (h, w))?;

        let data =
            Array2::from_shape_fn((h, w), |(ph, pw)| gray.get_pixel(pw as u32, ph as u32)[0] as f32);
        Ok(OwnedScanSlice::from_raw(data))
    }

    fn read_tissue(&self, z: usize) -> Result<OwnedMaskSlice, StoreError> {
        self.check_z(z, Channel::Tissue)?;
        self.read_mask_plane(&self.plane_path("tissue", z, "png"), z, Channel::Tissue)
    }

    fn write_tissue(&mut self, z: usize, plane: &OwnedMaskSlice) -> Result<(), StoreError> {
        self.write_mask_plane(&self.plane_path("tissue", z, "png"), z, Channel::Tissue, plane)
    }

    fn read_glomeruli2d(&self, z: usize) -> Result<OwnedMaskSlice, StoreError> {
        self.check_z(z, Channel::Glomeruli2d)?;
        self.read_mask_plane(
            &self.plane_path("glomeruli2d", z, "png"),
            z,
            Channel::Glomeruli2d,
        )
    }

    fn write_glomeruli2d(&mut self, z: usize, plane: &OwnedMaskSlice) -> Result<(), StoreError> {
        self.write_mask_plane(
            &self.plane_path("glomeruli2d", z, "png"),
            z,
            Channel::Glomeruli2d,
            plane,
        )
    }

    fn read_labels(&self, z: usize) -> Result<OwnedLabelSlice, StoreError> {
        self.check_z(z, Channel::Labels3d)?;
        let path = self.plane_path("labels3d", z, "npy");
        let file = File::open(&path).map_err(|e| {
            let kind = if e.kind() == std::io::ErrorKind::NotFound {
                StoreErrorKind::NotFound
            } else {
                StoreErrorKind::Io(e)
            };
            StoreError::new(z, Channel::Labels3d, kind)
        })?;
        let data = Array2::<u32>::read_npy(file)
            .map_err(|e| StoreError::new(z, Channel::Labels3d, StoreErrorKind::NpyRead(e)))?;

        let &[h, w] = data.shape() else { unreachable!() };
        self.check_shape(z, Channel::Labels3d, (h, w))?;
        Ok(OwnedLabelSlice::from_raw(data))
    }
}
