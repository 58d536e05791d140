//! 内存驻留的平面存储.

use super::{Channel, LabelSink, PlaneStore, StoreError, StoreErrorKind};
use crate::{
    GeometryAttr, LabelStack, MaskStack, OwnedLabelSlice, OwnedMaskSlice, OwnedScanSlice,
    ScanStack, StackGeometry,
};

/// 以内存体数据为后端的平面存储.
///
/// 服务于小型体数据、合成数据与测试场景; 大型体数据应使用
/// [`super::DirectoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    scan: ScanStack,
    tissue: MaskStack,
    glomeruli2d: MaskStack,
    labels3d: LabelStack,
}

impl MemoryStore {
    /// 以 `scan` 为输入体数据创建存储, 其余通道初始化为全背景.
    pub fn from_scan(scan: ScanStack) -> MemoryStore {
        let (shape, voxel) = (scan.shape(), scan.voxel_size());
        Self {
            scan,
            tissue: MaskStack::zeros(shape, voxel),
            glomeruli2d: MaskStack::zeros(shape, voxel),
            labels3d: LabelStack::zeros(shape, voxel),
        }
    }

    /// 获取标签通道的整体视图.
    #[inline]
    pub fn labels3d(&self) -> &LabelStack {
        &self.labels3d
    }

    /// 获取组织通道的整体视图.
    #[inline]
    pub fn tissue(&self) -> &MaskStack {
        &self.tissue
    }

    /// 获取肾小球掩膜通道的整体视图.
    #[inline]
    pub fn glomeruli2d(&self) -> &MaskStack {
        &self.glomeruli2d
    }

    /// 校验 z 与平面形状, 返回带通道标记的错误.
    fn check_plane(
        &self,
        z: usize,
        channel: Channel,
        actual: crate::Idx2d,
    ) -> Result<(), StoreError> {
        if z >= self.len_z() {
            return Err(StoreError::new(z, channel, StoreErrorKind::NotFound));
        }
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

    fn check_z(&self, z: usize, channel: Channel) -> Result<(), StoreError> {
        if z >= self.len_z() {
            return Err(StoreError::new(z, channel, StoreErrorKind::NotFound));
        }
        Ok(())
    }
}

impl GeometryAttr for MemoryStore {
    #[inline]
    fn geometry(&self) -> StackGeometry {
        self.scan.geometry()
    }
}

impl LabelSink for MemoryStore {
    fn write_labels(&mut self, z: usize, plane: &OwnedLabelSlice) -> Result<(), StoreError> {
        self.check_plane(z, Channel::Labels3d, plane.as_immut().shape())?;
        self.labels3d.set_slice(z, plane);
        Ok(())
    }
}

impl PlaneStore for MemoryStore {
    fn read_scan(&self, z: usize) -> Result<OwnedScanSlice, StoreError> {
        self.check_z(z, Channel::Scan)?;
        Ok(self.scan.slice_at(z).to_owned())
    }

    fn read_tissue(&self, z: usize) -> Result<OwnedMaskSlice, StoreError> {
        self.check_z(z, Channel::Tissue)?;
        Ok(self.tissue.slice_at(z).to_owned())
    }

    fn write_tissue(&mut self, z: usize, plane: &OwnedMaskSlice) -> Result<(), StoreError> {
        self.check_plane(z, Channel::Tissue, plane.as_immut().shape())?;
        self.tissue.set_slice(z, plane);
        Ok(())
    }

    fn read_glomeruli2d(&self, z: usize) -> Result<OwnedMaskSlice, StoreError> {
        self.check_z(z, Channel::Glomeruli2d)?;
        Ok(self.glomeruli2d.slice_at(z).to_owned())
    }

    fn write_glomeruli2d(&mut self, z: usize, plane: &OwnedMaskSlice) -> Result<(), StoreError> {
        self.check_plane(z, Channel::Glomeruli2d, plane.as_immut().shape())?;
        self.glomeruli2d.set_slice(z, plane);
        Ok(())
    }

    fn read_labels(&self, z: usize) -> Result<OwnedLabelSlice, StoreError> {
        self.check_z(z, Channel::Labels3d)?;
        Ok(self.labels3d.slice_at(z).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;
    use crate::VoxelSize;

    fn small_store() -> MemoryStore {
        MemoryStore::from_scan(ScanStack::zeros((3, 4, 5), VoxelSize::isotropic_unit()))
    }

    #[test]
    fn test_read_write_roundtrip() {
        let mut store = small_store();
        let mut mask = OwnedMaskSlice::zeros((4, 5));
        mask.as_mutable()[(1, 2)] = 255;
        store.write_tissue(2, &mask).unwrap();
        let back = store.read_tissue(2).unwrap();
        assert_eq!(back.as_immut()[(1, 2)], 255);
        assert_eq!(back.as_immut().count_foreground(), 1);
    }

    #[test]
    fn test_out_of_range_tagged_with_z() {
        let store = small_store();
        let err = store.read_scan(7).unwrap_err();
        assert_eq!(err.z, 7);
        assert_eq!(err.channel, Channel::Scan);
        assert!(matches!(err.kind, StoreErrorKind::NotFound));
    }

    #[test]
    fn test_bad_shape_rejected() {
        let mut store = small_store();
        let plane = OwnedLabelSlice::zeros((9, 9));
        let err = store.write_labels(0, &plane).unwrap_err();
        assert!(matches!(
            err.kind,
            StoreErrorKind::BadShape {
                expected: (4, 5),
                actual: (9, 9)
            }
        ));
    }
}
