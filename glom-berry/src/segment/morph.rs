//! 二维形态学操作与空洞闭合.

use crate::consts::gray::*;
use crate::{GraySlice, GraySliceMut, Idx2d, OwnedGraySlice};

/// 圆盘结构元.
///
/// 收集满足 `dh² + dw² < r²` 的整数偏移 (半径边界本身不含在内).
/// 半径 0 退化为仅含中心的恒等结构元.
#[derive(Debug, Clone)]
pub struct Disk {
    radius: usize,
    offsets: Vec<(isize, isize)>,
}

impl Disk {
    /// 构建半径为 `radius` (像素) 的圆盘结构元.
    pub fn new(radius: usize) -> Disk {
        let r = radius as isize;
        let mut offsets = Vec::with_capacity((2 * radius + 1).pow(2));
        for dh in -r..=r {
            for dw in -r..=r {
                if dh * dh + dw * dw < r * r {
                    offsets.push((dh, dw));
                }
            }
        }
        if offsets.is_empty() {
            offsets.push((0, 0));
        }
        Self { radius, offsets }
    }

    /// 结构元半径.
    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// 结构元覆盖的偏移集合.
    #[inline]
    pub fn offsets(&self) -> &[(isize, isize)] {
        &self.offsets
    }
}

/// 以 `pos` 为中心, 迭代 `disk` 覆盖且未越界的邻域索引.
#[inline]
fn disk_positions<'a>(
    (h, w): Idx2d,
    shape: Idx2d,
    disk: &'a Disk,
) -> impl Iterator<Item = Idx2d> + 'a {
    let (h_len, w_len) = shape;
    disk.offsets().iter().filter_map(move |&(dh, dw)| {
        let nh = h.checked_add_signed(dh)?;
        let nw = w.checked_add_signed(dw)?;
        (nh < h_len && nw < w_len).then_some((nh, nw))
    })
}

/// 形态学实现块.
///
/// 所有操作对边界外像素采取中性策略: 越界偏移不参与邻域统计.
/// 对 0/255 二值掩膜而言, 灰度腐蚀/膨胀 (邻域 min/max) 与二值形态学等价,
/// 因此掩膜与灰度平面共用同一套实现.
impl GraySlice<'_> {
    /// 以 `disk` 为结构元腐蚀 (邻域最小值滤波), 返回新平面.
    pub fn eroded(&self, disk: &Disk) -> OwnedGraySlice {
        self.neighbourhood_filter(disk, |acc, v| acc.min(v), u8::MAX)
    }

    /// 以 `disk` 为结构元膨胀 (邻域最大值滤波), 返回新平面.
    pub fn dilated(&self, disk: &Disk) -> OwnedGraySlice {
        self.neighbourhood_filter(disk, |acc, v| acc.max(v), u8::MIN)
    }

    /// 开运算: 先腐蚀后膨胀. 抑制小于结构元的亮斑.
    pub fn opened(&self, disk: &Disk) -> OwnedGraySlice {
        self.eroded(disk).as_immut().dilated(disk)
    }

    /// 闭运算: 先膨胀后腐蚀.
    pub fn closed(&self, disk: &Disk) -> OwnedGraySlice {
        self.dilated(disk).as_immut().eroded(disk)
    }

    /// 顶帽变换: 从原平面减去其开运算结果 (饱和减法).
    ///
    /// 用远大于目标对象的结构元做开运算能估计不均匀的背景照度,
    /// 相减后只留下比背景亮的小对象.
    pub fn tophat(&self, disk: &Disk) -> OwnedGraySlice {
        let opened = self.opened(disk);
        let mut out = self.to_owned();
        for (dst, sub) in out.as_mutable().iter_mut().zip(opened.as_immut().iter()) {
            *dst = dst.saturating_sub(*sub);
        }
        out
    }

    /// 通用邻域聚合滤波.
    fn neighbourhood_filter(
        &self,
        disk: &Disk,
        op: impl Fn(u8, u8) -> u8,
        init: u8,
    ) -> OwnedGraySlice {
        let mut out = OwnedGraySlice::zeros(self.shape());
        {
            let mut view = out.as_mutable();
            for pos in self.pos_iter() {
                let mut acc = init;
                for npos in disk_positions(pos, self.shape(), disk) {
                    acc = op(acc, self[npos]);
                }
                view[pos] = acc;
            }
        }
        out
    }
}

/// 空洞闭合实现块.
impl GraySliceMut<'_> {
    /// 闭合掩膜中的背景空洞.
    ///
    /// 从四条边上的每个零值像素出发做 4-邻域洪泛填充 (显式栈迭代,
    /// 避免大平面上的递归深度爆炸), 标记所有与边界连通的背景;
    /// 其余未被标记的零值像素即为被前景完全包围的空洞, 翻转为前景.
    ///
    /// 1 像素宽/高的平面同样正确: 角点可能同时属于两条边,
    /// 但标记缓冲保证其只入栈一次.
    pub fn close_holes(&mut self) {
        let (rows, cols) = self.shape();
        if rows == 0 || cols == 0 {
            return;
        }

        let mut buffer = OwnedGraySlice::zeros(self.shape());
        let mut stack: Vec<Idx2d> = Vec::with_capacity(2 * (rows + cols));

        {
            let mut marked = buffer.as_mutable();
            let mut seed = |pos: Idx2d, marked: &mut GraySliceMut, stack: &mut Vec<Idx2d>| {
                if is_background(self[pos]) && is_background(marked[pos]) {
                    marked[pos] = MASK_FOREGROUND;
                    stack.push(pos);
                }
            };

            // 左右两条边.
            for h in 0..rows {
                seed((h, 0), &mut marked, &mut stack);
                seed((h, cols - 1), &mut marked, &mut stack);
            }
            // 上下两条边.
            for w in 0..cols {
                seed((0, w), &mut marked, &mut stack);
                seed((rows - 1, w), &mut marked, &mut stack);
            }

            while let Some((h, w)) = stack.pop() {
                let neighbours = [
                    (h.wrapping_sub(1), w),
                    (h + 1, w),
                    (h, w.wrapping_sub(1)),
                    (h, w + 1),
                ];
                for npos in neighbours {
                    if !self.check(npos) {
                        continue;
                    }
                    if is_background(self[npos]) && is_background(marked[npos]) {
                        marked[npos] = MASK_FOREGROUND;
                        stack.push(npos);
                    }
                }
            }
        }

        // 未被标记到的像素 (前景与内部空洞) 统一翻转为前景.
        for (dst, reached) in self.iter_mut().zip(buffer.as_immut().iter()) {
            *dst = if is_foreground(*reached) {
                MASK_BACKGROUND
            } else {
                MASK_FOREGROUND
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OwnedMaskSlice;
    use ndarray::array;

    #[test]
    fn test_disk_shape() {
        // 半径 0/1 退化为单像素恒等.
        assert_eq!(Disk::new(0).offsets(), &[(0, 0)]);
        assert_eq!(Disk::new(1).offsets(), &[(0, 0)]);

        // 半径 2: dh² + dw² < 4.
        let d = Disk::new(2);
        assert_eq!(d.radius(), 2);
        assert_eq!(d.offsets().len(), 9);
        assert!(d.offsets().contains(&(-1, -1)));
        assert!(!d.offsets().contains(&(0, 2)));
    }

    #[test]
    fn test_open_removes_speckle() {
        // 单像素斑点会被半径 2 的开运算去除, 大块前景保留核心.
        let mut data = ndarray::Array2::<u8>::zeros((9, 9));
        data[(1, 1)] = 255;
        for h in 3..8 {
            for w in 3..8 {
                data[(h, w)] = 255;
            }
        }
        let mask = OwnedMaskSlice::from_raw(data);
        let opened = mask.as_immut().opened(&Disk::new(2));
        let v = opened.as_immut();
        assert_eq!(v[(1, 1)], 0);
        assert_eq!(v[(5, 5)], 255);
        assert!(v.count_foreground() > 0);
    }

    #[test]
    fn test_dilate_then_erode_roundtrip_interior() {
        let mut data = ndarray::Array2::<u8>::zeros((7, 7));
        for h in 2..5 {
            for w in 2..5 {
                data[(h, w)] = 255;
            }
        }
        let mask = OwnedMaskSlice::from_raw(data.clone());
        let closed = mask.as_immut().closed(&Disk::new(2));
        // 实心方块的闭运算不改变内容.
        assert_eq!(closed.as_immut().count_foreground(), 9);
        assert_eq!(closed.as_immut()[(3, 3)], 255);
    }

    #[test]
    fn test_tophat_flattens_background() {
        // 均匀亮背景上的一个小亮点: 顶帽留下亮点, 压掉背景.
        let mut data = ndarray::Array2::<u8>::from_elem((9, 9), 100);
        data[(4, 4)] = 200;
        let img = OwnedGraySlice::from_raw(data);
        let th = img.as_immut().tophat(&Disk::new(3));
        let v = th.as_immut();
        assert_eq!(v[(0, 0)], 0);
        assert_eq!(v[(4, 4)], 100);
    }

    #[test]
    fn test_close_holes_enclosed_region() {
        let mut mask = OwnedMaskSlice::from_raw(array![
            [255, 255, 255, 255],
            [255, 0, 0, 255],
            [255, 0, 0, 255],
            [255, 255, 255, 255],
        ]);
        mask.as_mutable().close_holes();
        assert_eq!(mask.as_immut().count_foreground(), 16);
    }

    #[test]
    fn test_close_holes_keeps_border_background() {
        // 开口朝向边界的凹槽不是空洞.
        let mut mask = OwnedMaskSlice::from_raw(array![
            [255, 0, 255, 255],
            [255, 0, 0, 255],
            [255, 255, 255, 255],
        ]);
        mask.as_mutable().close_holes();
        let v = mask.as_immut();
        assert_eq!(v[(0, 1)], 0);
        assert_eq!(v[(1, 1)], 0);
        assert_eq!(v[(1, 2)], 0);
        assert_eq!(v.count_foreground(), 9);
    }

    #[test]
    fn test_close_holes_one_pixel_wide() {
        // 1 像素宽的平面: 所有背景都与边界连通, 不发生填充.
        let mut mask = OwnedMaskSlice::from_raw(array![[0], [255], [0], [255], [0]]);
        mask.as_mutable().close_holes();
        let v = mask.as_immut();
        assert_eq!(v.count_foreground(), 2);
        assert_eq!(v[(0, 0)], 0);
        assert_eq!(v[(2, 0)], 0);
        assert_eq!(v[(4, 0)], 0);
    }
}
