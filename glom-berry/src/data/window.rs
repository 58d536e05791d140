use crate::ScanSlice;
use ordered_float::NotNan;

/// 强度窗口, 将 `[0, max]` 范围内的荧光强度离散化为 8-bit 灰度值.
///
/// 显微镜强度平面在构建直方图 (Otsu) 之前必须被规范化到 `0..=255`
/// 的整数区间. 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug)]
pub struct SignalWindow {
    max: f32,
}

impl SignalWindow {
    /// 构建强度窗口.
    ///
    /// `max` 必须是正的有限值, 否则返回 `None`.
    pub fn new(max: f32) -> Option<SignalWindow> {
        (max.is_finite() && max > 0.0).then_some(Self { max })
    }

    /// 以 `scan` 的最大强度为上限构建窗口.
    ///
    /// 如果平面为空或不存在正强度像素 (即全背景平面), 则返回 `None`.
    /// 调用方应将该情况短路处理为空掩膜, 而不是继续分割.
    pub fn from_scan(scan: &ScanSlice) -> Option<SignalWindow> {
        let max = scan
            .iter()
            .copied()
            .filter_map(|v| NotNan::new(v).ok())
            .max()?;
        Self::new(max.into_inner())
    }

    /// 窗口上限.
    #[inline]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// 求在当前窗口设置下, 强度 `v` 对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, v: f32) -> Option<u8> {
        if !v.is_finite() {
            return None;
        }
        if v <= 0.0 {
            Some(u8::MIN)
        } else if v >= self.max {
            Some(u8::MAX)
        } else {
            // 255, not 256.
            Some((v / self.max * 255.0) as u8)
        }
    }

    /// 求在当前窗口设置下, 强度 `v` 对应的灰度分布点 (0.0 <= value <= 255.0).
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_f32(&self, v: f32) -> Option<f32> {
        if !v.is_finite() {
            return None;
        }
        if v <= 0.0 {
            Some(0.0)
        } else if v >= self.max {
            Some(255.0)
        } else {
            Some(v / self.max * 255.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SignalWindow;
    use crate::OwnedScanSlice;
    use ndarray::array;

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-8
    }

    #[test]
    fn test_signal_window_invalid_input() {
        assert!(SignalWindow::new(0.0).is_none());
        assert!(SignalWindow::new(-1.0).is_none());
        assert!(SignalWindow::new(f32::NAN).is_none());
        assert!(SignalWindow::new(f32::INFINITY).is_none());
    }

    #[test]
    fn test_signal_window_generic() {
        let win = SignalWindow::new(200.0).unwrap();
        assert_eq!(win.eval(f32::NAN), None);
        assert_eq!(win.eval(-1.0), Some(0));
        assert_eq!(win.eval(0.0), Some(0));
        assert_eq!(win.eval(200.0), Some(255));
        assert_eq!(win.eval(1e10), Some(255));

        assert_eq!(win.eval(50.0).unwrap(), (255.0 * 0.25) as u8);
        assert!(float_eq(win.eval_f32(50.0).unwrap(), 255.0 * 0.25));
        assert_eq!(win.eval(100.0).unwrap(), (255.0 * 0.5) as u8);
        assert!(float_eq(win.eval_f32(100.0).unwrap(), 255.0 * 0.5));
    }

    #[test]
    fn test_signal_window_from_scan() {
        let scan = OwnedScanSlice::from_raw(array![[0.0, 3.0], [1.5, 0.0]]);
        let win = SignalWindow::from_scan(&scan.as_immut()).unwrap();
        assert!(float_eq(win.max(), 3.0));

        // 全背景平面不构成合法窗口.
        let blank = OwnedScanSlice::zeros((3, 3));
        assert!(SignalWindow::from_scan(&blank.as_immut()).is_none());
    }
}
