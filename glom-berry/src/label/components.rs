//! 单平面 4-连通分量标记.

use crate::consts::gray::is_foreground;
use crate::consts::label::LABEL_BACKGROUND;
use crate::{Idx2d, MaskSlice, OwnedLabelSlice};
use std::collections::VecDeque;

/// 对一个二值掩膜平面做 4-连通分量标记.
///
/// 前景像素被编号为 `1..=N` 的局部标识, 0 为背景; `N` 不超过平面像素数.
/// 分量按行优先扫描中首像素出现的先后编号, 保证同一平面的标记结果
/// 在任何运行中都一致.
///
/// 返回 (标签平面, N).
pub fn label_components(mask: &MaskSlice) -> (OwnedLabelSlice, u32) {
    let mut labels = OwnedLabelSlice::zeros(mask.shape());
    let mut next = 0u32;
    let mut bfs_q: VecDeque<Idx2d> = VecDeque::with_capacity(4);

    {
        let mut view = labels.as_mutable();
        for pos in mask.pos_iter() {
            if !is_foreground(mask[pos]) || view[pos] != LABEL_BACKGROUND {
                continue;
            }

            // 新分量, 从首像素开始 BFS.
            next += 1;
            view[pos] = next;
            bfs_q.push_back(pos);

            while let Some((h, w)) = bfs_q.pop_front() {
                let neighbours = [
                    (h.wrapping_sub(1), w),
                    (h + 1, w),
                    (h, w.wrapping_sub(1)),
                    (h, w + 1),
                ];
                for npos in neighbours {
                    if mask.check(npos)
                        && is_foreground(mask[npos])
                        && view[npos] == LABEL_BACKGROUND
                    {
                        view[npos] = next;
                        bfs_q.push_back(npos);
                    }
                }
            }
        }
    }

    (labels, next)
}
