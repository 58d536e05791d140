//! 跨平面标识解析.
//!
//! 将一串相互独立编号的逐平面标签图转化为全体数据一致的全局标签,
//! 内存占用有界. 本模块是整条管线中唯一 **必须严格按 z 升序串行**
//! 运行的部分: 每个平面的解析依赖上一平面已定的全局标识,
//! 且合并修正会就地改写窗口内所有已解析平面.

use super::components::label_components;
use crate::consts::label::is_object;
use crate::store::{LabelSink, StoreError};
use crate::{Idx2d, MaskSlice, OwnedLabelSlice};
use log::debug;
use std::collections::{HashMap, VecDeque};

/// 跨平面解析的致命错误. 全部属于前置条件违例或 flush 失败,
/// 不存在可跳过恢复的情形.
#[derive(Debug)]
pub enum ResolveError {
    /// 滑动窗口长度必须不小于 1.
    WindowTooShort,

    /// 平面形状与体数据的固定形状不一致.
    ShapeMismatch {
        /// 肇事平面的 z 索引.
        z: usize,
        /// 体数据的固定平面形状.
        expected: Idx2d,
        /// 实际提交的平面形状.
        actual: Idx2d,
    },

    /// 解析过程中的平面读写失败 (读取掩膜或 flush 标签).
    /// 对该体数据的整个解析是致命的.
    Store(StoreError),
}

impl From<StoreError> for ResolveError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// 局部标签到上一平面全局标签的邻接表.
///
/// 表项与每个表项的边集都保持 **行优先扫描首次触及** 的插入序,
/// 合并事件 "首遇存活者" 的决定性完全来自该顺序. `HashMap`
/// 只作为 O(1) 查找索引, 从不被迭代.
struct AdjacencyMap {
    order: Vec<(u32, Vec<u32>)>,
    index: HashMap<u32, usize>,
}

impl AdjacencyMap {
    fn with_capacity(cap: usize) -> Self {
        Self {
            order: Vec::with_capacity(cap),
            index: HashMap::with_capacity(cap),
        }
    }

    /// 声明局部标签 `local` 存在, 并在 `prev_global` 非背景时记录一条边.
    fn touch(&mut self, local: u32, prev_global: u32) {
        let slot = *self.index.entry(local).or_insert_with(|| {
            self.order.push((local, Vec::new()));
            self.order.len() - 1
        });
        if is_object(prev_global) {
            let edges = &mut self.order[slot].1;
            if !edges.contains(&prev_global) {
                edges.push(prev_global);
            }
        }
    }
}

/// 跨平面标识解析器.
///
/// 按 z 升序逐平面消费二值掩膜, 维护一个最多 `window_len` 个已解析平面的
/// 滑动窗口 (有界环形缓冲), 并把滑出窗口的平面 flush 到标签存储.
///
/// # 已知行为边界
///
/// 1. 一个对象在后续平面分裂为多个不相交区域时, 所有子区域 **继承同一个**
///    原全局标识, 不会产生新标识; 该算法只表达合并, 不表达分裂.
/// 2. z 跨度超过窗口长度 W 的对象, 其合并修正无法触及已 flush 的平面,
///    会被静默拆成两个全局标识. 这是算法的显式正确性边界, 调用方应
///    按最大期望对象跨度配置 W (参见 [`crate::PipelineConfig::window_len`]).
pub struct SliceResolver {
    /// 体数据的固定平面形状.
    slice_shape: Idx2d,

    /// 窗口长度 W.
    limit: usize,

    /// 滑动窗口: 已解析、仍可变的平面, 按 z 升序.
    window: VecDeque<OwnedLabelSlice>,

    /// 窗口最老平面的 z (低水位).
    first_z: usize,

    /// 下一个待提交平面的 z.
    next_z: usize,

    /// 全局标识计数器. 单调递增, 被合并吞掉的标识永不复用.
    global_max_label: u32,

    /// `finish` 之后不允许再提交平面.
    finished: bool,
}

impl SliceResolver {
    /// 创建解析器. `slice_shape` 是体数据的固定平面形状 (高, 宽),
    /// `window_len` 是滑动窗口长度 W.
    ///
    /// `window_len` 为 0 时返回 [`ResolveError::WindowTooShort`].
    pub fn new(slice_shape: Idx2d, window_len: usize) -> Result<SliceResolver, ResolveError> {
        if window_len < 1 {
            return Err(ResolveError::WindowTooShort);
        }
        Ok(Self {
            slice_shape,
            limit: window_len,
            window: VecDeque::with_capacity(window_len + 1),
            first_z: 0,
            next_z: 0,
            global_max_label: 0,
            finished: false,
        })
    }

    /// 迄今为止分配过的全局标识总数 (含已被合并吞掉的).
    #[inline]
    pub fn global_label_count(&self) -> u32 {
        self.global_max_label
    }

    /// 下一个待提交平面的 z.
    #[inline]
    pub fn next_z(&self) -> usize {
        self.next_z
    }

    /// 当前驻留在窗口内的平面数.
    #[inline]
    pub fn resident_len(&self) -> usize {
        self.window.len()
    }

    /// 提交下一个 z 平面的二值掩膜, 完成该平面的标识解析,
    /// 并把滑出窗口的平面 flush 到 `sink`.
    ///
    /// 平面的 z 索引由解析器自己推进, 调用方只需按升序依次提交.
    /// `finish` 之后再提交会 panic.
    pub fn push_plane<S: LabelSink>(
        &mut self,
        mask: &MaskSlice,
        sink: &mut S,
    ) -> Result<(), ResolveError> {
        assert!(!self.finished, "解析已结束, 不允许再提交平面");

        let z = self.next_z;
        if mask.shape() != self.slice_shape {
            return Err(ResolveError::ShapeMismatch {
                z,
                expected: self.slice_shape,
                actual: mask.shape(),
            });
        }

        let (mut local, max_label) = label_components(mask);
        debug!("在第 {z} 层发现 {max_label} 个对象");

        if self.window.is_empty() {
            // 整个体数据的第一个平面: 局部编号直接成为全局标识,
            // 计数器从该平面的分量数起步.
            debug_assert_eq!(self.global_max_label, 0);
            self.global_max_label = max_label;
        } else {
            let adjacency = self.build_adjacency(&local);
            let (local_renaming, global_renaming) = self.resolve_renamings(adjacency);

            // 用最终全局标识就地改写本平面.
            for pix in local.as_mutable().iter_mut() {
                if is_object(*pix) {
                    *pix = local_renaming[pix];
                }
            }

            // 合并修正必须回溯整个仍可变的窗口, 而不只是上一平面:
            // 两个对象可能在分叉数层之后才被发现是同一个.
            if !global_renaming.is_empty() {
                for plane in self.window.iter_mut() {
                    for pix in plane.as_mutable().iter_mut() {
                        if let Some(&survivor) = global_renaming.get(pix) {
                            *pix = survivor;
                        }
                    }
                }
            }
        }

        self.window.push_back(local);
        self.next_z += 1;
        self.evict(sink)
    }

    /// 结束平面流, 无条件 flush 窗口内的全部剩余平面.
    pub fn finish<S: LabelSink>(&mut self, sink: &mut S) -> Result<(), ResolveError> {
        self.finished = true;
        while let Some(plane) = self.window.pop_front() {
            sink.write_labels(self.first_z, &plane)?;
            self.first_z += 1;
        }
        Ok(())
    }

    /// 构建本平面局部标签对上一平面全局标签的邻接表.
    ///
    /// 对本平面的每个前景像素, 查询上一平面同坐标的全局标签;
    /// 非零即记一条边. 没有任何非零邻居的局部标签拥有空边集.
    fn build_adjacency(&self, local: &OwnedLabelSlice) -> AdjacencyMap {
        let prev = self
            .window
            .back()
            .expect("邻接表只在窗口非空时构建")
            .as_immut();

        let mut adjacency = AdjacencyMap::with_capacity(8);
        for (pos, &cur) in local.as_immut().indexed_iter() {
            if is_object(cur) {
                adjacency.touch(cur, prev[pos]);
            }
        }
        adjacency
    }

    /// 逐项消解邻接表, 生成本平面的局部重命名表和需要回写窗口的
    /// 全局重命名表.
    fn resolve_renamings(
        &mut self,
        mut adjacency: AdjacencyMap,
    ) -> (HashMap<u32, u32>, HashMap<u32, u32>) {
        let mut local_renaming: HashMap<u32, u32> = HashMap::with_capacity(adjacency.order.len());
        let mut global_renaming: HashMap<u32, u32> = HashMap::new();

        for idx in 0..adjacency.order.len() {
            let (cur, edges) = adjacency.order[idx].clone();
            match edges.len() {
                // 没有任何上一平面邻居: 全新对象.
                0 => {
                    self.global_max_label += 1;
                    local_renaming.insert(cur, self.global_max_label);
                }

                // 恰好一个邻居: 直接继承其全局标识.
                // 对象分裂时多个局部标签各自走到这里, 共同继承同一个标识.
                1 => {
                    local_renaming.insert(cur, edges[0]);
                }

                // 合并事件: 首遇者存活, 其余全部并入.
                _ => {
                    let target = edges[0];
                    local_renaming.insert(cur, target);

                    // 找出整个邻接表中与 target 同现的所有其它标识.
                    let mut target_components: Vec<u32> = Vec::new();
                    for (_, edges2) in adjacency.order.iter() {
                        if edges2.contains(&target) {
                            for &src in edges2 {
                                if src != target && !target_components.contains(&src) {
                                    target_components.push(src);
                                }
                            }
                        }
                    }

                    // 被吞标识 → 存活者.
                    for &src in &target_components {
                        global_renaming.insert(src, target);
                    }

                    // 三路修复, 保证同一平面内先后发现的多个合并事件
                    // 不会留下指向中间标识的残边:
                    // 1. 已有的 `* -> 被吞标识` 重定向到存活者;
                    for dst in global_renaming.values_mut() {
                        if target_components.contains(dst) {
                            *dst = target;
                        }
                    }
                    // 2. 局部重命名同样重定向;
                    for dst in local_renaming.values_mut() {
                        if target_components.contains(dst) {
                            *dst = target;
                        }
                    }
                    // 3. 其余邻接表项的边集合中替换被吞标识,
                    //    使本轮后续表项看到的是已坍缩的标识.
                    for (_, edges2) in adjacency.order.iter_mut() {
                        let mut collapsed = Vec::with_capacity(edges2.len());
                        for &src in edges2.iter() {
                            let dst = global_renaming.get(&src).copied().unwrap_or(src);
                            if !collapsed.contains(&dst) {
                                collapsed.push(dst);
                            }
                        }
                        *edges2 = collapsed;
                    }
                }
            }
        }

        (local_renaming, global_renaming)
    }

    /// 窗口超长时 flush 最老的平面并推进低水位.
    fn evict<S: LabelSink>(&mut self, sink: &mut S) -> Result<(), ResolveError> {
        while self.window.len() > self.limit {
            let plane = self.window.pop_front().expect("窗口超长时必然非空");
            sink.write_labels(self.first_z, &plane)?;
            self.first_z += 1;
        }
        Ok(())
    }
}
