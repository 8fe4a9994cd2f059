//! 端点邻近索引：按容差划分均匀网格，查询只扫描查询点周围的格子。

use std::collections::HashMap;

use autojoin_core::geometry::Point2;

type CellKey = (i64, i64);

/// 网格桶索引。格子边长等于构建时的容差，默认查询只需扫描 3×3 邻域。
#[derive(Debug)]
pub struct EndpointIndex<T> {
    cell_size: f64,
    buckets: HashMap<CellKey, Vec<(Point2, T)>>,
    len: usize,
}

impl<T: Copy + Ord> EndpointIndex<T> {
    /// `cell_size` 必须为正的有限值，调用方（`JoinOptions`）负责校验。
    pub fn new(cell_size: f64) -> Self {
        debug_assert!(cell_size.is_finite() && cell_size > 0.0);
        Self {
            cell_size,
            buckets: HashMap::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, point: Point2, owner: T) {
        let key = self.cell_of(point);
        self.buckets.entry(key).or_default().push((point, owner));
        self.len += 1;
    }

    /// 返回距离 `point` 不超过 `tolerance` 的全部端点所有者，升序且去重。
    pub fn query_near(&self, point: Point2, tolerance: f64) -> Vec<T> {
        let (cx, cy) = self.cell_of(point);
        let reach = ((tolerance / self.cell_size).ceil() as i64).max(1);
        let mut found = Vec::new();
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                let key = (cx.saturating_add(dx), cy.saturating_add(dy));
                let Some(bucket) = self.buckets.get(&key) else {
                    continue;
                };
                found.extend(
                    bucket
                        .iter()
                        .filter(|(candidate, _)| candidate.is_near(point, tolerance))
                        .map(|(_, owner)| *owner),
                );
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }

    fn cell_of(&self, point: Point2) -> CellKey {
        (
            (point.x() / self.cell_size).floor() as i64,
            (point.y() / self.cell_size).floor() as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_points_across_cell_borders() {
        let mut index = EndpointIndex::new(0.1);
        index.insert(Point2::new(0.099, 0.0), 1usize);
        index.insert(Point2::new(0.101, 0.0), 2);
        index.insert(Point2::new(0.5, 0.5), 3);
        assert_eq!(index.len(), 3);

        let near = index.query_near(Point2::new(0.1, 0.0), 0.1);
        assert_eq!(near, vec![1, 2]);
    }

    #[test]
    fn distance_limit_is_inclusive_and_exact() {
        let mut index = EndpointIndex::new(1.0);
        index.insert(Point2::new(1.0, 0.0), 10usize);
        index.insert(Point2::new(1.5, 1.5), 11);

        assert_eq!(index.query_near(Point2::new(0.0, 0.0), 1.0), vec![10]);
        // 位于相邻格子但超出容差
        assert!(index.query_near(Point2::new(0.5, 0.5), 0.5).is_empty());
    }

    #[test]
    fn larger_query_radius_widens_the_scan() {
        let mut index = EndpointIndex::new(0.01);
        index.insert(Point2::new(0.0, 0.0), 0usize);
        index.insert(Point2::new(0.05, 0.0), 1);
        assert_eq!(index.query_near(Point2::new(0.0, 0.0), 0.01), vec![0]);
        assert_eq!(index.query_near(Point2::new(0.0, 0.0), 0.06), vec![0, 1]);
    }

    #[test]
    fn negative_coordinates_use_floor_cells() {
        let mut index = EndpointIndex::new(1.0);
        index.insert(Point2::new(-0.2, -0.2), 'a');
        index.insert(Point2::new(0.2, 0.2), 'b');
        assert_eq!(index.query_near(Point2::new(0.0, 0.0), 1.0), vec!['a', 'b']);
        assert!(!index.is_empty());
    }
}
