//! 闭合形状之间的嵌套检测。
//!
//! 形状边界是按固定角步长离散后的多边形。内形状的全部边界采样点都落在外形状之内，且两条边界
//! 没有任何边严格相交时，记一条 `outer → inner` 关系。对离散后的多边形这是精确判定；
//! 圆弧与圆只在采样精度内成立，恰好贴在边界上的接触不视为相交。

use autojoin_core::geometry::{Bounds2D, Point2, Vector2};

/// 参与检测的形状来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeOwner {
    /// 闭合簇（下标指向 `ClusterSet::clusters`）。
    Cluster(usize),
    /// 独立的圆（下标指向输入图元）。
    Circle(usize),
}

impl ShapeOwner {
    /// 只有闭合簇能作为外形状。
    #[inline]
    pub fn can_enclose(self) -> bool {
        matches!(self, ShapeOwner::Cluster(_))
    }
}

/// 被排除在包含检测之外的退化边界。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRejection {
    TooFewVertices,
    ZeroArea,
    SelfIntersecting,
}

#[derive(Debug, Clone)]
pub struct ClosedShape {
    owner: ShapeOwner,
    boundary: Vec<Point2>,
    area: f64,
    bounds: Bounds2D,
}

impl ClosedShape {
    /// 校验边界并预计算面积与包围盒。
    ///
    /// 零面积按形状自身尺度判断（相对包围盒的浮点精度），与连接容差无关，
    /// 因此小于容差的圆孔仍参与检测。
    pub fn new(owner: ShapeOwner, boundary: Vec<Point2>) -> Result<Self, ShapeRejection> {
        if boundary.len() < 3 {
            return Err(ShapeRejection::TooFewVertices);
        }
        let bounds = Bounds2D::from_points(&boundary);
        let width = bounds.max().x() - bounds.min().x();
        let height = bounds.max().y() - bounds.min().y();
        let extent = width.max(height);
        let area = signed_area(&boundary).abs();
        if area <= f64::EPSILON * extent * extent {
            return Err(ShapeRejection::ZeroArea);
        }
        if is_self_intersecting(&boundary) {
            return Err(ShapeRejection::SelfIntersecting);
        }
        Ok(Self {
            owner,
            boundary,
            area,
            bounds,
        })
    }

    #[inline]
    pub fn owner(&self) -> ShapeOwner {
        self.owner
    }

    fn encloses(&self, inner: &ClosedShape) -> bool {
        self.area > inner.area
            && self.bounds.contains_bounds(&inner.bounds)
            && inner
                .boundary
                .iter()
                .all(|point| point_in_polygon(*point, &self.boundary))
            && !boundaries_cross(&self.boundary, &inner.boundary)
    }
}

/// 射线法判断点是否在多边形内（多边形首尾不重复）。
pub fn point_in_polygon(point: Point2, polygon: &[Point2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let (px, py) = (point.x(), point.y());
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].x(), polygon[i].y());
        let (xj, yj) = (polygon[j].x(), polygon[j].y());
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// 鞋带公式，逆时针为正。
pub fn signed_area(polygon: &[Point2]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let a = polygon[i];
            let b = polygon[(i + 1) % n];
            a.x() * b.y() - b.x() * a.y()
        })
        .sum();
    twice * 0.5
}

/// 是否存在两条不相邻的边严格相交。共线接触不计入。
pub fn is_self_intersecting(polygon: &[Point2]) -> bool {
    let n = polygon.len();
    if n < 4 {
        return false;
    }
    let edge = |i: usize| (polygon[i], polygon[(i + 1) % n]);
    for i in 0..n {
        let (a1, a2) = edge(i);
        let a_bounds = Bounds2D::from_points([&a1, &a2]);
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (b1, b2) = edge(j);
            let b_bounds = Bounds2D::from_points([&b1, &b2]);
            if !overlaps(&a_bounds, &b_bounds) {
                continue;
            }
            if segments_cross(a1, a2, b1, b2) {
                return true;
            }
        }
    }
    false
}

/// 两个闭合多边形是否有边严格相交。
fn boundaries_cross(a: &[Point2], b: &[Point2]) -> bool {
    let edges = |polygon: &[Point2]| -> Vec<(Point2, Point2, Bounds2D)> {
        (0..polygon.len())
            .map(|i| {
                let (p, q) = (polygon[i], polygon[(i + 1) % polygon.len()]);
                (p, q, Bounds2D::from_points([&p, &q]))
            })
            .collect()
    };
    let b_edges = edges(b);
    edges(a).iter().any(|(a1, a2, a_bounds)| {
        b_edges.iter().any(|(b1, b2, b_bounds)| {
            overlaps(a_bounds, b_bounds) && segments_cross(*a1, *a2, *b1, *b2)
        })
    })
}

fn overlaps(a: &Bounds2D, b: &Bounds2D) -> bool {
    a.min().x() <= b.max().x()
        && a.max().x() >= b.min().x()
        && a.min().y() <= b.max().y()
        && a.max().y() >= b.min().y()
}

fn orientation(a: Point2, b: Point2, c: Point2) -> f64 {
    Vector2::from_points(a, b).cross(Vector2::from_points(a, c))
}

fn segments_cross(a1: Point2, a2: Point2, b1: Point2, b2: Point2) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// 为每个形状找出直接外形状（包含它的形状中面积最小者，面积相同时取下标小者）。
/// 返回值与 `shapes` 一一对应，元素为外形状在 `shapes` 中的下标。
pub fn detect_enclosures(shapes: &[ClosedShape]) -> Vec<Option<usize>> {
    shapes
        .iter()
        .enumerate()
        .map(|(inner_index, inner)| {
            let mut best: Option<usize> = None;
            for (outer_index, outer) in shapes.iter().enumerate() {
                if outer_index == inner_index || !outer.owner.can_enclose() {
                    continue;
                }
                if !outer.encloses(inner) {
                    continue;
                }
                let better = match best {
                    Some(current) => outer.area < shapes[current].area,
                    None => true,
                };
                if better {
                    best = Some(outer_index);
                }
            }
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Vec<Point2> {
        vec![
            Point2::new(min, min),
            Point2::new(max, min),
            Point2::new(max, max),
            Point2::new(min, max),
        ]
    }

    #[test]
    fn ray_casting_handles_concave_polygon() {
        // U 形
        let polygon = vec![
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(3.0, 3.0),
            Point2::new(2.0, 3.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 3.0),
            Point2::new(0.0, 3.0),
        ];
        assert!(point_in_polygon(Point2::new(0.5, 2.0), &polygon));
        assert!(!point_in_polygon(Point2::new(1.5, 2.0), &polygon));
        assert!(point_in_polygon(Point2::new(1.5, 0.5), &polygon));
        assert!(!point_in_polygon(Point2::new(4.0, 0.5), &polygon));
    }

    #[test]
    fn crossing_edges_rule_out_enclosure() {
        // U 形外轮廓，矩形横跨缺口：顶点都在内部，但边穿过缺口两侧
        let outer = vec![
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(3.0, 3.0),
            Point2::new(2.0, 3.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 3.0),
            Point2::new(0.0, 3.0),
        ];
        let bridge = vec![
            Point2::new(0.5, 2.0),
            Point2::new(2.5, 2.0),
            Point2::new(2.5, 2.5),
            Point2::new(0.5, 2.5),
        ];
        assert!(bridge.iter().all(|point| point_in_polygon(*point, &outer)));

        let pocket = vec![
            Point2::new(0.2, 0.2),
            Point2::new(2.8, 0.2),
            Point2::new(2.8, 0.8),
            Point2::new(0.2, 0.8),
        ];
        let shapes = vec![
            ClosedShape::new(ShapeOwner::Cluster(0), outer).unwrap(),
            ClosedShape::new(ShapeOwner::Cluster(1), bridge).unwrap(),
            ClosedShape::new(ShapeOwner::Cluster(2), pocket).unwrap(),
        ];
        assert_eq!(detect_enclosures(&shapes), vec![None, None, Some(0)]);
    }

    #[test]
    fn small_shapes_are_not_zero_area() {
        let tiny = ClosedShape::new(ShapeOwner::Cluster(0), square(0.0, 1e-4));
        assert!(tiny.is_ok());
    }

    #[test]
    fn area_sign_follows_orientation() {
        let ccw = square(0.0, 2.0);
        assert!((signed_area(&ccw) - 4.0).abs() < 1e-12);
        let mut cw = ccw.clone();
        cw.reverse();
        assert!((signed_area(&cw) + 4.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_boundaries_are_rejected() {
        let flat = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
        ];
        assert_eq!(
            ClosedShape::new(ShapeOwner::Cluster(0), flat).unwrap_err(),
            ShapeRejection::ZeroArea
        );

        let bow_tie = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 2.0),
            Point2::new(2.0, 0.0),
            Point2::new(0.0, 2.0),
        ];
        assert_eq!(
            ClosedShape::new(ShapeOwner::Cluster(0), bow_tie).unwrap_err(),
            ShapeRejection::SelfIntersecting
        );

        assert_eq!(
            ClosedShape::new(ShapeOwner::Cluster(0), square(0.0, 1.0)[..2].to_vec())
                .unwrap_err(),
            ShapeRejection::TooFewVertices
        );
    }

    #[test]
    fn immediate_enclosure_is_the_smallest_outer() {
        let shapes = vec![
            ClosedShape::new(ShapeOwner::Cluster(0), square(0.0, 10.0)).unwrap(),
            ClosedShape::new(ShapeOwner::Cluster(1), square(2.0, 8.0)).unwrap(),
            ClosedShape::new(ShapeOwner::Cluster(2), square(4.0, 6.0)).unwrap(),
            ClosedShape::new(ShapeOwner::Cluster(3), square(20.0, 30.0)).unwrap(),
        ];
        assert_eq!(
            detect_enclosures(&shapes),
            vec![None, Some(0), Some(1), None]
        );
    }

    #[test]
    fn circles_never_enclose() {
        let shapes = vec![
            ClosedShape::new(ShapeOwner::Circle(0), square(0.0, 10.0)).unwrap(),
            ClosedShape::new(ShapeOwner::Cluster(0), square(2.0, 8.0)).unwrap(),
        ];
        assert_eq!(detect_enclosures(&shapes), vec![None, None]);
    }
}
