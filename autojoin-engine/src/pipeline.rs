//! 自动连接流水线：聚类 → 链分类与合并 → 包含检测 → 图层路由。
//!
//! 整个计划在内存中完成后才交给 [`OutputSink`]，任一阶段失败都不会产生部分输出。

use std::collections::HashMap;
use std::convert::Infallible;

use autojoin_core::drawing::Drawing;
use autojoin_core::primitive::{EntityId, Polyline, Primitive, Shape, Style};
use tracing::{debug, info, warn};

use crate::chain::{self, ChainClass, DegenerateReason, Resolution};
use crate::cluster::{self, ClusterSet};
use crate::containment::{self, ClosedShape, ShapeOwner, ShapeRejection};
use crate::errors::JoinError;
use crate::layers::{self, PartCounter, PartNumber, Route};

pub const DEFAULT_TOLERANCE: f64 = 0.01;
pub const DEFAULT_ARC_SAMPLE_STEP_DEGREES: f64 = 10.0;

/// 运行参数。构造时校验，之后各阶段直接使用。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinOptions {
    tolerance: f64,
    arc_sample_step: f64,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            arc_sample_step: DEFAULT_ARC_SAMPLE_STEP_DEGREES.to_radians(),
        }
    }
}

impl JoinOptions {
    pub fn new(tolerance: f64) -> Result<Self, JoinError> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(JoinError::InvalidTolerance(tolerance));
        }
        Ok(Self {
            tolerance,
            ..Self::default()
        })
    }

    pub fn with_arc_sample_step_degrees(mut self, degrees: f64) -> Result<Self, JoinError> {
        if !degrees.is_finite() || degrees <= 0.0 || degrees > 180.0 {
            return Err(JoinError::InvalidSampleStep(degrees));
        }
        self.arc_sample_step = degrees.to_radians();
        Ok(self)
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// 弧度。
    #[inline]
    pub fn arc_sample_step(&self) -> f64 {
        self.arc_sample_step
    }
}

/// 交给输出目标的几何元素：原样保留的图元，或由线段链合成的多段线。
#[derive(Debug, Clone, PartialEq)]
pub enum OutputElement {
    Primitive(Primitive),
    Polyline {
        polyline: Polyline,
        /// 继承自链中输入顺序最靠前的线段。
        style: Style,
        sources: Vec<EntityId>,
    },
}

impl OutputElement {
    pub fn style(&self) -> &Style {
        match self {
            OutputElement::Primitive(primitive) => primitive.style(),
            OutputElement::Polyline { style, .. } => style,
        }
    }

    /// 该元素覆盖的输入实体。
    pub fn sources(&self) -> Vec<EntityId> {
        match self {
            OutputElement::Primitive(primitive) => vec![primitive.id()],
            OutputElement::Polyline { sources, .. } => sources.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutedElement {
    pub element: OutputElement,
    pub route: Route,
    pub layer: String,
}

/// 单个簇的处理结果。`class` 为 `None` 表示退化簇。
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub part: PartNumber,
    pub members: Vec<EntityId>,
    pub class: Option<ChainClass>,
    pub enclosed_by: Option<PartNumber>,
}

/// 软错误：不中止运行，只影响路由。
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    DegenerateCluster {
        part: PartNumber,
        reason: DegenerateReason,
    },
    /// 边界退化，未参与包含检测。圆没有零件编号。
    ContainmentSkipped {
        part: Option<PartNumber>,
        entity: EntityId,
        reason: ShapeRejection,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinReport {
    pub closed_simple: usize,
    pub open_simple: usize,
    pub mixed_with_arcs: usize,
    pub branching: usize,
    pub degenerate: usize,
    pub merged_polylines: usize,
    pub contained: usize,
    pub individual_circles: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl JoinReport {
    pub fn cluster_count(&self) -> usize {
        self.closed_simple + self.open_simple + self.mixed_with_arcs + self.branching + self.degenerate
    }

    fn count_class(&mut self, class: Option<ChainClass>) {
        match class {
            Some(ChainClass::ClosedSimple) => self.closed_simple += 1,
            Some(ChainClass::OpenSimple) => self.open_simple += 1,
            Some(ChainClass::MixedWithArcs { .. }) => self.mixed_with_arcs += 1,
            Some(ChainClass::Branching) => self.branching += 1,
            None => self.degenerate += 1,
        }
    }
}

/// 接收 (元素, 目标图层) 的输出目标。
pub trait OutputSink {
    type Error;

    fn accept(&mut self, element: &OutputElement, layer: &str) -> Result<(), Self::Error>;
}

impl OutputSink for Drawing {
    type Error = Infallible;

    fn accept(&mut self, element: &OutputElement, layer: &str) -> Result<(), Infallible> {
        let style = Style {
            layer: layer.to_string(),
            ..element.style().clone()
        };
        match element {
            OutputElement::Primitive(primitive) => match *primitive.shape() {
                Shape::Line(line) => {
                    self.add_line(line.start, line.end, style);
                }
                Shape::Arc(arc) => {
                    self.add_arc(
                        arc.center,
                        arc.radius,
                        arc.start_angle,
                        arc.end_angle,
                        style,
                    );
                }
                Shape::Circle(circle) => {
                    self.add_circle(circle.center, circle.radius, style);
                }
            },
            OutputElement::Polyline { polyline, .. } => {
                self.add_polyline(polyline.vertices.iter().copied(), polyline.is_closed, style);
            }
        }
        Ok(())
    }
}

/// 完整的输出计划。只读，可多次发射。
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    elements: Vec<RoutedElement>,
    clusters: Vec<ClusterSummary>,
    report: JoinReport,
}

impl JoinPlan {
    #[inline]
    pub fn elements(&self) -> &[RoutedElement] {
        &self.elements
    }

    #[inline]
    pub fn clusters(&self) -> &[ClusterSummary] {
        &self.clusters
    }

    #[inline]
    pub fn report(&self) -> &JoinReport {
        &self.report
    }

    /// 按零件编号升序发射（同一编号内保持计划顺序），独立圆最后。
    pub fn emit<S: OutputSink>(&self, sink: &mut S) -> Result<(), S::Error> {
        let mut order: Vec<&RoutedElement> = self.elements.iter().collect();
        order.sort_by_key(|item| item.route.part().map_or(u32::MAX, |part| part.0));
        for item in order {
            sink.accept(&item.element, &item.layer)?;
        }
        Ok(())
    }
}

struct ClusterWork {
    part: PartNumber,
    resolution: Resolution,
}

/// 计算完整的输出计划，不触碰任何输出目标。
pub fn plan(primitives: &[Primitive], options: &JoinOptions) -> Result<JoinPlan, JoinError> {
    let set = cluster::build_clusters(primitives, options.tolerance);

    let mut counter = PartCounter::new();
    let mut report = JoinReport::default();
    let mut work = Vec::with_capacity(set.clusters().len());
    for cluster in set.clusters() {
        let part = counter.next_part();
        let resolution = chain::resolve(cluster, &set, primitives);
        let class = resolution.class();
        debug!(
            part = part.0,
            members = cluster.members.len(),
            class = ?class,
            "簇分类完成"
        );
        report.count_class(class);
        if let Resolution::Degenerate(reason) = resolution {
            warn!(part = part.0, reason = ?reason, "退化簇，转入手动连接图层");
            report
                .diagnostics
                .push(Diagnostic::DegenerateCluster { part, reason });
        }
        work.push(ClusterWork { part, resolution });
    }

    let shapes = collect_shapes(primitives, &set, &work, options, &mut report);
    let enclosures = containment::detect_enclosures(&shapes);

    let mut cluster_enclosure: Vec<Option<PartNumber>> = vec![None; work.len()];
    let mut circle_enclosure: HashMap<usize, PartNumber> = HashMap::new();
    for (shape, outer) in shapes.iter().zip(&enclosures) {
        let Some(outer) = outer else { continue };
        let ShapeOwner::Cluster(outer_cluster) = shapes[*outer].owner() else {
            continue;
        };
        let outer_part = work[outer_cluster].part;
        match shape.owner() {
            ShapeOwner::Cluster(index) => cluster_enclosure[index] = Some(outer_part),
            ShapeOwner::Circle(index) => {
                circle_enclosure.insert(index, outer_part);
            }
        }
        report.contained += 1;
    }

    let mut elements = Vec::with_capacity(primitives.len());
    let mut clusters = Vec::with_capacity(work.len());
    for (index, (item, cluster)) in work.into_iter().zip(set.clusters()).enumerate() {
        let class = item.resolution.class();
        let enclosed_by = cluster_enclosure[index];
        let route = layers::route_cluster(item.part, class, enclosed_by);
        let layer = route.layer_name();
        match item.resolution {
            Resolution::Merged { polyline, .. } => {
                report.merged_polylines += 1;
                let style = primitives[cluster.members[0]].style().clone();
                let sources = cluster
                    .members
                    .iter()
                    .map(|&member| primitives[member].id())
                    .collect();
                elements.push(RoutedElement {
                    element: OutputElement::Polyline {
                        polyline,
                        style,
                        sources,
                    },
                    route,
                    layer,
                });
            }
            Resolution::Unmerged { .. } | Resolution::Degenerate(_) => {
                elements.extend(cluster.members.iter().map(|&member| RoutedElement {
                    element: OutputElement::Primitive(primitives[member].clone()),
                    route,
                    layer: layer.clone(),
                }));
            }
        }
        clusters.push(ClusterSummary {
            part: item.part,
            members: cluster
                .members
                .iter()
                .map(|&member| primitives[member].id())
                .collect(),
            class,
            enclosed_by,
        });
    }

    for &index in set.circles() {
        let route = layers::route_circle(circle_enclosure.get(&index).copied());
        if route == Route::IndividualCircle {
            report.individual_circles += 1;
        }
        elements.push(RoutedElement {
            element: OutputElement::Primitive(primitives[index].clone()),
            layer: route.layer_name(),
            route,
        });
    }

    info!(
        primitives = primitives.len(),
        clusters = report.cluster_count(),
        merged = report.merged_polylines,
        contained = report.contained,
        circles = report.individual_circles,
        diagnostics = report.diagnostics.len(),
        "自动连接计划完成"
    );

    Ok(JoinPlan {
        elements,
        clusters,
        report,
    })
}

/// 从图纸抽取图元并计划。非法几何直接中止。
pub fn plan_drawing(drawing: &Drawing, options: &JoinOptions) -> Result<JoinPlan, JoinError> {
    let primitives = drawing.primitives()?;
    plan(&primitives, options)
}

/// 计划成功后一次性发射到输出目标，返回运行报告。
pub fn join<S>(
    primitives: &[Primitive],
    options: &JoinOptions,
    sink: &mut S,
) -> Result<JoinReport, JoinError>
where
    S: OutputSink,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let plan = plan(primitives, options)?;
    plan.emit(sink)
        .map_err(|err| JoinError::Sink(Box::new(err)))?;
    Ok(plan.report)
}

/// 闭合簇与孤立圆的边界；退化边界记为诊断并跳过。
fn collect_shapes(
    primitives: &[Primitive],
    set: &ClusterSet,
    work: &[ClusterWork],
    options: &JoinOptions,
    report: &mut JoinReport,
) -> Vec<ClosedShape> {
    let mut shapes = Vec::new();
    for (index, item) in work.iter().enumerate() {
        let boundary = match &item.resolution {
            Resolution::Merged { polyline, .. } if polyline.is_closed => {
                polyline.vertices.clone()
            }
            Resolution::Unmerged {
                walk: Some(walk), ..
            } if walk.closed => chain::sample_boundary(walk, primitives, options.arc_sample_step),
            _ => continue,
        };
        let entity = primitives[set.clusters()[index].members[0]].id();
        match ClosedShape::new(ShapeOwner::Cluster(index), boundary) {
            Ok(shape) => shapes.push(shape),
            Err(reason) => {
                warn!(part = item.part.0, reason = ?reason, "闭合边界退化，跳过包含检测");
                report.diagnostics.push(Diagnostic::ContainmentSkipped {
                    part: Some(item.part),
                    entity,
                    reason,
                });
            }
        }
    }

    for &index in set.circles() {
        let Shape::Circle(circle) = primitives[index].shape() else {
            continue;
        };
        let boundary = circle.sample(options.arc_sample_step);
        match ClosedShape::new(ShapeOwner::Circle(index), boundary) {
            Ok(shape) => shapes.push(shape),
            Err(reason) => {
                let entity = primitives[index].id();
                warn!(entity = entity.get(), reason = ?reason, "圆的边界退化，跳过包含检测");
                report.diagnostics.push(Diagnostic::ContainmentSkipped {
                    part: None,
                    entity,
                    reason,
                });
            }
        }
    }
    shapes
}

#[cfg(test)]
mod tests {
    use super::*;
    use autojoin_core::drawing::Entity;
    use autojoin_core::geometry::Point2;

    fn line(id: u64, a: (f64, f64), b: (f64, f64)) -> Primitive {
        Primitive::line(
            EntityId::new(id),
            Point2::new(a.0, a.1),
            Point2::new(b.0, b.1),
            Style::on_layer("CUT").with_color(5),
        )
        .unwrap()
    }

    #[test]
    fn options_reject_bad_values() {
        assert!(matches!(
            JoinOptions::new(0.0),
            Err(JoinError::InvalidTolerance(_))
        ));
        assert!(matches!(
            JoinOptions::new(f64::INFINITY),
            Err(JoinError::InvalidTolerance(_))
        ));
        assert!(matches!(
            JoinOptions::default().with_arc_sample_step_degrees(-1.0),
            Err(JoinError::InvalidSampleStep(_))
        ));
        let options = JoinOptions::new(0.5)
            .unwrap()
            .with_arc_sample_step_degrees(5.0)
            .unwrap();
        assert_eq!(options.tolerance(), 0.5);
        assert!((options.arc_sample_step() - 5f64.to_radians()).abs() < 1e-15);
    }

    #[test]
    fn merged_polyline_keeps_origin_style() {
        let primitives = vec![
            line(10, (0.0, 0.0), (1.0, 0.0)),
            line(11, (1.0, 0.0), (1.0, 1.0)),
        ];
        let plan = plan(&primitives, &JoinOptions::default()).unwrap();
        assert_eq!(plan.elements().len(), 1);
        let item = &plan.elements()[0];
        assert_eq!(item.layer, "Part 1");
        assert_eq!(item.element.style().color, Some(5));
        assert_eq!(
            item.element.sources(),
            vec![EntityId::new(10), EntityId::new(11)]
        );
        assert_eq!(plan.report().open_simple, 1);
        assert_eq!(plan.report().merged_polylines, 1);
    }

    #[test]
    fn collapsed_cluster_is_a_soft_failure() {
        let primitives = vec![
            line(0, (0.0, 0.0), (0.005, 0.0)),
            line(1, (5.0, 5.0), (6.0, 5.0)),
        ];
        let plan = plan(&primitives, &JoinOptions::default()).unwrap();
        assert_eq!(plan.report().degenerate, 1);
        assert!(matches!(
            plan.report().diagnostics[0],
            Diagnostic::DegenerateCluster {
                part: PartNumber(1),
                ..
            }
        ));
        assert_eq!(plan.elements()[0].layer, "Part 1 - Join Manually!");
        assert_eq!(plan.elements()[1].layer, "Part 2");
    }

    #[test]
    fn emission_into_drawing_renames_layers_and_sorts_by_part() {
        let circle = Primitive::circle(
            EntityId::new(0),
            Point2::new(50.0, 50.0),
            1.0,
            Style::on_layer("HOLES"),
        )
        .unwrap();
        let primitives = vec![
            circle,
            line(1, (0.0, 0.0), (1.0, 0.0)),
            line(2, (3.0, 0.0), (4.0, 0.0)),
        ];
        let mut drawing = Drawing::new();
        let report = join(&primitives, &JoinOptions::default(), &mut drawing).unwrap();
        assert_eq!(report.individual_circles, 1);

        let layers: Vec<_> = drawing
            .entities()
            .map(|item| item.style.layer.clone())
            .collect();
        assert_eq!(layers, vec!["Part 1", "Part 2", "Individual Circles"]);
        assert!(drawing.layer("Individual Circles").is_some());
        let first = drawing.entities().next().unwrap();
        assert!(matches!(first.entity, Entity::Polyline(_)));
        assert_eq!(first.style.color, Some(5));
    }
}
