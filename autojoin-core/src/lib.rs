pub mod errors {
    use thiserror::Error;

    /// 图元构造阶段发现的非法几何描述。
    #[derive(Debug, Clone, Copy, PartialEq, Error)]
    pub enum Malformation {
        #[error("non-finite coordinate or angle")]
        NonFinite,
        #[error("radius {0} is not positive")]
        NonPositiveRadius(f64),
        #[error("line has zero length")]
        ZeroLengthLine,
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum GeometryError {
        #[error("malformed geometry on entity {id}: {reason}")]
        MalformedGeometry {
            id: u64,
            #[source]
            reason: Malformation,
        },
    }
}

pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示。比较时只允许在容差内判等。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        /// 两点距离是否不超过给定容差（含边界）。
        #[inline]
        pub fn is_near(self, other: Point2, tolerance: f64) -> bool {
            self.0.distance_squared(other.0) <= tolerance * tolerance
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        /// 二维叉积（z 分量），正值表示 `other` 位于逆时针一侧。
        #[inline]
        pub fn cross(self, other: Vector2) -> f64 {
            self.0.perp_dot(other.0)
        }
    }

    /// 轴对齐边界框，用于包含关系检测前的快速排除。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Self {
            let mut bounds = Self::empty();
            for point in points {
                bounds.include_point(*point);
            }
            bounds
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        /// `other` 是否完全落在当前范围内（边界重合也算包含）。
        pub fn contains_bounds(&self, other: &Bounds2D) -> bool {
            if self.is_empty() || other.is_empty() {
                return false;
            }
            self.min.x() <= other.min.x()
                && self.min.y() <= other.min.y()
                && self.max.x() >= other.max.x()
                && self.max.y() >= other.max.y()
        }
    }
}

pub mod primitive {
    use std::f64::consts::{PI, TAU};

    use serde::{Deserialize, Serialize};

    use crate::errors::{GeometryError, Malformation};
    use crate::geometry::Point2;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 图元携带的来源样式。输出时只替换图层，其余原样透传。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Style {
        pub layer: String,
        /// 组码 6
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub linetype: Option<String>,
        /// 组码 62
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub color: Option<i16>,
        /// 组码 420，0xRRGGBB
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub true_color: Option<i32>,
    }

    impl Style {
        #[inline]
        pub fn on_layer(layer: impl Into<String>) -> Self {
            Self {
                layer: layer.into(),
                linetype: None,
                color: None,
                true_color: None,
            }
        }

        #[inline]
        pub fn with_color(mut self, color: i16) -> Self {
            self.color = Some(color);
            self
        }
    }

    impl Default for Style {
        fn default() -> Self {
            Self::on_layer("0")
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
    }

    impl Line {
        #[inline]
        pub fn length(&self) -> f64 {
            self.start.distance(self.end)
        }
    }

    /// 圆弧，角度以弧度储存，沿数学正方向（逆时针）从起始角扫到终止角。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
    }

    impl Arc {
        /// 圆上指定角度的点。端点推导与 DXF 写出使用同一公式。
        #[inline]
        pub fn point_at(&self, angle: f64) -> Point2 {
            let (sin, cos) = angle.sin_cos();
            Point2::new(
                self.center.x() + self.radius * cos,
                self.center.y() + self.radius * sin,
            )
        }

        #[inline]
        pub fn start_point(&self) -> Point2 {
            self.point_at(self.start_angle)
        }

        #[inline]
        pub fn end_point(&self) -> Point2 {
            self.point_at(self.end_angle)
        }

        /// 逆时针扫掠角，范围 (0, 2π]。起止角相同视为整圆。
        pub fn sweep(&self) -> f64 {
            let start = self.start_angle.rem_euclid(TAU);
            let end = self.end_angle.rem_euclid(TAU);
            let sweep = end - start;
            if sweep <= 0.0 { sweep + TAU } else { sweep }
        }

        /// 作为多段线段时的凸度。`reversed` 表示沿终点到起点方向行进。
        /// 扫掠超过 180° 时返回 `None`，这类圆弧不能安全地表示为凸度段。
        pub fn bulge(&self, reversed: bool) -> Option<f64> {
            let sweep = self.sweep();
            if sweep > PI + 1e-12 {
                return None;
            }
            let bulge = (sweep / 4.0).tan();
            Some(if reversed { -bulge } else { bulge })
        }

        /// 按固定角步长采样（含两端点），仅用于包含检测。
        pub fn sample(&self, step: f64) -> Vec<Point2> {
            let sweep = self.sweep();
            let segments = segment_count(sweep, step, 1);
            let start = self.start_angle.rem_euclid(TAU);
            (0..=segments)
                .map(|i| self.point_at(start + sweep * (i as f64) / (segments as f64)))
                .collect()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
    }

    impl Circle {
        /// 按固定角步长采样一周（首尾不重复）。
        pub fn sample(&self, step: f64) -> Vec<Point2> {
            let segments = segment_count(TAU, step, 3);
            (0..segments)
                .map(|i| {
                    let angle = TAU * (i as f64) / (segments as f64);
                    let (sin, cos) = angle.sin_cos();
                    Point2::new(
                        self.center.x() + self.radius * cos,
                        self.center.y() + self.radius * sin,
                    )
                })
                .collect()
        }
    }

    /// 单条圆弧或整圆的采样段数上限。
    pub const MAX_SAMPLE_SEGMENTS: usize = 3600;

    fn segment_count(sweep: f64, step: f64, minimum: usize) -> usize {
        if !(step.is_finite() && step > 0.0) {
            return minimum;
        }
        let wanted = (sweep / step).ceil();
        if wanted >= MAX_SAMPLE_SEGMENTS as f64 {
            return MAX_SAMPLE_SEGMENTS;
        }
        (wanted as usize).max(minimum)
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub enum Shape {
        Line(Line),
        Arc(Arc),
        Circle(Circle),
    }

    /// 经过校验的输入图元。构造即校验，之后不可变。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Primitive {
        id: EntityId,
        shape: Shape,
        style: Style,
    }

    impl Primitive {
        pub fn line(
            id: EntityId,
            start: Point2,
            end: Point2,
            style: Style,
        ) -> Result<Self, GeometryError> {
            Self::new(id, Shape::Line(Line { start, end }), style)
        }

        pub fn arc(
            id: EntityId,
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            style: Style,
        ) -> Result<Self, GeometryError> {
            Self::new(
                id,
                Shape::Arc(Arc {
                    center,
                    radius,
                    start_angle,
                    end_angle,
                }),
                style,
            )
        }

        pub fn circle(
            id: EntityId,
            center: Point2,
            radius: f64,
            style: Style,
        ) -> Result<Self, GeometryError> {
            Self::new(id, Shape::Circle(Circle { center, radius }), style)
        }

        pub fn new(id: EntityId, shape: Shape, style: Style) -> Result<Self, GeometryError> {
            validate(&shape).map_err(|reason| GeometryError::MalformedGeometry {
                id: id.get(),
                reason,
            })?;
            Ok(Self { id, shape, style })
        }

        #[inline]
        pub fn id(&self) -> EntityId {
            self.id
        }

        #[inline]
        pub fn shape(&self) -> &Shape {
            &self.shape
        }

        #[inline]
        pub fn style(&self) -> &Style {
            &self.style
        }

        #[inline]
        pub fn is_arc(&self) -> bool {
            matches!(self.shape, Shape::Arc(_))
        }

        #[inline]
        pub fn is_circle(&self) -> bool {
            matches!(self.shape, Shape::Circle(_))
        }

        /// 起点与终点；圆没有端点。
        pub fn endpoints(&self) -> Option<[Point2; 2]> {
            match &self.shape {
                Shape::Line(line) => Some([line.start, line.end]),
                Shape::Arc(arc) => Some([arc.start_point(), arc.end_point()]),
                Shape::Circle(_) => None,
            }
        }
    }

    fn validate(shape: &Shape) -> Result<(), Malformation> {
        match shape {
            Shape::Line(line) => {
                if !(line.start.is_finite() && line.end.is_finite()) {
                    return Err(Malformation::NonFinite);
                }
                if line.length() <= f64::EPSILON {
                    return Err(Malformation::ZeroLengthLine);
                }
            }
            Shape::Arc(arc) => {
                if !(arc.center.is_finite()
                    && arc.radius.is_finite()
                    && arc.start_angle.is_finite()
                    && arc.end_angle.is_finite())
                {
                    return Err(Malformation::NonFinite);
                }
                if arc.radius <= 0.0 {
                    return Err(Malformation::NonPositiveRadius(arc.radius));
                }
            }
            Shape::Circle(circle) => {
                if !(circle.center.is_finite() && circle.radius.is_finite()) {
                    return Err(Malformation::NonFinite);
                }
                if circle.radius <= 0.0 {
                    return Err(Malformation::NonPositiveRadius(circle.radius));
                }
            }
        }
        Ok(())
    }

    /// 合并后的多段线。闭合时通过标志表示，不重复首点。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point2>,
        pub is_closed: bool,
    }

}

pub mod drawing {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::errors::GeometryError;
    use crate::geometry::Point2;
    use crate::primitive::{Arc, Circle, EntityId, Line, Polyline, Primitive, Shape, Style};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub color: Option<i16>,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                color: None,
            }
        }
    }

    /// 未参与分组的原始实体，按组码原样保留以便写回。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RawEntity {
        pub kind: String,
        pub pairs: Vec<(i32, String)>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Arc(Arc),
        Circle(Circle),
        Polyline(Polyline),
        Raw(RawEntity),
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DrawingEntity {
        pub id: EntityId,
        pub entity: Entity,
        pub style: Style,
    }

    /// 头段中关心的变量：版本号（`$ACADVER`）与单位（`$INSUNITS`）。
    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DrawingHeader {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub units: Option<i16>,
    }

    /// 与 IO 层交换的内存图纸：图层表、实体序列与原样保留的块定义。
    #[derive(Debug, Default, Clone, Serialize)]
    pub struct Drawing {
        header: DrawingHeader,
        layers: Vec<Layer>,
        #[serde(skip)]
        layer_index: HashMap<String, usize>,
        entities: Vec<DrawingEntity>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        blocks: Vec<(i32, String)>,
        next_entity_id: u64,
    }

    impl Drawing {
        pub fn new() -> Self {
            let mut drawing = Self::default();
            drawing.ensure_layer("0");
            drawing
        }

        /// 仅继承头信息、图层颜色、块定义与原样实体，用作输出图纸的底稿。
        pub fn carry_over(&self) -> Self {
            let mut drawing = Self::new();
            drawing.header = self.header.clone();
            drawing.blocks = self.blocks.clone();
            for layer in &self.layers {
                drawing.define_layer(layer.clone());
            }
            for item in &self.entities {
                if let Entity::Raw(raw) = &item.entity {
                    drawing.add_raw(raw.clone(), item.style.clone());
                }
            }
            drawing
        }

        #[inline]
        pub fn header(&self) -> &DrawingHeader {
            &self.header
        }

        #[inline]
        pub fn set_header(&mut self, header: DrawingHeader) {
            self.header = header;
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            if !self.layer_index.contains_key(key) {
                self.layer_index.insert(key.to_string(), self.layers.len());
                self.layers.push(Layer::new(key));
            }
        }

        /// 定义或更新图层（已存在时仅补充颜色）。
        pub fn define_layer(&mut self, layer: Layer) {
            match self.layer_index.get(&layer.name) {
                Some(&index) => {
                    if layer.color.is_some() {
                        self.layers[index].color = layer.color;
                    }
                }
                None => {
                    self.layer_index.insert(layer.name.clone(), self.layers.len());
                    self.layers.push(layer);
                }
            }
        }

        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layer_index.get(name).map(|&index| &self.layers[index])
        }

        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.iter()
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, style: Style) -> EntityId {
            self.add_entity(Entity::Line(Line { start, end }), style)
        }

        pub fn add_arc(
            &mut self,
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            style: Style,
        ) -> EntityId {
            self.add_entity(
                Entity::Arc(Arc {
                    center,
                    radius,
                    start_angle,
                    end_angle,
                }),
                style,
            )
        }

        pub fn add_circle(&mut self, center: Point2, radius: f64, style: Style) -> EntityId {
            self.add_entity(Entity::Circle(Circle { center, radius }), style)
        }

        pub fn add_polyline<I>(&mut self, vertices: I, is_closed: bool, style: Style) -> EntityId
        where
            I: IntoIterator<Item = Point2>,
        {
            self.add_entity(
                Entity::Polyline(Polyline {
                    vertices: vertices.into_iter().collect(),
                    is_closed,
                }),
                style,
            )
        }

        pub fn add_raw(&mut self, raw: RawEntity, style: Style) -> EntityId {
            self.add_entity(Entity::Raw(raw), style)
        }

        pub fn add_entity(&mut self, entity: Entity, style: Style) -> EntityId {
            self.ensure_layer(&style.layer);
            let id = self.next_id();
            self.entities.push(DrawingEntity { id, entity, style });
            id
        }

        pub fn entities(&self) -> impl Iterator<Item = &DrawingEntity> {
            self.entities.iter()
        }

        pub fn set_blocks(&mut self, pairs: Vec<(i32, String)>) {
            self.blocks = pairs;
        }

        pub fn blocks(&self) -> &[(i32, String)] {
            &self.blocks
        }

        /// 抽取 LINE / ARC / CIRCLE 为已校验图元，保持输入顺序。
        /// 任何非法几何都会中止抽取。
        pub fn primitives(&self) -> Result<Vec<Primitive>, GeometryError> {
            let mut primitives = Vec::new();
            for item in &self.entities {
                let shape = match &item.entity {
                    Entity::Line(line) => Shape::Line(*line),
                    Entity::Arc(arc) => Shape::Arc(*arc),
                    Entity::Circle(circle) => Shape::Circle(*circle),
                    Entity::Polyline(_) | Entity::Raw(_) => continue,
                };
                primitives.push(Primitive::new(item.id, shape, item.style.clone())?);
            }
            Ok(primitives)
        }

        fn next_id(&mut self) -> EntityId {
            let id = EntityId::new(self.next_entity_id);
            self.next_entity_id += 1;
            id
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::errors::Malformation;
        use std::f64::consts::FRAC_PI_2;

        #[test]
        fn drawing_stores_entities_and_layers() {
            let mut drawing = Drawing::new();
            let line = drawing.add_line(
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Style::on_layer("CUT"),
            );
            let arc = drawing.add_arc(
                Point2::new(5.0, 0.0),
                5.0,
                0.0,
                FRAC_PI_2,
                Style::on_layer("CUT").with_color(1),
            );
            let circle =
                drawing.add_circle(Point2::new(5.0, 5.0), 2.0, Style::on_layer("HOLES"));

            assert_eq!(line.get(), 0);
            assert_eq!(arc.get(), 1);
            assert_eq!(circle.get(), 2);
            let layers: Vec<_> = drawing.layers().map(|l| l.name.as_str()).collect();
            assert_eq!(layers, vec!["0", "CUT", "HOLES"]);

            let primitives = drawing.primitives().expect("valid geometry");
            assert_eq!(primitives.len(), 3);
            assert_eq!(primitives[1].id(), arc);
            assert_eq!(primitives[1].style().color, Some(1));

        }

        #[test]
        fn primitives_skip_passthrough_and_reject_bad_radius() {
            let mut drawing = Drawing::new();
            drawing.add_raw(
                RawEntity {
                    kind: "TEXT".to_string(),
                    pairs: vec![(8, "NOTES".to_string()), (1, "hello".to_string())],
                },
                Style::on_layer("NOTES"),
            );
            assert!(drawing.primitives().unwrap().is_empty());

            let bad = drawing.add_circle(Point2::new(0.0, 0.0), -1.0, Style::default());
            let err = drawing.primitives().unwrap_err();
            assert_eq!(
                err,
                GeometryError::MalformedGeometry {
                    id: bad.get(),
                    reason: Malformation::NonPositiveRadius(-1.0)
                }
            );
        }

        #[test]
        fn carry_over_keeps_passthrough_only() {
            let mut drawing = Drawing::new();
            drawing.set_header(DrawingHeader {
                version: Some("AC1032".to_string()),
                units: Some(4),
            });
            drawing.define_layer(Layer {
                name: "CUT".to_string(),
                color: Some(2),
            });
            drawing.add_line(
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Style::on_layer("CUT"),
            );
            drawing.add_raw(
                RawEntity {
                    kind: "TEXT".to_string(),
                    pairs: vec![(8, "NOTES".to_string())],
                },
                Style::on_layer("NOTES"),
            );
            drawing.set_blocks(vec![(0, "BLOCK".to_string()), (0, "ENDBLK".to_string())]);

            let copy = drawing.carry_over();
            assert_eq!(copy.header().units, Some(4));
            assert_eq!(copy.layer("CUT").and_then(|l| l.color), Some(2));
            assert_eq!(copy.blocks().len(), 2);
            let kinds: Vec<_> = copy
                .entities()
                .map(|item| matches!(item.entity, Entity::Raw(_)))
                .collect();
            assert_eq!(kinds, vec![true]);
        }
    }
}
