use std::collections::HashSet;

use autojoin_core::geometry::Point2;
use autojoin_core::primitive::{Polyline, Primitive, Shape};

use crate::cluster::{Cluster, ClusterSet, NodeId};

/// 簇的链式拓扑分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainClass {
    /// 全为线段，每个节点恰好连接两条，构成单一闭环。
    ClosedSimple,
    /// 全为线段，构成单一开放链。
    OpenSimple,
    /// 至少包含一段圆弧，不做几何合并。
    ///
    /// 扫掠超过 180° 的圆弧无法写成多段线的凸度段，强行合并会改变形状。
    /// `major_arcs` 记录链中这类圆弧的数量。
    MixedWithArcs { closed: bool, major_arcs: usize },
    /// 存在度数不小于 3 的节点，或无法一次走完整个簇。
    Branching,
}

impl ChainClass {
    #[inline]
    pub fn is_mergeable(self) -> bool {
        matches!(self, ChainClass::ClosedSimple | ChainClass::OpenSimple)
    }
}

/// 无法归入任何分类的簇。属于软错误，成员整体转入手动连接图层。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateReason {
    EmptyCluster,
    /// 图元首尾落入同一节点（短于容差的线段或自闭合圆弧）。
    CollapsedPrimitive { primitive: usize },
}

/// 沿链行进的一步：图元下标以及是否逆向（终点到起点）经过。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub primitive: usize,
    pub reversed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Walk {
    pub steps: Vec<Step>,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// 纯线段链，已合并为一条多段线。
    Merged {
        class: ChainClass,
        polyline: Polyline,
    },
    /// 保留原图元；简单链（含圆弧）附带行进顺序，供包含检测构造边界。
    Unmerged {
        class: ChainClass,
        walk: Option<Walk>,
    },
    Degenerate(DegenerateReason),
}

impl Resolution {
    pub fn class(&self) -> Option<ChainClass> {
        match self {
            Resolution::Merged { class, .. } | Resolution::Unmerged { class, .. } => Some(*class),
            Resolution::Degenerate(_) => None,
        }
    }
}

/// 分类簇，并对纯线段的简单链执行链式行走与合并。
pub fn resolve(cluster: &Cluster, set: &ClusterSet, primitives: &[Primitive]) -> Resolution {
    if cluster.members.is_empty() {
        return Resolution::Degenerate(DegenerateReason::EmptyCluster);
    }

    let mut nodes = Vec::with_capacity(cluster.members.len() * 2);
    for &member in &cluster.members {
        let Some([start, end]) = set.nodes_of(member) else {
            continue;
        };
        if start == end {
            return Resolution::Degenerate(DegenerateReason::CollapsedPrimitive {
                primitive: member,
            });
        }
        nodes.push(start);
        nodes.push(end);
    }

    if nodes.iter().any(|&node| set.degree(node) >= 3) {
        return Resolution::Unmerged {
            class: ChainClass::Branching,
            walk: None,
        };
    }

    let Some(walk) = walk_chain(cluster, set) else {
        return Resolution::Unmerged {
            class: ChainClass::Branching,
            walk: None,
        };
    };

    let has_arcs = cluster
        .members
        .iter()
        .any(|&member| primitives[member].is_arc());
    if has_arcs {
        return Resolution::Unmerged {
            class: ChainClass::MixedWithArcs {
                closed: walk.closed,
                major_arcs: count_major_arcs(&walk, primitives),
            },
            walk: Some(walk),
        };
    }

    let class = if walk.closed {
        ChainClass::ClosedSimple
    } else {
        ChainClass::OpenSimple
    };
    Resolution::Merged {
        class,
        polyline: polyline_from_walk(&walk, set),
    }
}

/// 从一个端点出发逐段寻找共享尾节点的未访问图元。
/// 若存在度数为 1 的节点则从该处出发，保证开放链能一次走完。
/// 未能访问全部成员（簇内存在多个互不相连的环）时返回 `None`。
fn walk_chain(cluster: &Cluster, set: &ClusterSet) -> Option<Walk> {
    let open_start = cluster.members.iter().find_map(|&member| {
        let [start, end] = set.nodes_of(member)?;
        if set.degree(start) == 1 {
            Some(Step {
                primitive: member,
                reversed: false,
            })
        } else if set.degree(end) == 1 {
            Some(Step {
                primitive: member,
                reversed: true,
            })
        } else {
            None
        }
    });
    let first = open_start.unwrap_or(Step {
        primitive: cluster.members[0],
        reversed: false,
    });

    let origin = entry_node(set, first)?;
    let mut tail = exit_node(set, first)?;
    let mut visited = HashSet::from([first.primitive]);
    let mut steps = vec![first];

    loop {
        if tail == origin && steps.len() > 1 {
            break;
        }
        let next = set
            .incident(tail)
            .iter()
            .copied()
            .find(|candidate| !visited.contains(candidate));
        let Some(next) = next else { break };
        let [start, _] = set.nodes_of(next)?;
        let step = Step {
            primitive: next,
            reversed: start != tail,
        };
        tail = exit_node(set, step)?;
        visited.insert(next);
        steps.push(step);
        if set.degree(tail) >= 3 {
            return None;
        }
    }

    if steps.len() != cluster.members.len() {
        return None;
    }
    Some(Walk {
        closed: open_start.is_none() && tail == origin,
        steps,
    })
}

/// 按行进方向无法表示为凸度的圆弧数。
fn count_major_arcs(walk: &Walk, primitives: &[Primitive]) -> usize {
    walk.steps
        .iter()
        .filter(|step| match primitives[step.primitive].shape() {
            Shape::Arc(arc) => arc.bulge(step.reversed).is_none(),
            _ => false,
        })
        .count()
}

fn entry_node(set: &ClusterSet, step: Step) -> Option<NodeId> {
    let [start, end] = set.nodes_of(step.primitive)?;
    Some(if step.reversed { end } else { start })
}

fn exit_node(set: &ClusterSet, step: Step) -> Option<NodeId> {
    let [start, end] = set.nodes_of(step.primitive)?;
    Some(if step.reversed { start } else { end })
}

/// 按行走顺序取节点坐标；闭合链不重复首点，改用闭合标志。
fn polyline_from_walk(walk: &Walk, set: &ClusterSet) -> Polyline {
    let mut vertices = Vec::with_capacity(walk.steps.len() + 1);
    if let Some(node) = walk.steps.first().and_then(|&step| entry_node(set, step)) {
        vertices.push(set.position(node));
    }
    for &step in &walk.steps {
        if let Some(node) = exit_node(set, step) {
            vertices.push(set.position(node));
        }
    }
    if walk.closed {
        vertices.pop();
    }
    Polyline {
        vertices,
        is_closed: walk.closed,
    }
}

/// 沿行走顺序采样的闭合边界（圆弧按角步长离散），首尾不重复。
/// 采样只服务于包含检测，不影响输出几何。
pub fn sample_boundary(walk: &Walk, primitives: &[Primitive], arc_step: f64) -> Vec<Point2> {
    let mut boundary: Vec<Point2> = Vec::new();
    for step in &walk.steps {
        let mut points = match primitives[step.primitive].shape() {
            Shape::Line(line) => vec![line.start, line.end],
            Shape::Arc(arc) => arc.sample(arc_step),
            Shape::Circle(_) => continue,
        };
        if step.reversed {
            points.reverse();
        }
        // 每段首点与上一段末点在容差内重合，只保留一次。
        let skip = usize::from(!boundary.is_empty());
        boundary.extend(points.into_iter().skip(skip));
    }
    if walk.closed && boundary.len() > 1 {
        boundary.pop();
    }
    boundary
}
