use std::fmt;

use crate::chain::ChainClass;

pub const MANUAL_JOIN_SUFFIX: &str = " - Join Manually!";
pub const CONTAINED_SUFFIX: &str = " - Contained";
pub const INDIVIDUAL_CIRCLES_LAYER: &str = "Individual Circles";

/// 零件编号，单次运行内从 1 开始递增。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartNumber(pub u32);

impl fmt::Display for PartNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 一次运行独占的编号器，不跨运行共享。
#[derive(Debug, Clone)]
pub struct PartCounter {
    next: u32,
}

impl Default for PartCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl PartCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_part(&mut self) -> PartNumber {
        let part = PartNumber(self.next);
        self.next += 1;
        part
    }
}

/// 输出元素的去向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// 零件自身图层；`manual_join` 为真时转入手动连接图层。
    Part { part: PartNumber, manual_join: bool },
    /// 嵌套在 `outer` 零件之内。
    Contained { outer: PartNumber },
    IndividualCircle,
}

impl Route {
    /// 路由所在的零件编号，供输出排序使用；独立圆没有编号。
    pub fn part(self) -> Option<PartNumber> {
        match self {
            Route::Part { part, .. } => Some(part),
            Route::Contained { outer } => Some(outer),
            Route::IndividualCircle => None,
        }
    }

    pub fn layer_name(self) -> String {
        match self {
            Route::Part {
                part,
                manual_join: false,
            } => format!("Part {part}"),
            Route::Part {
                part,
                manual_join: true,
            } => format!("Part {part}{MANUAL_JOIN_SUFFIX}"),
            Route::Contained { outer } => format!("Part {outer}{CONTAINED_SUFFIX}"),
            Route::IndividualCircle => INDIVIDUAL_CIRCLES_LAYER.to_string(),
        }
    }
}

/// 簇的路由：嵌套优先，其次按分类决定是否需要手动连接。
/// `class` 为 `None` 表示退化簇，同样走手动连接。
pub fn route_cluster(
    part: PartNumber,
    class: Option<ChainClass>,
    enclosed_by: Option<PartNumber>,
) -> Route {
    if let Some(outer) = enclosed_by {
        return Route::Contained { outer };
    }
    let manual_join = !class.is_some_and(ChainClass::is_mergeable);
    Route::Part { part, manual_join }
}

pub fn route_circle(enclosed_by: Option<PartNumber>) -> Route {
    match enclosed_by {
        Some(outer) => Route::Contained { outer },
        None => Route::IndividualCircle,
    }
}
