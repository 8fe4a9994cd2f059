pub mod chain;
pub mod cluster;
pub mod containment;
pub mod layers;
pub mod pipeline;
pub mod proximity;

pub mod errors {
    use autojoin_core::errors::GeometryError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum JoinError {
        #[error(transparent)]
        MalformedGeometry(#[from] GeometryError),
        #[error("容差必须为正的有限值，实际为 {0}")]
        InvalidTolerance(f64),
        #[error("圆弧采样步长必须为正的有限值，实际为 {0}")]
        InvalidSampleStep(f64),
        #[error("输出目标拒绝写入")]
        Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
    }
}

pub use chain::ChainClass;
pub use errors::JoinError;
pub use layers::{PartNumber, Route};
pub use pipeline::{
    Diagnostic, JoinOptions, JoinPlan, JoinReport, OutputElement, OutputSink, RoutedElement,
    join, plan, plan_drawing,
};
