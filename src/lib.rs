pub mod backend;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod report;
pub mod training;

pub mod prelude {
    pub use crate::data::{SvhnBatch, SvhnBatcher, SvhnDataset, SvhnItem};
    pub use crate::error::{DataError, MatError};
    pub use crate::metrics::{EvalAccumulator, MetricsSummary};
    pub use crate::model::{Model, ModelConfig};
    pub use crate::training::{TrainingConfig, TrainingReport, train, training_config};
}
