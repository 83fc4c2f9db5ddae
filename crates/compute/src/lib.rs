pub mod aggregator;
pub mod computation;
pub mod engine;
pub mod error;
pub mod reconciler;
pub mod report;

pub use aggregator::{AggregationPolicy, DayEvaluation, SliceVerdict};
pub use computation::{ComputationRegistry, ComputeRequest, FeatureComputation};
pub use engine::AnomalyFeature;
pub use error::EngineError;
pub use reconciler::{classify, EmployeeBatches, RELATIVE_TOLERANCE};
pub use report::{ActionCounts, BatchOutcome, EmployeeReport, SyncOutcome, SyncReport};
