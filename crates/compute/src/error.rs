use likelihood_core::LikelihoodError;
use likelihood_store::StoreError;

/// Errors that end a sync run. Batch commit failures are not among them:
/// they are logged and counted in the report.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] LikelihoodError),
    #[error("failed to load feature series: {0}")]
    Load(#[from] StoreError),
}
