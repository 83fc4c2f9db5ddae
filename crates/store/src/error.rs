use thiserror::Error;

use likelihood_core::ActivityId;

/// Failure raised by the feature store on begin, stage, or commit.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("feature {name} already exists for activity {activity_id}")]
    UniqueViolation { activity_id: ActivityId, name: String },

    #[error("injected commit failure: {0}")]
    Injected(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}
