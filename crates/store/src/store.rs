//! Storage traits consumed by the likelihood engine.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

use likelihood_core::{ActivityId, ActivityLookup, EmployeeId, FeatureRow, FeatureSeries};

use crate::error::StoreError;

/// Kind of write staged in a [`FeatureUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::Insert => write!(f, "insert"),
            WriteKind::Update => write!(f, "update"),
            WriteKind::Delete => write!(f, "delete"),
        }
    }
}

/// One atomic unit of work against `user_features`.
///
/// Staged writes become visible only after [`commit`](FeatureUnit::commit)
/// succeeds. A failed commit leaves the store unchanged. Dropping a unit
/// without committing discards its writes.
#[async_trait]
pub trait FeatureUnit: Send {
    /// Stage a new row. Fails at stage or commit time if `(activity_id, name)`
    /// already exists.
    async fn insert(&mut self, row: &FeatureRow) -> Result<(), StoreError>;

    /// Stage a value update for the row keyed by `(activity_id, name)`.
    /// Missing rows are left alone.
    async fn update(&mut self, row: &FeatureRow) -> Result<(), StoreError>;

    /// Stage removal of the row keyed by `(activity_id, name)`.
    async fn delete(&mut self, activity_id: ActivityId, name: &str) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Persisted `(activity_id, name) → value` mapping.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn FeatureUnit>, StoreError>;
}

/// Reads per-employee feature series keyed by date.
#[async_trait]
pub trait FeatureSeriesLoader: Send + Sync {
    /// Load `names` for `employees` between `start` (None = unbounded) and
    /// `end` inclusive. Only non-null values are returned; dates with no
    /// value are absent. Every requested employee has an entry.
    async fn load_series(
        &self,
        names: &[String],
        employees: &[EmployeeId],
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<HashMap<EmployeeId, FeatureSeries>, StoreError>;
}

/// Resolves employee days to activity ids.
#[async_trait]
pub trait ActivityDirectory: Send + Sync {
    async fn load_activities(
        &self,
        employees: &[EmployeeId],
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<ActivityLookup, StoreError>;
}
