//! What a sync run did, per employee and in total.

use serde::Serialize;

use likelihood_core::{DerivedFeature, EmployeeId};

/// Result of one batch commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Nothing to write.
    Skipped,
    Committed { rows: usize },
    /// Commit failed and was rolled back.
    Failed { rows: usize },
}

/// Rows committed and rows lost to failed batches for one write kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub committed: usize,
    pub failed: usize,
}

impl ActionCounts {
    fn record(&mut self, outcome: BatchOutcome) {
        match outcome {
            BatchOutcome::Skipped => {}
            BatchOutcome::Committed { rows } => self.committed += rows,
            BatchOutcome::Failed { rows } => self.failed += rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeReport {
    pub employee: EmployeeId,
    /// Dates with at least one loaded value.
    pub dates: usize,
    /// Dates skipped because the slice was empty or overflowed its recipe.
    pub invalid_slices: usize,
    /// Dates with a pending write but no activity id in the lookup.
    pub unmapped_dates: usize,
    pub insert: BatchOutcome,
    pub update: BatchOutcome,
    pub delete: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub feature: DerivedFeature,
    pub inserted: ActionCounts,
    pub updated: ActionCounts,
    pub deleted: ActionCounts,
    pub invalid_slices: usize,
    pub unmapped_dates: usize,
    pub employees: Vec<EmployeeReport>,
}

impl SyncReport {
    pub fn new(feature: DerivedFeature) -> Self {
        Self {
            feature,
            inserted: ActionCounts::default(),
            updated: ActionCounts::default(),
            deleted: ActionCounts::default(),
            invalid_slices: 0,
            unmapped_dates: 0,
            employees: Vec::new(),
        }
    }

    pub fn record(&mut self, employee: EmployeeReport) {
        self.inserted.record(employee.insert);
        self.updated.record(employee.update);
        self.deleted.record(employee.delete);
        self.invalid_slices += employee.invalid_slices;
        self.unmapped_dates += employee.unmapped_dates;
        self.employees.push(employee);
    }

    /// Rows written across all kinds.
    pub fn committed(&self) -> usize {
        self.inserted.committed + self.updated.committed + self.deleted.committed
    }

    /// Rows in batches that failed to commit.
    pub fn failed(&self) -> usize {
        self.inserted.failed + self.updated.failed + self.deleted.failed
    }

    /// True when every classified write was committed.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }
}

/// Entry point result: whether the feature was handled, and how.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The requested feature is not derived by this engine.
    Unsupported { feature: String },
    Synced(SyncReport),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Synced(report) => Some(report),
            SyncOutcome::Unsupported { .. } => None,
        }
    }
}
