//! Change classification and per-employee batch commits.

use tracing::{error, info};

use likelihood_core::FeatureRow;
use likelihood_store::{FeatureStore, WriteKind};

use crate::report::BatchOutcome;

/// Relative change below which a recomputed value is not written back.
pub const RELATIVE_TOLERANCE: f64 = 1e-13;

/// Decide what to do with a date whose stored value is `prev` and whose
/// recomputed value is `new`. `None` means no action.
pub fn classify(prev: Option<f64>, new: Option<f64>) -> Option<WriteKind> {
    if prev == new {
        return None;
    }
    match (prev, new) {
        (None, Some(v)) if v.is_finite() => Some(WriteKind::Insert),
        (None, _) => None,
        (Some(_), None) => Some(WriteKind::Delete),
        (Some(_), Some(v)) if v.is_nan() => Some(WriteKind::Delete),
        (Some(p), Some(v)) if ((v - p) / v).abs() > RELATIVE_TOLERANCE => Some(WriteKind::Update),
        _ => None,
    }
}

/// Classified writes of one employee, in commit order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EmployeeBatches {
    pub to_insert: Vec<FeatureRow>,
    pub to_update: Vec<FeatureRow>,
    pub to_delete: Vec<FeatureRow>,
}

impl EmployeeBatches {
    pub fn push(&mut self, kind: WriteKind, row: FeatureRow) {
        match kind {
            WriteKind::Insert => self.to_insert.push(row),
            WriteKind::Update => self.to_update.push(row),
            WriteKind::Delete => self.to_delete.push(row),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_insert.len() + self.to_update.len() + self.to_delete.len()
    }

    /// Commit inserts, then updates, then deletes. Each batch is its own
    /// unit of work; a failed batch does not stop the next one.
    pub async fn commit(&self, store: &dyn FeatureStore) -> [BatchOutcome; 3] {
        [
            commit_batch(store, WriteKind::Insert, &self.to_insert).await,
            commit_batch(store, WriteKind::Update, &self.to_update).await,
            commit_batch(store, WriteKind::Delete, &self.to_delete).await,
        ]
    }
}

fn past_tense(kind: WriteKind) -> &'static str {
    match kind {
        WriteKind::Insert => "saved to DB",
        WriteKind::Update => "updated in DB",
        WriteKind::Delete => "deleted from DB",
    }
}

/// Write `rows` as one unit of work. Any failure is logged and the unit
/// rolled back; nothing is propagated.
pub async fn commit_batch(store: &dyn FeatureStore, kind: WriteKind, rows: &[FeatureRow]) -> BatchOutcome {
    if rows.is_empty() {
        return BatchOutcome::Skipped;
    }
    let failed = BatchOutcome::Failed { rows: rows.len() };

    let mut unit = match store.begin().await {
        Ok(unit) => unit,
        Err(e) => {
            error!(error = %e, batch = %kind, "failed to open unit of work");
            return failed;
        }
    };

    for row in rows {
        let staged = match kind {
            WriteKind::Insert => unit.insert(row).await,
            WriteKind::Update => unit.update(row).await,
            WriteKind::Delete => unit.delete(row.activity_id, &row.name).await,
        };
        if let Err(e) = staged {
            error!(error = ?e, batch = %kind, activity_id = row.activity_id, "failed to stage feature write");
            if let Err(rb) = unit.rollback().await {
                error!(error = %rb, batch = %kind, "rollback failed");
            }
            return failed;
        }
    }

    match unit.commit().await {
        Ok(()) => {
            info!("{} features {}", rows.len(), past_tense(kind));
            BatchOutcome::Committed { rows: rows.len() }
        }
        Err(e) => {
            error!(error = ?e, batch = %kind, rows = rows.len(), "feature batch commit failed, rolled back");
            failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use likelihood_store::MemoryFeatureStore;

    #[test]
    fn equal_values_need_no_action() {
        assert_eq!(classify(None, None), None);
        assert_eq!(classify(Some(0.3), Some(0.3)), None);
    }

    #[test]
    fn new_finite_value_is_inserted() {
        assert_eq!(classify(None, Some(0.3)), Some(WriteKind::Insert));
    }

    #[test]
    fn new_nan_without_previous_is_ignored() {
        assert_eq!(classify(None, Some(f64::NAN)), None);
        assert_eq!(classify(None, Some(f64::INFINITY)), None);
    }

    #[test]
    fn nan_or_missing_replaces_previous_with_delete() {
        assert_eq!(classify(Some(0.3), Some(f64::NAN)), Some(WriteKind::Delete));
        assert_eq!(classify(Some(0.3), None), Some(WriteKind::Delete));
    }

    #[test]
    fn tolerance_boundary() {
        assert_eq!(classify(Some(1.0), Some(1.0 + 5e-14)), None);
        assert_eq!(classify(Some(1.0), Some(1.0 + 1e-12)), Some(WriteKind::Update));
    }

    #[test]
    fn drop_to_zero_is_an_update() {
        assert_eq!(classify(Some(0.2), Some(0.0)), Some(WriteKind::Update));
    }

    #[test]
    fn batches_route_by_kind() {
        let mut batches = EmployeeBatches::default();
        assert!(batches.is_empty());
        batches.push(WriteKind::Insert, FeatureRow::new(1, "f", Some(0.1)));
        batches.push(WriteKind::Delete, FeatureRow::new(2, "f", None));
        assert_eq!(batches.to_insert.len(), 1);
        assert_eq!(batches.to_update.len(), 0);
        assert_eq!(batches.to_delete.len(), 1);
        assert_eq!(batches.len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_skipped_without_a_transaction() {
        let store = MemoryFeatureStore::new();
        let outcome = commit_batch(&store, WriteKind::Update, &[]).await;
        assert_eq!(outcome, BatchOutcome::Skipped);
        assert_eq!(store.commits() + store.rollbacks(), 0);
    }

    #[tokio::test]
    async fn failed_commit_is_reported_not_raised() {
        let store = MemoryFeatureStore::new();
        store.fail_commit_when(WriteKind::Insert, None);
        let rows = vec![FeatureRow::new(1, "f", Some(0.1)), FeatureRow::new(2, "f", Some(0.2))];

        let outcome = commit_batch(&store, WriteKind::Insert, &rows).await;

        assert_eq!(outcome, BatchOutcome::Failed { rows: 2 });
        assert_eq!(store.feature(1, "f"), None);
        assert_eq!(store.rollbacks(), 1);
    }

    #[tokio::test]
    async fn later_batches_run_after_a_failure() {
        let store = MemoryFeatureStore::new();
        store.put_feature(1, "f", Some(0.5));
        store.put_feature(2, "f", Some(0.5));
        store.fail_commit_when(WriteKind::Update, None);

        let mut batches = EmployeeBatches::default();
        batches.push(WriteKind::Insert, FeatureRow::new(3, "f", Some(0.1)));
        batches.push(WriteKind::Update, FeatureRow::new(1, "f", Some(0.9)));
        batches.push(WriteKind::Delete, FeatureRow::new(2, "f", None));

        let [insert, update, delete] = batches.commit(&store).await;

        assert_eq!(insert, BatchOutcome::Committed { rows: 1 });
        assert_eq!(update, BatchOutcome::Failed { rows: 1 });
        assert_eq!(delete, BatchOutcome::Committed { rows: 1 });
        assert_eq!(store.feature(3, "f"), Some(Some(0.1)));
        assert_eq!(store.feature(1, "f"), Some(Some(0.5)));
        assert_eq!(store.feature(2, "f"), None);
    }
}
