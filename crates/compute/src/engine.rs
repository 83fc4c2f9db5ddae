use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use likelihood_core::{
    ActivityId, ActivityLookup, CompiledRecipes, DerivedFeature, EmployeeId, EngineConfig,
    FeatureRow, FeatureSeries, LikelihoodError, OverflowPolicy,
};
use likelihood_store::{FeatureSeriesLoader, FeatureStore, WriteKind};

use crate::aggregator::{evaluate_slice, DayEvaluation, SliceVerdict};
use crate::computation::{ComputeRequest, FeatureComputation};
use crate::error::EngineError;
use crate::reconciler::{classify, EmployeeBatches};
use crate::report::{EmployeeReport, SyncOutcome, SyncReport};

/// Derives the anomaly likelihood meta-features and keeps the store in
/// step with them.
///
/// Employees are processed one at a time in the order given. For each one
/// the base series is loaded, every date is aggregated and classified, and
/// the resulting insert, update and delete batches are committed in that
/// order. Batch failures are logged and counted; they never end the run.
pub struct AnomalyFeature {
    recipes: CompiledRecipes,
    config: EngineConfig,
    loader: Arc<dyn FeatureSeriesLoader>,
    store: Arc<dyn FeatureStore>,
    supported: BTreeSet<String>,
}

impl AnomalyFeature {
    pub fn new(
        recipes: CompiledRecipes,
        config: EngineConfig,
        loader: Arc<dyn FeatureSeriesLoader>,
        store: Arc<dyn FeatureStore>,
    ) -> Self {
        let supported = DerivedFeature::ALL
            .iter()
            .map(|f| f.as_str().to_string())
            .collect();
        Self {
            recipes,
            config,
            loader,
            store,
            supported,
        }
    }

    /// Feature names this engine derives.
    pub fn supported_features(&self) -> &BTreeSet<String> {
        &self.supported
    }

    /// Recompute `feature_name` for `employees` up to `end_date` and write
    /// the differences to the store.
    ///
    /// `start_date` bounds the load only when full-history reconciliation
    /// is disabled.
    pub async fn sync(
        &self,
        feature_name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        employees: &[EmployeeId],
        activities: &ActivityLookup,
    ) -> Result<SyncOutcome, EngineError> {
        let Ok(feature) = feature_name.parse::<DerivedFeature>() else {
            return Ok(SyncOutcome::Unsupported {
                feature: feature_name.to_string(),
            });
        };
        let recipe = self
            .recipes
            .get(feature)
            .ok_or_else(|| LikelihoodError::MissingRecipe(feature.to_string()))?;

        let names = recipe.load_names();
        let load_start = if self.config.full_history { None } else { Some(start_date) };
        let started = Instant::now();
        let mut report = SyncReport::new(feature);

        for (n, login) in employees.iter().enumerate() {
            info!("Calculating for {} {}/{}", login, n + 1, employees.len());

            let series = self
                .loader
                .load_series(&names, std::slice::from_ref(login), load_start, end_date)
                .await?
                .remove(login)
                .unwrap_or_default();

            let plan = plan_employee(
                feature,
                recipe.len(),
                self.config.overflow_policy,
                series,
                activities.get(login),
            );
            let [insert, update, delete] = plan.batches.commit(self.store.as_ref()).await;

            report.record(EmployeeReport {
                employee: login.clone(),
                dates: plan.dates,
                invalid_slices: plan.invalid_slices,
                unmapped_dates: plan.unmapped_dates,
                insert,
                update,
                delete,
            });
        }

        info!(
            "{} synced for {} employees in {:.1}s: {} committed, {} failed",
            feature,
            employees.len(),
            started.elapsed().as_secs_f64(),
            report.committed(),
            report.failed()
        );

        Ok(SyncOutcome::Synced(report))
    }
}

#[async_trait]
impl FeatureComputation for AnomalyFeature {
    fn name(&self) -> &str {
        "anomaly_likelihood"
    }

    fn supported_features(&self) -> &BTreeSet<String> {
        &self.supported
    }

    async fn compute(&self, request: &ComputeRequest) -> Result<SyncOutcome, EngineError> {
        self.sync(
            &request.feature_name,
            request.start_date,
            request.end_date,
            &request.employees,
            &request.activities,
        )
        .await
    }
}

/// Classified writes and bookkeeping for one employee.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EmployeePlan {
    pub batches: EmployeeBatches,
    pub dates: usize,
    pub invalid_slices: usize,
    pub unmapped_dates: usize,
}

/// Aggregate and classify every date of one employee's series.
pub fn plan_employee(
    feature: DerivedFeature,
    recipe_len: usize,
    overflow: OverflowPolicy,
    series: FeatureSeries,
    days: Option<&HashMap<NaiveDate, ActivityId>>,
) -> EmployeePlan {
    let mut plan = EmployeePlan::default();

    for (day, slice) in series {
        plan.dates += 1;
        let DayEvaluation { prev, verdict } = evaluate_slice(feature, recipe_len, slice);

        let new = match verdict {
            SliceVerdict::Value(value) => Some(value),
            SliceVerdict::Overflow { count }
                if overflow == OverflowPolicy::Delete && prev.is_some() =>
            {
                debug!(%day, count, recipe_len, "overflowing slice, dropping stored value");
                plan.invalid_slices += 1;
                None
            }
            SliceVerdict::Empty | SliceVerdict::Overflow { .. } => {
                plan.invalid_slices += 1;
                continue;
            }
        };

        let Some(kind) = classify(prev, new) else {
            continue;
        };
        let Some(activity_id) = days.and_then(|d| d.get(&day)).copied() else {
            warn!(%day, %kind, "no activity id for date, skipping");
            plan.unmapped_dates += 1;
            continue;
        };

        debug!(%day, %kind, ?prev, ?new, "classified");
        let value = if kind == WriteKind::Delete { None } else { new };
        plan.batches
            .push(kind, FeatureRow::new(activity_id, feature.as_str(), value));
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use likelihood_core::Slice;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn slice(entries: &[(&str, f64)]) -> Slice {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn days(ids: &[(u32, ActivityId)]) -> HashMap<NaiveDate, ActivityId> {
        ids.iter().map(|(d, id)| (day(*d), *id)).collect()
    }

    #[test]
    fn plan_classifies_each_date_independently() {
        let mut series = FeatureSeries::new();
        // new value, no previous
        series.insert(day(1), slice(&[("a_prob", 0.5), ("b_prob", 0.2)]));
        // unchanged
        series.insert(day(2), slice(&[("a_prob", 0.25), ("anomaly_likehood", 0.25)]));
        // changed
        series.insert(day(3), slice(&[("a_prob", 0.36), ("anomaly_likehood", 0.5)]));
        // only the previous value survives
        series.insert(day(4), slice(&[("anomaly_likehood", 0.5)]));

        let lookup = days(&[(1, 11), (2, 12), (3, 13), (4, 14)]);
        let plan = plan_employee(
            DerivedFeature::AnomalyLikelihood,
            2,
            OverflowPolicy::Keep,
            series,
            Some(&lookup),
        );

        assert_eq!(plan.dates, 4);
        assert_eq!(plan.invalid_slices, 1);
        assert_eq!(plan.batches.to_insert.len(), 1);
        assert_eq!(plan.batches.to_insert[0].activity_id, 11);
        assert_eq!(plan.batches.to_update.len(), 1);
        assert_eq!(plan.batches.to_update[0].activity_id, 13);
        assert_eq!(plan.batches.to_update[0].value, Some(0.36));
        assert!(plan.batches.to_delete.is_empty());
    }

    #[test]
    fn overflow_keep_leaves_stale_value() {
        let mut series = FeatureSeries::new();
        series.insert(
            day(1),
            slice(&[("a_prob", 0.5), ("b_prob", 0.5), ("anomaly_likehood", 0.7)]),
        );
        let lookup = days(&[(1, 21)]);

        let plan = plan_employee(
            DerivedFeature::AnomalyLikelihood,
            1,
            OverflowPolicy::Keep,
            series,
            Some(&lookup),
        );
        assert!(plan.batches.is_empty());
        assert_eq!(plan.invalid_slices, 1);
    }

    #[test]
    fn overflow_delete_removes_stale_value() {
        let mut series = FeatureSeries::new();
        series.insert(
            day(1),
            slice(&[("a_prob", 0.5), ("b_prob", 0.5), ("anomaly_likehood", 0.7)]),
        );
        series.insert(day(2), slice(&[("a_prob", 0.5), ("b_prob", 0.5)]));
        let lookup = days(&[(1, 21), (2, 22)]);

        let plan = plan_employee(
            DerivedFeature::AnomalyLikelihood,
            1,
            OverflowPolicy::Delete,
            series,
            Some(&lookup),
        );
        assert_eq!(plan.batches.to_delete, vec![FeatureRow::new(21, "anomaly_likehood", None)]);
        assert!(plan.batches.to_insert.is_empty());
        assert_eq!(plan.invalid_slices, 2);
    }

    #[test]
    fn missing_activity_is_counted() {
        let mut series = FeatureSeries::new();
        series.insert(day(1), slice(&[("a_prob", 0.5)]));
        series.insert(day(2), slice(&[("a_prob", 0.5)]));
        let lookup = days(&[(2, 32)]);

        let plan = plan_employee(
            DerivedFeature::AnomalyLikelihood,
            1,
            OverflowPolicy::Keep,
            series,
            Some(&lookup),
        );
        assert_eq!(plan.unmapped_dates, 1);
        assert_eq!(plan.batches.to_insert.len(), 1);
        assert_eq!(plan.batches.to_insert[0].activity_id, 32);
    }

    #[test]
    fn log_feature_with_nan_result_deletes() {
        let mut series = FeatureSeries::new();
        series.insert(
            day(1),
            slice(&[("a_prob", 0.5), ("b_prob", 0.2), ("anomaly_likehood_log", -1.2)]),
        );
        let lookup = days(&[(1, 41)]);

        let plan = plan_employee(
            DerivedFeature::AnomalyLikelihoodLog,
            2,
            OverflowPolicy::Keep,
            series,
            Some(&lookup),
        );
        assert_eq!(
            plan.batches.to_delete,
            vec![FeatureRow::new(41, "anomaly_likehood_log", None)]
        );
    }
}
