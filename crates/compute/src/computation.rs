use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use likelihood_core::{ActivityLookup, EmployeeId};

use crate::error::EngineError;
use crate::report::SyncOutcome;

/// Everything a feature computation needs for one run.
#[derive(Debug, Clone)]
pub struct ComputeRequest {
    pub feature_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub employees: Vec<EmployeeId>,
    pub activities: ActivityLookup,
}

/// A computation that derives one or more named features.
///
/// The surrounding scoring pipeline asks each registered computation whether
/// it supports a requested feature name and hands the request to the first
/// one that does.
#[async_trait]
pub trait FeatureComputation: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Feature names this computation derives.
    fn supported_features(&self) -> &BTreeSet<String>;

    fn supports(&self, feature_name: &str) -> bool {
        self.supported_features().contains(feature_name)
    }

    /// Run the computation. Persistence happens as a side effect.
    async fn compute(&self, request: &ComputeRequest) -> Result<SyncOutcome, EngineError>;
}

/// Routes feature names to registered computations.
#[derive(Default)]
pub struct ComputationRegistry {
    computations: Vec<Arc<dyn FeatureComputation>>,
}

impl ComputationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, computation: Arc<dyn FeatureComputation>) {
        debug!(
            computation = computation.name(),
            features = ?computation.supported_features(),
            "registered feature computation"
        );
        self.computations.push(computation);
    }

    /// First registered computation supporting `feature_name`.
    pub fn route(&self, feature_name: &str) -> Option<&Arc<dyn FeatureComputation>> {
        self.computations.iter().find(|c| c.supports(feature_name))
    }

    /// Union of all supported feature names.
    pub fn supported_features(&self) -> BTreeSet<String> {
        self.computations
            .iter()
            .flat_map(|c| c.supported_features().iter().cloned())
            .collect()
    }

    pub async fn compute(&self, request: &ComputeRequest) -> Result<SyncOutcome, EngineError> {
        match self.route(&request.feature_name) {
            Some(computation) => computation.compute(request).await,
            None => Ok(SyncOutcome::Unsupported {
                feature: request.feature_name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock computation for testing.
    struct MockComputation {
        name: String,
        features: BTreeSet<String>,
        calls: AtomicUsize,
    }

    impl MockComputation {
        fn new(name: &str, features: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                features: features.iter().map(|f| f.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeatureComputation for MockComputation {
        fn name(&self) -> &str { &self.name }
        fn supported_features(&self) -> &BTreeSet<String> { &self.features }

        async fn compute(&self, request: &ComputeRequest) -> Result<SyncOutcome, EngineError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(SyncOutcome::Unsupported { feature: format!("{}:{}", self.name, request.feature_name) })
        }
    }

    fn request(feature: &str) -> ComputeRequest {
        ComputeRequest {
            feature_name: feature.to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            employees: vec!["alice".to_string()],
            activities: ActivityLookup::new(),
        }
    }

    #[tokio::test]
    async fn routes_to_supporting_computation() {
        let vacations = Arc::new(MockComputation::new("vacations", &["vacation_days"]));
        let anomaly = Arc::new(MockComputation::new("anomaly", &["anomaly_likehood"]));
        let mut registry = ComputationRegistry::new();
        registry.register(vacations.clone());
        registry.register(anomaly.clone());

        let outcome = registry.compute(&request("anomaly_likehood")).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Unsupported { feature: "anomaly:anomaly_likehood".to_string() }
        );
        assert_eq!(anomaly.calls.load(Ordering::Relaxed), 1);
        assert_eq!(vacations.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn unknown_feature_is_unsupported() {
        let registry = ComputationRegistry::new();
        let outcome = registry.compute(&request("nope")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Unsupported { feature: "nope".to_string() });
    }

    #[test]
    fn supported_features_union() {
        let mut registry = ComputationRegistry::new();
        registry.register(Arc::new(MockComputation::new("a", &["x", "y"])));
        registry.register(Arc::new(MockComputation::new("b", &["y", "z"])));
        let all: Vec<String> = registry.supported_features().into_iter().collect();
        assert_eq!(all, vec!["x", "y", "z"]);
    }
}
