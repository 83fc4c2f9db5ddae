use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::LikelihoodError;

/// Opaque key of one employee's one calendar day (`user_activity.id`).
pub type ActivityId = i64;

/// Employee identifier (login).
pub type EmployeeId = String;

/// Feature name → value for one employee on one date. Name order keeps
/// floating-point aggregation deterministic.
pub type Slice = BTreeMap<String, f64>;

/// Date-ordered slices of one employee.
pub type FeatureSeries = BTreeMap<NaiveDate, Slice>;

/// Employee → date → activity id.
pub type ActivityLookup = HashMap<EmployeeId, HashMap<NaiveDate, ActivityId>>;

/// Suffix carried by every base probability feature in the store.
pub const PROB_SUFFIX: &str = "_prob";

/// One persisted row of `user_features`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub activity_id: ActivityId,
    pub name: String,
    pub value: Option<f64>,
}

impl FeatureRow {
    pub fn new(activity_id: ActivityId, name: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            activity_id,
            name: name.into(),
            value,
        }
    }
}

/// The two meta-features derived from base anomaly probabilities.
///
/// The persisted names keep the historical spelling so existing rows stay
/// addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DerivedFeature {
    /// Geometric mean of the slice.
    #[serde(rename = "anomaly_likehood")]
    AnomalyLikelihood,
    /// `(Σ ln v)^(1/n)` over the slice.
    #[serde(rename = "anomaly_likehood_log")]
    AnomalyLikelihoodLog,
}

impl DerivedFeature {
    pub const ALL: [DerivedFeature; 2] = [
        DerivedFeature::AnomalyLikelihood,
        DerivedFeature::AnomalyLikelihoodLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedFeature::AnomalyLikelihood => "anomaly_likehood",
            DerivedFeature::AnomalyLikelihoodLog => "anomaly_likehood_log",
        }
    }
}

impl fmt::Display for DerivedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DerivedFeature {
    type Err = LikelihoodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DerivedFeature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| LikelihoodError::UnknownFeature(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_feature_names_round_trip() {
        for feature in DerivedFeature::ALL {
            assert_eq!(feature.as_str().parse::<DerivedFeature>().unwrap(), feature);
        }
    }

    #[test]
    fn unknown_feature_is_rejected() {
        let err = "anomaly_score".parse::<DerivedFeature>().unwrap_err();
        assert!(matches!(err, LikelihoodError::UnknownFeature(name) if name == "anomaly_score"));
    }

    #[test]
    fn serde_uses_persisted_names() {
        let json = serde_json::to_string(&DerivedFeature::AnomalyLikelihoodLog).unwrap();
        assert_eq!(json, "\"anomaly_likehood_log\"");
    }
}
