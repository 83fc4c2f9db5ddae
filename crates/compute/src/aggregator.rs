//! Per-date aggregation of base probabilities into a derived score.

use likelihood_core::{DerivedFeature, Slice};

/// Numeric policy used to combine one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// `(Π v)^(1/n)`.
    GeometricMean,
    /// `(Σ ln v)^(1/n)`.
    ///
    /// A negative sum raised to a fractional power is NaN, so this policy
    /// yields NaN for most probability inputs once `n > 1`. It is kept
    /// as stored values depend on it.
    LogAggregate,
}

impl AggregationPolicy {
    pub fn for_feature(feature: DerivedFeature) -> Self {
        match feature {
            DerivedFeature::AnomalyLikelihood => AggregationPolicy::GeometricMean,
            DerivedFeature::AnomalyLikelihoodLog => AggregationPolicy::LogAggregate,
        }
    }

    /// Combine `values`. Callers guarantee at least one value; NaN inputs
    /// propagate.
    pub fn aggregate<'a>(&self, values: impl ExactSizeIterator<Item = &'a f64>) -> f64 {
        let exponent = 1.0 / values.len() as f64;
        match self {
            AggregationPolicy::GeometricMean => values.product::<f64>().powf(exponent),
            AggregationPolicy::LogAggregate => {
                values.map(|v| v.ln()).sum::<f64>().powf(exponent)
            }
        }
    }
}

/// Outcome of the validity check for one date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SliceVerdict {
    /// No base feature on this date.
    Empty,
    /// More base features than the recipe lists.
    Overflow { count: usize },
    /// Valid slice and its aggregate.
    Value(f64),
}

/// Previous stored value and recomputed verdict for one date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayEvaluation {
    pub prev: Option<f64>,
    pub verdict: SliceVerdict,
}

/// Evaluate one date's slice for `feature` under a recipe of length
/// `recipe_len`. The previous derived value is taken out of the slice
/// before counting.
pub fn evaluate_slice(feature: DerivedFeature, recipe_len: usize, mut slice: Slice) -> DayEvaluation {
    let prev = slice.remove(feature.as_str());
    let count = slice.len();

    let verdict = if count == 0 {
        SliceVerdict::Empty
    } else if count > recipe_len {
        SliceVerdict::Overflow { count }
    } else {
        SliceVerdict::Value(AggregationPolicy::for_feature(feature).aggregate(slice.values()))
    };

    DayEvaluation { prev, verdict }
}
