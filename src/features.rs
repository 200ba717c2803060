//! # Feature Selection and Cleaning
//!
//! Selects the fixed, named set of numeric columns the regression consumes,
//! plus the opportunity-value target, and converts them from the summary
//! relation into dense `ndarray` structures.
//!
//! Null handling is a named strategy rather than an accidental default.
//! `FillStrategy::Zero` replaces every null (a provider absent from the
//! encounter or claims source) with zero before training or scoring. This
//! is a deliberate modeling simplification, not imputation by statistical
//! estimate; swapping in a different strategy must not change the shape of
//! the pipeline.

use crate::aggregate::{
    AVG_COST, AVG_LENGTH_OF_STAY, AVG_SATISFACTION, DENIAL_RATE, TOTAL_CLAIM_AMOUNT,
    TOTAL_CLAIM_PAID, TOTAL_PATIENTS,
};
use crate::data::{
    CONTACT_COUNT, DEALS_VALUE, DataError, MARKETING_COST, OPPORTUNITY_VALUE, PROVIDER_ID,
    extract_nullable_numeric_column, extract_string_column,
};
use ndarray::{Array1, Array2, ShapeBuilder};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// The model's input columns, in the order the coefficient vector uses.
pub const FEATURE_COLUMNS: [&str; 10] = [
    TOTAL_PATIENTS,
    AVG_LENGTH_OF_STAY,
    AVG_SATISFACTION,
    AVG_COST,
    CONTACT_COUNT,
    DEALS_VALUE,
    MARKETING_COST,
    TOTAL_CLAIM_AMOUNT,
    TOTAL_CLAIM_PAID,
    DENIAL_RATE,
];

/// The regression target.
pub const TARGET_COLUMN: &str = OPPORTUNITY_VALUE;

/// How null feature/target values are replaced before modeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FillStrategy {
    /// Nulls become zero.
    #[default]
    Zero,
}

impl FillStrategy {
    pub fn fill(&self, value: Option<f64>) -> f64 {
        match self {
            FillStrategy::Zero => value.unwrap_or(0.0),
        }
    }
}

/// The cleaned model inputs: one row per provider, aligned with
/// `provider_ids`.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub provider_ids: Vec<String>,
    /// Shape `[n_providers, FEATURE_COLUMNS.len()]`.
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

/// Builds the feature matrix and target vector from the summary relation.
pub fn build_features(
    summary: &DataFrame,
    fill: FillStrategy,
) -> Result<FeatureMatrix, DataError> {
    const RELATION: &str = "provider summary";

    let provider_ids = extract_string_column(summary, RELATION, PROVIDER_ID)?;
    let n = summary.height();

    let mut buffer = Vec::with_capacity(n * FEATURE_COLUMNS.len());
    for name in FEATURE_COLUMNS {
        let column = extract_nullable_numeric_column(summary, RELATION, name)?;
        if column.iter().flatten().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound {
                relation: RELATION,
                column: name.to_string(),
            });
        }
        buffer.extend(column.into_iter().map(|v| fill.fill(v)));
    }
    // Columns were appended one after another, so interpret the buffer in
    // column-major order.
    let x = Array2::from_shape_vec((n, FEATURE_COLUMNS.len()).f(), buffer)
        .expect("feature columns share the summary's row count");

    let target = extract_nullable_numeric_column(summary, RELATION, TARGET_COLUMN)?;
    let y = Array1::from_iter(target.into_iter().map(|v| fill.fill(v)));

    Ok(FeatureMatrix { provider_ids, x, y })
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn summary_fixture() -> DataFrame {
        df!(
            PROVIDER_ID => ["Dr. Smith", "Dr. Garcia"],
            TOTAL_PATIENTS => [Some(10i64), None],
            AVG_LENGTH_OF_STAY => [Some(4.0), None],
            AVG_SATISFACTION => [Some(85.0), None],
            AVG_COST => [Some(5000.0), None],
            CONTACT_COUNT => [25i64, 10],
            DEALS_VALUE => [100000.0, 50000.0],
            MARKETING_COST => [50000.0, 10000.0],
            TOTAL_CLAIM_AMOUNT => [Some(10000.0), None],
            TOTAL_CLAIM_PAID => [Some(8000.0), None],
            DENIAL_RATE => [Some(0.25), None],
            OPPORTUNITY_VALUE => [80000.0, 30000.0],
        )
        .unwrap()
    }

    #[test]
    fn matrix_shape_and_order() {
        let features = build_features(&summary_fixture(), FillStrategy::Zero).unwrap();
        assert_eq!(features.x.shape(), &[2, FEATURE_COLUMNS.len()]);
        assert_eq!(features.provider_ids, vec!["Dr. Smith", "Dr. Garcia"]);
        // Column 0 is total_patients, column 5 is deals_value.
        assert_abs_diff_eq!(features.x[[0, 0]], 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(features.x[[0, 5]], 100000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(features.y[0], 80000.0, epsilon = 1e-9);
    }

    #[test]
    fn nulls_become_zero_not_dropped() {
        let features = build_features(&summary_fixture(), FillStrategy::Zero).unwrap();
        // Dr. Garcia has no encounter or claims aggregates: every joined
        // column is zero-filled, and the row is retained.
        assert_eq!(features.x.nrows(), 2);
        assert_abs_diff_eq!(features.x[[1, 0]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(features.x[[1, 9]], 0.0, epsilon = 1e-12);
        // Anchor columns keep their values.
        assert_abs_diff_eq!(features.x[[1, 4]], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_feature_rejected() {
        let df = df!(
            PROVIDER_ID => ["Dr. Smith"],
            TOTAL_PATIENTS => [10i64],
            AVG_LENGTH_OF_STAY => [4.0],
            AVG_SATISFACTION => [85.0],
            AVG_COST => [f64::INFINITY],
            CONTACT_COUNT => [25i64],
            DEALS_VALUE => [100000.0],
            MARKETING_COST => [50000.0],
            TOTAL_CLAIM_AMOUNT => [10000.0],
            TOTAL_CLAIM_PAID => [8000.0],
            DENIAL_RATE => [0.25],
            OPPORTUNITY_VALUE => [80000.0],
        )
        .unwrap();
        let err = build_features(&df, FillStrategy::Zero).unwrap_err();
        match err {
            DataError::NonFiniteValuesFound { column, .. } => assert_eq!(column, AVG_COST),
            other => panic!("expected NonFiniteValuesFound, got {other:?}"),
        }
    }
}
