//! # Regression Training, Evaluation and Scoring
//!
//! Fits the opportunity-value model from the cleaned feature matrix:
//!
//! 1. Split rows into a 70% training and 30% held-out partition by
//!    shuffling row indices with an explicitly seeded `StdRng`. The seed is
//!    a parameter threaded from the caller — never ambient global state —
//!    so identical input and seed reproduce the split bit-for-bit.
//! 2. Fit a per-feature standardization (mean and population standard
//!    deviation learned from the training partition only) composed with an
//!    ordinary least-squares regression, solved by SVD so rank-deficient
//!    feature matrices yield the minimum-norm solution instead of failing.
//! 3. Evaluate on the held-out partition: mean absolute error and R².
//!
//! The fitted standardization parameters and coefficients together form the
//! immutable [`FittedModel`] artifact, serialized to a human-readable TOML
//! file. Full-population scoring — applying the artifact to training and
//! held-out rows alike — is a distinct step from held-out evaluation, and
//! its predictions are partly in-sample by design.

use crate::features::{FEATURE_COLUMNS, FeatureMatrix};
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use ndarray_linalg::LeastSquaresSvd;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Column appended to the summary by full-population scoring.
pub const PREDICTED_OPPORTUNITY_VALUE: &str = "predicted_opportunity_value";

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.3;

#[derive(Debug, Clone, Copy)]
pub struct TrainConfig {
    /// Seed for the train/held-out shuffle.
    pub seed: u64,
    /// Fraction of rows held out for evaluation.
    pub holdout_fraction: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
        }
    }
}

/// Per-feature standardization parameters, learned from the training
/// partition only and reused unchanged for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl Standardizer {
    fn fit(x: ArrayView2<f64>) -> Self {
        let n = x.nrows() as f64;
        let mut means = Vec::with_capacity(x.ncols());
        let mut scales = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let mean = column.sum() / n;
            let variance = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let scale = variance.sqrt();
            means.push(mean);
            // A constant feature has zero spread; dividing by it would turn
            // every value non-finite, so it passes through unscaled.
            scales.push(if scale == 0.0 { 1.0 } else { scale });
        }
        Standardizer { means, scales }
    }

    fn transform(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let mean = self.means[j];
            let scale = self.scales[j];
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        out
    }
}

/// The self-contained, trained model artifact. This is the structure that
/// gets saved to and loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    /// Canonical feature order; the coefficient vector follows it.
    pub feature_names: Vec<String>,
    pub standardizer: Standardizer,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// The split seed the artifact was trained with, kept for provenance.
    pub seed: u64,
}

/// Held-out evaluation of a fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub mae: f64,
    /// `None` when the held-out target is constant (or entirely
    /// zero-filled), which makes the coefficient of determination
    /// undefined.
    pub r2: Option<f64>,
    pub n_train: usize,
    pub n_holdout: usize,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read or write model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML model file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize model to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("least-squares solve failed: {0}")]
    LeastSquares(#[from] ndarray_linalg::error::LinalgError),
    #[error(
        "the feature matrix has {rows} row(s); at least {required} are needed to form a held-out partition"
    )]
    InsufficientRows { rows: usize, required: usize },
    #[error("scoring data has {found} feature columns, but the model was trained on {expected}")]
    MismatchedFeatureCount { found: usize, expected: usize },
}

impl FittedModel {
    /// Applies the artifact to a feature matrix, producing one prediction
    /// per row. Used both for held-out evaluation and for the final
    /// full-population scoring pass.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.coefficients.len() {
            return Err(ModelError::MismatchedFeatureCount {
                found: x.ncols(),
                expected: self.coefficients.len(),
            });
        }
        let standardized = self.standardizer.transform(x);
        let coefficients = Array1::from_vec(self.coefficients.clone());
        Ok(standardized.dot(&coefficients) + self.intercept)
    }

    /// Saves the artifact to a human-readable TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads an artifact from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model = toml::from_str(&toml_string)?;
        Ok(model)
    }
}

/// Deterministic train/held-out split of `0..n`.
///
/// The held-out size is `ceil(n * holdout_fraction)`, clamped so both
/// partitions stay non-empty.
pub fn split_indices(n: usize, holdout_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let n_holdout = ((n as f64) * holdout_fraction).ceil() as usize;
    let n_holdout = n_holdout.clamp(1, n.saturating_sub(1).max(1));
    let holdout = indices[..n_holdout].to_vec();
    let train = indices[n_holdout..].to_vec();
    (train, holdout)
}

/// Trains the model and evaluates it on the held-out partition.
pub fn train_model(
    features: &FeatureMatrix,
    config: &TrainConfig,
) -> Result<(FittedModel, Evaluation), ModelError> {
    let n = features.x.nrows();
    if n < 2 {
        return Err(ModelError::InsufficientRows {
            rows: n,
            required: 2,
        });
    }

    let (train_idx, holdout_idx) = split_indices(n, config.holdout_fraction, config.seed);
    log::info!(
        "training on {} provider(s), holding out {} for evaluation (seed {})",
        train_idx.len(),
        holdout_idx.len(),
        config.seed
    );

    let x_train = features.x.select(Axis(0), &train_idx);
    let y_train = features.y.select(Axis(0), &train_idx);

    let standardizer = Standardizer::fit(x_train.view());
    let design = design_matrix(&standardizer.transform(x_train.view()));
    let solution = design.least_squares(&y_train)?;
    let beta = solution.solution;

    let model = FittedModel {
        feature_names: FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
        standardizer,
        intercept: beta[0],
        coefficients: beta.slice(s![1..]).to_vec(),
        seed: config.seed,
    };

    let x_holdout = features.x.select(Axis(0), &holdout_idx);
    let y_holdout = features.y.select(Axis(0), &holdout_idx);
    let evaluation = evaluate(&model, x_holdout.view(), &y_holdout, train_idx.len())?;
    Ok((model, evaluation))
}

fn evaluate(
    model: &FittedModel,
    x_holdout: ArrayView2<f64>,
    y_holdout: &Array1<f64>,
    n_train: usize,
) -> Result<Evaluation, ModelError> {
    let predictions = model.predict(x_holdout)?;
    let n = y_holdout.len() as f64;

    let mae = y_holdout
        .iter()
        .zip(predictions.iter())
        .map(|(actual, predicted)| (actual - predicted).abs())
        .sum::<f64>()
        / n;

    let mean = y_holdout.sum() / n;
    let ss_tot = y_holdout.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    let r2 = if ss_tot == 0.0 {
        log::warn!(
            "held-out opportunity values are constant; R^2 is undefined for this evaluation"
        );
        None
    } else {
        let ss_res = y_holdout
            .iter()
            .zip(predictions.iter())
            .map(|(actual, predicted)| (actual - predicted).powi(2))
            .sum::<f64>();
        Some(1.0 - ss_res / ss_tot)
    };

    Ok(Evaluation {
        mae,
        r2,
        n_train,
        n_holdout: y_holdout.len(),
    })
}

/// Prepends the intercept column of ones.
fn design_matrix(x: &Array2<f64>) -> Array2<f64> {
    let mut design = Array2::ones((x.nrows(), x.ncols() + 1));
    design.slice_mut(s![.., 1..]).assign(x);
    design
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    /// A feature matrix whose target is an exact linear function of one
    /// informative column; the remaining columns are constant.
    fn linear_features(n: usize) -> FeatureMatrix {
        let mut x = Array2::zeros((n, FEATURE_COLUMNS.len()));
        for i in 0..n {
            x[[i, 0]] = i as f64;
            x[[i, 5]] = 1.0;
        }
        let y = Array1::from_iter((0..n).map(|i| 3.0 * i as f64 + 7.0));
        FeatureMatrix {
            provider_ids: (0..n).map(|i| format!("P{i:03}")).collect(),
            x,
            y,
        }
    }

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let (train_a, holdout_a) = split_indices(20, 0.3, 42);
        let (train_b, holdout_b) = split_indices(20, 0.3, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(holdout_a, holdout_b);

        let (train_c, _) = split_indices(20, 0.3, 43);
        assert_ne!(train_a, train_c);
    }

    #[test]
    fn split_sizes_and_disjointness() {
        let (train, holdout) = split_indices(20, 0.3, 42);
        assert_eq!(holdout.len(), 6);
        assert_eq!(train.len(), 14);
        let mut all: Vec<usize> = train.iter().chain(holdout.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn tiny_input_keeps_both_partitions_non_empty() {
        let (train, holdout) = split_indices(2, 0.3, 42);
        assert_eq!(train.len(), 1);
        assert_eq!(holdout.len(), 1);
    }

    #[test]
    fn recovers_exact_linear_relationship() {
        let features = linear_features(40);
        let (model, evaluation) = train_model(&features, &TrainConfig::default()).unwrap();
        assert!(evaluation.mae < 1e-6, "MAE was {}", evaluation.mae);
        let r2 = evaluation.r2.expect("holdout target varies");
        assert_abs_diff_eq!(r2, 1.0, epsilon = 1e-9);

        let predictions = model.predict(features.x.view()).unwrap();
        for (i, predicted) in predictions.iter().enumerate() {
            assert_abs_diff_eq!(*predicted, 3.0 * i as f64 + 7.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn identical_seed_reproduces_coefficients() {
        let features = linear_features(25);
        let config = TrainConfig::default();
        let (model_a, eval_a) = train_model(&features, &config).unwrap();
        let (model_b, eval_b) = train_model(&features, &config).unwrap();
        // Bit-for-bit: same split, same arithmetic, same result.
        assert_eq!(model_a.coefficients, model_b.coefficients);
        assert_eq!(model_a.intercept.to_bits(), model_b.intercept.to_bits());
        assert_eq!(eval_a, eval_b);
    }

    #[test]
    fn constant_target_reports_undefined_r2() {
        let mut features = linear_features(10);
        features.y = Array1::from_elem(10, 5000.0);
        let (_, evaluation) = train_model(&features, &TrainConfig::default()).unwrap();
        assert_eq!(evaluation.r2, None);
        assert!(evaluation.mae.is_finite());
    }

    #[test]
    fn artifact_round_trips_through_toml() {
        let features = linear_features(15);
        let (model, _) = train_model(&features, &TrainConfig::default()).unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        model.save(file.path()).unwrap();
        let loaded = FittedModel::load(file.path()).unwrap();

        assert_eq!(loaded.feature_names, model.feature_names);
        assert_eq!(loaded.coefficients, model.coefficients);
        assert_eq!(loaded.seed, model.seed);

        let original = model.predict(features.x.view()).unwrap();
        let reloaded = loaded.predict(features.x.view()).unwrap();
        for (a, b) in original.iter().zip(reloaded.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn mismatched_feature_count_is_rejected() {
        let features = linear_features(15);
        let (model, _) = train_model(&features, &TrainConfig::default()).unwrap();
        let narrow = Array2::<f64>::zeros((3, 4));
        let err = model.predict(narrow.view()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::MismatchedFeatureCount {
                found: 4,
                expected: 10
            }
        ));
    }

    #[test]
    fn too_few_rows_is_rejected() {
        let features = linear_features(1);
        let err = train_model(&features, &TrainConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientRows { rows: 1, .. }));
    }
}
