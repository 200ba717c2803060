//! # The Pipeline Orchestrator
//!
//! Drives one full batch run:
//!
//! ```text
//! load -> aggregate -> merge -> derived metrics -> features
//!      -> train/evaluate -> full-population scoring
//! ```
//!
//! Single-threaded, single-pass, everything in memory; the run either
//! completes or aborts on the first unrecoverable error. The summary is
//! rebuilt from scratch on every invocation — no state crosses runs — and
//! rows are sorted by provider id before modeling so that the seeded split
//! is independent of join and group-by implementation order.

use crate::aggregate::{
    AVG_COST, AVG_LENGTH_OF_STAY, AVG_SATISFACTION, DENIAL_RATE, TOTAL_CLAIM_AMOUNT,
    TOTAL_CLAIM_PAID, TOTAL_CLAIMS, TOTAL_PATIENTS, aggregate_claims, aggregate_encounters,
};
use crate::data::{
    CONTACT_COUNT, DEALS_VALUE, DataError, EncounterFrame, MARKETING_COST, OPPORTUNITY_VALUE,
    PIPELINE_STAGE, PROVIDER_ID, ReferralFrame, UsageFrame, load_claims, load_encounters,
    load_referrals,
};
use crate::features::{FillStrategy, build_features};
use crate::merge::{MergeError, merge_provider_relations};
use crate::metrics::{CLAIM_COLLECTION_RATE, ROI, VALUE_PER_PATIENT, add_derived_metrics};
use crate::model::{
    DEFAULT_HOLDOUT_FRACTION, DEFAULT_SEED, Evaluation, FittedModel, ModelError,
    PREDICTED_OPPORTUNITY_VALUE, TrainConfig, train_model,
};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The deterministic column order of the exported summary relation.
pub const SUMMARY_COLUMNS: [&str; 18] = [
    PROVIDER_ID,
    PIPELINE_STAGE,
    CONTACT_COUNT,
    DEALS_VALUE,
    MARKETING_COST,
    OPPORTUNITY_VALUE,
    TOTAL_PATIENTS,
    AVG_LENGTH_OF_STAY,
    AVG_SATISFACTION,
    AVG_COST,
    TOTAL_CLAIMS,
    TOTAL_CLAIM_AMOUNT,
    TOTAL_CLAIM_PAID,
    DENIAL_RATE,
    ROI,
    VALUE_PER_PATIENT,
    CLAIM_COLLECTION_RATE,
    PREDICTED_OPPORTUNITY_VALUE,
];

/// Locations of the three CSV sources.
#[derive(Debug, Clone)]
pub struct SourcePaths {
    pub encounters: PathBuf,
    pub referrals: PathBuf,
    pub claims: PathBuf,
}

impl SourcePaths {
    /// The conventional file names inside a data directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            encounters: dir.join("encounters.csv"),
            referrals: dir.join("referrals.csv"),
            claims: dir.join("claims.csv"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub seed: u64,
    pub holdout_fraction: f64,
    pub fill: FillStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
            fill: FillStrategy::Zero,
        }
    }
}

/// Everything a completed run produces: the raw relations (kept for the
/// workbook export), the scored summary, the fitted artifact and its
/// held-out evaluation.
#[derive(Debug)]
pub struct RunArtifacts {
    pub encounters: EncounterFrame,
    pub referrals: ReferralFrame,
    pub claims: UsageFrame,
    pub summary: DataFrame,
    pub model: FittedModel,
    pub evaluation: Evaluation,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
}

/// Runs the full integration-and-scoring pipeline.
pub fn run(sources: &SourcePaths, config: &PipelineConfig) -> Result<RunArtifacts, PipelineError> {
    let encounters = load_encounters(&sources.encounters)?;
    let referrals = load_referrals(&sources.referrals)?;
    let claims = load_claims(&sources.claims)?;
    log::info!(
        "loaded {} encounters, {} referral providers, {} claims",
        encounters.df.height(),
        referrals.df.height(),
        claims.df.height()
    );

    let encounter_agg = aggregate_encounters(&encounters)?;
    let usage_agg = aggregate_claims(&claims)?;
    let merged = merge_provider_relations(&referrals, &encounter_agg, &usage_agg)?;
    let summary = add_derived_metrics(merged)?;
    // Canonical row order before modeling: the seeded split operates on row
    // indices, so the mapping from provider to index must not depend on
    // hash-based group-by or join ordering.
    let mut summary = summary.sort([PROVIDER_ID], Default::default())?;

    let features = build_features(&summary, config.fill)?;
    let train_config = TrainConfig {
        seed: config.seed,
        holdout_fraction: config.holdout_fraction,
    };
    let (model, evaluation) = train_model(&features, &train_config)?;
    match evaluation.r2 {
        Some(r2) => log::info!(
            "predictive model evaluation: MAE={:.2}, R2={:.2}",
            evaluation.mae,
            r2
        ),
        None => log::warn!(
            "predictive model evaluation: MAE={:.2}, R2 undefined (degenerate held-out target)",
            evaluation.mae
        ),
    }

    // Full-population scoring: the artifact is applied to every provider,
    // training and held-out rows alike, so these predictions are partly
    // in-sample and are not comparable to the held-out evaluation above.
    let predictions = model.predict(features.x.view())?;
    summary.with_column(Series::new(
        PREDICTED_OPPORTUNITY_VALUE.into(),
        predictions.to_vec(),
    ))?;
    let summary = summary.select(SUMMARY_COLUMNS)?;

    Ok(RunArtifacts {
        encounters,
        referrals,
        claims,
        summary,
        model,
        evaluation,
    })
}
