//! # Per-Provider Aggregation
//!
//! Collapses the fine-grained sources (one row per encounter, one row per
//! claim) into one row per distinct provider. Pure functions of their input
//! relation: a provider with zero source rows simply does not appear here —
//! it is reintroduced, with nulls, by the downstream left join against the
//! referral anchor.

use crate::data::{
    CLAIM_AMOUNT, CLAIM_PAID, CLAIM_STATUS, DENIED_STATUS, EncounterFrame, LENGTH_OF_STAY,
    PATIENT_ID, PROVIDER_ID, REFERRING_PROVIDER, SATISFACTION_SCORE, TREATMENT_COST, UsageFrame,
};
use polars::prelude::*;

// Encounter aggregate columns.
pub const TOTAL_PATIENTS: &str = "total_patients";
pub const AVG_LENGTH_OF_STAY: &str = "avg_length_of_stay";
pub const AVG_SATISFACTION: &str = "avg_satisfaction";
pub const AVG_COST: &str = "avg_cost";

// Usage aggregate columns.
pub const TOTAL_CLAIMS: &str = "total_claims";
pub const TOTAL_CLAIM_AMOUNT: &str = "total_claim_amount";
pub const TOTAL_CLAIM_PAID: &str = "total_claim_paid";
pub const DENIAL_RATE: &str = "denial_rate";

/// One row per referring provider: patient count plus arithmetic means of
/// the clinical metrics.
pub fn aggregate_encounters(encounters: &EncounterFrame) -> Result<DataFrame, PolarsError> {
    encounters
        .df
        .clone()
        .lazy()
        .with_column(col(REFERRING_PROVIDER).alias(PROVIDER_ID))
        .group_by([col(PROVIDER_ID)])
        .agg([
            col(PATIENT_ID).count().cast(DataType::Int64).alias(TOTAL_PATIENTS),
            col(LENGTH_OF_STAY).mean().alias(AVG_LENGTH_OF_STAY),
            col(SATISFACTION_SCORE).mean().alias(AVG_SATISFACTION),
            col(TREATMENT_COST).mean().alias(AVG_COST),
        ])
        .collect()
}

/// One row per provider: claim count, billed and paid totals, and the
/// fraction of claims in the denied state.
pub fn aggregate_claims(claims: &UsageFrame) -> Result<DataFrame, PolarsError> {
    claims
        .df
        .clone()
        .lazy()
        .group_by([col(PROVIDER_ID)])
        .agg([
            col(CLAIM_AMOUNT).count().cast(DataType::Int64).alias(TOTAL_CLAIMS),
            col(CLAIM_AMOUNT).cast(DataType::Float64).sum().alias(TOTAL_CLAIM_AMOUNT),
            col(CLAIM_PAID).cast(DataType::Float64).sum().alias(TOTAL_CLAIM_PAID),
            col(CLAIM_STATUS)
                .eq(lit(DENIED_STATUS))
                .cast(DataType::Float64)
                .mean()
                .alias(DENIAL_RATE),
        ])
        .collect()
}
