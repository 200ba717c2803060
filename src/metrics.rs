//! # Derived Provider Metrics
//!
//! Row-wise formula columns computed on the merged relation:
//!
//! - `roi = (deals_value - marketing_cost) / marketing_cost`
//! - `value_per_patient = deals_value / total_patients`
//! - `claim_collection_rate = total_claim_paid / total_claim_amount`
//!
//! Division-by-zero policy: a zero denominator propagates an IEEE
//! non-finite value and a null denominator propagates null. Neither is an
//! error here — consumers of the summary (exports, the read API) must be
//! prepared to encounter and filter such values.

use crate::aggregate::{TOTAL_CLAIM_AMOUNT, TOTAL_CLAIM_PAID, TOTAL_PATIENTS};
use crate::data::{DEALS_VALUE, MARKETING_COST};
use polars::prelude::*;

pub const ROI: &str = "roi";
pub const VALUE_PER_PATIENT: &str = "value_per_patient";
pub const CLAIM_COLLECTION_RATE: &str = "claim_collection_rate";

/// Appends the derived ratio columns to the merged relation.
pub fn add_derived_metrics(merged: DataFrame) -> Result<DataFrame, PolarsError> {
    let deals = col(DEALS_VALUE).cast(DataType::Float64);
    let marketing = col(MARKETING_COST).cast(DataType::Float64);
    merged
        .lazy()
        .with_columns([
            ((deals.clone() - marketing.clone()) / marketing).alias(ROI),
            (deals / col(TOTAL_PATIENTS).cast(DataType::Float64)).alias(VALUE_PER_PATIENT),
            (col(TOTAL_CLAIM_PAID).cast(DataType::Float64)
                / col(TOTAL_CLAIM_AMOUNT).cast(DataType::Float64))
            .alias(CLAIM_COLLECTION_RATE),
        ])
        .collect()
}
