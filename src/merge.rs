//! # Provider-Level Merge
//!
//! Left-joins the referral relation (the anchor, one row per provider)
//! against each per-provider aggregate. A left join silently fans out rows
//! when the right side carries a duplicate key, so uniqueness is asserted
//! explicitly before every merge and a violation fails the run. Providers
//! without a match keep their row and receive null aggregate columns.

use crate::data::{DataError, PROVIDER_ID, ReferralFrame, extract_string_column};
use polars::prelude::*;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(
        "the {relation} aggregate has {rows} rows but only {keys} distinct provider ids; \
         merging it would silently fan out the summary"
    )]
    DuplicateProviderKey {
        relation: &'static str,
        rows: usize,
        keys: usize,
    },
}

/// Left-joins the referral anchor against the encounter and claims
/// aggregates on provider identity.
pub fn merge_provider_relations(
    referrals: &ReferralFrame,
    encounter_agg: &DataFrame,
    usage_agg: &DataFrame,
) -> Result<DataFrame, MergeError> {
    assert_unique_provider_keys("encounter", encounter_agg)?;
    assert_unique_provider_keys("claims", usage_agg)?;

    let merged = referrals
        .df
        .clone()
        .lazy()
        .join(
            encounter_agg.clone().lazy(),
            [col(PROVIDER_ID)],
            [col(PROVIDER_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .join(
            usage_agg.clone().lazy(),
            [col(PROVIDER_ID)],
            [col(PROVIDER_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    Ok(merged)
}

/// Fails fast when an aggregate carries a duplicate provider key.
pub fn assert_unique_provider_keys(
    relation: &'static str,
    aggregate: &DataFrame,
) -> Result<(), MergeError> {
    let keys = extract_string_column(aggregate, relation, PROVIDER_ID)?;
    let distinct: HashSet<&str> = keys.iter().map(String::as_str).collect();
    if distinct.len() != keys.len() {
        return Err(MergeError::DuplicateProviderKey {
            relation,
            rows: keys.len(),
            keys: distinct.len(),
        });
    }
    Ok(())
}
