//! # Data Loading and Validation
//!
//! This module is the exclusive entry point for source data. It reads the
//! three tabular sources (clinical encounters, CRM referral records, claims
//! usage records) from CSV, validates each against a strict, predefined
//! schema, and hands the rest of the pipeline clean, typed relations.
//!
//! - Strict schema: column names are not configurable. Failures are assumed
//!   to be user-input errors, and `DataError` is written to give actionable
//!   feedback.
//! - Fail fast: a missing column, a mistyped column, or a null in a required
//!   column aborts the run before any partial processing happens.
//! - Value-domain oddities (a claim paid above the billed amount, a
//!   non-positive marketing cost) are data-quality anomalies, not schema
//!   violations. They are counted and logged at warn level and the rows are
//!   kept.

use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

// Shared join key of the integrated relations.
pub const PROVIDER_ID: &str = "provider_id";

// Encounter source columns.
pub const PATIENT_ID: &str = "patient_id";
pub const REFERRING_PROVIDER: &str = "referring_provider";
pub const SERVICE_LINE: &str = "service_line";
pub const ADMISSION_DATE: &str = "admission_date";
pub const DISCHARGE_DATE: &str = "discharge_date";
pub const LENGTH_OF_STAY: &str = "length_of_stay";
pub const SATISFACTION_SCORE: &str = "satisfaction_score";
pub const TREATMENT_COST: &str = "treatment_cost";

// Referral source columns.
pub const PIPELINE_STAGE: &str = "pipeline_stage";
pub const CONTACT_COUNT: &str = "contact_count";
pub const DEALS_VALUE: &str = "deals_value";
pub const OPPORTUNITY_VALUE: &str = "opportunity_value";
pub const MARKETING_COST: &str = "marketing_cost";

// Usage (claims) source columns.
pub const CLAIM_AMOUNT: &str = "claim_amount";
pub const CLAIM_PAID: &str = "claim_paid";
pub const CLAIM_STATUS: &str = "claim_status";

/// The categorical claim status counted by the denial-rate aggregate.
pub const DENIED_STATUS: &str = "Denied";

/// One clinical visit/admission per row, keyed by the referring provider.
#[derive(Debug, Clone)]
pub struct EncounterFrame {
    pub df: DataFrame,
}

/// One row per provider: CRM pipeline metrics and the opportunity value
/// used as the regression target. This relation is the left-join anchor.
#[derive(Debug, Clone)]
pub struct ReferralFrame {
    pub df: DataFrame,
}

/// One row per claim, keyed by provider.
#[derive(Debug, Clone)]
pub struct UsageFrame {
    pub df: DataFrame,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "the required column '{column}' was not found in the {relation} source; check spelling and case"
    )]
    ColumnNotFound {
        relation: &'static str,
        column: String,
    },
    #[error(
        "column '{column}' of the {relation} source could not be read as {expected} (found type: {found})"
    )]
    ColumnWrongType {
        relation: &'static str,
        column: String,
        expected: &'static str,
        found: String,
    },
    #[error(
        "missing or null values were found in required column '{column}' of the {relation} source"
    )]
    MissingValuesFound {
        relation: &'static str,
        column: String,
    },
    #[error(
        "non-finite values (NaN or infinity) were found in column '{column}' of the {relation} source"
    )]
    NonFiniteValuesFound {
        relation: &'static str,
        column: String,
    },
    #[error(
        "the referral source must contain exactly one row per provider, but '{0}' appears more than once"
    )]
    DuplicateProviderId(String),
    #[error("the {0} source contains no data rows")]
    EmptyRelation(&'static str),
}

/// Loads and validates the encounter source.
pub fn load_encounters(path: &Path) -> Result<EncounterFrame, DataError> {
    const RELATION: &str = "encounter";
    let df = read_csv(path)?;
    check_columns(
        &df,
        RELATION,
        &[
            PATIENT_ID,
            REFERRING_PROVIDER,
            SERVICE_LINE,
            ADMISSION_DATE,
            DISCHARGE_DATE,
            LENGTH_OF_STAY,
            SATISFACTION_SCORE,
            TREATMENT_COST,
        ],
    )?;

    extract_numeric_column(&df, RELATION, PATIENT_ID)?;
    extract_string_column(&df, RELATION, REFERRING_PROVIDER)?;
    extract_string_column(&df, RELATION, SERVICE_LINE)?;
    check_date_column(&df, RELATION, ADMISSION_DATE)?;
    check_date_column(&df, RELATION, DISCHARGE_DATE)?;
    let los = extract_numeric_column(&df, RELATION, LENGTH_OF_STAY)?;
    let satisfaction = extract_numeric_column(&df, RELATION, SATISFACTION_SCORE)?;
    let cost = extract_numeric_column(&df, RELATION, TREATMENT_COST)?;

    warn_on_anomalies(RELATION, LENGTH_OF_STAY, "negative", los.iter().filter(|&&v| v < 0.0).count());
    warn_on_anomalies(
        RELATION,
        SATISFACTION_SCORE,
        "outside [0, 100]",
        satisfaction.iter().filter(|&&v| !(0.0..=100.0).contains(&v)).count(),
    );
    warn_on_anomalies(RELATION, TREATMENT_COST, "non-positive", cost.iter().filter(|&&v| v <= 0.0).count());

    Ok(EncounterFrame { df })
}

/// Loads and validates the referral source, the one-row-per-provider anchor
/// of the integrated summary.
pub fn load_referrals(path: &Path) -> Result<ReferralFrame, DataError> {
    const RELATION: &str = "referral";
    let df = read_csv(path)?;
    check_columns(
        &df,
        RELATION,
        &[
            PROVIDER_ID,
            PIPELINE_STAGE,
            CONTACT_COUNT,
            DEALS_VALUE,
            OPPORTUNITY_VALUE,
            MARKETING_COST,
        ],
    )?;
    if df.height() == 0 {
        return Err(DataError::EmptyRelation(RELATION));
    }

    let providers = extract_string_column(&df, RELATION, PROVIDER_ID)?;
    let mut seen = HashSet::with_capacity(providers.len());
    for provider in &providers {
        if !seen.insert(provider.as_str()) {
            return Err(DataError::DuplicateProviderId(provider.clone()));
        }
    }

    extract_string_column(&df, RELATION, PIPELINE_STAGE)?;
    let contacts = extract_numeric_column(&df, RELATION, CONTACT_COUNT)?;
    extract_numeric_column(&df, RELATION, DEALS_VALUE)?;
    extract_numeric_column(&df, RELATION, OPPORTUNITY_VALUE)?;
    let marketing = extract_numeric_column(&df, RELATION, MARKETING_COST)?;

    warn_on_anomalies(RELATION, CONTACT_COUNT, "negative", contacts.iter().filter(|&&v| v < 0.0).count());
    // Zero marketing cost is deliberately NOT rejected: ROI computed from it
    // propagates a non-finite value, which downstream consumers must filter.
    warn_on_anomalies(RELATION, MARKETING_COST, "non-positive", marketing.iter().filter(|&&v| v <= 0.0).count());

    Ok(ReferralFrame { df })
}

/// Loads and validates the claims usage source.
pub fn load_claims(path: &Path) -> Result<UsageFrame, DataError> {
    const RELATION: &str = "claims";
    let df = read_csv(path)?;
    check_columns(
        &df,
        RELATION,
        &[PROVIDER_ID, CLAIM_AMOUNT, CLAIM_PAID, CLAIM_STATUS],
    )?;

    extract_string_column(&df, RELATION, PROVIDER_ID)?;
    let amount = extract_numeric_column(&df, RELATION, CLAIM_AMOUNT)?;
    let paid = extract_numeric_column(&df, RELATION, CLAIM_PAID)?;
    extract_string_column(&df, RELATION, CLAIM_STATUS)?;

    warn_on_anomalies(RELATION, CLAIM_AMOUNT, "non-positive", amount.iter().filter(|&&v| v <= 0.0).count());
    // 0 <= paid <= billed is expected but not guaranteed upstream.
    let overpaid = amount
        .iter()
        .zip(paid.iter())
        .filter(|(billed, p)| p > billed || **p < 0.0)
        .count();
    warn_on_anomalies(RELATION, CLAIM_PAID, "outside [0, claim_amount]", overpaid);

    Ok(UsageFrame { df })
}

fn read_csv(path: &Path) -> Result<DataFrame, DataError> {
    log::info!("loading data from '{}'", path.display());
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_try_parse_dates(true)),
        )
        .finish()?;
    Ok(df)
}

fn check_columns(df: &DataFrame, relation: &'static str, required: &[&str]) -> Result<(), DataError> {
    let present: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    for name in required {
        if !present.contains(*name) {
            return Err(DataError::ColumnNotFound {
                relation,
                column: (*name).to_string(),
            });
        }
    }
    Ok(())
}

fn warn_on_anomalies(relation: &'static str, column: &str, kind: &str, count: usize) {
    if count > 0 {
        log::warn!(
            "{count} row(s) of the {relation} source have {kind} values in '{column}'; \
             kept as data-quality anomalies"
        );
    }
}

/// Extracts a required numeric column as `f64`, rejecting nulls, mistyped
/// values and non-finite values.
pub fn extract_numeric_column(
    df: &DataFrame,
    relation: &'static str,
    name: &str,
) -> Result<Vec<f64>, DataError> {
    let column = df.column(name).map_err(|_| DataError::ColumnNotFound {
        relation,
        column: name.to_string(),
    })?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound {
            relation,
            column: name.to_string(),
        });
    }

    let casted = match column.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                relation,
                column: name.to_string(),
                expected: "f64 (numeric)",
                found: format!("{:?}", column.dtype()),
            });
        }
    };
    if casted.null_count() > 0 {
        return Err(DataError::ColumnWrongType {
            relation,
            column: name.to_string(),
            expected: "f64 (numeric)",
            found: format!("{:?}", column.dtype()),
        });
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound {
            relation,
            column: name.to_string(),
        });
    }
    Ok(values)
}

/// Extracts a numeric column that may contain nulls (columns produced by the
/// left join against the referral anchor). Nulls pass through as `None`.
pub fn extract_nullable_numeric_column(
    df: &DataFrame,
    relation: &'static str,
    name: &str,
) -> Result<Vec<Option<f64>>, DataError> {
    let column = df.column(name).map_err(|_| DataError::ColumnNotFound {
        relation,
        column: name.to_string(),
    })?;
    let casted = match column.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                relation,
                column: name.to_string(),
                expected: "f64 (numeric)",
                found: format!("{:?}", column.dtype()),
            });
        }
    };
    let chunked = casted.f64()?.rechunk();
    Ok((&chunked).into_iter().collect())
}

/// Extracts a required string column, rejecting nulls.
pub fn extract_string_column(
    df: &DataFrame,
    relation: &'static str,
    name: &str,
) -> Result<Vec<String>, DataError> {
    let column = df.column(name).map_err(|_| DataError::ColumnNotFound {
        relation,
        column: name.to_string(),
    })?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound {
            relation,
            column: name.to_string(),
        });
    }
    if !matches!(column.dtype(), DataType::String) {
        return Err(DataError::ColumnWrongType {
            relation,
            column: name.to_string(),
            expected: "string",
            found: format!("{:?}", column.dtype()),
        });
    }

    let chunked = column.str()?.rechunk();
    let mut values = Vec::with_capacity(df.height());
    for value in (&chunked).into_iter() {
        match value {
            Some(text) => values.push(text.to_string()),
            // Unreachable after the null check above, but kept total.
            None => {
                return Err(DataError::MissingValuesFound {
                    relation,
                    column: name.to_string(),
                });
            }
        }
    }
    Ok(values)
}

fn check_date_column(df: &DataFrame, relation: &'static str, name: &str) -> Result<(), DataError> {
    let column = df.column(name).map_err(|_| DataError::ColumnNotFound {
        relation,
        column: name.to_string(),
    })?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound {
            relation,
            column: name.to_string(),
        });
    }
    if !matches!(column.dtype(), DataType::Date) {
        return Err(DataError::ColumnWrongType {
            relation,
            column: name.to_string(),
            expected: "date (YYYY-MM-DD)",
            found: format!("{:?}", column.dtype()),
        });
    }
    Ok(())
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_csv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    const REFERRAL_HEADER: &str =
        "provider_id,pipeline_stage,contact_count,deals_value,opportunity_value,marketing_cost";

    fn referral_csv(rows: &[&str]) -> String {
        let mut lines = vec![REFERRAL_HEADER.to_string()];
        lines.extend(rows.iter().map(|r| r.to_string()));
        lines.join("\n")
    }

    #[test]
    fn referral_load_success() {
        let content = referral_csv(&[
            "Dr. Smith,Qualified,25,100000,80000,50000",
            "Dr. Jones,Proposal,40,200000,120000,40000",
        ]);
        let file = create_test_csv(&content).unwrap();
        let frame = load_referrals(file.path()).unwrap();
        assert_eq!(frame.df.height(), 2);
        let providers = extract_string_column(&frame.df, "referral", PROVIDER_ID).unwrap();
        assert_eq!(providers, vec!["Dr. Smith", "Dr. Jones"]);
    }

    #[test]
    fn referral_missing_column_rejected() {
        let content = "provider_id,pipeline_stage,contact_count,deals_value,marketing_cost\n\
                       Dr. Smith,Qualified,25,100000,50000";
        let file = create_test_csv(content).unwrap();
        let err = load_referrals(file.path()).unwrap_err();
        match err {
            DataError::ColumnNotFound { column, .. } => assert_eq!(column, OPPORTUNITY_VALUE),
            other => panic!("expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn referral_duplicate_provider_rejected() {
        let content = referral_csv(&[
            "Dr. Smith,Qualified,25,100000,80000,50000",
            "Dr. Smith,Proposal,40,200000,120000,40000",
        ]);
        let file = create_test_csv(&content).unwrap();
        let err = load_referrals(file.path()).unwrap_err();
        match err {
            DataError::DuplicateProviderId(id) => assert_eq!(id, "Dr. Smith"),
            other => panic!("expected DuplicateProviderId, got {other:?}"),
        }
    }

    #[test]
    fn referral_non_numeric_value_rejected() {
        let content = referral_csv(&[
            "Dr. Smith,Qualified,25,100000,80000,50000",
            "Dr. Jones,Proposal,lots,200000,120000,40000",
        ]);
        let file = create_test_csv(&content).unwrap();
        let err = load_referrals(file.path()).unwrap_err();
        match err {
            DataError::ColumnWrongType { column, .. } => assert_eq!(column, CONTACT_COUNT),
            other => panic!("expected ColumnWrongType, got {other:?}"),
        }
    }

    #[test]
    fn referral_null_value_rejected() {
        let content = referral_csv(&[
            "Dr. Smith,Qualified,25,100000,80000,50000",
            "Dr. Jones,Proposal,40,,120000,40000",
        ]);
        let file = create_test_csv(&content).unwrap();
        let err = load_referrals(file.path()).unwrap_err();
        match err {
            DataError::MissingValuesFound { column, .. } => assert_eq!(column, DEALS_VALUE),
            other => panic!("expected MissingValuesFound, got {other:?}"),
        }
    }

    #[test]
    fn referral_empty_relation_rejected() {
        let file = create_test_csv(REFERRAL_HEADER).unwrap();
        let err = load_referrals(file.path()).unwrap_err();
        assert!(matches!(err, DataError::EmptyRelation("referral")));
    }

    #[test]
    fn claims_paid_above_billed_is_kept() {
        // Anomalous but loadable: paid > billed is a data-quality warning.
        let content = "provider_id,claim_amount,claim_paid,claim_status\n\
                       Dr. Smith,1000.0,1500.0,Paid\n\
                       Dr. Smith,2000.0,1800.0,Denied";
        let file = create_test_csv(content).unwrap();
        let frame = load_claims(file.path()).unwrap();
        assert_eq!(frame.df.height(), 2);
    }

    #[test]
    fn encounters_load_and_validate_dates() {
        let content = "patient_id,referring_provider,service_line,admission_date,discharge_date,length_of_stay,satisfaction_score,treatment_cost\n\
                       1,Dr. Smith,Oncology,2025-01-01,2025-01-05,4,85.5,25000.0\n\
                       2,Dr. Jones,Cardiology,2025-02-10,2025-02-12,2,78.0,18000.0";
        let file = create_test_csv(content).unwrap();
        let frame = load_encounters(file.path()).unwrap();
        assert_eq!(frame.df.height(), 2);
        assert!(matches!(
            frame.df.column(ADMISSION_DATE).unwrap().dtype(),
            DataType::Date
        ));
    }

    #[test]
    fn encounters_malformed_date_rejected() {
        let content = "patient_id,referring_provider,service_line,admission_date,discharge_date,length_of_stay,satisfaction_score,treatment_cost\n\
                       1,Dr. Smith,Oncology,not-a-date,2025-01-05,4,85.5,25000.0";
        let file = create_test_csv(content).unwrap();
        let err = load_encounters(file.path()).unwrap_err();
        match err {
            DataError::ColumnWrongType { column, .. } => assert_eq!(column, ADMISSION_DATE),
            other => panic!("expected ColumnWrongType, got {other:?}"),
        }
    }

    #[test]
    fn nullable_extraction_preserves_nulls() {
        let df = df!(
            "x" => [Some(1.0_f64), None, Some(3.0)],
        )
        .unwrap();
        let values = extract_nullable_numeric_column(&df, "test", "x").unwrap();
        assert_eq!(values, vec![Some(1.0), None, Some(3.0)]);
    }
}
