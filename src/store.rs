//! # The Summary Store
//!
//! Read-only lookups over the persisted copy of the provider summary (the
//! `provider_summary` table of the workbook database written by the
//! exporter). Two operations: list every row, or fetch one provider by
//! exact id. An unknown id is a distinct [`StoreError::ProviderNotFound`]
//! outcome — never conflated with an empty list.

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use std::path::Path;
use thiserror::Error;

use crate::export::SUMMARY_TABLE;

/// One scored provider row as served to downstream consumers.
///
/// Aggregate and derived columns are optional: a provider absent from the
/// encounter or claims source has no aggregates, and a NaN ratio has no
/// SQLite representation and comes back as NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSummaryRecord {
    pub provider_id: String,
    pub pipeline_stage: String,
    pub contact_count: i64,
    pub deals_value: f64,
    pub marketing_cost: f64,
    pub opportunity_value: f64,
    pub total_patients: Option<i64>,
    pub avg_length_of_stay: Option<f64>,
    pub avg_satisfaction: Option<f64>,
    pub avg_cost: Option<f64>,
    pub total_claims: Option<i64>,
    pub total_claim_amount: Option<f64>,
    pub total_claim_paid: Option<f64>,
    pub denial_rate: Option<f64>,
    pub roi: Option<f64>,
    pub value_per_patient: Option<f64>,
    pub claim_collection_rate: Option<f64>,
    pub predicted_opportunity_value: f64,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("provider '{0}' was not found in the summary store")]
    ProviderNotFound(String),
}

const SELECT_COLUMNS: &str = "provider_id, pipeline_stage, contact_count, deals_value, \
     marketing_cost, opportunity_value, total_patients, avg_length_of_stay, avg_satisfaction, \
     avg_cost, total_claims, total_claim_amount, total_claim_paid, denial_rate, roi, \
     value_per_patient, claim_collection_rate, predicted_opportunity_value";

/// Read-only handle over a workbook database.
pub struct SummaryStore {
    conn: Connection,
}

impl SummaryStore {
    /// Opens an existing workbook database. The handle is strictly
    /// read-only; a missing file is an error rather than an implicitly
    /// created empty database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Every provider row, ordered by provider id. An empty result is a
    /// valid outcome (an empty summary), distinct from a failed lookup.
    pub fn list(&self) -> Result<Vec<ProviderSummaryRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM {SUMMARY_TABLE} ORDER BY provider_id"
        ))?;
        let rows = stmt.query_map([], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Fetches one provider by exact id.
    pub fn fetch(&self, provider_id: &str) -> Result<ProviderSummaryRecord, StoreError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM {SUMMARY_TABLE} WHERE provider_id = ?1"),
                params![provider_id],
                record_from_row,
            )
            .optional()?;
        record.ok_or_else(|| StoreError::ProviderNotFound(provider_id.to_string()))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ProviderSummaryRecord> {
    Ok(ProviderSummaryRecord {
        provider_id: row.get(0)?,
        pipeline_stage: row.get(1)?,
        contact_count: row.get(2)?,
        deals_value: row.get(3)?,
        marketing_cost: row.get(4)?,
        opportunity_value: row.get(5)?,
        total_patients: row.get(6)?,
        avg_length_of_stay: row.get(7)?,
        avg_satisfaction: row.get(8)?,
        avg_cost: row.get(9)?,
        total_claims: row.get(10)?,
        total_claim_amount: row.get(11)?,
        total_claim_paid: row.get(12)?,
        denial_rate: row.get(13)?,
        roi: row.get(14)?,
        value_per_patient: row.get(15)?,
        claim_collection_rate: row.get(16)?,
        predicted_opportunity_value: row.get(17)?,
    })
}
