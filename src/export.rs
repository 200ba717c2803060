//! # Export
//!
//! Serializes a completed run for downstream reporting tools:
//!
//! - the scored provider summary as a flat CSV, and
//! - a SQLite "workbook" holding the three raw relations plus the summary
//!   as four tables, the persisted copy the read API serves from.
//!
//! The workbook is rewritten from scratch on every run. Non-finite derived
//! ratios survive the CSV as-is; SQLite has no NaN representation, so a NaN
//! ratio lands in the workbook as NULL — one more reason consumers of these
//! columns must guard.

use crate::pipeline::RunArtifacts;
use itertools::Itertools;
use polars::prelude::*;
use rusqlite::{Connection, params_from_iter};
use std::fs::{self, File};
use std::path::Path;
use thiserror::Error;

pub const ENCOUNTERS_TABLE: &str = "encounters";
pub const REFERRALS_TABLE: &str = "referrals";
pub const CLAIMS_TABLE: &str = "claims";
pub const SUMMARY_TABLE: &str = "provider_summary";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Writes the summary relation to a flat, comma-delimited file.
pub fn export_summary_csv(summary: &DataFrame, path: &Path) -> Result<(), ExportError> {
    let mut df = summary.clone();
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    log::info!("wrote provider summary CSV to '{}'", path.display());
    Ok(())
}

/// Writes the four-relation workbook database.
pub fn export_workbook(artifacts: &RunArtifacts, path: &Path) -> Result<(), ExportError> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut conn = Connection::open(path)?;
    write_table(&mut conn, ENCOUNTERS_TABLE, &artifacts.encounters.df)?;
    write_table(&mut conn, REFERRALS_TABLE, &artifacts.referrals.df)?;
    write_table(&mut conn, CLAIMS_TABLE, &artifacts.claims.df)?;
    write_table(&mut conn, SUMMARY_TABLE, &artifacts.summary)?;
    log::info!("wrote workbook database to '{}'", path.display());
    Ok(())
}

fn write_table(conn: &mut Connection, name: &str, df: &DataFrame) -> Result<(), ExportError> {
    let declarations = df
        .get_columns()
        .iter()
        .map(|column| format!("\"{}\" {}", column.name(), sqlite_type(column.dtype())))
        .join(", ");
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS \"{name}\"; CREATE TABLE \"{name}\" ({declarations});"
    ))?;

    let placeholders = (1..=df.width()).map(|i| format!("?{i}")).join(", ");
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!("INSERT INTO \"{name}\" VALUES ({placeholders})"))?;
        for row in 0..df.height() {
            let mut values = Vec::with_capacity(df.width());
            for column in df.get_columns() {
                values.push(sqlite_value(column.get(row)?));
            }
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn sqlite_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "INTEGER",
        DataType::Float32 | DataType::Float64 => "REAL",
        _ => "TEXT",
    }
}

fn sqlite_value(value: AnyValue) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        AnyValue::Null => Sql::Null,
        AnyValue::Boolean(v) => Sql::Integer(v as i64),
        AnyValue::Int8(v) => Sql::Integer(v as i64),
        AnyValue::Int16(v) => Sql::Integer(v as i64),
        AnyValue::Int32(v) => Sql::Integer(v as i64),
        AnyValue::Int64(v) => Sql::Integer(v),
        AnyValue::UInt8(v) => Sql::Integer(v as i64),
        AnyValue::UInt16(v) => Sql::Integer(v as i64),
        AnyValue::UInt32(v) => Sql::Integer(v as i64),
        AnyValue::UInt64(v) => Sql::Integer(v as i64),
        AnyValue::Float32(v) => Sql::Real(v as f64),
        AnyValue::Float64(v) => Sql::Real(v),
        AnyValue::String(v) => Sql::Text(v.to_string()),
        AnyValue::StringOwned(v) => Sql::Text(v.to_string()),
        // Dates and anything else serialize through their display form.
        other => Sql::Text(other.to_string()),
    }
}
