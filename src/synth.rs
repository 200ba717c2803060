//! # Synthetic Source Data
//!
//! Generates the three CSV sources the pipeline ingests. Upstream systems
//! are simulated, not contacted: the output is deliberately simple but rich
//! enough to exercise every aggregation, join and modeling path.
//!
//! All randomness flows from one explicitly seeded `StdRng`; the seed is a
//! parameter, never ambient process state, so a given configuration always
//! regenerates byte-identical files.

use crate::data::{
    ADMISSION_DATE, CLAIM_AMOUNT, CLAIM_PAID, CLAIM_STATUS, CONTACT_COUNT, DEALS_VALUE,
    DISCHARGE_DATE, LENGTH_OF_STAY, MARKETING_COST, OPPORTUNITY_VALUE, PATIENT_ID, PIPELINE_STAGE,
    PROVIDER_ID, REFERRING_PROVIDER, SATISFACTION_SCORE, SERVICE_LINE, TREATMENT_COST,
};
use crate::pipeline::SourcePaths;
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::fs::{self, File};
use std::path::Path;
use thiserror::Error;

const PROVIDER_SURNAMES: [&str; 8] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis",
];

/// Service lines with their base treatment cost.
const SERVICE_LINES: [(&str, f64); 6] = [
    ("Oncology", 25000.0),
    ("Cardiology", 18000.0),
    ("Orthopedics", 22000.0),
    ("Surgery", 30000.0),
    ("Behavioral Health", 12000.0),
    ("Urology", 15000.0),
];

const PIPELINE_STAGES: [&str; 6] = [
    "Prospecting",
    "Qualified",
    "Proposal",
    "Negotiation",
    "Closed Won",
    "Closed Lost",
];

const DIAGNOSIS_CODES: [&str; 6] = ["I10", "E11", "M16", "C50", "J45", "K35"];
const PROCEDURE_CODES: [&str; 6] = ["99213", "93000", "27130", "47562", "99214", "52240"];

#[derive(Debug, Clone, Copy)]
pub struct SynthConfig {
    pub seed: u64,
    pub num_patients: usize,
    pub num_providers: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_patients: 2000,
            num_providers: 8,
        }
    }
}

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
}

/// Generates the three source CSVs into `out_dir` and returns their paths.
pub fn generate(config: &SynthConfig, out_dir: &Path) -> Result<SourcePaths, SynthError> {
    fs::create_dir_all(out_dir)?;
    let paths = SourcePaths::in_dir(out_dir);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let providers = provider_names(config.num_providers);
    let base_date = NaiveDate::from_ymd_opt(2025, 1, 1).expect("fixed base date is valid");

    let mut encounters = generate_encounters(config, &providers, base_date, &mut rng)?;
    write_csv(&mut encounters, &paths.encounters)?;

    let mut referrals = generate_referrals(&providers, &mut rng)?;
    write_csv(&mut referrals, &paths.referrals)?;

    let mut claims = generate_claims(config, &providers, base_date, &mut rng)?;
    write_csv(&mut claims, &paths.claims)?;

    log::info!(
        "generated {} encounters, {} referral providers, {} claims under '{}'",
        encounters.height(),
        referrals.height(),
        claims.height(),
        out_dir.display()
    );
    Ok(paths)
}

fn provider_names(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match PROVIDER_SURNAMES.get(i) {
            Some(surname) => format!("Dr. {surname}"),
            None => format!("Dr. Provider{:02}", i + 1),
        })
        .collect()
}

fn generate_encounters(
    config: &SynthConfig,
    providers: &[String],
    base_date: NaiveDate,
    rng: &mut StdRng,
) -> Result<DataFrame, SynthError> {
    let n = config.num_patients;
    let mut patient_ids = Vec::with_capacity(n);
    let mut referring = Vec::with_capacity(n);
    let mut service_lines = Vec::with_capacity(n);
    let mut admissions = Vec::with_capacity(n);
    let mut discharges = Vec::with_capacity(n);
    let mut lengths = Vec::with_capacity(n);
    let mut satisfactions = Vec::with_capacity(n);
    let mut costs = Vec::with_capacity(n);

    for patient in 1..=n {
        let (line, base_cost) = SERVICE_LINES[rng.gen_range(0..SERVICE_LINES.len())];
        let admission = base_date + Duration::days(rng.gen_range(0..365));
        let length_of_stay: i64 = rng.gen_range(1..15);
        let satisfaction =
            (80.0 + 10.0 * rng.sample::<f64, _>(StandardNormal)).clamp(50.0, 100.0);

        patient_ids.push(patient as i64);
        referring.push(providers[rng.gen_range(0..providers.len())].clone());
        service_lines.push(line.to_string());
        admissions.push(admission.format("%Y-%m-%d").to_string());
        discharges.push((admission + Duration::days(length_of_stay)).format("%Y-%m-%d").to_string());
        lengths.push(length_of_stay);
        satisfactions.push(satisfaction);
        costs.push(base_cost * rng.gen_range(0.8..1.2));
    }

    Ok(df!(
        PATIENT_ID => patient_ids,
        REFERRING_PROVIDER => referring,
        SERVICE_LINE => service_lines,
        ADMISSION_DATE => admissions,
        DISCHARGE_DATE => discharges,
        LENGTH_OF_STAY => lengths,
        SATISFACTION_SCORE => satisfactions,
        TREATMENT_COST => costs,
    )?)
}

fn generate_referrals(providers: &[String], rng: &mut StdRng) -> Result<DataFrame, SynthError> {
    let n = providers.len();
    let mut stages = Vec::with_capacity(n);
    let mut contacts = Vec::with_capacity(n);
    let mut deals = Vec::with_capacity(n);
    let mut opportunities = Vec::with_capacity(n);
    let mut marketing = Vec::with_capacity(n);

    for _ in providers {
        stages.push(PIPELINE_STAGES[rng.gen_range(0..PIPELINE_STAGES.len())].to_string());
        contacts.push(rng.gen_range(10i64..80));
        deals.push(rng.gen_range(100_000i64..600_000));
        opportunities.push(rng.gen_range(50_000i64..400_000));
        marketing.push(rng.gen_range(10_000i64..60_000));
    }

    Ok(df!(
        PROVIDER_ID => providers.to_vec(),
        PIPELINE_STAGE => stages,
        CONTACT_COUNT => contacts,
        DEALS_VALUE => deals,
        OPPORTUNITY_VALUE => opportunities,
        MARKETING_COST => marketing,
    )?)
}

fn generate_claims(
    config: &SynthConfig,
    providers: &[String],
    base_date: NaiveDate,
    rng: &mut StdRng,
) -> Result<DataFrame, SynthError> {
    let mut patient_ids = Vec::new();
    let mut visit_dates = Vec::new();
    let mut diagnoses = Vec::new();
    let mut procedures = Vec::new();
    let mut claim_providers = Vec::new();
    let mut amounts = Vec::new();
    let mut paids = Vec::new();
    let mut statuses = Vec::new();

    for patient in 1..=config.num_patients {
        let visits = rng.gen_range(1..4);
        for _ in 0..visits {
            let visit = base_date + Duration::days(rng.gen_range(0..365));
            let amount = rng.gen_range(5_000.0..30_000.0);
            let roll: f64 = rng.r#gen();
            let status = if roll < 0.8 {
                "Paid"
            } else if roll < 0.9 {
                "Denied"
            } else {
                "Pending"
            };

            patient_ids.push(patient as i64);
            visit_dates.push(visit.format("%Y-%m-%d").to_string());
            diagnoses.push(DIAGNOSIS_CODES[rng.gen_range(0..DIAGNOSIS_CODES.len())].to_string());
            procedures.push(PROCEDURE_CODES[rng.gen_range(0..PROCEDURE_CODES.len())].to_string());
            claim_providers.push(providers[rng.gen_range(0..providers.len())].clone());
            amounts.push(amount);
            paids.push(amount * rng.gen_range(0.6..1.0));
            statuses.push(status.to_string());
        }
    }

    Ok(df!(
        PATIENT_ID => patient_ids,
        "visit_date" => visit_dates,
        "diagnosis_code" => diagnoses,
        "procedure_code" => procedures,
        PROVIDER_ID => claim_providers,
        CLAIM_AMOUNT => amounts,
        CLAIM_PAID => paids,
        CLAIM_STATUS => statuses,
    )?)
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), SynthError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{load_claims, load_encounters, load_referrals};
    use tempfile::tempdir;

    fn small_config(seed: u64) -> SynthConfig {
        SynthConfig {
            seed,
            num_patients: 50,
            num_providers: 6,
        }
    }

    #[test]
    fn generated_sources_pass_schema_validation() {
        let dir = tempdir().unwrap();
        let paths = generate(&small_config(42), dir.path()).unwrap();

        let encounters = load_encounters(&paths.encounters).unwrap();
        assert_eq!(encounters.df.height(), 50);
        let referrals = load_referrals(&paths.referrals).unwrap();
        assert_eq!(referrals.df.height(), 6);
        let claims = load_claims(&paths.claims).unwrap();
        assert!(claims.df.height() >= 50);
    }

    #[test]
    fn same_seed_regenerates_identical_files() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        generate(&small_config(7), dir_a.path()).unwrap();
        generate(&small_config(7), dir_b.path()).unwrap();

        for name in ["encounters.csv", "referrals.csv", "claims.csv"] {
            let a = std::fs::read(dir_a.path().join(name)).unwrap();
            let b = std::fs::read(dir_b.path().join(name)).unwrap();
            assert_eq!(a, b, "{name} differs between identically seeded runs");
        }
    }

    #[test]
    fn different_seeds_produce_different_data() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        generate(&small_config(1), dir_a.path()).unwrap();
        generate(&small_config(2), dir_b.path()).unwrap();
        let a = std::fs::read(dir_a.path().join("referrals.csv")).unwrap();
        let b = std::fs::read(dir_b.path().join("referrals.csv")).unwrap();
        assert_ne!(a, b);
    }
}
