//! Delimited-text writers for the annotated and high-risk tables

use crate::error::{DetectionError, Result};
use crate::report::{annotated_table, high_risk_table, Table};
use crate::store::RecordStore;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Rows written by `ReportWriter::write_files`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WrittenTables {
    pub full_rows: usize,
    pub high_risk_rows: usize,
}

/// Serializes report tables as delimited text
#[derive(Debug, Clone)]
pub struct ReportWriter {
    delimiter: u8,
}

impl ReportWriter {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Write a table with its header, returning the number of data rows
    pub fn write_table<W: Write>(&self, table: &Table, writer: W) -> Result<usize> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(writer);

        writer.write_record(&table.header)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(table.rows.len())
    }

    /// Write both output tables, creating parent directories as needed
    pub fn write_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        store: &RecordStore,
        full_path: P,
        high_risk_path: Q,
    ) -> Result<WrittenTables> {
        let full_rows = self.write_to_path(&annotated_table(store), full_path.as_ref())?;
        let high_risk_rows = self.write_to_path(&high_risk_table(store), high_risk_path.as_ref())?;

        info!(
            full_report = %full_path.as_ref().display(),
            high_risk_report = %high_risk_path.as_ref().display(),
            full_rows = full_rows,
            high_risk_rows = high_risk_rows,
            "Reports saved"
        );

        Ok(WrittenTables {
            full_rows,
            high_risk_rows,
        })
    }

    fn write_to_path(&self, table: &Table, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let rows = self.write_table(table, File::create(path)?)?;
        debug!(path = %path.display(), rows = rows, "Table written");
        Ok(rows)
    }
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self::new(b',')
    }
}

/// Consistency check of a pair of written output tables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputValidation {
    pub full_rows: usize,
    pub high_risk_rows: usize,
    /// Rows of the full table flagged `high_risk = true`
    pub flagged_in_full: usize,
    pub high_risk_percentage: f64,
    pub high_risk_mean_amount: Option<f64>,
    pub issues: Vec<String>,
}

impl OutputValidation {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Re-read both tables and check that they agree with each other
pub fn validate_outputs<P: AsRef<Path>, Q: AsRef<Path>>(
    full_path: P,
    high_risk_path: Q,
    delimiter: u8,
) -> Result<OutputValidation> {
    let full = read_table(File::open(full_path.as_ref())?, delimiter)?;
    let high = read_table(File::open(high_risk_path.as_ref())?, delimiter)?;
    validate_tables(&full, &high)
}

/// Check an in-memory pair of tables
pub fn validate_tables(full: &Table, high: &Table) -> Result<OutputValidation> {
    let full_flag = column_index(full, "high_risk")?;
    let high_flag = column_index(high, "high_risk")?;
    let high_amount = column_index(high, "amount")?;

    let mut issues = Vec::new();
    if full.header != high.header {
        issues.push("tables have different headers".to_string());
    }

    let flagged_in_full = full.rows.iter().filter(|r| r[full_flag] == "true").count();
    if flagged_in_full != high.rows.len() {
        issues.push(format!(
            "full table flags {} rows but high-risk table has {}",
            flagged_in_full,
            high.rows.len()
        ));
    }

    let not_flagged = high.rows.iter().filter(|r| r[high_flag] != "true").count();
    if not_flagged > 0 {
        issues.push(format!("{} high-risk rows are not flagged high_risk", not_flagged));
    }

    let amounts: Vec<f64> = high
        .rows
        .iter()
        .filter_map(|r| r[high_amount].parse::<f64>().ok())
        .collect();
    let high_risk_mean_amount = if amounts.is_empty() {
        None
    } else {
        Some(amounts.iter().sum::<f64>() / amounts.len() as f64)
    };

    let high_risk_percentage = if full.rows.is_empty() {
        0.0
    } else {
        high.rows.len() as f64 / full.rows.len() as f64 * 100.0
    };

    for issue in &issues {
        warn!(issue = %issue, "Output validation issue");
    }

    Ok(OutputValidation {
        full_rows: full.rows.len(),
        high_risk_rows: high.rows.len(),
        flagged_in_full,
        high_risk_percentage,
        high_risk_mean_amount,
        issues,
    })
}

/// Read a delimited table back into memory
pub fn read_table<R: Read>(reader: R, delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(reader);
    let header: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|r| r.map(|record| record.iter().map(String::from).collect()))
        .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;
    Ok(Table { header, rows })
}

fn column_index(table: &Table, name: &str) -> Result<usize> {
    table
        .header
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| DetectionError::Ingestion(format!("output table has no `{}` column", name)))
}
