//! CSV ingestion into a record store

use crate::error::{DetectionError, Result};
use crate::store::{parse_numeric, RecordStore, BASE_COLUMNS};
use crate::types::transaction::{Transaction, TransactionType};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Columns every source must provide
pub const REQUIRED_COLUMNS: [&str; 4] = ["transaction_id", "user_id", "amount", "timestamp"];

/// Format used when writing timestamps back out
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Reads delimited transaction tables.
///
/// Missing required columns, duplicate ids, unparseable timestamps and
/// unknown transaction types abort the load. A non-numeric `amount` is
/// logged and the record kept with its amount unset, unless
/// `reject_non_numeric` is on.
#[derive(Debug, Clone)]
pub struct TransactionSource {
    delimiter: u8,
    reject_non_numeric: bool,
}

impl TransactionSource {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            reject_non_numeric: false,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn reject_non_numeric(mut self, reject: bool) -> Self {
        self.reject_non_numeric = reject;
        self
    }

    /// Load a table from a file
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<RecordStore> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DetectionError::Ingestion(format!("cannot open {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), "Loading transaction data");
        self.load_reader(file)
    }

    /// Load a table from any reader
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<RecordStore> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| DetectionError::Ingestion(format!("unreadable header: {}", e)))?
            .iter()
            .map(String::from)
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|required| !headers.iter().any(|h| h == required))
            .collect();
        if !missing.is_empty() {
            return Err(DetectionError::Ingestion(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        for header in &headers {
            if !columns.contains(header) {
                columns.push(header.clone());
            }
        }

        let mut records = Vec::new();
        let mut non_numeric = 0usize;
        for (row, result) in reader.records().enumerate() {
            // header is line 1
            let line = row + 2;
            let record = result
                .map_err(|e| DetectionError::Ingestion(format!("malformed row {}: {}", line, e)))?;
            let tx = self.parse_row(&headers, &record, line)?;
            if tx.amount.is_none() {
                non_numeric += 1;
            }
            records.push(tx);
        }

        let store = RecordStore::with_columns(columns, records)?;
        info!(
            transactions = store.len(),
            non_numeric_amounts = non_numeric,
            columns = ?store.source_columns(),
            "Transaction data loaded"
        );
        Ok(store)
    }

    fn parse_row(
        &self,
        headers: &[String],
        record: &csv::StringRecord,
        line: usize,
    ) -> Result<Transaction> {
        let cell = |name: &str| column_value(headers, record, name);
        let optional = |name: &str| {
            column_value(headers, record, name)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let transaction_id = optional("transaction_id").ok_or_else(|| {
            DetectionError::Ingestion(format!("row {}: empty transaction_id", line))
        })?;
        let user_id = cell("user_id").unwrap_or_default().to_string();

        let raw_timestamp = cell("timestamp").unwrap_or_default();
        let timestamp = parse_timestamp(raw_timestamp).ok_or_else(|| {
            DetectionError::Ingestion(format!(
                "row {}: unparseable timestamp `{}`",
                line, raw_timestamp
            ))
        })?;

        let raw_amount = cell("amount").unwrap_or_default();
        let amount = parse_numeric(raw_amount);
        if amount.is_none() {
            if self.reject_non_numeric {
                return Err(DetectionError::Ingestion(format!(
                    "row {}: non-numeric amount `{}`",
                    line, raw_amount
                )));
            }
            warn!(
                transaction_id = %transaction_id,
                value = %raw_amount,
                "Non-numeric amount, record excluded from statistics"
            );
        }

        let transaction_type = match optional("transaction_type") {
            Some(raw) => Some(raw.parse::<TransactionType>().map_err(|e| {
                DetectionError::Ingestion(format!("row {}: {}", line, e))
            })?),
            None => None,
        };

        let extra = headers
            .iter()
            .zip(record.iter())
            .filter(|(name, _)| !BASE_COLUMNS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();

        Ok(Transaction {
            transaction_id,
            user_id,
            amount,
            amount_raw: Some(raw_amount.to_string()),
            timestamp,
            merchant_category: optional("merchant_category"),
            location: optional("location"),
            transaction_type,
            extra,
        })
    }
}

impl Default for TransactionSource {
    fn default() -> Self {
        Self::new()
    }
}

fn column_value<'r>(headers: &[String], record: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|i| record.get(i))
}

/// Parse the timestamp layouts commonly produced by dataframe exports
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
