//! In-memory record store.
//!
//! Holds the ordered, immutable base records plus a parallel vector of
//! derived flags. Detectors and the aggregator only ever touch the flags.

use crate::error::{DetectionError, Result};
use crate::types::annotation::DerivedFlags;
use crate::types::transaction::Transaction;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Base columns in the order they are written out
pub const BASE_COLUMNS: [&str; 7] = [
    "transaction_id",
    "user_id",
    "amount",
    "timestamp",
    "merchant_category",
    "location",
    "transaction_type",
];

/// Derived columns appended to every output table
pub const DERIVED_COLUMNS: [&str; 6] = [
    "iqr_anomaly",
    "zscore_anomaly",
    "zscore_value",
    "high_amount_risk",
    "risk_score",
    "high_risk",
];

/// Values of one numeric column, aligned with the store's record order
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub name: String,
    /// `None` where the cell was missing or not numeric
    pub values: Vec<Option<f64>>,
    /// Number of cells that failed numeric coercion
    pub excluded: usize,
}

impl NumericColumn {
    pub fn from_values(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        let excluded = values.iter().filter(|v| v.is_none()).count();
        Self {
            name: name.into(),
            values,
            excluded,
        }
    }

    /// Usable values in record order
    pub fn present(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Dataset-level facts used by the exploration summary
#[derive(Debug, Clone, Serialize)]
pub struct DatasetOverview {
    pub total_transactions: usize,
    pub unique_users: usize,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
    pub transaction_types: Vec<String>,
}

/// Owner of the transaction table and its derived annotations
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Transaction>,
    flags: Vec<DerivedFlags>,
    index: HashMap<String, usize>,
    columns: Vec<String>,
}

impl RecordStore {
    /// Create an empty store with the base schema
    pub fn new() -> Self {
        Self {
            columns: BASE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Build a store from records, rejecting duplicate transaction ids
    pub fn from_records(records: Vec<Transaction>) -> Result<Self> {
        let mut store = Self::new();
        for record in records {
            store.push(record)?;
        }
        Ok(store)
    }

    /// Build a store that remembers the source header, including extra columns
    pub fn with_columns(columns: Vec<String>, records: Vec<Transaction>) -> Result<Self> {
        let mut store = Self {
            columns,
            ..Self::default()
        };
        for record in records {
            store.push(record)?;
        }
        Ok(store)
    }

    /// Append a record with unset derived flags
    pub fn push(&mut self, record: Transaction) -> Result<()> {
        if self.index.contains_key(&record.transaction_id) {
            return Err(DetectionError::Ingestion(format!(
                "duplicate transaction_id `{}`",
                record.transaction_id
            )));
        }
        for (name, _) in &record.extra {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.clone());
            }
        }
        self.index
            .insert(record.transaction_id.clone(), self.records.len());
        self.records.push(record);
        self.flags.push(DerivedFlags::default());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Transaction] {
        &self.records
    }

    pub fn flags(&self) -> &[DerivedFlags] {
        &self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut [DerivedFlags] {
        &mut self.flags
    }

    /// Records paired with their derived flags, in source order
    pub fn iter(&self) -> impl Iterator<Item = (&Transaction, &DerivedFlags)> {
        self.records.iter().zip(self.flags.iter())
    }

    pub fn get(&self, transaction_id: &str) -> Option<(&Transaction, &DerivedFlags)> {
        self.index
            .get(transaction_id)
            .map(|&i| (&self.records[i], &self.flags[i]))
    }

    /// Source columns in output order (base schema first, then extras)
    pub fn source_columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        name == "amount" || self.columns.iter().any(|c| c == name)
    }

    /// Extract a numeric column. Cells that fail coercion become `None`
    /// and are counted in `excluded`.
    pub fn numeric_column(&self, name: &str) -> Result<NumericColumn> {
        let values: Vec<Option<f64>> = match name {
            "amount" => self.records.iter().map(|r| r.amount).collect(),
            _ if self.has_column(name) => self
                .records
                .iter()
                .map(|r| r.extra_value(name).and_then(parse_numeric))
                .collect(),
            _ => return Err(DetectionError::UnknownColumn(name.to_string())),
        };
        Ok(NumericColumn::from_values(name, values))
    }

    /// Forget every derived flag
    pub fn reset_annotations(&mut self) {
        for flags in &mut self.flags {
            *flags = DerivedFlags::default();
        }
    }

    /// Records whose `high_risk` flag is set
    pub fn high_risk(&self) -> impl Iterator<Item = (&Transaction, &DerivedFlags)> {
        self.iter().filter(|(_, flags)| flags.is_high_risk())
    }

    pub fn overview(&self) -> DatasetOverview {
        let unique_users: HashSet<&str> = self.records.iter().map(|r| r.user_id.as_str()).collect();
        let transaction_types: BTreeSet<&str> = self
            .records
            .iter()
            .filter_map(|r| r.transaction_type.map(|t| t.as_str()))
            .collect();

        DatasetOverview {
            total_transactions: self.records.len(),
            unique_users: unique_users.len(),
            first_timestamp: self.records.iter().map(|r| r.timestamp).min(),
            last_timestamp: self.records.iter().map(|r| r.timestamp).max(),
            transaction_types: transaction_types.into_iter().map(String::from).collect(),
        }
    }
}

/// Parse a cell as a finite float
pub fn parse_numeric(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
