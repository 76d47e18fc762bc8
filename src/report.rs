//! Summary reporting over an aggregated record store

use crate::ingest::TIMESTAMP_FORMAT;
use crate::stats::ColumnSummary;
use crate::store::{DatasetOverview, RecordStore, DERIVED_COLUMNS};
use crate::types::annotation::{flag_cell, DerivedFlags};
use crate::types::transaction::Transaction;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

/// Count and share of records flagged by one rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MethodCount {
    pub count: usize,
    /// Percentage of all records in the store
    pub percentage: f64,
}

impl MethodCount {
    fn new(count: usize, total: usize) -> Self {
        Self {
            count,
            percentage: percentage(count, total),
        }
    }
}

/// High-risk rate for one merchant category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRisk {
    pub category: String,
    pub total: usize,
    pub high_risk: usize,
    /// `high_risk / total * 100`
    pub risk_rate: f64,
    pub high_risk_mean_amount: Option<f64>,
    pub high_risk_max_amount: Option<f64>,
}

/// One row of the top-N high-risk listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTransaction {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: Option<f64>,
    pub merchant_category: Option<String>,
    pub risk_score: Option<u8>,
    pub high_amount_risk: Option<bool>,
    pub iqr_anomaly: Option<bool>,
    pub zscore_anomaly: Option<bool>,
}

impl RankedTransaction {
    fn new(record: &Transaction, flags: &DerivedFlags) -> Self {
        Self {
            transaction_id: record.transaction_id.clone(),
            user_id: record.user_id.clone(),
            amount: record.amount,
            merchant_category: record.merchant_category.clone(),
            risk_score: flags.risk_score,
            high_amount_risk: flags.high_amount_risk,
            iqr_anomaly: flags.iqr_anomaly,
            zscore_anomaly: flags.zscore_anomaly,
        }
    }
}

/// Summary of one detection run
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub overview: DatasetOverview,
    pub high_amount: MethodCount,
    pub iqr: MethodCount,
    pub zscore: MethodCount,
    pub combined: MethodCount,
    /// Number of records per risk score
    pub score_distribution: BTreeMap<u8, usize>,
    /// High-risk records by amount, largest first
    pub top_high_risk: Vec<RankedTransaction>,
    /// Sorted by category name
    pub category_rates: Vec<CategoryRisk>,
    /// High-risk records per calendar day
    pub daily_high_risk: BTreeMap<NaiveDate, usize>,
    pub high_risk_mean_amount: Option<f64>,
    pub high_risk_max_amount: Option<f64>,
    pub most_common_high_risk_category: Option<String>,
    /// 95th percentile of the target column
    pub monitoring_threshold: Option<f64>,
}

impl RiskReport {
    /// Build the report from flags already written by the aggregator
    pub fn build(store: &RecordStore, column: &str, top_n: usize) -> Self {
        let total = store.len();
        let count_where = |pred: fn(&DerivedFlags) -> bool| {
            store.flags().iter().filter(|f| pred(f)).count()
        };

        let high_risk: Vec<(&Transaction, &DerivedFlags)> = store.high_risk().collect();
        let high_risk_amounts: Vec<f64> = high_risk.iter().filter_map(|(r, _)| r.amount).collect();

        let mut score_distribution = BTreeMap::new();
        for score in store.flags().iter().filter_map(|f| f.risk_score) {
            *score_distribution.entry(score).or_insert(0) += 1;
        }

        let mut ranked = high_risk.clone();
        ranked.sort_by(|a, b| {
            let (x, y) = (
                a.0.amount.unwrap_or(f64::NEG_INFINITY),
                b.0.amount.unwrap_or(f64::NEG_INFINITY),
            );
            y.total_cmp(&x)
                .then_with(|| a.0.transaction_id.cmp(&b.0.transaction_id))
        });
        let top_high_risk = ranked
            .iter()
            .take(top_n)
            .map(|(r, f)| RankedTransaction::new(r, f))
            .collect();

        let mut daily_high_risk = BTreeMap::new();
        for (record, _) in &high_risk {
            *daily_high_risk.entry(record.timestamp.date()).or_insert(0) += 1;
        }

        let monitoring_threshold = match store.numeric_column(column) {
            Ok(col) => ColumnSummary::from_column(&col).ok().map(|s| s.p95),
            Err(_) => None,
        };

        let report = Self {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            overview: store.overview(),
            high_amount: MethodCount::new(count_where(|f| f.high_amount_risk == Some(true)), total),
            iqr: MethodCount::new(count_where(|f| f.iqr_anomaly == Some(true)), total),
            zscore: MethodCount::new(count_where(|f| f.zscore_anomaly == Some(true)), total),
            combined: MethodCount::new(high_risk.len(), total),
            score_distribution,
            top_high_risk,
            category_rates: category_rates(store),
            daily_high_risk,
            high_risk_mean_amount: mean_of(&high_risk_amounts),
            high_risk_max_amount: high_risk_amounts.iter().copied().reduce(f64::max),
            most_common_high_risk_category: most_common_category(&high_risk),
            monitoring_threshold,
        };

        info!(
            report_id = %report.report_id,
            high_risk = report.combined.count,
            categories = report.category_rates.len(),
            "Risk report built"
        );
        report
    }

    /// Log the report in a boxed layout, followed by recommendations
    pub fn log_summary(&self) {
        let o = &self.overview;
        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            ANOMALY DETECTION SUMMARY REPORT                  ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Transactions analyzed: {:>10}                            ║", o.total_transactions);
        info!("║ Unique users:          {:>10}                            ║", o.unique_users);
        if let (Some(first), Some(last)) = (o.first_timestamp, o.last_timestamp) {
            info!(
                "║ Date range: {} to {}                          ║",
                first.format("%Y-%m-%d"),
                last.format("%Y-%m-%d")
            );
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        for (label, m) in [
            ("High amount", &self.high_amount),
            ("IQR method", &self.iqr),
            ("Z-score method", &self.zscore),
            ("Combined high-risk", &self.combined),
        ] {
            info!("║ {:<20} {:>8} ({:>6.2}%)                        ║", label, m.count, m.percentage);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Score Distribution:                                     ║");
        for (score, count) in &self.score_distribution {
            info!("║   score {}: {:>8}                                          ║", score, count);
        }

        if !self.top_high_risk.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Top High-Risk Transactions:                                  ║");
            for row in &self.top_high_risk {
                info!(
                    "║   {:<12} {:<10} {:>12} {:<12} score={}",
                    row.transaction_id,
                    row.user_id,
                    row.amount.map(|a| format!("{:.2}", a)).unwrap_or_default(),
                    row.merchant_category.as_deref().unwrap_or("-"),
                    row.risk_score.unwrap_or(0)
                );
            }
        }

        if !self.category_rates.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Risk Rate by Merchant Category:                              ║");
            for c in &self.category_rates {
                info!(
                    "║   {:<14} {:>6}/{:<6} ({:>6.2}%)",
                    c.category, c.high_risk, c.total, c.risk_rate
                );
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        if let (Some(mean), Some(max)) = (self.high_risk_mean_amount, self.high_risk_max_amount) {
            info!(
                mean_amount = format!("{:.2}", mean),
                max_amount = format!("{:.2}", max),
                most_common_category = self.most_common_high_risk_category.as_deref().unwrap_or("-"),
                "High-risk transaction analysis"
            );
        }

        info!("Recommendations:");
        info!("  - Review all {} high-risk transactions manually", self.combined.count);
        if let Some(threshold) = self.monitoring_threshold {
            info!("  - Implement real-time monitoring for amounts > {:.2}", threshold);
        }
        info!("  - Consider additional verification for transactions with risk_score >= 2");
    }
}

/// An ephemeral table of string cells, ready for serialization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Every record with all source and derived columns
pub fn annotated_table(store: &RecordStore) -> Table {
    build_table(store, |_| true)
}

/// Only records flagged `high_risk = true`, same schema as the full table
pub fn high_risk_table(store: &RecordStore) -> Table {
    build_table(store, DerivedFlags::is_high_risk)
}

/// Source columns only, as a transaction log to be ingested
pub fn source_table(store: &RecordStore) -> Table {
    let columns = store.source_columns();
    Table {
        header: columns.to_vec(),
        rows: store
            .records()
            .iter()
            .map(|record| columns.iter().map(|c| source_cell(record, c)).collect())
            .collect(),
    }
}

fn build_table(store: &RecordStore, keep: impl Fn(&DerivedFlags) -> bool) -> Table {
    let columns = store.source_columns();
    let header: Vec<String> = columns
        .iter()
        .cloned()
        .chain(DERIVED_COLUMNS.iter().map(|c| c.to_string()))
        .collect();

    let rows: Vec<Vec<String>> = store
        .iter()
        .filter(|(_, flags)| keep(flags))
        .map(|(record, flags)| {
            columns
                .iter()
                .map(|c| source_cell(record, c))
                .chain([
                    flag_cell(flags.iqr_anomaly),
                    flag_cell(flags.zscore_anomaly),
                    flags.zscore_value.map(|z| z.to_string()).unwrap_or_default(),
                    flag_cell(flags.high_amount_risk),
                    flags.risk_score.map(|s| s.to_string()).unwrap_or_default(),
                    flag_cell(flags.high_risk),
                ])
                .collect::<Vec<String>>()
        })
        .collect();

    Table { header, rows }
}

fn source_cell(record: &Transaction, column: &str) -> String {
    match column {
        "transaction_id" => record.transaction_id.clone(),
        "user_id" => record.user_id.clone(),
        "amount" => record.amount_text(),
        "timestamp" => record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        "merchant_category" => record.merchant_category.clone().unwrap_or_default(),
        "location" => record.location.clone().unwrap_or_default(),
        "transaction_type" => record
            .transaction_type
            .map(|t| t.to_string())
            .unwrap_or_default(),
        other => record.extra_value(other).unwrap_or_default().to_string(),
    }
}

fn category_rates(store: &RecordStore) -> Vec<CategoryRisk> {
    let mut groups: BTreeMap<&str, (usize, Vec<f64>, usize)> = BTreeMap::new();
    for (record, flags) in store.iter() {
        let Some(category) = record.merchant_category.as_deref() else {
            continue;
        };
        let entry = groups.entry(category).or_insert((0, Vec::new(), 0));
        entry.0 += 1;
        if flags.is_high_risk() {
            entry.2 += 1;
            if let Some(amount) = record.amount {
                entry.1.push(amount);
            }
        }
    }

    groups
        .into_iter()
        .map(|(category, (total, amounts, high_risk))| CategoryRisk {
            category: category.to_string(),
            total,
            high_risk,
            risk_rate: percentage(high_risk, total),
            high_risk_mean_amount: mean_of(&amounts),
            high_risk_max_amount: amounts.iter().copied().reduce(f64::max),
        })
        .collect()
}

fn most_common_category(high_risk: &[(&Transaction, &DerivedFlags)]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (record, _) in high_risk {
        if let Some(category) = record.merchant_category.as_deref() {
            *counts.entry(category).or_insert(0) += 1;
        }
    }
    // ties go to the alphabetically first category
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(category, _)| category.to_string())
}

fn percentage(count: usize, total: usize) -> f64 {
    if total > 0 {
        count as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
