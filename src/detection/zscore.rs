//! Z-score outlier detector

use crate::error::{DetectionError, Result};
use crate::stats::StatisticsSnapshot;
use crate::store::{NumericColumn, RecordStore};
use crate::types::transaction::Transaction;
use serde::Serialize;
use tracing::info;

/// Default z-score threshold
pub const DEFAULT_ZSCORE_THRESHOLD: f64 = 2.5;

/// Distribution parameters and counts from one z-score pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZScoreOutcome {
    pub threshold: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub evaluated: usize,
    pub flagged: usize,
    pub excluded: usize,
}

impl ZScoreOutcome {
    /// Absolute standardized deviation of `value`
    pub fn z(&self, value: f64) -> f64 {
        (value - self.mean).abs() / self.std_dev
    }

    /// Strictly above the threshold
    pub fn is_outlier(&self, value: f64) -> bool {
        self.z(value) > self.threshold
    }
}

/// Flags values whose distance from the mean exceeds `threshold` sample
/// standard deviations.
#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    column: String,
    threshold: f64,
}

impl ZScoreDetector {
    pub fn new(column: impl Into<String>, threshold: f64) -> Self {
        Self {
            column: column.into(),
            threshold,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compute the distribution and counts without touching the store.
    ///
    /// Fails with `DegenerateDistribution` when the standard deviation is
    /// zero, rather than producing infinite z-scores.
    pub fn evaluate(&self, column: &NumericColumn) -> Result<ZScoreOutcome> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(DetectionError::InvalidConfig(format!(
                "z-score threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }

        let snapshot = StatisticsSnapshot::from_column(column)?;
        if snapshot.std_dev <= 0.0 {
            return Err(DetectionError::DegenerateDistribution {
                column: column.name.clone(),
                mean: snapshot.mean,
            });
        }

        let mut outcome = ZScoreOutcome {
            threshold: self.threshold,
            mean: snapshot.mean,
            std_dev: snapshot.std_dev,
            evaluated: snapshot.count,
            flagged: 0,
            excluded: snapshot.excluded,
        };
        outcome.flagged = column
            .values
            .iter()
            .flatten()
            .filter(|&&v| outcome.is_outlier(v))
            .count();

        Ok(outcome)
    }

    /// Run the detector and write `zscore_value` and `zscore_anomaly`.
    ///
    /// On a degenerate distribution nothing is written and the error is
    /// returned to the caller.
    pub fn run(&self, store: &mut RecordStore) -> Result<ZScoreOutcome> {
        let column = store.numeric_column(&self.column)?;
        let outcome = self.evaluate(&column)?;

        for (flags, value) in store.flags_mut().iter_mut().zip(column.values.iter()) {
            flags.zscore_value = value.map(|v| outcome.z(v));
            flags.zscore_anomaly = value.map(|v| outcome.is_outlier(v));
        }

        info!(
            column = %self.column,
            mean = outcome.mean,
            std_dev = outcome.std_dev,
            threshold = outcome.threshold,
            flagged = outcome.flagged,
            evaluated = outcome.evaluated,
            "Z-score anomaly detection complete"
        );

        Ok(outcome)
    }

    /// Record every evaluable value as not anomalous, with no z-score.
    ///
    /// Used when a degenerate distribution is skipped instead of aborting.
    pub fn mark_clean(&self, store: &mut RecordStore) -> Result<usize> {
        let column = store.numeric_column(&self.column)?;
        for (flags, value) in store.flags_mut().iter_mut().zip(column.values.iter()) {
            flags.zscore_value = None;
            flags.zscore_anomaly = value.map(|_| false);
        }
        Ok(column.len() - column.excluded)
    }

    /// Flagged records ranked by z-score, largest first
    pub fn top_anomalies<'a>(
        &self,
        store: &'a RecordStore,
        n: usize,
    ) -> Result<Vec<(&'a Transaction, f64)>> {
        if !store.has_column(&self.column) {
            return Err(DetectionError::UnknownColumn(self.column.clone()));
        }
        let mut ranked: Vec<(&Transaction, f64)> = store
            .iter()
            .filter(|(_, flags)| flags.zscore_anomaly == Some(true))
            .filter_map(|(record, flags)| flags.zscore_value.map(|z| (record, z)))
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        Ok(ranked)
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self::new("amount", DEFAULT_ZSCORE_THRESHOLD)
    }
}
