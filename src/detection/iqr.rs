//! Interquartile-range outlier detector

use crate::error::{DetectionError, Result};
use crate::stats::StatisticsSnapshot;
use crate::store::{NumericColumn, RecordStore};
use crate::types::transaction::Transaction;
use serde::Serialize;
use tracing::{debug, info};

/// Default IQR multiplier (Tukey's fences)
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Bounds and counts from one IQR pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IqrOutcome {
    pub multiplier: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Records that had a usable value
    pub evaluated: usize,
    pub flagged: usize,
    pub excluded: usize,
}

impl IqrOutcome {
    /// Strictly outside `[lower_bound, upper_bound]`
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower_bound || value > self.upper_bound
    }
}

/// Flags values outside `[Q1 - k*IQR, Q3 + k*IQR]`.
///
/// With IQR = 0 the fences collapse onto a single value and any deviation
/// from it is flagged.
#[derive(Debug, Clone)]
pub struct IqrDetector {
    column: String,
    multiplier: f64,
}

impl IqrDetector {
    pub fn new(column: impl Into<String>, multiplier: f64) -> Self {
        Self {
            column: column.into(),
            multiplier,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Compute bounds and counts for a column without touching the store
    pub fn evaluate(&self, column: &NumericColumn) -> Result<IqrOutcome> {
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(DetectionError::InvalidConfig(format!(
                "iqr multiplier must be a non-negative number, got {}",
                self.multiplier
            )));
        }

        let snapshot = StatisticsSnapshot::from_column(column)?;
        let lower_bound = snapshot.q1 - self.multiplier * snapshot.iqr;
        let upper_bound = snapshot.q3 + self.multiplier * snapshot.iqr;

        let mut outcome = IqrOutcome {
            multiplier: self.multiplier,
            q1: snapshot.q1,
            q3: snapshot.q3,
            iqr: snapshot.iqr,
            lower_bound,
            upper_bound,
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

    /// Run the detector and write `iqr_anomaly` for every record.
    ///
    /// Records without a usable value get `None`. Running twice with the
    /// same parameters over an unchanged store yields the same flags.
    pub fn run(&self, store: &mut RecordStore) -> Result<IqrOutcome> {
        let column = store.numeric_column(&self.column)?;
        let outcome = self.evaluate(&column)?;

        for (flags, value) in store.flags_mut().iter_mut().zip(column.values.iter()) {
            flags.iqr_anomaly = value.map(|v| outcome.is_outlier(v));
        }

        debug!(
            column = %self.column,
            q1 = outcome.q1,
            q3 = outcome.q3,
            iqr = outcome.iqr,
            "IQR quartiles computed"
        );
        info!(
            column = %self.column,
            lower_bound = outcome.lower_bound,
            upper_bound = outcome.upper_bound,
            flagged = outcome.flagged,
            evaluated = outcome.evaluated,
            excluded = outcome.excluded,
            "IQR anomaly detection complete"
        );

        Ok(outcome)
    }

    /// Flagged records ranked by column value, largest first
    pub fn top_anomalies<'a>(
        &self,
        store: &'a RecordStore,
        n: usize,
    ) -> Result<Vec<(&'a Transaction, f64)>> {
        let column = store.numeric_column(&self.column)?;
        let mut ranked: Vec<(&Transaction, f64)> = store
            .iter()
            .zip(column.values.iter())
            .filter(|((_, flags), _)| flags.iqr_anomaly == Some(true))
            .filter_map(|((record, _), value)| value.map(|v| (record, v)))
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        Ok(ranked)
    }
}

impl Default for IqrDetector {
    fn default() -> Self {
        Self::new("amount", DEFAULT_IQR_MULTIPLIER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store_with(amounts: &[f64]) -> RecordStore {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let records = amounts
            .iter()
            .enumerate()
            .map(|(i, &a)| Transaction::new(format!("TXN_{:06}", i + 1), "USER_0001", a, ts))
            .collect();
        RecordStore::from_records(records).unwrap()
    }

    fn iqr_flags(store: &RecordStore) -> Vec<Option<bool>> {
        store.flags().iter().map(|f| f.iqr_anomaly).collect()
    }

    #[test]
    fn test_reference_scenario() {
        let mut store = store_with(&[10.0, 12.0, 12.0, 13.0, 12.0, 14.0, 200.0]);
        let outcome = IqrDetector::default().run(&mut store).unwrap();

        assert!((outcome.q1 - 12.0).abs() < 1e-9);
        assert!((outcome.q3 - 13.5).abs() < 1e-9);
        assert!((outcome.iqr - 1.5).abs() < 1e-9);
        assert!((outcome.lower_bound - 9.75).abs() < 1e-9);
        assert!((outcome.upper_bound - 15.75).abs() < 1e-9);
        assert_eq!(outcome.flagged, 1);

        let mut expected = vec![Some(false); 6];
        expected.push(Some(true));
        assert_eq!(iqr_flags(&store), expected);
    }

    #[test]
    fn test_bound_values_not_flagged() {
        // q1 = 2, q3 = 4, iqr = 2, k = 1 -> bounds [0, 6]
        let column = NumericColumn::from_values(
            "amount",
            vec![Some(0.0), Some(2.0), Some(3.0), Some(4.0), Some(6.0)],
        );
        let outcome = IqrDetector::new("amount", 1.0).evaluate(&column).unwrap();
        assert_eq!(outcome.lower_bound, 0.0);
        assert_eq!(outcome.upper_bound, 6.0);
        assert_eq!(outcome.flagged, 0);
        assert!(!outcome.is_outlier(6.0));
        assert!(outcome.is_outlier(6.000001));
    }

    #[test]
    fn test_zero_iqr_flags_any_deviation() {
        let mut store = store_with(&[5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.01]);
        let outcome = IqrDetector::default().run(&mut store).unwrap();
        assert_eq!(outcome.iqr, 0.0);
        assert_eq!(outcome.lower_bound, 5.0);
        assert_eq!(outcome.upper_bound, 5.0);
        assert_eq!(outcome.flagged, 1);
        assert_eq!(store.flags()[6].iqr_anomaly, Some(true));
    }

    #[test]
    fn test_excluded_records_left_unset() {
        let mut store = store_with(&[1.0, 2.0, 3.0]);
        let mut missing = Transaction::new(
            "TXN_X",
            "USER_0002",
            0.0,
            store.records()[0].timestamp,
        );
        missing.amount = None;
        missing.amount_raw = Some("oops".to_string());
        store.push(missing).unwrap();

        let outcome = IqrDetector::default().run(&mut store).unwrap();
        assert_eq!(outcome.evaluated, 3);
        assert_eq!(outcome.excluded, 1);
        assert_eq!(store.flags()[3].iqr_anomaly, None);
    }

    #[test]
    fn test_idempotent_runs() {
        let mut store = store_with(&[10.0, 12.0, 12.0, 13.0, 12.0, 14.0, 200.0]);
        let detector = IqrDetector::default();
        let first = detector.run(&mut store).unwrap();
        let flags_first = iqr_flags(&store);
        let second = detector.run(&mut store).unwrap();

        assert_eq!(first, second);
        assert_eq!(flags_first, iqr_flags(&store));
    }

    #[test]
    fn test_negative_multiplier_rejected() {
        let mut store = store_with(&[1.0, 2.0]);
        let result = IqrDetector::new("amount", -1.0).run(&mut store);
        assert!(matches!(result, Err(DetectionError::InvalidConfig(_))));
    }

    #[test]
    fn test_top_anomalies_ordering() {
        let mut store = store_with(&[10.0, 11.0, 10.0, 12.0, 11.0, 500.0, 900.0, -300.0]);
        let detector = IqrDetector::default();
        detector.run(&mut store).unwrap();

        let top = detector.top_anomalies(&store, 2).unwrap();
        let values: Vec<f64> = top.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![900.0, 500.0]);
    }
}
