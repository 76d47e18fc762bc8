//! Descriptive statistics over numeric columns.
//!
//! Standard deviation is the sample estimator (divides by N-1) and quantiles
//! use linear interpolation between closest ranks.

use crate::error::{DetectionError, Result};
use crate::store::NumericColumn;
use serde::Serialize;

/// Point-in-time statistics for one column.
///
/// Not kept in sync with the store: recompute after the column changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    /// Number of values that took part
    pub count: usize,
    /// Number of cells excluded as non-numeric
    pub excluded: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
}

impl StatisticsSnapshot {
    /// Compute the snapshot for a column, skipping non-numeric cells
    pub fn from_column(column: &NumericColumn) -> Result<Self> {
        let values = column.present();
        let sorted = sorted_or_empty(&values, column)?;

        let q1 = interpolate(&sorted, 0.25);
        let q3 = interpolate(&sorted, 0.75);

        Ok(Self {
            count: values.len(),
            excluded: column.excluded,
            mean: mean(&values),
            std_dev: sample_std_dev(&values),
            q1,
            q3,
            iqr: q3 - q1,
        })
    }
}

/// Exploration summary of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub excluded: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub p95: f64,
    pub max: f64,
}

impl ColumnSummary {
    pub fn from_column(column: &NumericColumn) -> Result<Self> {
        let values = column.present();
        let sorted = sorted_or_empty(&values, column)?;

        Ok(Self {
            count: sorted.len(),
            excluded: column.excluded,
            mean: mean(&values),
            std_dev: sample_std_dev(&values),
            min: sorted[0],
            q1: interpolate(&sorted, 0.25),
            median: interpolate(&sorted, 0.5),
            q3: interpolate(&sorted, 0.75),
            p95: interpolate(&sorted, 0.95),
            max: sorted[sorted.len() - 1],
        })
    }
}

fn sorted_or_empty(values: &[f64], column: &NumericColumn) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(DetectionError::EmptyColumn {
            column: column.name.clone(),
            excluded: column.excluded,
        });
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(sorted)
}

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (N-1 denominator).
///
/// Fewer than two values carry no spread, so 0.0 is returned.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sq_diff: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sq_diff / (values.len() - 1) as f64).sqrt()
}

/// Quantile `q` in `[0, 1]` of an ascending slice, linearly interpolated
/// between the two closest ranks. `None` for an empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    Some(interpolate(sorted, q))
}

// sorted must be non-empty
fn interpolate(sorted: &[f64], q: f64) -> f64 {
    let q = q.clamp(0.0, 1.0);
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> NumericColumn {
        NumericColumn::from_values("amount", values.iter().map(|&v| Some(v)).collect())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_linear_quartiles() {
        let snapshot =
            StatisticsSnapshot::from_column(&column(&[10.0, 12.0, 12.0, 13.0, 12.0, 14.0, 200.0]))
                .unwrap();
        assert!(approx(snapshot.q1, 12.0));
        assert!(approx(snapshot.q3, 13.5));
        assert!(approx(snapshot.iqr, 1.5));
        assert_eq!(snapshot.count, 7);
    }

    #[test]
    fn test_sample_std_dev() {
        // mean 5, squared deviations sum to 32, 32 / 7
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(approx(mean(&values), 5.0));
        assert!(approx(sample_std_dev(&values), (32.0_f64 / 7.0).sqrt()));
        assert_eq!(sample_std_dev(&[3.0]), 0.0);
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(quantile(&sorted, 0.0).unwrap(), 1.0));
        assert!(approx(quantile(&sorted, 0.5).unwrap(), 2.5));
        assert!(approx(quantile(&sorted, 0.25).unwrap(), 1.75));
        assert!(approx(quantile(&sorted, 1.0).unwrap(), 4.0));
        assert!(approx(quantile(&[7.0], 0.75).unwrap(), 7.0));
    }

    #[test]
    fn test_quantile_of_empty_slice() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[], 0.0), None);
    }

    #[test]
    fn test_empty_column_error() {
        let col = NumericColumn::from_values("amount", vec![None, None]);
        match StatisticsSnapshot::from_column(&col) {
            Err(DetectionError::EmptyColumn { column, excluded }) => {
                assert_eq!(column, "amount");
                assert_eq!(excluded, 2);
            }
            other => panic!("expected EmptyColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_excluded_values_surface() {
        let col = NumericColumn::from_values("amount", vec![Some(1.0), None, Some(3.0)]);
        let snapshot = StatisticsSnapshot::from_column(&col).unwrap();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.excluded, 1);
        assert!(approx(snapshot.mean, 2.0));
    }

    #[test]
    fn test_column_summary() {
        let values: Vec<f64> = (1..=21).map(|v| v as f64).collect();
        let summary = ColumnSummary::from_column(&column(&values)).unwrap();
        assert!(approx(summary.min, 1.0));
        assert!(approx(summary.max, 21.0));
        assert!(approx(summary.median, 11.0));
        assert!(approx(summary.p95, 20.0));
    }
}
