//! Error taxonomy for ingestion, statistics and detection.

use thiserror::Error;

/// Errors raised by the anomaly-detection engine.
///
/// Per-record anomalies are data, not errors: only conditions that stop a
/// stage from producing a result are represented here.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Source unreadable, malformed, or missing required columns.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// Target column has no usable numeric values.
    #[error("column `{column}` has no numeric values ({excluded} excluded)")]
    EmptyColumn { column: String, excluded: usize },

    /// Standard deviation is zero, so z-scores are undefined.
    #[error("column `{column}` has zero standard deviation (mean {mean})")]
    DegenerateDistribution { column: String, mean: f64 },

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, DetectionError>;
