//! Statistical anomaly detectors and risk aggregation

pub mod aggregator;
pub mod iqr;
pub mod zscore;

pub use aggregator::{DegeneratePolicy, RiskAggregator, RiskOutcome, RiskParams};
pub use iqr::{IqrDetector, IqrOutcome};
pub use zscore::{ZScoreDetector, ZScoreOutcome};
