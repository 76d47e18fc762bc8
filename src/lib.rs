//! Transaction Anomaly Detection Library
//!
//! Statistical outlier detection (IQR and Z-score) and rule-based risk
//! scoring over tabular transaction logs.

pub mod config;
pub mod detection;
pub mod error;
pub mod ingest;
pub mod output;
pub mod report;
pub mod stats;
pub mod store;
pub mod synthetic;
pub mod types;

pub use config::AppConfig;
pub use detection::{IqrDetector, RiskAggregator, RiskParams, ZScoreDetector};
pub use error::{DetectionError, Result};
pub use ingest::TransactionSource;
pub use output::ReportWriter;
pub use report::RiskReport;
pub use store::RecordStore;
pub use synthetic::SyntheticGenerator;
pub use types::{annotation::DerivedFlags, transaction::Transaction};
