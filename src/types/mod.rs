//! Record and annotation types for the anomaly-detection engine

pub mod annotation;
pub mod transaction;

pub use annotation::DerivedFlags;
pub use transaction::{Transaction, TransactionType};
