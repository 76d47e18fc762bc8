//! Per-record derived fields written by the detectors and the aggregator

use serde::{Deserialize, Serialize};

/// Derived columns for one transaction.
///
/// Every field starts unset. `None` means "not evaluated" (the detector has
/// not run, or the record's value was excluded from statistics), which is
/// distinct from `Some(false)` ("evaluated and clean").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFlags {
    pub iqr_anomaly: Option<bool>,
    pub zscore_anomaly: Option<bool>,
    /// Absolute standardized deviation `|x - mean| / std`
    pub zscore_value: Option<f64>,
    pub high_amount_risk: Option<bool>,
    /// Number of contributing rules that fired (0..=3)
    pub risk_score: Option<u8>,
    pub high_risk: Option<bool>,
}

impl DerivedFlags {
    /// True only when the record was scored and flagged high-risk
    pub fn is_high_risk(&self) -> bool {
        self.high_risk == Some(true)
    }
}

/// Render an optional flag the way the output tables expect it
pub fn flag_cell(value: Option<bool>) -> String {
    match value {
        Some(true) => "true".to_string(),
        Some(false) => "false".to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unset() {
        let flags = DerivedFlags::default();
        assert_eq!(flags.iqr_anomaly, None);
        assert_eq!(flags.high_risk, None);
        assert!(!flags.is_high_risk());
    }

    #[test]
    fn test_flag_cell() {
        assert_eq!(flag_cell(Some(true)), "true");
        assert_eq!(flag_cell(Some(false)), "false");
        assert_eq!(flag_cell(None), "");
    }
}
