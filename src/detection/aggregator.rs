//! Risk aggregation over the amount rule and both statistical detectors

use crate::detection::iqr::{IqrDetector, IqrOutcome, DEFAULT_IQR_MULTIPLIER};
use crate::detection::zscore::{ZScoreDetector, ZScoreOutcome, DEFAULT_ZSCORE_THRESHOLD};
use crate::error::{DetectionError, Result};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What to do when the z-score detector sees zero spread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Treat every evaluable record as not a z-score anomaly
    #[default]
    Skip,
    /// Fail the aggregation with `DegenerateDistribution`
    Abort,
}

/// Parameters for one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Column the statistical detectors read
    pub column: String,
    /// `high_amount_risk` fires when `amount > amount_threshold`
    pub amount_threshold: f64,
    pub iqr_multiplier: f64,
    pub zscore_threshold: f64,
    /// When false only the amount rule contributes to score and flag
    pub combine_methods: bool,
    pub degenerate_policy: DegeneratePolicy,
}

impl RiskParams {
    pub fn validate(&self) -> Result<()> {
        if self.column.trim().is_empty() {
            return Err(DetectionError::InvalidConfig(
                "target column must not be empty".to_string(),
            ));
        }
        if !self.amount_threshold.is_finite() {
            return Err(DetectionError::InvalidConfig(format!(
                "amount threshold must be finite, got {}",
                self.amount_threshold
            )));
        }
        for (name, value) in [
            ("iqr multiplier", self.iqr_multiplier),
            ("z-score threshold", self.zscore_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DetectionError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            column: "amount".to_string(),
            amount_threshold: 500.0,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            zscore_threshold: DEFAULT_ZSCORE_THRESHOLD,
            combine_methods: true,
            degenerate_policy: DegeneratePolicy::Skip,
        }
    }
}

/// Counts and detector details from one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskOutcome {
    pub params: RiskParams,
    pub iqr: IqrOutcome,
    /// `None` when the z-score detector was skipped as degenerate
    pub zscore: Option<ZScoreOutcome>,
    pub high_amount_count: usize,
    pub iqr_count: usize,
    pub zscore_count: usize,
    pub high_risk_count: usize,
    /// Records that received a risk score
    pub scored: usize,
}

/// Combines the amount rule with the IQR and z-score detectors into a
/// per-record `risk_score` and `high_risk` flag.
///
/// Both detectors are always re-run with this aggregator's parameters, so
/// flags left over from an earlier run with other parameters are never
/// reused.
#[derive(Debug, Clone)]
pub struct RiskAggregator {
    params: RiskParams,
}

impl RiskAggregator {
    pub fn new(params: RiskParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &RiskParams {
        &self.params
    }

    /// Score a single record from its rule outcomes.
    ///
    /// Returns `(risk_score, high_risk)`. In combined mode the score counts
    /// the rules that fired and the flag is their logical OR; otherwise
    /// only the amount rule counts.
    pub fn score(
        high_amount: bool,
        iqr_anomaly: bool,
        zscore_anomaly: bool,
        combine_methods: bool,
    ) -> (u8, bool) {
        Self::score_evaluated(
            [Some(high_amount), Some(iqr_anomaly), Some(zscore_anomaly)],
            combine_methods,
        )
        .unwrap_or((0, false))
    }

    /// Score from `[high_amount, iqr, zscore]` outcomes where `None` means
    /// the rule was not evaluated for the record.
    ///
    /// A rule that fired decides `high_risk` on its own, and the score then
    /// counts the evaluated rules that fired. With nothing fired and a
    /// contributing rule unevaluated the result is unknown (`None`).
    pub fn score_evaluated(rules: [Option<bool>; 3], combine_methods: bool) -> Option<(u8, bool)> {
        let contributing = if combine_methods { &rules[..] } else { &rules[..1] };
        let fired = contributing.iter().filter(|r| **r == Some(true)).count() as u8;
        let complete = contributing.iter().all(Option::is_some);

        (fired > 0 || complete).then_some((fired, fired > 0))
    }

    /// Run both detectors, then write `high_amount_risk`, `risk_score` and
    /// `high_risk` for every record.
    ///
    /// A record is left unscored only when none of its evaluated rules
    /// fired and a contributing rule could not be evaluated. Every derived
    /// flag is cleared first, so a failed run leaves no state from an
    /// earlier one.
    pub fn run(&self, store: &mut RecordStore) -> Result<RiskOutcome> {
        let params = &self.params;
        store.reset_annotations();

        // z-score first: an abort must happen before anything is written
        let zscore_detector = ZScoreDetector::new(params.column.as_str(), params.zscore_threshold);
        let zscore = match zscore_detector.run(store) {
            Ok(outcome) => Some(outcome),
            Err(DetectionError::DegenerateDistribution { column, mean })
                if params.degenerate_policy == DegeneratePolicy::Skip =>
            {
                warn!(
                    column = %column,
                    mean = mean,
                    "Zero standard deviation, z-score contribution skipped"
                );
                zscore_detector.mark_clean(store)?;
                None
            }
            Err(e) => return Err(e),
        };
        let iqr = IqrDetector::new(params.column.as_str(), params.iqr_multiplier).run(store)?;

        let mut outcome = RiskOutcome {
            params: params.clone(),
            iqr,
            zscore,
            high_amount_count: 0,
            iqr_count: 0,
            zscore_count: 0,
            high_risk_count: 0,
            scored: 0,
        };

        let amounts: Vec<Option<f64>> = store.records().iter().map(|r| r.amount).collect();
        for (flags, amount) in store.flags_mut().iter_mut().zip(amounts) {
            flags.high_amount_risk = amount.map(|a| a > params.amount_threshold);

            let rules = [flags.high_amount_risk, flags.iqr_anomaly, flags.zscore_anomaly];
            if let Some((risk_score, high_risk)) =
                Self::score_evaluated(rules, params.combine_methods)
            {
                flags.risk_score = Some(risk_score);
                flags.high_risk = Some(high_risk);
                outcome.scored += 1;
                if high_risk {
                    outcome.high_risk_count += 1;
                }
            }

            outcome.high_amount_count += (flags.high_amount_risk == Some(true)) as usize;
            outcome.iqr_count += (flags.iqr_anomaly == Some(true)) as usize;
            outcome.zscore_count += (flags.zscore_anomaly == Some(true)) as usize;
        }

        info!(
            amount_threshold = params.amount_threshold,
            combine_methods = params.combine_methods,
            high_amount = outcome.high_amount_count,
            iqr_anomalies = outcome.iqr_count,
            zscore_anomalies = outcome.zscore_count,
            high_risk = outcome.high_risk_count,
            scored = outcome.scored,
            "Risk aggregation complete"
        );

        Ok(outcome)
    }
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self {
            params: RiskParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::annotation::DerivedFlags;
    use crate::types::transaction::Transaction;
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

    fn params(amount_threshold: f64, combine_methods: bool) -> RiskParams {
        RiskParams {
            amount_threshold,
            combine_methods,
            ..RiskParams::default()
        }
    }

    #[test]
    fn test_amount_threshold_rule() {
        let mut store = store_with(&[100.0, 600.0, 50.0]);
        RiskAggregator::new(params(500.0, true))
            .unwrap()
            .run(&mut store)
            .unwrap();

        let high_amount: Vec<Option<bool>> =
            store.flags().iter().map(|f| f.high_amount_risk).collect();
        assert_eq!(high_amount, vec![Some(false), Some(true), Some(false)]);
    }

    #[test]
    fn test_score_function() {
        assert_eq!(RiskAggregator::score(true, true, true, true), (3, true));
        assert_eq!(RiskAggregator::score(false, true, false, true), (1, true));
        assert_eq!(RiskAggregator::score(false, false, false, true), (0, false));
        assert_eq!(RiskAggregator::score(true, true, false, false), (1, true));
        assert_eq!(RiskAggregator::score(false, true, true, false), (0, false));
    }

    #[test]
    fn test_combined_mode_is_logical_or() {
        let mut store = store_with(&[10.0, 12.0, 12.0, 13.0, 12.0, 14.0, 200.0, 600.0]);
        RiskAggregator::new(params(500.0, true))
            .unwrap()
            .run(&mut store)
            .unwrap();

        for flags in store.flags() {
            let h = flags.high_amount_risk.unwrap();
            let i = flags.iqr_anomaly.unwrap();
            let z = flags.zscore_anomaly.unwrap();
            assert_eq!(flags.high_risk, Some(h || i || z));
            assert_eq!(flags.risk_score, Some(h as u8 + i as u8 + z as u8));
        }
    }

    #[test]
    fn test_amount_only_mode_ignores_detectors() {
        let mut store = store_with(&[10.0, 12.0, 12.0, 13.0, 12.0, 14.0, 600.0]);
        let outcome = RiskAggregator::new(params(500.0, false))
            .unwrap()
            .run(&mut store)
            .unwrap();

        let last = &store.flags()[6];
        assert_eq!(last.high_amount_risk, Some(true));
        assert_eq!(last.iqr_anomaly, Some(true));
        assert_eq!(last.risk_score, Some(1));
        assert_eq!(last.high_risk, Some(true));

        for flags in store.flags() {
            assert_eq!(flags.high_risk, flags.high_amount_risk);
        }
        assert_eq!(outcome.high_risk_count, 1);
        assert_eq!(outcome.iqr_count, 1);
    }

    #[test]
    fn test_degenerate_skip_policy() {
        let mut store = store_with(&[20.0, 20.0, 20.0, 20.0]);
        let outcome = RiskAggregator::new(params(10.0, true))
            .unwrap()
            .run(&mut store)
            .unwrap();

        assert!(outcome.zscore.is_none());
        assert_eq!(outcome.zscore_count, 0);
        assert_eq!(outcome.high_risk_count, 4);
        assert!(store
            .flags()
            .iter()
            .all(|f| f.zscore_anomaly == Some(false) && f.risk_score == Some(1)));
    }

    #[test]
    fn test_degenerate_abort_policy() {
        let mut store = store_with(&[20.0, 20.0, 20.0]);
        let aggregator = RiskAggregator::new(RiskParams {
            degenerate_policy: DegeneratePolicy::Abort,
            ..RiskParams::default()
        })
        .unwrap();

        assert!(matches!(
            aggregator.run(&mut store),
            Err(DetectionError::DegenerateDistribution { .. })
        ));
        assert!(store.flags().iter().all(|f| f.high_risk.is_none()));
    }

    #[test]
    fn test_failed_run_leaves_no_earlier_state() {
        let mut store = store_with(&[20.0, 20.0, 20.0]);
        RiskAggregator::new(params(10.0, true))
            .unwrap()
            .run(&mut store)
            .unwrap();
        assert!(store.flags().iter().all(|f| f.high_risk == Some(true)));

        let strict = RiskAggregator::new(RiskParams {
            amount_threshold: 100.0,
            degenerate_policy: DegeneratePolicy::Abort,
            ..RiskParams::default()
        })
        .unwrap();
        assert!(strict.run(&mut store).is_err());
        assert!(store.flags().iter().all(|f| *f == DerivedFlags::default()));
    }

    #[test]
    fn test_partial_evaluation_scoring() {
        let score = RiskAggregator::score_evaluated;
        assert_eq!(score([Some(true), None, None], true), Some((1, true)));
        assert_eq!(score([Some(true), Some(true), None], true), Some((2, true)));
        assert_eq!(score([Some(false), None, Some(false)], true), None);
        assert_eq!(score([Some(false), Some(false), Some(false)], true), Some((0, false)));
        assert_eq!(score([Some(false), None, None], false), Some((0, false)));
        assert_eq!(score([None, Some(true), Some(true)], false), None);
    }

    #[test]
    fn test_high_amount_flagged_when_target_cell_unusable() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let fees = ["1", "2", "3", "4", "oops"];
        let records: Vec<Transaction> = fees
            .iter()
            .enumerate()
            .map(|(i, fee)| {
                let amount = if i == 4 { 10_000.0 } else { 50.0 };
                let mut tx = Transaction::new(format!("TXN_{}", i + 1), "USER_0001", amount, ts);
                tx.extra.push(("fee".to_string(), fee.to_string()));
                tx
            })
            .collect();
        let mut store = RecordStore::from_records(records).unwrap();

        let outcome = RiskAggregator::new(RiskParams {
            column: "fee".to_string(),
            ..RiskParams::default()
        })
        .unwrap()
        .run(&mut store)
        .unwrap();

        let (_, flags) = store.get("TXN_5").unwrap();
        assert_eq!(flags.iqr_anomaly, None);
        assert_eq!(flags.zscore_anomaly, None);
        assert_eq!(flags.high_amount_risk, Some(true));
        assert_eq!(flags.high_risk, Some(true));
        assert_eq!(flags.risk_score, Some(1));
        assert_eq!(outcome.high_risk_count, 1);
        assert_eq!(store.high_risk().count(), 1);
    }

    #[test]
    fn test_stale_flags_recomputed() {
        let mut store = store_with(&[10.0, 12.0, 12.0, 13.0, 12.0, 14.0, 16.0]);

        // a loose earlier run leaves 16.0 clean
        IqrDetector::new("amount", 3.0).run(&mut store).unwrap();
        assert_eq!(store.flags()[6].iqr_anomaly, Some(false));

        // the aggregator re-runs with its own multiplier instead of reusing it
        RiskAggregator::new(params(1000.0, true))
            .unwrap()
            .run(&mut store)
            .unwrap();
        assert_eq!(store.flags()[6].iqr_anomaly, Some(true));
        assert_eq!(store.flags()[6].high_risk, Some(true));
    }

    #[test]
    fn test_unevaluated_records_stay_unscored() {
        let mut store = store_with(&[10.0, 11.0, 12.0, 13.0]);
        let mut bad = Transaction::new("TXN_BAD", "USER_0001", 0.0, store.records()[0].timestamp);
        bad.amount = None;
        bad.amount_raw = Some("twelve".to_string());
        store.push(bad).unwrap();

        let outcome = RiskAggregator::default().run(&mut store).unwrap();
        let (_, flags) = store.get("TXN_BAD").unwrap();
        assert_eq!(flags.high_amount_risk, None);
        assert_eq!(flags.risk_score, None);
        assert_eq!(flags.high_risk, None);
        assert_eq!(outcome.scored, 4);
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(RiskAggregator::new(RiskParams {
            zscore_threshold: f64::NAN,
            ..RiskParams::default()
        })
        .is_err());
        assert!(RiskAggregator::new(RiskParams {
            column: " ".to_string(),
            ..RiskParams::default()
        })
        .is_err());
    }
}
