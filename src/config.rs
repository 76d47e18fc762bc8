//! Configuration management for the anomaly-detection engine

use crate::detection::aggregator::{DegeneratePolicy, RiskParams};
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub input: InputConfig,
    pub detection: DetectionConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Transaction source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Path of the transaction CSV
    pub path: String,
    /// Treat a non-numeric amount as a load failure instead of a warning
    #[serde(default)]
    pub reject_non_numeric: bool,
    /// Field delimiter of the source table
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

/// Detector and aggregator parameters
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Numeric column the statistical detectors read
    #[serde(default = "default_column")]
    pub column: String,
    /// IQR multiplier `k`
    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,
    /// Z-score threshold `t`
    #[serde(default = "default_zscore_threshold")]
    pub zscore_threshold: f64,
    /// Direct amount threshold for `high_amount_risk`
    pub amount_threshold: f64,
    /// Combine all three rules (true) or use the amount rule alone
    #[serde(default = "default_combine_methods")]
    pub combine_methods: bool,
    /// Handling of a zero standard deviation: "skip" or "abort"
    #[serde(default)]
    pub degenerate_policy: DegeneratePolicy,
    /// Number of high-risk records listed in the report
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

/// Output table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Full annotated table
    pub report_path: String,
    /// High-risk subset
    pub high_risk_path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

fn default_delimiter() -> char {
    ','
}

fn default_column() -> String {
    "amount".to_string()
}

fn default_iqr_multiplier() -> f64 {
    1.5
}

fn default_zscore_threshold() -> f64 {
    2.5
}

fn default_combine_methods() -> bool {
    true
}

fn default_top_n() -> usize {
    15
}

impl AppConfig {
    /// Load configuration from the default file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path.
    ///
    /// Values can be overridden with `ANOMALY__SECTION__KEY` variables,
    /// e.g. `ANOMALY__DETECTION__AMOUNT_THRESHOLD=1000`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("ANOMALY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the detectors cannot work with
    pub fn validate(&self) -> Result<()> {
        self.detection
            .risk_params()
            .validate()
            .context("Invalid detection configuration")?;
        if self.detection.top_n == 0 {
            bail!("detection.top_n must be at least 1");
        }
        for (name, delimiter) in [
            ("input.delimiter", self.input.delimiter),
            ("output.delimiter", self.output.delimiter),
        ] {
            if !delimiter.is_ascii() || delimiter == '"' || delimiter == '\n' {
                bail!("{} must be a single ASCII separator, got {:?}", name, delimiter);
            }
        }
        Ok(())
    }
}

impl DetectionConfig {
    /// Parameters for the risk aggregator
    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            column: self.column.clone(),
            amount_threshold: self.amount_threshold,
            iqr_multiplier: self.iqr_multiplier,
            zscore_threshold: self.zscore_threshold,
            combine_methods: self.combine_methods,
            degenerate_policy: self.degenerate_policy,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                path: "transaction_logs.csv".to_string(),
                reject_non_numeric: false,
                delimiter: default_delimiter(),
            },
            detection: DetectionConfig {
                column: default_column(),
                iqr_multiplier: default_iqr_multiplier(),
                zscore_threshold: default_zscore_threshold(),
                amount_threshold: 500.0,
                combine_methods: default_combine_methods(),
                degenerate_policy: DegeneratePolicy::Skip,
                top_n: default_top_n(),
            },
            output: OutputConfig {
                report_path: "anomaly_detection_report.csv".to_string(),
                high_risk_path: "high_risk_transactions.csv".to_string(),
                delimiter: default_delimiter(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
