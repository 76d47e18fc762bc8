//! Transaction Anomaly Engine - Main Entry Point
//!
//! Loads a transaction log, flags statistical outliers, scores risk and
//! writes the annotated and high-risk tables.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transaction_anomaly_engine::{
    config::{AppConfig, LoggingConfig},
    detection::{IqrDetector, RiskAggregator, ZScoreDetector},
    ingest::TransactionSource,
    output::{validate_outputs, ReportWriter},
    report::RiskReport,
    stats::ColumnSummary,
};

/// Number of records listed per detector in the run log
const DETECTOR_LISTING: usize = 10;

#[derive(Debug, Parser)]
#[command(
    name = "anomaly-engine",
    about = "Flag anomalous transactions and score their risk",
    after_help = "Examples:\n  anomaly-engine --input transaction_logs.csv\n  anomaly-engine --amount-threshold 1000 --output-dir out --json"
)]
struct Args {
    #[arg(long, default_value = "config/config.toml", help = "Configuration file")]
    config: PathBuf,

    #[arg(long, help = "Transaction log to analyze (overrides input.path)")]
    input: Option<String>,

    #[arg(long, help = "Directory for both output tables")]
    output_dir: Option<PathBuf>,

    #[arg(long, help = "Amount above which a transaction is high-amount risk")]
    amount_threshold: Option<f64>,

    #[arg(long, help = "IQR fence multiplier")]
    iqr_multiplier: Option<f64>,

    #[arg(long, help = "Absolute z-score threshold")]
    zscore_threshold: Option<f64>,

    #[arg(long, help = "Score on the amount rule alone")]
    amount_only: bool,

    #[arg(long, help = "High-risk transactions listed in the summary")]
    top_n: Option<usize>,

    #[arg(long, help = "Print the summary report as JSON on stdout")]
    json: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input.path = input.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.report_path = relocate(dir, &config.output.report_path);
            config.output.high_risk_path = relocate(dir, &config.output.high_risk_path);
        }
        if let Some(threshold) = self.amount_threshold {
            config.detection.amount_threshold = threshold;
        }
        if let Some(k) = self.iqr_multiplier {
            config.detection.iqr_multiplier = k;
        }
        if let Some(t) = self.zscore_threshold {
            config.detection.zscore_threshold = t;
        }
        if self.amount_only {
            config.detection.combine_methods = false;
        }
        if let Some(n) = self.top_n {
            config.detection.top_n = n;
        }
    }
}

fn relocate(dir: &Path, path: &str) -> String {
    let name = Path::new(path)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(path));
    dir.join(name).to_string_lossy().into_owned()
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("transaction_anomaly_engine={}", logging.level).parse()?)
        .add_directive(format!("anomaly_engine={}", logging.level).parse()?);

    // stdout is reserved for --json
    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = if args.config.exists() {
        AppConfig::load_from_path(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else {
        AppConfig::default()
    };
    args.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging)?;
    info!("Starting Transaction Anomaly Engine");
    if !args.config.exists() {
        warn!(path = %args.config.display(), "Configuration file not found, using defaults");
    }

    let detection = &config.detection;
    info!(
        column = %detection.column,
        iqr_multiplier = detection.iqr_multiplier,
        zscore_threshold = detection.zscore_threshold,
        amount_threshold = detection.amount_threshold,
        combine_methods = detection.combine_methods,
        degenerate_policy = ?detection.degenerate_policy,
        "Configuration loaded"
    );

    // Load
    let mut store = TransactionSource::new()
        .with_delimiter(config.input.delimiter as u8)
        .reject_non_numeric(config.input.reject_non_numeric)
        .load_path(&config.input.path)
        .with_context(|| format!("Failed to load transactions from {}", config.input.path))?;

    // Explore
    let overview = store.overview();
    info!(
        transactions = overview.total_transactions,
        unique_users = overview.unique_users,
        first = ?overview.first_timestamp,
        last = ?overview.last_timestamp,
        transaction_types = ?overview.transaction_types,
        "Dataset overview"
    );
    let column = store.numeric_column(&detection.column)?;
    let summary = ColumnSummary::from_column(&column)
        .with_context(|| format!("No usable values in column `{}`", detection.column))?;
    info!(
        count = summary.count,
        excluded = summary.excluded,
        mean = format!("{:.2}", summary.mean),
        median = format!("{:.2}", summary.median),
        std_dev = format!("{:.2}", summary.std_dev),
        min = format!("{:.2}", summary.min),
        max = format!("{:.2}", summary.max),
        p95 = format!("{:.2}", summary.p95),
        "Column statistics"
    );

    // Detect and score
    let params = detection.risk_params();
    let aggregator = RiskAggregator::new(params.clone())?;
    let outcome = aggregator.run(&mut store).context("Risk aggregation failed")?;

    let iqr = IqrDetector::new(&params.column, params.iqr_multiplier);
    for (record, value) in iqr.top_anomalies(&store, DETECTOR_LISTING)? {
        info!(
            transaction_id = %record.transaction_id,
            user_id = %record.user_id,
            value = value,
            merchant_category = record.merchant_category.as_deref().unwrap_or("-"),
            "IQR anomaly"
        );
    }
    let zscore = ZScoreDetector::new(&params.column, params.zscore_threshold);
    for (record, z) in zscore.top_anomalies(&store, DETECTOR_LISTING)? {
        info!(
            transaction_id = %record.transaction_id,
            amount = ?record.amount,
            zscore = format!("{:.3}", z),
            "Z-score anomaly"
        );
    }
    info!(
        high_amount = outcome.high_amount_count,
        iqr = outcome.iqr_count,
        zscore = outcome.zscore_count,
        high_risk = outcome.high_risk_count,
        scored = outcome.scored,
        "Risk scoring complete"
    );

    // Report
    let report = RiskReport::build(&store, &detection.column, detection.top_n);
    report.log_summary();

    let delimiter = config.output.delimiter as u8;
    ReportWriter::new(delimiter)
        .write_files(
            &store,
            &config.output.report_path,
            &config.output.high_risk_path,
        )
        .context("Failed to write output tables")?;

    let validation = validate_outputs(
        &config.output.report_path,
        &config.output.high_risk_path,
        delimiter,
    )
    .context("Failed to re-read output tables")?;
    info!(
        full_rows = validation.full_rows,
        high_risk_rows = validation.high_risk_rows,
        high_risk_percentage = format!("{:.2}", validation.high_risk_percentage),
        "Output validation complete"
    );
    if !validation.is_consistent() {
        bail!("Output tables are inconsistent: {}", validation.issues.join("; "));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    info!("Anomaly detection complete");
    Ok(())
}
