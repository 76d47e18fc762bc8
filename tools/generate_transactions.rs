//! Synthetic Transaction Generator
//!
//! Writes a seeded sample transaction log for exercising the anomaly engine.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;
use tracing::info;
use transaction_anomaly_engine::{
    ingest::parse_timestamp, report::source_table, RecordStore, ReportWriter, SyntheticGenerator,
};

#[derive(Debug, Parser)]
#[command(
    name = "generate-transactions",
    about = "Generate a synthetic transaction log"
)]
struct Args {
    #[arg(long, default_value_t = 1000, help = "Number of transactions")]
    count: usize,

    #[arg(long, default_value_t = 42, help = "RNG seed")]
    seed: u64,

    #[arg(long, default_value = "transaction_logs.csv", help = "Output CSV path")]
    output: PathBuf,

    #[arg(long, help = "Latest possible timestamp, defaults to now (UTC)")]
    reference: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_transactions=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let reference = match &args.reference {
        Some(raw) => parse_timestamp(raw)
            .with_context(|| format!("Unparseable reference time `{}`", raw))?,
        None => Utc::now().naive_utc(),
    };

    info!(
        count = args.count,
        seed = args.seed,
        reference = %reference,
        output = %args.output.display(),
        "Generating transaction data"
    );

    let transactions = SyntheticGenerator::new(args.seed).generate(args.count, reference);

    let high_amount = transactions
        .iter()
        .filter(|t| t.amount.is_some_and(|a| a >= 2000.0))
        .count();
    let store = RecordStore::from_records(transactions)?;

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let written = ReportWriter::default().write_table(&source_table(&store), file)?;

    info!(
        generated = written,
        high_amount = high_amount,
        "Completed! Transaction log saved"
    );

    Ok(())
}
