//! Seeded synthetic transaction logs for demos and tests

use crate::types::transaction::{Transaction, TransactionType};
use chrono::{Duration, NaiveDateTime};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

const NORMAL_CATEGORIES: [&str; 5] = ["grocery", "gas", "restaurant", "retail", "online"];
const HIGH_AMOUNT_CATEGORIES: [&str; 3] = ["jewelry", "electronics", "luxury"];
const LOCATIONS: [&str; 5] = ["New York", "Los Angeles", "Chicago", "Houston", "Phoenix"];
const TRANSACTION_TYPES: [TransactionType; 3] = [
    TransactionType::Purchase,
    TransactionType::Withdrawal,
    TransactionType::Transfer,
];

const USER_COUNT: u32 = 200;
const WINDOW_DAYS: i64 = 30;
const NORMAL_MEAN: f64 = 150.0;
const NORMAL_STD_DEV: f64 = 75.0;

/// Kind of anomalous record injected into the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnomalyKind {
    HighAmount,
    UnusualTime,
    FrequentTransactions,
}

/// Transaction log generator with its own seeded RNG.
///
/// The same seed and reference time always produce the same log.
pub struct SyntheticGenerator {
    rng: StdRng,
    transaction_counter: u64,
}

impl SyntheticGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            transaction_counter: 0,
        }
    }

    /// Generate `count` transactions dated within 30 days before `reference`.
    ///
    /// Normal records come first, then `count / 20` anomalous ones.
    pub fn generate(&mut self, count: usize, reference: NaiveDateTime) -> Vec<Transaction> {
        // 5% anomalous
        let anomalous = count / 20;
        let normal = count - anomalous;

        let mut transactions = Vec::with_capacity(count);
        for _ in 0..normal {
            transactions.push(self.generate_normal(reference));
        }
        for _ in 0..anomalous {
            let kind = self.random_anomaly();
            let tx = match kind {
                AnomalyKind::HighAmount => self.generate_high_amount(reference),
                // same population as normal traffic
                AnomalyKind::UnusualTime | AnomalyKind::FrequentTransactions => {
                    self.generate_normal(reference)
                }
            };
            transactions.push(tx);
        }
        transactions
    }

    /// Generate a transaction from the everyday spending population
    fn generate_normal(&mut self, reference: NaiveDateTime) -> Transaction {
        let amount = round_cents(self.normal(NORMAL_MEAN, NORMAL_STD_DEV).abs());
        let transaction_type = TRANSACTION_TYPES[self.rng.gen_range(0..TRANSACTION_TYPES.len())];

        self.base(amount, reference)
            .with_merchant_category(self.random_choice(&NORMAL_CATEGORIES))
            .with_transaction_type(transaction_type)
    }

    /// Generate an unusually large purchase in a high-value category
    fn generate_high_amount(&mut self, reference: NaiveDateTime) -> Transaction {
        let amount = round_cents(self.rng.gen_range(2000.0..10000.0));

        self.base(amount, reference)
            .with_merchant_category(self.random_choice(&HIGH_AMOUNT_CATEGORIES))
            .with_transaction_type(TransactionType::Purchase)
    }

    fn base(&mut self, amount: f64, reference: NaiveDateTime) -> Transaction {
        self.transaction_counter += 1;
        let user = self.rng.gen_range(1..=USER_COUNT);
        let offset = self.rng.gen_range(0..=WINDOW_DAYS * 86_400);
        let location = self.random_choice(&LOCATIONS);

        Transaction::new(
            format!("TXN_{:06}", self.transaction_counter),
            format!("USER_{:04}", user),
            amount,
            reference - Duration::seconds(offset),
        )
        .with_location(location)
    }

    fn random_anomaly(&mut self) -> AnomalyKind {
        match self.rng.gen_range(0..3) {
            0 => AnomalyKind::HighAmount,
            1 => AnomalyKind::UnusualTime,
            _ => AnomalyKind::FrequentTransactions,
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }

    /// Draw from Normal(mean, std_dev)
    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        mean + std_dev * z
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 30)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_same_seed_same_output() {
        let a = SyntheticGenerator::new(42).generate(200, reference());
        let b = SyntheticGenerator::new(42).generate(200, reference());
        assert_eq!(a, b);

        let c = SyntheticGenerator::new(7).generate(200, reference());
        assert_ne!(a, c);
    }

    #[test]
    fn test_shape_of_generated_log() {
        let txs = SyntheticGenerator::new(42).generate(1000, reference());
        assert_eq!(txs.len(), 1000);
        assert_eq!(txs[0].transaction_id, "TXN_000001");
        assert_eq!(txs[999].transaction_id, "TXN_001000");

        let ids: HashSet<&str> = txs.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids.len(), 1000);

        let earliest = reference() - Duration::days(WINDOW_DAYS);
        for tx in &txs {
            let amount = tx.amount.unwrap();
            assert!(amount >= 0.0);
            assert_eq!(round_cents(amount), amount);
            assert!(tx.timestamp <= reference() && tx.timestamp >= earliest);
            let user: u32 = tx.user_id.trim_start_matches("USER_").parse().unwrap();
            assert!((1..=USER_COUNT).contains(&user));
            assert!(LOCATIONS.contains(&tx.location.as_deref().unwrap()));
        }
    }

    #[test]
    fn test_high_amounts_only_in_anomalous_tail() {
        let txs = SyntheticGenerator::new(3).generate(1000, reference());
        let (normal, anomalous) = txs.split_at(950);

        for tx in normal {
            let category = tx.merchant_category.as_deref().unwrap();
            assert!(NORMAL_CATEGORIES.contains(&category));
        }
        for tx in anomalous {
            let category = tx.merchant_category.as_deref().unwrap();
            if HIGH_AMOUNT_CATEGORIES.contains(&category) {
                let amount = tx.amount.unwrap();
                assert!((2000.0..=10000.0).contains(&amount));
                assert_eq!(tx.transaction_type, Some(TransactionType::Purchase));
            }
        }
    }

    #[test]
    fn test_normal_amounts_centered() {
        let txs = SyntheticGenerator::new(11).generate(2000, reference());
        let normal: Vec<f64> = txs[..1900].iter().filter_map(|t| t.amount).collect();
        let mean = normal.iter().sum::<f64>() / normal.len() as f64;
        // folded normal around 150 with sd 75 has mean close to 150
        assert!((mean - 150.0).abs() < 15.0, "mean was {}", mean);
    }

    #[test]
    fn test_small_counts() {
        assert!(SyntheticGenerator::new(1).generate(0, reference()).is_empty());
        let txs = SyntheticGenerator::new(1).generate(10, reference());
        assert_eq!(txs.len(), 10);
    }
}
