//! Transaction record as ingested from a tabular source

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of money movement a transaction represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "purchase" => Ok(TransactionType::Purchase),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("unknown transaction type `{}`", other)),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transaction to be scored.
///
/// Base columns are immutable once ingested. Derived flags live alongside
/// in the record store, never on the record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier
    pub transaction_id: String,

    /// Account that made the transaction
    pub user_id: String,

    /// Amount, `None` when the source cell failed numeric coercion
    pub amount: Option<f64>,

    /// Source cell text of the amount, as ingested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_raw: Option<String>,

    /// Point in time of the transaction
    pub timestamp: NaiveDateTime,

    #[serde(default)]
    pub merchant_category: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub transaction_type: Option<TransactionType>,

    /// Source columns outside the known schema, in source order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl Transaction {
    /// Create a transaction with a numeric amount and no optional columns
    pub fn new(
        transaction_id: impl Into<String>,
        user_id: impl Into<String>,
        amount: f64,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            amount: Some(amount),
            amount_raw: None,
            timestamp,
            merchant_category: None,
            location: None,
            transaction_type: None,
            extra: Vec::new(),
        }
    }

    pub fn with_merchant_category(mut self, category: impl Into<String>) -> Self {
        self.merchant_category = Some(category.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    /// Text of the amount cell as it should be written back out.
    ///
    /// Ingested cells are passed through unchanged; records built in code
    /// render their numeric amount.
    pub fn amount_text(&self) -> String {
        match (&self.amount_raw, self.amount) {
            (Some(raw), _) => raw.clone(),
            (None, Some(amount)) => amount.to_string(),
            (None, None) => String::new(),
        }
    }

    /// Look up an extra source column by name
    pub fn extra_value(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_transaction_type_parsing() {
        assert_eq!("purchase".parse(), Ok(TransactionType::Purchase));
        assert_eq!(" Withdrawal ".parse(), Ok(TransactionType::Withdrawal));
        assert_eq!("TRANSFER".parse(), Ok(TransactionType::Transfer));
        assert!("refund".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_amount_text() {
        let tx = Transaction::new("TXN_000001", "USER_0001", 150.25, ts());
        assert_eq!(tx.amount_text(), "150.25");

        let mut bad = tx.clone();
        bad.amount = None;
        bad.amount_raw = Some("n/a".to_string());
        assert_eq!(bad.amount_text(), "n/a");

        let mut ingested = tx.clone();
        ingested.amount = Some(120.5);
        ingested.amount_raw = Some("120.50".to_string());
        assert_eq!(ingested.amount_text(), "120.50");
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = Transaction::new("TXN_000001", "USER_0001", 99.5, ts())
            .with_merchant_category("grocery")
            .with_transaction_type(TransactionType::Purchase);

        let json = serde_json::to_string(&tx).unwrap();
        let deserialized: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(tx, deserialized);
        assert!(json.contains("\"purchase\""));
    }
}
