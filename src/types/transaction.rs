//! Transaction data structures for fraud scoring

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single payment event.
///
/// Only constructible through validation: `user_id` is non-empty and `amount`
/// is finite and positive. Deserialization goes through [`RawTransaction`], so
/// a malformed payload is rejected before it reaches feature derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTransaction")]
pub struct Transaction {
    user_id: String,
    amount: f64,
    timestamp: DateTime<Utc>,
    merchant: Option<String>,
    location: Option<String>,
}

/// Unvalidated wire form of a transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub user_id: String,
    pub amount: f64,
    /// Ingestion time when absent
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default, alias = "city")]
    pub location: Option<String>,
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = ValidationError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        Transaction::at(raw.user_id, raw.amount, raw.timestamp)
            .map(|tx| tx.with_merchant(raw.merchant).with_location(raw.location))
    }
}

impl Transaction {
    /// Create a transaction stamped with the current time.
    pub fn new(user_id: impl Into<String>, amount: f64) -> Result<Self, ValidationError> {
        Self::at(user_id, amount, Utc::now())
    }

    /// Create a transaction at an explicit instant.
    pub fn at(
        user_id: impl Into<String>,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(ValidationError::MissingUserId);
        }
        if !amount.is_finite() {
            return Err(ValidationError::NonFiniteAmount);
        }
        if amount <= 0.0 {
            return Err(ValidationError::NonPositiveAmount(amount));
        }

        Ok(Self {
            user_id,
            amount,
            timestamp,
            merchant: None,
            location: None,
        })
    }

    pub fn with_merchant(mut self, merchant: Option<String>) -> Self {
        self.merchant = merchant;
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn merchant(&self) -> Option<&str> {
        self.merchant.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_amount() {
        assert_eq!(
            Transaction::new("user_001", 0.0),
            Err(ValidationError::NonPositiveAmount(0.0))
        );
        assert_eq!(
            Transaction::new("user_001", -15.0),
            Err(ValidationError::NonPositiveAmount(-15.0))
        );
        assert_eq!(
            Transaction::new("user_001", f64::NAN),
            Err(ValidationError::NonFiniteAmount)
        );
    }

    #[test]
    fn test_rejects_missing_user_id() {
        assert_eq!(
            Transaction::new("  ", 50_000.0),
            Err(ValidationError::MissingUserId)
        );
    }

    #[test]
    fn test_deserialization_validates() {
        let ok: Transaction = serde_json::from_str(
            r#"{"user_id":"user_001","amount":50000.0,"timestamp":"2024-01-01T10:00:00Z","city":"Tashkent"}"#,
        )
        .unwrap();
        assert_eq!(ok.user_id(), "user_001");
        assert_eq!(ok.location(), Some("Tashkent"));
        assert_eq!(ok.merchant(), None);

        let bad = serde_json::from_str::<Transaction>(r#"{"user_id":"user_001","amount":-1.0}"#);
        assert!(bad.is_err());

        let anonymous = serde_json::from_str::<Transaction>(r#"{"amount":10.0}"#);
        assert!(anonymous.is_err());
    }

    #[test]
    fn test_missing_timestamp_defaults_to_ingestion_time() {
        let before = Utc::now();
        let tx: Transaction =
            serde_json::from_str(r#"{"user_id":"user_002","amount":1200.0}"#).unwrap();
        assert!(tx.timestamp() >= before);
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = Transaction::new("user_003", 75_000.0)
            .unwrap()
            .with_merchant(Some("grocery".to_string()));

        let json = serde_json::to_string(&tx).unwrap();
        let deserialized: Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(tx, deserialized);
    }
}
