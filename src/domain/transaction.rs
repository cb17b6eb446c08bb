//! Transaction domain entity.
//! An immutable record of one gateway-facing operation, linked into a tree by
//! `parent_transaction_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Gateway-facing operation a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Auth,
    Charge,
    Capture,
    Void,
    Refund,
    Debit,
    Credit,
    AchVoid,
    PreNote,
    Storage,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Auth => "AUTH",
            TransactionType::Charge => "CHARGE",
            TransactionType::Capture => "CAPTURE",
            TransactionType::Void => "VOID",
            TransactionType::Refund => "REFUND",
            TransactionType::Debit => "DEBIT",
            TransactionType::Credit => "CREDIT",
            TransactionType::AchVoid => "ACH_VOID",
            TransactionType::PreNote => "PRE_NOTE",
            TransactionType::Storage => "STORAGE",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TransactionType::Void | TransactionType::AchVoid)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "AUTH" => TransactionType::Auth,
            "CHARGE" => TransactionType::Charge,
            "CAPTURE" => TransactionType::Capture,
            "VOID" => TransactionType::Void,
            "REFUND" => TransactionType::Refund,
            "DEBIT" => TransactionType::Debit,
            "CREDIT" => TransactionType::Credit,
            "ACH_VOID" => TransactionType::AchVoid,
            "PRE_NOTE" => TransactionType::PreNote,
            "STORAGE" => TransactionType::Storage,
            other => return Err(ParseEnumError::new("transaction type", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Card,
    Ach,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Card => "CARD",
            PaymentType::Ach => "ACH",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentType::Card),
            "ACH" => Ok(PaymentType::Ach),
            other => Err(ParseEnumError::new("payment type", other)),
        }
    }
}

/// Outcome of the gateway exchange recorded on the transaction.
///
/// `Indeterminate` marks an exchange whose result is unknown (the request may
/// or may not have been processed) and which must be reconciled out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Declined,
    Failed,
    Indeterminate,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Declined => "declined",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Indeterminate => "indeterminate",
        }
    }

    /// Statuses whose economic effect is unknown and must be held against
    /// remaining amounts.
    pub fn is_unsettled(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Pending | TransactionStatus::Indeterminate
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => TransactionStatus::Pending,
            "approved" => TransactionStatus::Approved,
            "declined" => TransactionStatus::Declined,
            "failed" => TransactionStatus::Failed,
            "indeterminate" => TransactionStatus::Indeterminate,
            other => return Err(ParseEnumError::new("transaction status", other)),
        })
    }
}

/// Classification of a gateway response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineCategory {
    Approved,
    /// Retry with a different instrument, never the same call.
    SoftDecline,
    /// Terminal for this instrument.
    HardDecline,
    /// Issuer temporarily unreachable; the caller may submit a new operation.
    IssuerUnavailable,
}

impl DeclineCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineCategory::Approved => "approved",
            DeclineCategory::SoftDecline => "soft_decline",
            DeclineCategory::HardDecline => "hard_decline",
            DeclineCategory::IssuerUnavailable => "issuer_unavailable",
        }
    }
}

impl FromStr for DeclineCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "approved" => DeclineCategory::Approved,
            "soft_decline" => DeclineCategory::SoftDecline,
            "hard_decline" => DeclineCategory::HardDecline,
            "issuer_unavailable" => DeclineCategory::IssuerUnavailable,
            other => return Err(ParseEnumError::new("decline category", other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Domain entity representing one gateway-facing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub parent_transaction_id: Option<Uuid>,
    pub merchant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub payment_method_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub payment_method_type: PaymentType,
    pub amount_cents: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub decline_category: Option<DeclineCategory>,
    pub gateway_tran_nbr: String,
    pub gateway_token: Option<String>,
    pub gateway_response_code: Option<String>,
    pub gateway_approval_code: Option<String>,
    pub gateway_response_text: Option<String>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn is_root(&self) -> bool {
        self.parent_transaction_id.is_none()
    }

    pub fn is_approved(&self) -> bool {
        self.status == TransactionStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_round_trips_through_str() {
        for ty in [
            TransactionType::Auth,
            TransactionType::AchVoid,
            TransactionType::PreNote,
        ] {
            assert_eq!(ty.as_str().parse::<TransactionType>().unwrap(), ty);
        }
        assert!("SETTLE".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TransactionStatus::Indeterminate).unwrap();
        assert_eq!(json, "\"indeterminate\"");
    }
}
