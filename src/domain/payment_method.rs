//! Stored, tokenized reference to a card or bank account.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::transaction::PaymentType;

/// A payment method on file. The durable gateway token (`bric`) is never
/// serialized and is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub customer_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub bric: String,
    pub payment_type: PaymentType,
    pub last_four: Option<String>,
    /// Only meaningful for ACH; flipped by the pre-note verification
    /// collaborator.
    pub is_verified: bool,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PaymentMethod {
    pub fn is_usable(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }

    /// ACH methods may only move money once the pre-note has verified them.
    pub fn can_move_funds(&self) -> bool {
        self.is_usable() && (self.payment_type != PaymentType::Ach || self.is_verified)
    }
}

impl fmt::Debug for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentMethod")
            .field("id", &self.id)
            .field("merchant_id", &self.merchant_id)
            .field("customer_id", &self.customer_id)
            .field("bric", &"****")
            .field("payment_type", &self.payment_type)
            .field("last_four", &self.last_four)
            .field("is_verified", &self.is_verified)
            .field("is_active", &self.is_active)
            .field("is_default", &self.is_default)
            .field("deleted_at", &self.deleted_at)
            .finish()
    }
}
