use thiserror::Error;
use uuid::Uuid;

use crate::domain::Transaction;
use crate::gateway::GatewayError;
use crate::ports::StoreError;
use crate::validation::ValidationError;

/// Coarse classification callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Precondition,
    NotFound,
    InProgress,
    Transient,
    Indeterminate,
    Conflict,
    Reconciliation,
    Cancelled,
    Internal,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parent transaction: {0}")]
    InvalidParent(String),

    #[error("Capture of {requested_cents} cents exceeds the {remaining_cents} cents capturable")]
    CaptureExceedsRemaining {
        requested_cents: i64,
        remaining_cents: i64,
    },

    #[error("Refund of {requested_cents} cents exceeds the {remaining_cents} cents refundable")]
    RefundExceedsRemaining {
        requested_cents: i64,
        remaining_cents: i64,
    },

    #[error("Void not allowed: {0}")]
    VoidNotAllowed(String),

    #[error("Payment method {0} has not been verified")]
    PaymentMethodNotVerified(Uuid),

    #[error("Payment method unusable: {0}")]
    PaymentMethodUnusable(String),

    #[error("Operation {0} is already in progress")]
    InProgress(Uuid),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Recorded with `status=indeterminate`; must be reconciled, not retried.
    #[error("Gateway outcome unknown for transaction {}", .transaction.id)]
    Indeterminate { transaction: Box<Transaction> },

    #[error("Group {root_id} kept changing after {attempts} attempt(s)")]
    Conflict { root_id: Uuid, attempts: u32 },

    /// The gateway acted but the result could not be recorded.
    #[error("Transaction {transaction_id} needs reconciliation: {reason}")]
    Reconciliation { transaction_id: Uuid, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::Validation(_) => ErrorKind::Validation,
            PaymentError::NotFound(_) => ErrorKind::NotFound,
            PaymentError::InvalidParent(_)
            | PaymentError::CaptureExceedsRemaining { .. }
            | PaymentError::RefundExceedsRemaining { .. }
            | PaymentError::VoidNotAllowed(_)
            | PaymentError::PaymentMethodNotVerified(_)
            | PaymentError::PaymentMethodUnusable(_) => ErrorKind::Precondition,
            PaymentError::InProgress(_) => ErrorKind::InProgress,
            PaymentError::Gateway(e) => match e {
                GatewayError::Transient { .. } => ErrorKind::Transient,
                GatewayError::Cancelled => ErrorKind::Cancelled,
                GatewayError::Indeterminate(_) | GatewayError::Malformed(_) => {
                    ErrorKind::Indeterminate
                }
                GatewayError::InvalidRequest(_) | GatewayError::Rejected { .. } => {
                    ErrorKind::Validation
                }
                GatewayError::Credentials(_) => ErrorKind::Internal,
            },
            PaymentError::Indeterminate { .. } => ErrorKind::Indeterminate,
            PaymentError::Conflict { .. } => ErrorKind::Conflict,
            PaymentError::Reconciliation { .. } => ErrorKind::Reconciliation,
            PaymentError::Cancelled => ErrorKind::Cancelled,
            PaymentError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            PaymentError::Store(StoreError::Conflict { .. }) => ErrorKind::Conflict,
            PaymentError::Store(_) | PaymentError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may resubmit with the same idempotency key.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient
                | ErrorKind::InProgress
                | ErrorKind::Conflict
                | ErrorKind::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_kind() {
        let error = PaymentError::from(ValidationError::new("amount", "must be greater than zero"));
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_unverified_method_is_precondition_not_decline() {
        let error = PaymentError::PaymentMethodNotVerified(Uuid::nil());
        assert_eq!(error.kind(), ErrorKind::Precondition);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_transient_gateway_error_is_retryable() {
        let error = PaymentError::from(GatewayError::Transient {
            attempts: 4,
            reason: "HTTP 503".to_string(),
        });
        assert_eq!(error.kind(), ErrorKind::Transient);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_reconciliation_is_not_retryable() {
        let error = PaymentError::Reconciliation {
            transaction_id: Uuid::nil(),
            reason: "database unavailable".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Reconciliation);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let error = PaymentError::from(StoreError::NotFound("transaction".to_string()));
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_database_error_is_internal() {
        let error = PaymentError::from(StoreError::Database(sqlx::Error::RowNotFound));
        assert_eq!(error.kind(), ErrorKind::Internal);
    }
}
