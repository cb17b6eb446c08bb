pub mod client;
pub mod request;
pub mod response;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialError;

pub use client::GatewayClient;
pub use request::{
    build_request, tran_nbr_for, BankAccountDetails, BankAccountType, CardDetails,
    GatewayOperation, GatewayRequest, GatewaySource, OperationKind,
};
pub use response::{classify, parse_response, GatewayResponse};

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Every attempt failed before the gateway could have acted on it.
    #[error("gateway unreachable after {attempts} attempt(s): {reason}")]
    Transient { attempts: u32, reason: String },
    /// The request may have reached the gateway; the outcome is unknown.
    #[error("gateway outcome unknown: {0}")]
    Indeterminate(String),
    #[error("malformed gateway response: {0}")]
    Malformed(String),
    #[error("invalid gateway request: {0}")]
    InvalidRequest(String),
    #[error("gateway rejected the request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("operation cancelled before the gateway was reached")]
    Cancelled,
    #[error("merchant credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),
}

impl GatewayError {
    /// Safe to resubmit: nothing reached the gateway.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient { .. } | GatewayError::Cancelled)
    }

    /// The gateway may have moved money; the result must be recorded and
    /// reconciled rather than resubmitted.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, GatewayError::Indeterminate(_) | GatewayError::Malformed(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn execute(
        &self,
        op: &GatewayOperation,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transient = GatewayError::Transient {
            attempts: 3,
            reason: "connection refused".to_string(),
        };
        assert!(transient.is_retryable());
        assert!(!transient.is_outcome_unknown());

        let unknown = GatewayError::Indeterminate("timed out".to_string());
        assert!(!unknown.is_retryable());
        assert!(unknown.is_outcome_unknown());

        let rejected = GatewayError::Rejected {
            status: 400,
            body: "bad request".to_string(),
        };
        assert!(!rejected.is_retryable());
        assert!(!rejected.is_outcome_unknown());
    }
}
