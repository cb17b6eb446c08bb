//! ACH operations against stored, verified bank accounts.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{draft_transaction, DescendantRequest, PaymentOrchestrator, Plan, RootStart};
use crate::domain::{PaymentType, Transaction, TransactionType};
use crate::error::PaymentError;
use crate::gateway::{GatewayOperation, GatewaySource, OperationKind};
use crate::validation::{validate_currency, validate_positive_amount};

#[derive(Debug, Clone)]
pub struct AchPaymentRequest {
    pub merchant_id: Uuid,
    pub payment_method_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct AchVoidRequest {
    pub merchant_id: Uuid,
    /// The DEBIT or CREDIT being voided.
    pub transaction_id: Uuid,
    pub idempotency_key: String,
}

impl PaymentOrchestrator {
    /// Pulls funds from a verified bank account.
    pub async fn ach_debit(
        &self,
        request: AchPaymentRequest,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        self.ach_root(request, TransactionType::Debit, OperationKind::AchDebit, cancel)
            .await
    }

    /// Pushes funds to a verified bank account.
    pub async fn ach_credit(
        &self,
        request: AchPaymentRequest,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        self.ach_root(request, TransactionType::Credit, OperationKind::AchCredit, cancel)
            .await
    }

    pub async fn ach_void(
        &self,
        request: AchVoidRequest,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        self.run_descendant(
            DescendantRequest {
                merchant_id: request.merchant_id,
                parent_id: request.transaction_id,
                amount_cents: None,
                transaction_type: TransactionType::AchVoid,
                idempotency_key: &request.idempotency_key,
            },
            cancel,
        )
        .await
    }

    async fn ach_root(
        &self,
        request: AchPaymentRequest,
        transaction_type: TransactionType,
        kind: OperationKind,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        validate_positive_amount(request.amount_cents)?;
        validate_currency(&request.currency)?;

        let (id, in_flight) = match self
            .begin_root(
                request.merchant_id,
                &request.idempotency_key,
                transaction_type,
                request.amount_cents,
            )
            .await?
        {
            RootStart::Replayed(existing, _) => return Ok(existing),
            RootStart::Fresh { id, in_flight } => (id, in_flight),
        };

        let method = self
            .load_payment_method(request.merchant_id, request.payment_method_id)
            .await?;
        if method.payment_type != PaymentType::Ach {
            return Err(PaymentError::PaymentMethodUnusable(format!(
                "payment method {} is not a bank account",
                method.id
            )));
        }
        if !method.can_move_funds() {
            if !method.is_usable() {
                return Err(PaymentError::PaymentMethodUnusable(format!(
                    "payment method {} is inactive or deleted",
                    method.id
                )));
            }
            tracing::info!(
                payment_method_id = %method.id,
                "Rejecting ACH operation on unverified bank account"
            );
            return Err(PaymentError::PaymentMethodNotVerified(method.id));
        }

        let transaction = draft_transaction(
            id,
            None,
            request.merchant_id,
            method.customer_id,
            Some(method.id),
            transaction_type,
            PaymentType::Ach,
            request.amount_cents,
            &request.currency,
            &request.idempotency_key,
            self.clock.now(),
        );
        let plan = Plan {
            gateway_op: GatewayOperation {
                kind,
                merchant_id: request.merchant_id,
                amount_cents: request.amount_cents,
                tran_nbr: transaction.gateway_tran_nbr.clone(),
                source: GatewaySource::StoredToken(method.bric),
            },
            transaction,
            root_id: id,
            expected_version: None,
            rule: None,
            touch_payment_method: Some(method.id),
            new_method: None,
        };

        self.finish_root(plan, in_flight, cancel)
            .await
            .map(|(tx, _)| tx)
    }
}
