//! Card operations: authorize, sale, capture, void and refund.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    draft_transaction, DescendantRequest, PaymentOrchestrator, Plan, RootStart,
};
use crate::domain::{PaymentType, Transaction, TransactionType};
use crate::error::PaymentError;
use crate::gateway::{CardDetails, GatewayOperation, GatewaySource, OperationKind};
use crate::validation::{
    validate_card, validate_currency, validate_positive_amount, validate_token,
};

/// Where the card data for a new AUTH or CHARGE comes from.
#[derive(Debug, Clone)]
pub enum PaymentSource {
    Card(CardDetails),
    /// One-time token from hosted capture or a prior transaction.
    Token(String),
    /// Stored card payment method.
    PaymentMethod(Uuid),
}

#[derive(Debug, Clone)]
pub struct CardPaymentRequest {
    pub merchant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub source: PaymentSource,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub merchant_id: Uuid,
    /// The AUTH being captured.
    pub parent_transaction_id: Uuid,
    pub amount_cents: i64,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct VoidRequest {
    pub merchant_id: Uuid,
    /// The AUTH or CHARGE being voided.
    pub transaction_id: Uuid,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub merchant_id: Uuid,
    /// A CHARGE, an approved CAPTURE, or an ACH DEBIT.
    pub parent_transaction_id: Uuid,
    pub amount_cents: i64,
    pub idempotency_key: String,
}

impl PaymentOrchestrator {
    /// Reserves funds without moving them. Capture later with [`Self::capture`].
    pub async fn authorize(
        &self,
        request: CardPaymentRequest,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        self.card_root(request, TransactionType::Auth, OperationKind::Authorize, cancel)
            .await
    }

    /// Authorizes and captures in one step.
    pub async fn sale(
        &self,
        request: CardPaymentRequest,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        self.card_root(request, TransactionType::Charge, OperationKind::Sale, cancel)
            .await
    }

    pub async fn capture(
        &self,
        request: CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        validate_positive_amount(request.amount_cents)?;
        self.run_descendant(
            DescendantRequest {
                merchant_id: request.merchant_id,
                parent_id: request.parent_transaction_id,
                amount_cents: Some(request.amount_cents),
                transaction_type: TransactionType::Capture,
                idempotency_key: &request.idempotency_key,
            },
            cancel,
        )
        .await
    }

    /// Full reversal of an AUTH or CHARGE, allowed only on the UTC calendar
    /// day it was created and before any capture or refund.
    pub async fn void(
        &self,
        request: VoidRequest,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        self.run_descendant(
            DescendantRequest {
                merchant_id: request.merchant_id,
                parent_id: request.transaction_id,
                amount_cents: None,
                transaction_type: TransactionType::Void,
                idempotency_key: &request.idempotency_key,
            },
            cancel,
        )
        .await
    }

    /// Refunds part or all of a CHARGE, a CAPTURE or an ACH DEBIT. ACH
    /// refunds go out as an ACH credit referencing the debit.
    pub async fn refund(
        &self,
        request: RefundRequest,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        validate_positive_amount(request.amount_cents)?;
        self.run_descendant(
            DescendantRequest {
                merchant_id: request.merchant_id,
                parent_id: request.parent_transaction_id,
                amount_cents: Some(request.amount_cents),
                transaction_type: TransactionType::Refund,
                idempotency_key: &request.idempotency_key,
            },
            cancel,
        )
        .await
    }

    async fn card_root(
        &self,
        request: CardPaymentRequest,
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

        let now = self.clock.now();
        let mut customer_id = request.customer_id;
        let mut payment_method_id = None;
        let source = match request.source {
            PaymentSource::Card(card) => {
                validate_card(&card, now)?;
                GatewaySource::Card(card)
            }
            PaymentSource::Token(token) => {
                validate_token("token", &token)?;
                GatewaySource::Token(token)
            }
            PaymentSource::PaymentMethod(method_id) => {
                let method = self
                    .load_payment_method(request.merchant_id, method_id)
                    .await?;
                if method.payment_type != PaymentType::Card {
                    return Err(PaymentError::PaymentMethodUnusable(format!(
                        "payment method {} is not a card",
                        method_id
                    )));
                }
                if !method.is_usable() {
                    return Err(PaymentError::PaymentMethodUnusable(format!(
                        "payment method {} is inactive or deleted",
                        method_id
                    )));
                }
                customer_id = customer_id.or(method.customer_id);
                payment_method_id = Some(method.id);
                GatewaySource::StoredToken(method.bric)
            }
        };

        let transaction = draft_transaction(
            id,
            None,
            request.merchant_id,
            customer_id,
            payment_method_id,
            transaction_type,
            PaymentType::Card,
            request.amount_cents,
            &request.currency,
            &request.idempotency_key,
            now,
        );
        let plan = Plan {
            gateway_op: GatewayOperation {
                kind,
                merchant_id: request.merchant_id,
                amount_cents: request.amount_cents,
                tran_nbr: transaction.gateway_tran_nbr.clone(),
                source,
            },
            transaction,
            root_id: id,
            expected_version: None,
            rule: None,
            touch_payment_method: payment_method_id,
            new_method: None,
        };

        self.finish_root(plan, in_flight, cancel)
            .await
            .map(|(tx, _)| tx)
    }
}
