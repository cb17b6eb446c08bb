//! Tokenization: exchanging raw card or bank data for a payment method on file.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{draft_transaction, MethodDraft, PaymentOrchestrator, Plan, RootStart};
use crate::domain::{PaymentMethod, PaymentType, Transaction, TransactionType};
use crate::error::PaymentError;
use crate::gateway::{
    BankAccountDetails, CardDetails, GatewayOperation, GatewaySource, OperationKind,
};
use crate::validation::{validate_bank_account, validate_card, validate_token};

const TOKENIZE_CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub enum TokenizeSource {
    Card(CardDetails),
    /// Hosted-capture token to be stored.
    Token(String),
    /// Stored unverified; a pre-note is sent to verify it.
    BankAccount(BankAccountDetails),
}

#[derive(Debug, Clone)]
pub struct TokenizeRequest {
    pub merchant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub source: TokenizeSource,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct TokenizeOutcome {
    pub transaction: Transaction,
    /// Present only when the gateway approved and returned a token.
    pub payment_method: Option<PaymentMethod>,
}

impl PaymentOrchestrator {
    /// Stores a card or bank account with the gateway. Cards come back
    /// verified; bank accounts stay unverified until the pre-note result is
    /// recorded with [`Self::record_verification`].
    pub async fn tokenize(
        &self,
        request: TokenizeRequest,
        cancel: &CancellationToken,
    ) -> Result<TokenizeOutcome, PaymentError> {
        let now = self.clock.now();
        let (transaction_type, kind, source, draft) = match request.source {
            TokenizeSource::Card(card) => {
                validate_card(&card, now)?;
                let draft = MethodDraft {
                    payment_type: PaymentType::Card,
                    last_four: Some(card.last_four()),
                    is_verified: true,
                };
                (
                    TransactionType::Storage,
                    OperationKind::Tokenize,
                    GatewaySource::Card(card),
                    draft,
                )
            }
            TokenizeSource::Token(token) => {
                validate_token("token", &token)?;
                let draft = MethodDraft {
                    payment_type: PaymentType::Card,
                    last_four: None,
                    is_verified: true,
                };
                (
                    TransactionType::Storage,
                    OperationKind::Tokenize,
                    GatewaySource::Token(token),
                    draft,
                )
            }
            TokenizeSource::BankAccount(account) => {
                validate_bank_account(&account)?;
                let draft = MethodDraft {
                    payment_type: PaymentType::Ach,
                    last_four: Some(account.last_four()),
                    is_verified: false,
                };
                (
                    TransactionType::PreNote,
                    OperationKind::AchPreNote,
                    GatewaySource::BankAccount(account),
                    draft,
                )
            }
        };

        let (id, in_flight) = match self
            .begin_root(request.merchant_id, &request.idempotency_key, transaction_type, 0)
            .await?
        {
            RootStart::Replayed(transaction, payment_method) => {
                return Ok(TokenizeOutcome {
                    transaction,
                    payment_method,
                })
            }
            RootStart::Fresh { id, in_flight } => (id, in_flight),
        };

        let transaction = draft_transaction(
            id,
            None,
            request.merchant_id,
            request.customer_id,
            None,
            transaction_type,
            draft.payment_type,
            0,
            TOKENIZE_CURRENCY,
            &request.idempotency_key,
            now,
        );
        let plan = Plan {
            gateway_op: GatewayOperation {
                kind,
                merchant_id: request.merchant_id,
                amount_cents: 0,
                tran_nbr: transaction.gateway_tran_nbr.clone(),
                source,
            },
            transaction,
            root_id: id,
            expected_version: None,
            rule: None,
            touch_payment_method: None,
            new_method: Some(draft),
        };

        let (transaction, payment_method) = self.finish_root(plan, in_flight, cancel).await?;
        if let Some(method) = &payment_method {
            tracing::info!(
                payment_method_id = %method.id,
                payment_type = %method.payment_type,
                verified = method.is_verified,
                "Payment method stored"
            );
        }
        Ok(TokenizeOutcome {
            transaction,
            payment_method,
        })
    }
}
