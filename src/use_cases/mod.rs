//! Idempotent payment orchestration.
//!
//! Every public operation follows the same cycle: derive the transaction id
//! from the idempotency key, replay an existing record if there is one,
//! validate against the group's derived state, reserve a pending record with
//! an optimistic group write, call the gateway once, and settle the
//! reservation with the outcome.
//!
//! The reservation is what keeps two workers from spending the same
//! remaining amount: the loser of the conditional write re-validates against
//! the winner's pending record before anything is sent to the gateway.

pub mod ach;
pub mod card;
pub mod guards;
pub mod tokenize;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{
    compute_state, DeclineCategory, GroupState, PaymentMethod, PaymentType, Transaction,
    TransactionStatus, TransactionType,
};
use crate::error::PaymentError;
use crate::gateway::{
    tran_nbr_for, GatewayError, GatewayOperation, GatewaySource, OperationKind, PaymentGateway,
};
use crate::ports::{GroupWrite, OutcomeWrite, StoreError, TransactionStore};
use crate::utils::clock::Clock;
use crate::validation::validate_idempotency_key;
use guards::{GroupGuard, GroupLocks, InFlightGuard, InFlightRegistry};

pub use ach::{AchPaymentRequest, AchVoidRequest};
pub use card::{CaptureRequest, CardPaymentRequest, PaymentSource, RefundRequest, VoidRequest};
pub use tokenize::{TokenizeOutcome, TokenizeRequest, TokenizeSource};

/// Namespace for transaction ids derived from idempotency keys.
const TRANSACTION_NAMESPACE: Uuid = Uuid::from_u128(0x6f3c_1a52_8e0d_4b7a_9c21_d4e8_5f60_a713);

pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Stable transaction id for an idempotency key, scoped per merchant.
pub fn transaction_id_for(merchant_id: Uuid, idempotency_key: &str) -> Uuid {
    Uuid::new_v5(
        &TRANSACTION_NAMESPACE,
        format!("{}:{}", merchant_id, idempotency_key).as_bytes(),
    )
}

/// Precondition re-checked against fresh group state whenever the group
/// changes underneath an operation.
#[derive(Debug, Clone, Copy)]
pub(crate) enum GroupRule {
    Capture { parent_id: Uuid, amount_cents: i64 },
    Refund { parent_id: Uuid, amount_cents: i64 },
    Void { root_id: Uuid, void_type: TransactionType },
}

impl GroupRule {
    pub(crate) fn check(
        &self,
        records: &[Transaction],
        state: &GroupState,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), PaymentError> {
        let find = |id: Uuid| {
            records
                .iter()
                .find(|t| t.id == id)
                .ok_or_else(|| PaymentError::NotFound(format!("transaction {}", id)))
        };
        let void_pending_or_done = state.is_voided()
            || records
                .iter()
                .any(|t| t.transaction_type.is_void() && t.status.is_unsettled());

        match *self {
            GroupRule::Capture {
                parent_id,
                amount_cents,
            } => {
                let parent = find(parent_id)?;
                if parent.transaction_type != TransactionType::Auth || !parent.is_root() {
                    return Err(PaymentError::InvalidParent(
                        "captures apply only to authorizations".to_string(),
                    ));
                }
                if !parent.is_approved() {
                    return Err(PaymentError::InvalidParent(
                        "authorization was not approved".to_string(),
                    ));
                }
                if void_pending_or_done {
                    return Err(PaymentError::InvalidParent(
                        "authorization has been voided".to_string(),
                    ));
                }
                if amount_cents > state.capturable_remaining_cents {
                    return Err(PaymentError::CaptureExceedsRemaining {
                        requested_cents: amount_cents,
                        remaining_cents: state.capturable_remaining_cents,
                    });
                }
                Ok(())
            }
            GroupRule::Refund {
                parent_id,
                amount_cents,
            } => {
                let parent = find(parent_id)?;
                let refundable_parent = match parent.transaction_type {
                    TransactionType::Charge | TransactionType::Debit => parent.is_root(),
                    TransactionType::Capture => true,
                    _ => false,
                };
                if !refundable_parent {
                    return Err(PaymentError::InvalidParent(format!(
                        "{} transactions cannot be refunded",
                        parent.transaction_type
                    )));
                }
                if !parent.is_approved() {
                    return Err(PaymentError::InvalidParent(format!(
                        "{} was not approved",
                        parent.transaction_type
                    )));
                }
                if void_pending_or_done {
                    return Err(PaymentError::InvalidParent(
                        "transaction has been voided".to_string(),
                    ));
                }
                let remaining = state
                    .refundable_for(parent_id)
                    .min(state.refundable_remaining_cents);
                if amount_cents > remaining {
                    return Err(PaymentError::RefundExceedsRemaining {
                        requested_cents: amount_cents,
                        remaining_cents: remaining,
                    });
                }
                Ok(())
            }
            GroupRule::Void { root_id, void_type } => {
                let root = find(root_id)?;
                let voidable = match void_type {
                    TransactionType::AchVoid => matches!(
                        root.transaction_type,
                        TransactionType::Debit | TransactionType::Credit
                    ),
                    _ => matches!(
                        root.transaction_type,
                        TransactionType::Auth | TransactionType::Charge
                    ),
                };
                if !root.is_root() || !voidable {
                    return Err(PaymentError::VoidNotAllowed(format!(
                        "{} cannot be voided with {}",
                        root.transaction_type, void_type
                    )));
                }
                if !root.is_approved() {
                    return Err(PaymentError::VoidNotAllowed(
                        "only approved transactions can be voided".to_string(),
                    ));
                }
                if void_pending_or_done {
                    return Err(PaymentError::VoidNotAllowed(
                        "transaction is already voided".to_string(),
                    ));
                }
                if state.has_settlement_activity() {
                    return Err(PaymentError::VoidNotAllowed(
                        "transaction has captures or refunds".to_string(),
                    ));
                }
                if now.date_naive() != root.created_at.date_naive() {
                    return Err(PaymentError::VoidNotAllowed(format!(
                        "void window closed at the end of {} UTC",
                        root.created_at.date_naive()
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Fields for the payment method created by a successful tokenization.
#[derive(Debug, Clone)]
pub(crate) struct MethodDraft {
    pub payment_type: PaymentType,
    pub last_four: Option<String>,
    pub is_verified: bool,
}

/// Everything needed to call the gateway and persist the result.
pub(crate) struct Plan {
    pub transaction: Transaction,
    pub root_id: Uuid,
    pub expected_version: Option<i64>,
    pub gateway_op: GatewayOperation,
    pub rule: Option<GroupRule>,
    pub touch_payment_method: Option<Uuid>,
    pub new_method: Option<MethodDraft>,
}

pub(crate) enum RootStart {
    Replayed(Transaction, Option<PaymentMethod>),
    Fresh { id: Uuid, in_flight: InFlightGuard },
}

/// Held for the lifetime of one operation, including its spawned
/// gateway/persist task.
pub(crate) struct OperationGuards {
    _in_flight: InFlightGuard,
    _group: Option<GroupGuard>,
}

/// New, not yet submitted transaction record.
#[allow(clippy::too_many_arguments)]
pub(crate) fn draft_transaction(
    id: Uuid,
    parent: Option<&Transaction>,
    merchant_id: Uuid,
    customer_id: Option<Uuid>,
    payment_method_id: Option<Uuid>,
    transaction_type: TransactionType,
    payment_method_type: PaymentType,
    amount_cents: i64,
    currency: &str,
    idempotency_key: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Transaction {
    Transaction {
        id,
        parent_transaction_id: parent.map(|p| p.id),
        merchant_id,
        customer_id,
        payment_method_id,
        transaction_type,
        payment_method_type,
        amount_cents,
        currency: currency.to_string(),
        status: TransactionStatus::Pending,
        decline_category: None,
        gateway_tran_nbr: tran_nbr_for(id),
        gateway_token: None,
        gateway_response_code: None,
        gateway_approval_code: None,
        gateway_response_text: None,
        idempotency_key: idempotency_key.to_string(),
        created_at: now,
        processed_at: None,
    }
}

/// Entry point for every payment operation.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    in_flight: Arc<InFlightRegistry>,
    group_locks: Arc<GroupLocks>,
    max_conflict_retries: u32,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            in_flight: Arc::new(InFlightRegistry::default()),
            group_locks: Arc::new(GroupLocks::default()),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, PaymentError> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("transaction {}", id)))
    }

    /// Derived state of the group containing `transaction_id`.
    pub async fn group_state(&self, transaction_id: Uuid) -> Result<GroupState, PaymentError> {
        let root_id = self.store.find_root_id(transaction_id).await?;
        let snapshot = self.store.fetch_group(root_id).await?;
        Ok(compute_state(&snapshot.transactions))
    }

    /// Applies the result of an out-of-band verification (for ACH, the
    /// pre-note outcome) to a payment method.
    pub async fn record_verification(
        &self,
        merchant_id: Uuid,
        payment_method_id: Uuid,
        verified: bool,
    ) -> Result<PaymentMethod, PaymentError> {
        self.load_payment_method(merchant_id, payment_method_id).await?;
        let method = self
            .store
            .set_payment_method_verified(payment_method_id, verified)
            .await?;
        tracing::info!(
            payment_method_id = %payment_method_id,
            verified,
            "Payment method verification recorded"
        );
        Ok(method)
    }

    /// Existing record for `id`, if any. Parameter drift on a replayed key
    /// is logged, never acted on.
    async fn replay(
        &self,
        id: Uuid,
        transaction_type: TransactionType,
        amount_cents: i64,
        parent_id: Option<Uuid>,
    ) -> Result<Option<Transaction>, PaymentError> {
        let Some(existing) = self.store.get_transaction(id).await? else {
            return Ok(None);
        };

        if existing.transaction_type != transaction_type
            || existing.amount_cents != amount_cents
            || existing.parent_transaction_id != parent_id
        {
            tracing::warn!(
                transaction_id = %id,
                stored_type = %existing.transaction_type,
                requested_type = %transaction_type,
                stored_amount = existing.amount_cents,
                requested_amount = amount_cents,
                "Idempotency key replayed with different parameters; returning original"
            );
        } else {
            tracing::debug!(transaction_id = %id, "Idempotent replay");
        }

        replayable(existing).map(Some)
    }

    /// Claims `id` for this process. Callers must re-check for a stored
    /// record after claiming: the previous holder may have just finished.
    fn claim(&self, id: Uuid) -> Result<InFlightGuard, PaymentError> {
        self.in_flight.claim(id).ok_or(PaymentError::InProgress(id))
    }

    async fn load_payment_method(
        &self,
        merchant_id: Uuid,
        id: Uuid,
    ) -> Result<PaymentMethod, PaymentError> {
        match self.store.get_payment_method(id).await {
            Ok(method) if method.merchant_id == merchant_id => Ok(method),
            Ok(_) | Err(StoreError::NotFound(_)) => {
                Err(PaymentError::NotFound(format!("payment method {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_parent(
        &self,
        merchant_id: Uuid,
        parent_id: Uuid,
    ) -> Result<Transaction, PaymentError> {
        match self.store.get_transaction(parent_id).await? {
            Some(parent) if parent.merchant_id == merchant_id => Ok(parent),
            _ => Err(PaymentError::NotFound(format!("transaction {}", parent_id))),
        }
    }

    /// Shared path for CAPTURE, REFUND, VOID and ACH_VOID.
    pub(crate) async fn run_descendant(
        &self,
        request: DescendantRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<Transaction, PaymentError> {
        validate_idempotency_key(request.idempotency_key)?;
        let id = transaction_id_for(request.merchant_id, request.idempotency_key);

        // Voids replay against the root amount, which is only known after load.
        let parent = self.load_parent(request.merchant_id, request.parent_id).await?;
        let amount_cents = request.amount_cents.unwrap_or(parent.amount_cents);

        if let Some(existing) = self
            .replay(id, request.transaction_type, amount_cents, Some(parent.id))
            .await?
        {
            return Ok(existing);
        }
        let in_flight = self.claim(id)?;
        if let Some(existing) = self
            .replay(id, request.transaction_type, amount_cents, Some(parent.id))
            .await?
        {
            return Ok(existing);
        }

        let token = parent.gateway_token.clone().ok_or_else(|| {
            PaymentError::InvalidParent(format!("transaction {} has no gateway token", parent.id))
        })?;

        let root_id = self.store.find_root_id(parent.id).await?;
        let group = self.group_locks.acquire(root_id).await;
        let snapshot = self.store.fetch_group(root_id).await?;
        let state = compute_state(&snapshot.transactions);
        if !state.is_consistent() {
            tracing::warn!(
                root_id = %root_id,
                anomalies = ?state.anomalies,
                "Group has anomalies; validating conservatively"
            );
        }

        let rule = match request.transaction_type {
            TransactionType::Capture => GroupRule::Capture {
                parent_id: parent.id,
                amount_cents,
            },
            TransactionType::Refund => GroupRule::Refund {
                parent_id: parent.id,
                amount_cents,
            },
            void_type => GroupRule::Void {
                root_id: parent.id,
                void_type,
            },
        };
        let now = self.clock.now();
        rule.check(&snapshot.transactions, &state, now)?;

        let op_kind = request.operation_kind(&parent);
        let transaction = draft_transaction(
            id,
            Some(&parent),
            request.merchant_id,
            parent.customer_id,
            parent.payment_method_id,
            request.transaction_type,
            parent.payment_method_type,
            amount_cents,
            &parent.currency,
            request.idempotency_key,
            now,
        );
        let gateway_op = GatewayOperation {
            kind: op_kind,
            merchant_id: request.merchant_id,
            amount_cents,
            tran_nbr: transaction.gateway_tran_nbr.clone(),
            source: GatewaySource::Token(token),
        };

        let plan = Plan {
            transaction,
            root_id,
            expected_version: Some(snapshot.version),
            gateway_op,
            rule: Some(rule),
            touch_payment_method: None,
            new_method: None,
        };
        let guards = OperationGuards {
            _in_flight: in_flight,
            _group: Some(group),
        };
        self.execute(plan, guards, cancel)
            .await
            .map(|(tx, _)| tx)
    }

    /// First half of the path for new groups (AUTH, CHARGE, DEBIT, CREDIT
    /// and tokenization): replay, or claim the id for a fresh submission.
    pub(crate) async fn begin_root(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
        transaction_type: TransactionType,
        amount_cents: i64,
    ) -> Result<RootStart, PaymentError> {
        validate_idempotency_key(idempotency_key)?;
        let id = transaction_id_for(merchant_id, idempotency_key);

        if let Some(existing) = self.replay(id, transaction_type, amount_cents, None).await? {
            let method = self.created_method(&existing).await?;
            return Ok(RootStart::Replayed(existing, method));
        }
        let in_flight = self.claim(id)?;
        if let Some(existing) = self.replay(id, transaction_type, amount_cents, None).await? {
            let method = self.created_method(&existing).await?;
            return Ok(RootStart::Replayed(existing, method));
        }

        Ok(RootStart::Fresh { id, in_flight })
    }

    pub(crate) async fn finish_root(
        &self,
        plan: Plan,
        in_flight: InFlightGuard,
        cancel: &CancellationToken,
    ) -> Result<(Transaction, Option<PaymentMethod>), PaymentError> {
        let guards = OperationGuards {
            _in_flight: in_flight,
            _group: None,
        };
        self.execute(plan, guards, cancel).await
    }

    /// Payment method created by a tokenization record, if any.
    async fn created_method(
        &self,
        tx: &Transaction,
    ) -> Result<Option<PaymentMethod>, PaymentError> {
        if !matches!(
            tx.transaction_type,
            TransactionType::Storage | TransactionType::PreNote
        ) {
            return Ok(None);
        }
        match self.store.get_payment_method(payment_method_id_for(tx.id)).await {
            Ok(method) => Ok(Some(method)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reserves, calls the gateway and settles on a task of its own, so a
    /// caller giving up cannot strand a completed charge unrecorded.
    async fn execute(
        &self,
        plan: Plan,
        guards: OperationGuards,
        cancel: &CancellationToken,
    ) -> Result<(Transaction, Option<PaymentMethod>), PaymentError> {
        let this = self.clone();
        let cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let result = this.reserve_call_settle(plan, &cancel).await;
            drop(guards);
            result
        });

        task.await
            .map_err(|e| PaymentError::Internal(format!("payment task failed: {}", e)))?
    }

    async fn reserve_call_settle(
        &self,
        plan: Plan,
        cancel: &CancellationToken,
    ) -> Result<(Transaction, Option<PaymentMethod>), PaymentError> {
        let Plan {
            mut transaction,
            root_id,
            expected_version,
            gateway_op,
            rule,
            touch_payment_method,
            new_method,
        } = plan;

        if cancel.is_cancelled() {
            return Err(PaymentError::Cancelled);
        }
        if let Some(existing) = self
            .reserve(&transaction, root_id, expected_version, rule)
            .await?
        {
            let method = self.created_method(&existing).await?;
            return Ok((existing, method));
        }

        let outcome = self.gateway.execute(&gateway_op, cancel).await;
        transaction.processed_at = Some(self.clock.now());

        let mut payment_method = None;
        match outcome {
            Ok(response) => {
                transaction.status = if response.approved {
                    TransactionStatus::Approved
                } else {
                    TransactionStatus::Declined
                };
                transaction.decline_category = Some(response.category);
                transaction.gateway_token = response.token.clone();
                transaction.gateway_response_code = Some(response.response_code.clone());
                transaction.gateway_approval_code = response.approval_code.clone();
                transaction.gateway_response_text = response.response_text.clone();

                if response.approved {
                    if let (Some(draft), Some(token)) = (new_method, response.token) {
                        payment_method = Some(PaymentMethod {
                            id: payment_method_id_for(transaction.id),
                            merchant_id: transaction.merchant_id,
                            customer_id: transaction.customer_id,
                            bric: token,
                            payment_type: draft.payment_type,
                            last_four: draft.last_four,
                            is_verified: draft.is_verified,
                            is_active: true,
                            is_default: false,
                            created_at: transaction.created_at,
                            updated_at: transaction.created_at,
                            last_used_at: None,
                            deleted_at: None,
                        });
                    }
                }
                if response.category != DeclineCategory::Approved {
                    tracing::info!(
                        transaction_id = %transaction.id,
                        response_code = %response.response_code,
                        category = response.category.as_str(),
                        "Gateway declined operation"
                    );
                }
            }
            Err(e) if e.is_outcome_unknown() => {
                transaction.status = TransactionStatus::Indeterminate;
                transaction.gateway_response_text = Some(e.to_string());
            }
            Err(e) => {
                self.release(transaction.id, root_id).await;
                return Err(match e {
                    GatewayError::Cancelled => PaymentError::Cancelled,
                    other => PaymentError::Gateway(other),
                });
            }
        }

        if let Some(method) = &payment_method {
            transaction.payment_method_id = Some(method.id);
        }
        let touch = touch_payment_method.filter(|_| transaction.is_approved());

        let stored = self
            .settle(OutcomeWrite {
                transaction,
                root_id,
                new_payment_method: payment_method.clone(),
                touch_payment_method: touch,
            })
            .await?;

        if stored.status == TransactionStatus::Indeterminate {
            tracing::error!(
                transaction_id = %stored.id,
                tran_nbr = %stored.gateway_tran_nbr,
                "Recorded indeterminate gateway outcome"
            );
            return Err(PaymentError::Indeterminate {
                transaction: Box::new(stored),
            });
        }

        tracing::info!(
            transaction_id = %stored.id,
            root_id = %root_id,
            transaction_type = %stored.transaction_type,
            status = %stored.status,
            amount_cents = stored.amount_cents,
            "Transaction recorded"
        );
        Ok((stored, payment_method))
    }

    /// Writes the pending record into its group. On a version conflict the
    /// group is re-read and `rule` re-checked, so a concurrent writer that
    /// took the remaining amount turns this operation into a validation
    /// error before the gateway is called. Returns the stored record when
    /// another worker already owns the id.
    async fn reserve(
        &self,
        transaction: &Transaction,
        root_id: Uuid,
        mut expected_version: Option<i64>,
        rule: Option<GroupRule>,
    ) -> Result<Option<Transaction>, PaymentError> {
        let id = transaction.id;
        let mut conflicts: u32 = 0;

        loop {
            let write = GroupWrite {
                transaction: transaction.clone(),
                root_id,
                expected_version,
            };
            match self.store.commit(write).await {
                Ok(_) => return Ok(None),
                Err(StoreError::Duplicate(_)) => {
                    let existing = self.store.get_transaction(id).await?.ok_or_else(|| {
                        PaymentError::Internal(format!(
                            "idempotency key of transaction {} is held by another record",
                            id
                        ))
                    })?;
                    tracing::debug!(transaction_id = %id, "Reservation lost to another worker");
                    return replayable(existing).map(Some);
                }
                Err(StoreError::Conflict { root_id, .. }) => {
                    conflicts += 1;
                    if conflicts > self.max_conflict_retries {
                        tracing::warn!(
                            transaction_id = %id,
                            root_id = %root_id,
                            conflicts,
                            "Group write retries exhausted"
                        );
                        return Err(PaymentError::Conflict {
                            root_id,
                            attempts: conflicts,
                        });
                    }

                    let snapshot = self.store.fetch_group(root_id).await?;
                    tracing::debug!(
                        transaction_id = %id,
                        root_id = %root_id,
                        version = snapshot.version,
                        "Group changed; re-validating"
                    );
                    if let Some(rule) = rule {
                        let state = compute_state(&snapshot.transactions);
                        rule.check(&snapshot.transactions, &state, self.clock.now())?;
                    }
                    expected_version = Some(snapshot.version);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Records the known gateway outcome. Never calls the gateway: a failure
    /// here leaves the pending reservation in place for reconciliation.
    async fn settle(&self, write: OutcomeWrite) -> Result<Transaction, PaymentError> {
        let id = write.transaction.id;
        self.store.finalize(write).await.map_err(|e| {
            tracing::error!(
                transaction_id = %id,
                error = %e,
                "Failed to record gateway outcome"
            );
            PaymentError::Reconciliation {
                transaction_id: id,
                reason: e.to_string(),
            }
        })
    }

    /// Drops a reservation for an operation the gateway did not process.
    async fn release(&self, id: Uuid, root_id: Uuid) {
        if let Err(e) = self.store.release(id, root_id).await {
            tracing::error!(
                transaction_id = %id,
                error = %e,
                "Failed to release reservation; it stays held as pending"
            );
        }
    }
}

/// Answer for a stored record found under a replayed key: settled outcomes
/// are returned as they are, unsettled ones as the error their first caller
/// saw or is about to see.
fn replayable(existing: Transaction) -> Result<Transaction, PaymentError> {
    match existing.status {
        TransactionStatus::Pending => Err(PaymentError::InProgress(existing.id)),
        TransactionStatus::Indeterminate => Err(PaymentError::Indeterminate {
            transaction: Box::new(existing),
        }),
        _ => Ok(existing),
    }
}

/// Id of the payment method created by tokenization transaction `tx_id`.
pub fn payment_method_id_for(tx_id: Uuid) -> Uuid {
    Uuid::new_v5(&tx_id, b"payment-method")
}

/// Input to [`PaymentOrchestrator::run_descendant`].
pub(crate) struct DescendantRequest<'a> {
    pub merchant_id: Uuid,
    pub parent_id: Uuid,
    /// `None` takes the parent's amount (voids).
    pub amount_cents: Option<i64>,
    pub transaction_type: TransactionType,
    pub idempotency_key: &'a str,
}

impl DescendantRequest<'_> {
    fn operation_kind(&self, parent: &Transaction) -> OperationKind {
        match (self.transaction_type, parent.payment_method_type) {
            (TransactionType::Capture, _) => OperationKind::Capture,
            (TransactionType::Refund, PaymentType::Ach) => OperationKind::AchCredit,
            (TransactionType::Refund, PaymentType::Card) => OperationKind::Refund,
            (TransactionType::AchVoid, _) => OperationKind::AchVoid,
            _ => OperationKind::Void,
        }
    }
}
