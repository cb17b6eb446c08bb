//! Persistence port for transactions, their groups and payment methods.
//! Adapters live in `crate::adapters`.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{PaymentMethod, Transaction};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    /// The group changed since it was read.
    #[error("Group {root_id} is no longer at version {expected_version}")]
    Conflict { root_id: Uuid, expected_version: i64 },
    /// A transaction with this id or idempotency key already exists.
    #[error("Transaction {0} already exists")]
    Duplicate(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// All records of one group plus the version they were read at.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub root_id: Uuid,
    pub transactions: Vec<Transaction>,
    pub version: i64,
}

/// Reserves a pending transaction in its group ahead of the gateway call.
#[derive(Debug, Clone)]
pub struct GroupWrite {
    pub transaction: Transaction,
    /// Group the transaction joins. Equal to the transaction id for a root.
    pub root_id: Uuid,
    /// `None` opens a new group; `Some(v)` requires the group to still be at
    /// version `v`.
    pub expected_version: Option<i64>,
}

/// Settles a pending reservation with the gateway outcome, together with its
/// side effects.
#[derive(Debug, Clone)]
pub struct OutcomeWrite {
    /// The reserved record carrying its final status and gateway fields.
    pub transaction: Transaction,
    pub root_id: Uuid,
    pub new_payment_method: Option<PaymentMethod>,
    pub touch_payment_method: Option<Uuid>,
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Root of the group `id` belongs to.
    async fn find_root_id(&self, id: Uuid) -> StoreResult<Uuid>;

    /// Every record reachable from `root_id`, with the group version.
    async fn fetch_group(&self, root_id: Uuid) -> StoreResult<GroupSnapshot>;

    async fn get_payment_method(&self, id: Uuid) -> StoreResult<PaymentMethod>;

    /// Records the outcome of an external verification of a payment method.
    async fn set_payment_method_verified(
        &self,
        id: Uuid,
        verified: bool,
    ) -> StoreResult<PaymentMethod>;

    /// Inserts `write` atomically and bumps the group version, failing with
    /// [`StoreError::Conflict`] when the group moved on and
    /// [`StoreError::Duplicate`] when the id or idempotency key is taken.
    async fn commit(&self, write: GroupWrite) -> StoreResult<Transaction>;

    /// Replaces a pending record with its outcome and applies the side
    /// effects in one write. Fails with [`StoreError::NotFound`] when no
    /// pending record with that id exists.
    async fn finalize(&self, write: OutcomeWrite) -> StoreResult<Transaction>;

    /// Drops a pending record whose operation never reached the gateway or
    /// was definitely not processed. Releasing a root removes its group.
    async fn release(&self, id: Uuid, root_id: Uuid) -> StoreResult<()>;
}
