//! In-memory implementation of TransactionStore, for tests and local runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{PaymentMethod, Transaction, TransactionStatus};
use crate::ports::{
    GroupSnapshot, GroupWrite, OutcomeWrite, StoreError, StoreResult, TransactionStore,
};

#[derive(Default)]
struct Inner {
    transactions: HashMap<Uuid, Transaction>,
    idempotency_keys: HashSet<(Uuid, String)>,
    /// transaction id -> root id
    membership: HashMap<Uuid, Uuid>,
    /// root id -> version
    groups: HashMap<Uuid, i64>,
    payment_methods: HashMap<Uuid, PaymentMethod>,
}

/// Store kept entirely behind one lock; every commit is trivially atomic.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    inner: RwLock<Inner>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a payment method directly, bypassing tokenization.
    pub async fn insert_payment_method(&self, method: PaymentMethod) {
        self.inner
            .write()
            .await
            .payment_methods
            .insert(method.id, method);
    }

    pub async fn transaction_count(&self) -> usize {
        self.inner.read().await.transactions.len()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        Ok(self.inner.read().await.transactions.get(&id).cloned())
    }

    async fn find_root_id(&self, id: Uuid) -> StoreResult<Uuid> {
        self.inner
            .read()
            .await
            .membership
            .get(&id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))
    }

    async fn fetch_group(&self, root_id: Uuid) -> StoreResult<GroupSnapshot> {
        let inner = self.inner.read().await;
        let version = *inner
            .groups
            .get(&root_id)
            .ok_or_else(|| StoreError::NotFound(format!("group {}", root_id)))?;

        let transactions = inner
            .membership
            .iter()
            .filter(|(_, root)| **root == root_id)
            .filter_map(|(id, _)| inner.transactions.get(id).cloned())
            .collect();

        Ok(GroupSnapshot {
            root_id,
            transactions,
            version,
        })
    }

    async fn get_payment_method(&self, id: Uuid) -> StoreResult<PaymentMethod> {
        self.inner
            .read()
            .await
            .payment_methods
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("payment method {}", id)))
    }

    async fn set_payment_method_verified(
        &self,
        id: Uuid,
        verified: bool,
    ) -> StoreResult<PaymentMethod> {
        let mut inner = self.inner.write().await;
        let method = inner
            .payment_methods
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("payment method {}", id)))?;
        method.is_verified = verified;
        method.updated_at = chrono::Utc::now();
        Ok(method.clone())
    }

    async fn commit(&self, write: GroupWrite) -> StoreResult<Transaction> {
        let mut inner = self.inner.write().await;
        let tx = write.transaction;
        let key = (tx.merchant_id, tx.idempotency_key.clone());

        if inner.transactions.contains_key(&tx.id) || inner.idempotency_keys.contains(&key) {
            return Err(StoreError::Duplicate(tx.id));
        }

        let next_version = match write.expected_version {
            None => {
                if write.root_id != tx.id || inner.groups.contains_key(&write.root_id) {
                    return Err(StoreError::Duplicate(write.root_id));
                }
                1
            }
            Some(expected) => match inner.groups.get(&write.root_id) {
                None => return Err(StoreError::NotFound(format!("group {}", write.root_id))),
                Some(&current) if current != expected => {
                    return Err(StoreError::Conflict {
                        root_id: write.root_id,
                        expected_version: expected,
                    })
                }
                Some(&current) => current + 1,
            },
        };

        inner.groups.insert(write.root_id, next_version);
        inner.membership.insert(tx.id, write.root_id);
        inner.idempotency_keys.insert(key);
        inner.transactions.insert(tx.id, tx.clone());

        Ok(tx)
    }

    async fn finalize(&self, write: OutcomeWrite) -> StoreResult<Transaction> {
        let mut inner = self.inner.write().await;
        let tx = write.transaction;

        let pending = inner
            .transactions
            .get(&tx.id)
            .is_some_and(|stored| stored.status == TransactionStatus::Pending);
        if !pending || inner.membership.get(&tx.id) != Some(&write.root_id) {
            return Err(StoreError::NotFound(format!("pending transaction {}", tx.id)));
        }
        if let Some(method) = &write.new_payment_method {
            if inner.payment_methods.contains_key(&method.id) {
                return Err(StoreError::Duplicate(method.id));
            }
        }
        if let Some(method_id) = write.touch_payment_method {
            if !inner.payment_methods.contains_key(&method_id) {
                return Err(StoreError::NotFound(format!("payment method {}", method_id)));
            }
        }

        // All checks passed; apply.
        if let Some(method) = write.new_payment_method {
            inner.payment_methods.insert(method.id, method);
        }
        if let Some(method_id) = write.touch_payment_method {
            if let Some(method) = inner.payment_methods.get_mut(&method_id) {
                method.last_used_at = Some(tx.created_at);
                method.updated_at = tx.created_at;
            }
        }
        if let Some(version) = inner.groups.get_mut(&write.root_id) {
            *version += 1;
        }
        inner.transactions.insert(tx.id, tx.clone());

        Ok(tx)
    }

    async fn release(&self, id: Uuid, root_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = match inner.transactions.get(&id) {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                (tx.merchant_id, tx.idempotency_key.clone())
            }
            _ => return Err(StoreError::NotFound(format!("pending transaction {}", id))),
        };

        inner.transactions.remove(&id);
        inner.membership.remove(&id);
        inner.idempotency_keys.remove(&key);
        if id == root_id {
            inner.groups.remove(&root_id);
        } else if let Some(version) = inner.groups.get_mut(&root_id) {
            *version += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PaymentType, TransactionStatus, TransactionType};
    use chrono::Utc;

    fn record(id: Uuid, parent: Option<Uuid>, ty: TransactionType, key: &str) -> Transaction {
        Transaction {
            id,
            parent_transaction_id: parent,
            merchant_id: Uuid::nil(),
            customer_id: None,
            payment_method_id: None,
            transaction_type: ty,
            payment_method_type: PaymentType::Card,
            amount_cents: 1000,
            currency: "USD".to_string(),
            status: TransactionStatus::Approved,
            decline_category: None,
            gateway_tran_nbr: "1000000001".to_string(),
            gateway_token: Some("TOKEN".to_string()),
            gateway_response_code: Some("00".to_string()),
            gateway_approval_code: None,
            gateway_response_text: None,
            idempotency_key: key.to_string(),
            created_at: Utc::now(),
            processed_at: Some(Utc::now()),
        }
    }

    fn write(tx: Transaction, root_id: Uuid, expected_version: Option<i64>) -> GroupWrite {
        GroupWrite {
            transaction: tx,
            root_id,
            expected_version,
        }
    }

    fn pending(mut tx: Transaction) -> Transaction {
        tx.status = TransactionStatus::Pending;
        tx.processed_at = None;
        tx
    }

    #[tokio::test]
    async fn test_commit_and_fetch_group() {
        let store = InMemoryTransactionStore::new();
        let root = Uuid::new_v4();
        let child = Uuid::new_v4();

        store
            .commit(write(record(root, None, TransactionType::Auth, "a"), root, None))
            .await
            .unwrap();
        store
            .commit(write(
                record(child, Some(root), TransactionType::Capture, "b"),
                root,
                Some(1),
            ))
            .await
            .unwrap();

        let group = store.fetch_group(root).await.unwrap();
        assert_eq!(group.version, 2);
        assert_eq!(group.transactions.len(), 2);
        assert_eq!(store.find_root_id(child).await.unwrap(), root);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryTransactionStore::new();
        let root = Uuid::new_v4();
        store
            .commit(write(record(root, None, TransactionType::Auth, "a"), root, None))
            .await
            .unwrap();
        store
            .commit(write(
                record(Uuid::new_v4(), Some(root), TransactionType::Capture, "b"),
                root,
                Some(1),
            ))
            .await
            .unwrap();

        let stale = store
            .commit(write(
                record(Uuid::new_v4(), Some(root), TransactionType::Capture, "c"),
                root,
                Some(1),
            ))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));
        assert_eq!(store.transaction_count().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_rejected() {
        let store = InMemoryTransactionStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store
            .commit(write(record(first, None, TransactionType::Charge, "same"), first, None))
            .await
            .unwrap();

        let result = store
            .commit(write(record(second, None, TransactionType::Charge, "same"), second, None))
            .await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_finalize_settles_pending_and_bumps_version() {
        let store = InMemoryTransactionStore::new();
        let root = Uuid::new_v4();
        store
            .commit(write(record(root, None, TransactionType::Auth, "a"), root, None))
            .await
            .unwrap();

        let capture = record(Uuid::new_v4(), Some(root), TransactionType::Capture, "b");
        store
            .commit(write(pending(capture.clone()), root, Some(1)))
            .await
            .unwrap();
        let settled = store
            .finalize(OutcomeWrite {
                transaction: capture.clone(),
                root_id: root,
                new_payment_method: None,
                touch_payment_method: None,
            })
            .await
            .unwrap();

        assert_eq!(settled.status, TransactionStatus::Approved);
        assert_eq!(store.fetch_group(root).await.unwrap().version, 3);

        // Already settled: nothing pending left to finalize.
        let again = store
            .finalize(OutcomeWrite {
                transaction: capture,
                root_id: root,
                new_payment_method: None,
                touch_payment_method: None,
            })
            .await;
        assert!(matches!(again, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_touched_method_leaves_reservation_pending() {
        let store = InMemoryTransactionStore::new();
        let root = Uuid::new_v4();
        let sale = record(root, None, TransactionType::Charge, "a");
        store
            .commit(write(pending(sale.clone()), root, None))
            .await
            .unwrap();

        let result = store
            .finalize(OutcomeWrite {
                transaction: sale,
                root_id: root,
                new_payment_method: None,
                touch_payment_method: Some(Uuid::new_v4()),
            })
            .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        let stored = store.get_transaction(root).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(store.fetch_group(root).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_release_frees_key_and_group() {
        let store = InMemoryTransactionStore::new();
        let root = Uuid::new_v4();
        store
            .commit(write(pending(record(root, None, TransactionType::Charge, "k")), root, None))
            .await
            .unwrap();

        store.release(root, root).await.unwrap();
        assert_eq!(store.transaction_count().await, 0);
        assert!(store.fetch_group(root).await.is_err());

        // The key can be reserved again.
        store
            .commit(write(record(root, None, TransactionType::Charge, "k"), root, None))
            .await
            .unwrap();
        assert!(matches!(
            store.release(root, root).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
