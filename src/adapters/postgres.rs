//! Postgres implementation of TransactionStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::domain::{DeclineCategory, PaymentMethod, Transaction, TransactionStatus};
use crate::ports::{
    GroupSnapshot, GroupWrite, OutcomeWrite, StoreError, StoreResult, TransactionStore,
};

const UNIQUE_VIOLATION: &str = "23505";

const TRANSACTION_COLUMNS: &str = "id, parent_transaction_id, merchant_id, customer_id, \
    payment_method_id, transaction_type, payment_method_type, amount_cents, currency, status, \
    decline_category, gateway_tran_nbr, gateway_token, gateway_response_code, \
    gateway_approval_code, gateway_response_text, idempotency_key, created_at, processed_at";

const PAYMENT_METHOD_COLUMNS: &str = "id, merchant_id, customer_id, bric, payment_type, last_four, \
    is_verified, is_active, is_default, created_at, updated_at, last_used_at, deleted_at";

/// Postgres-backed transaction store.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error, id: Uuid) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Duplicate(id)
        }
        _ => StoreError::Database(err),
    }
}

async fn insert_transaction(
    conn: &mut sqlx::PgConnection,
    tx: &Transaction,
) -> StoreResult<Transaction> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO transactions ({cols})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19)
        RETURNING {cols}
        "#,
        cols = TRANSACTION_COLUMNS
    ))
    .bind(tx.id)
    .bind(tx.parent_transaction_id)
    .bind(tx.merchant_id)
    .bind(tx.customer_id)
    .bind(tx.payment_method_id)
    .bind(tx.transaction_type.as_str())
    .bind(tx.payment_method_type.as_str())
    .bind(tx.amount_cents)
    .bind(&tx.currency)
    .bind(tx.status.as_str())
    .bind(tx.decline_category.map(|c| c.as_str()))
    .bind(&tx.gateway_tran_nbr)
    .bind(&tx.gateway_token)
    .bind(&tx.gateway_response_code)
    .bind(&tx.gateway_approval_code)
    .bind(&tx.gateway_response_text)
    .bind(&tx.idempotency_key)
    .bind(tx.created_at)
    .bind(tx.processed_at)
    .fetch_one(conn)
    .await
    .map_err(|e| map_insert_error(e, tx.id))?;

    row.into_domain()
}

async fn insert_payment_method(
    conn: &mut sqlx::PgConnection,
    method: &PaymentMethod,
) -> StoreResult<()> {
    sqlx::query(&format!(
        "INSERT INTO payment_methods ({}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        PAYMENT_METHOD_COLUMNS
    ))
    .bind(method.id)
    .bind(method.merchant_id)
    .bind(method.customer_id)
    .bind(&method.bric)
    .bind(method.payment_type.as_str())
    .bind(&method.last_four)
    .bind(method.is_verified)
    .bind(method.is_active)
    .bind(method.is_default)
    .bind(method.created_at)
    .bind(method.updated_at)
    .bind(method.last_used_at)
    .bind(method.deleted_at)
    .execute(conn)
    .await
    .map_err(|e| map_insert_error(e, method.id))?;
    Ok(())
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_root_id(&self, id: Uuid) -> StoreResult<Uuid> {
        let root: Option<(Uuid,)> = sqlx::query_as(
            r#"
            WITH RECURSIVE ancestors AS (
                SELECT id, parent_transaction_id FROM transactions WHERE id = $1
                UNION ALL
                SELECT t.id, t.parent_transaction_id
                FROM transactions t
                JOIN ancestors a ON t.id = a.parent_transaction_id
            )
            SELECT id FROM ancestors WHERE parent_transaction_id IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        root.map(|(root_id,)| root_id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))
    }

    async fn fetch_group(&self, root_id: Uuid) -> StoreResult<GroupSnapshot> {
        // Version first: a write landing between the two reads then shows up
        // as a conflict on commit instead of being missed.
        let version: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM transaction_groups WHERE root_id = $1")
                .bind(root_id)
                .fetch_optional(&self.pool)
                .await?;
        let (version,) =
            version.ok_or_else(|| StoreError::NotFound(format!("group {}", root_id)))?;

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            WITH RECURSIVE tree AS (
                SELECT * FROM transactions WHERE id = $1
                UNION ALL
                SELECT t.* FROM transactions t JOIN tree ON t.parent_transaction_id = tree.id
            )
            SELECT {} FROM tree
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;

        let transactions = rows
            .into_iter()
            .map(TransactionRow::into_domain)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(GroupSnapshot {
            root_id,
            transactions,
            version,
        })
    }

    async fn get_payment_method(&self, id: Uuid) -> StoreResult<PaymentMethod> {
        let row = sqlx::query_as::<_, PaymentMethodRow>(&format!(
            "SELECT {} FROM payment_methods WHERE id = $1",
            PAYMENT_METHOD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment method {}", id)))?
            .into_domain()
    }

    async fn set_payment_method_verified(
        &self,
        id: Uuid,
        verified: bool,
    ) -> StoreResult<PaymentMethod> {
        let row = sqlx::query_as::<_, PaymentMethodRow>(&format!(
            "UPDATE payment_methods SET is_verified = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            PAYMENT_METHOD_COLUMNS
        ))
        .bind(id)
        .bind(verified)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment method {}", id)))?
            .into_domain()
    }

    async fn commit(&self, write: GroupWrite) -> StoreResult<Transaction> {
        let mut db_tx: sqlx::Transaction<'_, Postgres> = self.pool.begin().await?;

        if let Some(expected) = write.expected_version {
            let updated = sqlx::query(
                "UPDATE transaction_groups SET version = version + 1, updated_at = NOW() \
                 WHERE root_id = $1 AND version = $2",
            )
            .bind(write.root_id)
            .bind(expected)
            .execute(&mut *db_tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(StoreError::Conflict {
                    root_id: write.root_id,
                    expected_version: expected,
                });
            }
        }

        let inserted = insert_transaction(&mut db_tx, &write.transaction).await?;

        if write.expected_version.is_none() {
            sqlx::query("INSERT INTO transaction_groups (root_id, version) VALUES ($1, 1)")
                .bind(write.root_id)
                .execute(&mut *db_tx)
                .await
                .map_err(|e| map_insert_error(e, write.root_id))?;
        }

        db_tx.commit().await?;
        Ok(inserted)
    }

    async fn finalize(&self, write: OutcomeWrite) -> StoreResult<Transaction> {
        let tx = &write.transaction;
        let mut db_tx: sqlx::Transaction<'_, Postgres> = self.pool.begin().await?;

        if let Some(method) = &write.new_payment_method {
            insert_payment_method(&mut db_tx, method).await?;
        }

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions
            SET status = $3, decline_category = $4, gateway_token = $5,
                gateway_response_code = $6, gateway_approval_code = $7,
                gateway_response_text = $8, processed_at = $9, payment_method_id = $10
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(tx.id)
        .bind(TransactionStatus::Pending.as_str())
        .bind(tx.status.as_str())
        .bind(tx.decline_category.map(|c| c.as_str()))
        .bind(&tx.gateway_token)
        .bind(&tx.gateway_response_code)
        .bind(&tx.gateway_approval_code)
        .bind(&tx.gateway_response_text)
        .bind(tx.processed_at)
        .bind(tx.payment_method_id)
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("pending transaction {}", tx.id)))?;
        let settled = row.into_domain()?;

        if let Some(method_id) = write.touch_payment_method {
            let touched = sqlx::query(
                "UPDATE payment_methods SET last_used_at = $2, updated_at = $2 WHERE id = $1",
            )
            .bind(method_id)
            .bind(settled.created_at)
            .execute(&mut *db_tx)
            .await?;

            if touched.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("payment method {}", method_id)));
            }
        }

        sqlx::query(
            "UPDATE transaction_groups SET version = version + 1, updated_at = NOW() \
             WHERE root_id = $1",
        )
        .bind(write.root_id)
        .execute(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        Ok(settled)
    }

    async fn release(&self, id: Uuid, root_id: Uuid) -> StoreResult<()> {
        let mut db_tx: sqlx::Transaction<'_, Postgres> = self.pool.begin().await?;

        if id == root_id {
            sqlx::query("DELETE FROM transaction_groups WHERE root_id = $1")
                .bind(root_id)
                .execute(&mut *db_tx)
                .await?;
        } else {
            sqlx::query(
                "UPDATE transaction_groups SET version = version + 1, updated_at = NOW() \
                 WHERE root_id = $1",
            )
            .bind(root_id)
            .execute(&mut *db_tx)
            .await?;
        }

        let deleted = sqlx::query("DELETE FROM transactions WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(TransactionStatus::Pending.as_str())
            .execute(&mut *db_tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("pending transaction {}", id)));
        }

        db_tx.commit().await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    parent_transaction_id: Option<Uuid>,
    merchant_id: Uuid,
    customer_id: Option<Uuid>,
    payment_method_id: Option<Uuid>,
    transaction_type: String,
    payment_method_type: String,
    amount_cents: i64,
    currency: String,
    status: String,
    decline_category: Option<String>,
    gateway_tran_nbr: String,
    gateway_token: Option<String>,
    gateway_response_code: Option<String>,
    gateway_approval_code: Option<String>,
    gateway_response_text: Option<String>,
    idempotency_key: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            parent_transaction_id: self.parent_transaction_id,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            payment_method_id: self.payment_method_id,
            transaction_type: self.transaction_type.parse().map_err(corrupt)?,
            payment_method_type: self.payment_method_type.parse().map_err(corrupt)?,
            amount_cents: self.amount_cents,
            currency: self.currency,
            status: self.status.parse().map_err(corrupt)?,
            decline_category: self
                .decline_category
                .as_deref()
                .map(str::parse::<DeclineCategory>)
                .transpose()
                .map_err(corrupt)?,
            gateway_tran_nbr: self.gateway_tran_nbr,
            gateway_token: self.gateway_token,
            gateway_response_code: self.gateway_response_code,
            gateway_approval_code: self.gateway_approval_code,
            gateway_response_text: self.gateway_response_text,
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            processed_at: self.processed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentMethodRow {
    id: Uuid,
    merchant_id: Uuid,
    customer_id: Option<Uuid>,
    bric: String,
    payment_type: String,
    last_four: Option<String>,
    is_verified: bool,
    is_active: bool,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl PaymentMethodRow {
    fn into_domain(self) -> StoreResult<PaymentMethod> {
        Ok(PaymentMethod {
            id: self.id,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            bric: self.bric,
            payment_type: self.payment_type.parse().map_err(corrupt)?,
            last_four: self.last_four,
            is_verified: self.is_verified,
            is_active: self.is_active,
            is_default: self.is_default,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_used_at: self.last_used_at,
            deleted_at: self.deleted_at,
        })
    }
}
