use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use uuid::Uuid;

use crate::adapters::PostgresTransactionStore;
use crate::config::Config;
use crate::domain::compute_state;
use crate::ports::TransactionStore;
use crate::use_cases::PaymentOrchestrator;

#[derive(Parser)]
#[command(name = "paygate-core")]
#[command(
    about = "Paygate Core - idempotent card and ACH payment orchestration",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Payment method commands
    #[command(subcommand)]
    Method(MethodCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,

    /// Check database, credential backend and gateway client setup
    Check,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Print a stored transaction as JSON
    Show {
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
    /// Print the derived state of the group containing a transaction
    Group {
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum MethodCommands {
    /// Record the outcome of an ACH pre-note for a payment method
    Verify {
        #[arg(long)]
        merchant_id: Uuid,
        #[arg(value_name = "PAYMENT_METHOD_ID")]
        payment_method_id: Uuid,
        /// Mark the method as failed verification instead
        #[arg(long)]
        failed: bool,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(pool: &PgPool, tx_id: Uuid) -> anyhow::Result<()> {
    let store = PostgresTransactionStore::new(pool.clone());
    match store.get_transaction(tx_id).await? {
        Some(transaction) => {
            println!("{}", serde_json::to_string_pretty(&transaction)?);
            Ok(())
        }
        None => {
            tracing::warn!("Transaction {} not found", tx_id);
            anyhow::bail!("Transaction {} not found", tx_id)
        }
    }
}

pub async fn handle_tx_group(pool: &PgPool, tx_id: Uuid) -> anyhow::Result<()> {
    let store = PostgresTransactionStore::new(pool.clone());
    let root_id = store
        .find_root_id(tx_id)
        .await
        .with_context(|| format!("Transaction {} not found", tx_id))?;
    let snapshot = store.fetch_group(root_id).await?;
    let state = compute_state(&snapshot.transactions);

    if !state.is_consistent() {
        tracing::warn!(root_id = %root_id, anomalies = ?state.anomalies, "Group has anomalies");
    }
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub async fn handle_method_verify(
    orchestrator: &PaymentOrchestrator,
    merchant_id: Uuid,
    payment_method_id: Uuid,
    verified: bool,
) -> anyhow::Result<()> {
    let method = orchestrator
        .record_verification(merchant_id, payment_method_id, verified)
        .await?;
    println!(
        "✓ Payment method {} marked as {}",
        method.id,
        if verified { "verified" } else { "unverified" }
    );
    Ok(())
}

pub async fn handle_check(config: &Config, pool: &PgPool) -> anyhow::Result<()> {
    let report = crate::startup::validate_environment(config, pool).await;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Startup validation failed");
    }
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Gateway URL: {}", config.gateway.url);
    println!(
        "  Gateway timeouts: connect {:?}, request {:?}",
        config.gateway.connect_timeout, config.gateway.request_timeout
    );
    println!(
        "  Gateway retries: {} (backoff {:?}..{:?})",
        config.gateway.max_retries, config.gateway.backoff_base, config.gateway.backoff_max
    );
    println!(
        "  Circuit breaker: {} consecutive failures, reset after {:?}",
        config.gateway.breaker_failure_threshold, config.gateway.breaker_reset
    );
    println!("  Credential cache TTL: {:?}", config.credential_cache_ttl);
    println!("  Max conflict retries: {}", config.max_conflict_retries);
    match &config.vault {
        Some(vault) => println!("  Vault: {} (kv mount {})", vault.addr, vault.kv_mount),
        None => println!("  Vault: not configured"),
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
