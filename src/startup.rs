use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;

use crate::adapters::PostgresTransactionStore;
use crate::config::Config;
use crate::credentials::{CredentialCache, VaultCredentialProvider};
use crate::gateway::GatewayClient;
use crate::use_cases::PaymentOrchestrator;
use crate::utils::clock::SystemClock;

pub struct ValidationReport {
    pub database: bool,
    pub credentials: bool,
    pub gateway: bool,
    /// Breaker state of the freshly built client, when it could be built.
    pub gateway_circuit: Option<String>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.database && self.credentials && self.gateway
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Database Connectivity: {}", status(self.database));
        println!("Credential Backend:    {}", status(self.credentials));
        println!("Gateway Client:        {}", status(self.gateway));
        if let Some(circuit) = &self.gateway_circuit {
            println!("Gateway Circuit:       {}", circuit);
        }

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

/// Wires the production stack: Postgres store, Vault-backed credential
/// cache, pooled gateway client and the system clock.
pub async fn build_orchestrator(config: &Config, pool: PgPool) -> Result<PaymentOrchestrator> {
    let vault = config
        .vault
        .as_ref()
        .context("VAULT_ROLE_ID is required to resolve merchant credentials")?;
    let provider = VaultCredentialProvider::connect(vault).await?;
    let credentials = Arc::new(CredentialCache::new(
        Arc::new(provider),
        config.credential_cache_ttl,
    ));

    let gateway = GatewayClient::new(&config.gateway, credentials)
        .context("failed to build gateway HTTP client")?;
    tracing::info!(url = %config.gateway.url, "Gateway client initialized");

    Ok(PaymentOrchestrator::new(
        Arc::new(PostgresTransactionStore::new(pool)),
        Arc::new(gateway),
        Arc::new(SystemClock),
    )
    .with_max_conflict_retries(config.max_conflict_retries))
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> ValidationReport {
    let mut report = ValidationReport {
        database: true,
        credentials: true,
        gateway: true,
        gateway_circuit: None,
        errors: Vec::new(),
    };

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    match &config.vault {
        Some(vault) => {
            if let Err(e) = VaultCredentialProvider::connect(vault).await {
                report.credentials = false;
                report.errors.push(format!("Vault: {:#}", e));
            }
        }
        None => {
            report.credentials = false;
            report.errors.push("Vault: VAULT_ROLE_ID is not set".to_string());
        }
    }

    // Building the client checks TLS setup; it does not contact the gateway.
    let cache = Arc::new(CredentialCache::new(
        Arc::new(crate::credentials::StaticCredentialProvider::new()),
        config.credential_cache_ttl,
    ));
    if let Err(e) = config.gateway.validate() {
        report.gateway = false;
        report.errors.push(format!("Gateway: {:#}", e));
    }
    match GatewayClient::new(&config.gateway, cache) {
        Ok(client) => report.gateway_circuit = Some(client.circuit_state()),
        Err(e) => {
            report.gateway = false;
            report.errors.push(format!("Gateway: {}", e));
        }
    }

    report
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Failed to execute test query")?;

    sqlx::query("SELECT 1 FROM transaction_groups LIMIT 1")
        .execute(pool)
        .await
        .context("Schema is missing; run `paygate-core db migrate`")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_requires_every_check() {
        let mut report = ValidationReport {
            database: true,
            credentials: true,
            gateway: true,
            gateway_circuit: Some("closed".to_string()),
            errors: Vec::new(),
        };
        assert!(report.is_valid());

        report.credentials = false;
        assert!(!report.is_valid());
    }
}
