//! Merchant credential resolution.
//!
//! The gateway needs a merchant identity quadruple plus a signing secret for
//! every request. Storage of those secrets lives outside this crate; it is
//! consumed through [`CredentialProvider`] and fronted by [`CredentialCache`].

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod cache;
pub mod vault;

pub use cache::CredentialCache;
pub use vault::VaultCredentialProvider;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No credentials configured for merchant {0}")]
    UnknownMerchant(Uuid),
    #[error("Credential backend error: {0}")]
    Backend(String),
}

/// Static merchant identity and the per-merchant signing secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct MerchantCredentials {
    pub cust_nbr: String,
    pub merch_nbr: String,
    pub dba_nbr: String,
    pub terminal_nbr: String,
    pub mac_secret: String,
}

impl fmt::Debug for MerchantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("cust_nbr", &self.cust_nbr)
            .field("merch_nbr", &self.merch_nbr)
            .field("dba_nbr", &self.dba_nbr)
            .field("terminal_nbr", &self.terminal_nbr)
            .field("mac_secret", &"****")
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_merchant(&self, merchant_id: Uuid) -> Result<MerchantCredentials, CredentialError>;
}

/// Map-backed provider for local runs and tests.
#[derive(Default)]
pub struct StaticCredentialProvider {
    merchants: RwLock<HashMap<Uuid, MerchantCredentials>>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, merchant_id: Uuid, credentials: MerchantCredentials) {
        self.merchants.write().await.insert(merchant_id, credentials);
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_merchant(
        &self,
        merchant_id: Uuid,
    ) -> Result<MerchantCredentials, CredentialError> {
        self.merchants
            .read()
            .await
            .get(&merchant_id)
            .cloned()
            .ok_or(CredentialError::UnknownMerchant(merchant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_mac_secret() {
        let creds = MerchantCredentials {
            cust_nbr: "9001".to_string(),
            merch_nbr: "900300".to_string(),
            dba_nbr: "2".to_string(),
            terminal_nbr: "21".to_string(),
            mac_secret: "super-secret".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("900300"));
    }

    #[tokio::test]
    async fn test_static_provider_unknown_merchant() {
        let provider = StaticCredentialProvider::new();
        let result = provider.get_merchant(Uuid::new_v4()).await;
        assert!(matches!(result, Err(CredentialError::UnknownMerchant(_))));
    }
}
