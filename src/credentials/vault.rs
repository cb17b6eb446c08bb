use anyhow::{Context, Result};
use async_trait::async_trait;
use uuid::Uuid;
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::{CredentialError, CredentialProvider, MerchantCredentials};
use crate::config::VaultConfig;

const MERCHANT_PATH_PREFIX: &str = "merchants";

/// Reads merchant credentials from a Vault KV v2 mount at
/// `merchants/<merchant_id>`.
pub struct VaultCredentialProvider {
    client: VaultClient,
    kv_mount: String,
}

impl VaultCredentialProvider {
    pub async fn connect(config: &VaultConfig) -> Result<Self> {
        let mut client = VaultClient::new(
            VaultClientSettingsBuilder::default()
                .address(&config.addr)
                .build()
                .context("failed to build Vault client settings")?,
        )
        .context("failed to create Vault client")?;

        let auth = approle::login(
            &mut client,
            &config.auth_mount,
            &config.role_id,
            &config.secret_id,
        )
        .await
        .context("failed to authenticate to Vault with AppRole")?;
        client.set_token(&auth.client_token);

        Ok(Self {
            client,
            kv_mount: config.kv_mount.clone(),
        })
    }
}

#[async_trait]
impl CredentialProvider for VaultCredentialProvider {
    async fn get_merchant(
        &self,
        merchant_id: Uuid,
    ) -> Result<MerchantCredentials, CredentialError> {
        let path = format!("{}/{}", MERCHANT_PATH_PREFIX, merchant_id);
        kv2::read::<MerchantCredentials>(&self.client, &self.kv_mount, &path)
            .await
            .map_err(|e| match e {
                ClientError::APIError { code: 404, .. } => {
                    CredentialError::UnknownMerchant(merchant_id)
                }
                other => CredentialError::Backend(other.to_string()),
            })
    }
}
